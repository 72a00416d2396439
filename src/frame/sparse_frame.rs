//! Immutable block-structured frame container produced by the encoder.

use crate::constants::{SPARSE_BLOCK_SIZE, SPARSE_BLOCK_VOXEL_COUNT};
use crate::error::{PipelineError, PipelineResult};
use crate::math::{Aabb, Transform};
use crate::voxel::{active_channel_offset, channel_count, ChannelBlock, ChannelMask};

/// Statistics over one channel's active voxels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelStatistics {
    pub min_value: f32,
    pub max_value: f32,
    pub mean_positive_value: f32,
    pub mean_negative_value: f32,
    pub voxel_count: u64,
}

impl Default for VoxelStatistics {
    fn default() -> Self {
        Self {
            min_value: f32::MAX,
            max_value: f32::MIN,
            mean_positive_value: 0.0,
            mean_negative_value: 0.0,
            voxel_count: 0,
        }
    }
}

/// One channel of a sparse frame.
#[derive(Debug, Clone)]
pub struct FrameChannel {
    pub name: String,
    pub statistics: VoxelStatistics,
    pub grid_transform: Transform,
}

/// Descriptor of one occupied sparse block.
///
/// `coords` are AABB-relative block coordinates, never negative. Channel
/// payloads for the block occupy the contiguous index range
/// `[channel_blocks_offset, channel_blocks_offset + channel_count)` in
/// ascending channel-bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialBlockInfo {
    pub coords: [i32; 3],
    pub channel_blocks_offset: u32,
    pub channel_mask: ChannelMask,
    pub channel_count: u32,
}

/// Origin offset of a frame in voxels; translates frame-local coordinates
/// back into world space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodingMetadata {
    pub offset_x: i32,
    pub offset_y: i32,
    pub offset_z: i32,
}

impl EncodingMetadata {
    pub fn from_block_min(aabb: &Aabb) -> Self {
        Self {
            offset_x: aabb.min_x * SPARSE_BLOCK_SIZE,
            offset_y: aabb.min_y * SPARSE_BLOCK_SIZE,
            offset_z: aabb.min_z * SPARSE_BLOCK_SIZE,
        }
    }

    /// Wire form: three space-separated integers.
    pub fn to_metadata_string(&self) -> String {
        format!("{} {} {}", self.offset_x, self.offset_y, self.offset_z)
    }

    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split_whitespace().map(|p| p.parse::<i32>());
        match (parts.next(), parts.next(), parts.next()) {
            (Some(Ok(x)), Some(Ok(y)), Some(Ok(z))) => {
                Some(Self { offset_x: x, offset_y: y, offset_z: z })
            }
            _ => None,
        }
    }

    /// Translation undoing the encoder's origin shift, in voxels.
    pub fn decode_translation(&self) -> [f32; 3] {
        [
            -self.offset_x as f32,
            -self.offset_y as f32,
            -self.offset_z as f32,
        ]
    }
}

/// Channel-interleaved sparse frame; the unit handed to the compressor.
///
/// Constructed only by [`crate::frame::FrameEncoder`] and immutable
/// afterwards. The AABB is normalized so its minimum is the origin; the
/// pre-shift origin is carried in [`EncodingMetadata`].
#[derive(Debug, Clone, Default)]
pub struct SparseFrame {
    pub(crate) aabb: Aabb,
    pub(crate) channels: Vec<FrameChannel>,
    pub(crate) spatial_blocks: Vec<SpatialBlockInfo>,
    pub(crate) channel_blocks: Vec<ChannelBlock>,
    pub(crate) channel_index_per_block: Vec<u32>,
}

impl SparseFrame {
    /// Frame with a zero-sized AABB and no blocks.
    pub fn empty() -> Self {
        Self { aabb: Aabb::zero(), ..Default::default() }
    }

    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    pub fn channels(&self) -> &[FrameChannel] {
        &self.channels
    }

    pub fn spatial_blocks(&self) -> &[SpatialBlockInfo] {
        &self.spatial_blocks
    }

    pub fn channel_blocks(&self) -> &[ChannelBlock] {
        &self.channel_blocks
    }

    pub fn channel_index_per_block(&self) -> &[u32] {
        &self.channel_index_per_block
    }

    pub fn spatial_block_count(&self) -> u32 {
        self.spatial_blocks.len() as u32
    }

    pub fn channel_block_count(&self) -> u32 {
        self.channel_blocks.len() as u32
    }

    /// Checks the structural invariants of the container.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.channel_blocks.len() != self.channel_index_per_block.len() {
            return Err(PipelineError::Internal(
                "channel block and index arrays disagree".into(),
            ));
        }
        if !self.spatial_blocks.is_empty()
            && (self.aabb.min_x != 0 || self.aabb.min_y != 0 || self.aabb.min_z != 0)
        {
            return Err(PipelineError::Internal(
                "frame AABB is not origin-normalized".into(),
            ));
        }
        for block in &self.spatial_blocks {
            if block.channel_count != channel_count(block.channel_mask) {
                return Err(PipelineError::Internal(format!(
                    "channel count {} disagrees with mask {:#010b}",
                    block.channel_count, block.channel_mask
                )));
            }
            let end = block.channel_blocks_offset as usize + block.channel_count as usize;
            if end > self.channel_blocks.len() {
                return Err(PipelineError::Internal(format!(
                    "channel block range [{}, {}) out of bounds",
                    block.channel_blocks_offset, end
                )));
            }
            if block.coords.iter().any(|&c| c < 0) {
                return Err(PipelineError::Internal(
                    "spatial block coordinate below frame origin".into(),
                ));
            }
            if !self.aabb.contains_block(block.coords[0], block.coords[1], block.coords[2]) {
                return Err(PipelineError::Internal(
                    "spatial block outside the frame AABB".into(),
                ));
            }
            // Payloads appear in ascending channel-bit order.
            for channel in 0..8u32 {
                let Some(offset) = active_channel_offset(block.channel_mask, channel) else {
                    continue;
                };
                let index = block.channel_blocks_offset as usize + offset as usize;
                if self.channel_index_per_block[index] != channel {
                    return Err(PipelineError::Internal(format!(
                        "channel block {} does not belong to channel {}",
                        index, channel
                    )));
                }
            }
        }
        for (i, channel) in self.channels.iter().enumerate() {
            let blocks = self
                .channel_index_per_block
                .iter()
                .filter(|&&c| c == i as u32)
                .count() as u64;
            if channel.statistics.voxel_count != blocks * SPARSE_BLOCK_VOXEL_COUNT as u64 {
                return Err(PipelineError::Internal(format!(
                    "channel '{}' voxel count does not cover its blocks",
                    channel.name
                )));
            }
        }
        Ok(())
    }
}
