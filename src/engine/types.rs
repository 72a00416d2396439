//! Shared data types crossing the engine boundary.

use uuid::Uuid;

use crate::gpu::BufferId;
use crate::math::{Aabb, Transform};

/// Per-channel description exposed by a compressed frame.
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub name: String,
    pub min_grid_value: f32,
    pub max_grid_value: f32,
    /// Grid-space affine transform; an all-zero matrix means identity.
    pub grid_transform: Transform,
}

/// Layout of one compressed frame as advertised by its container.
#[derive(Debug, Clone, Default)]
pub struct FrameInfo {
    pub channels: Vec<ChannelInfo>,
    pub spatial_block_count: u32,
    pub channel_block_count: u32,
    /// Frame-local box; the minimum is the origin for encoded frames.
    pub aabb: Aabb,
}

impl Default for ChannelInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            min_grid_value: 0.0,
            max_grid_value: 0.0,
            grid_transform: Transform::EMPTY,
        }
    }
}

/// Valid frame range of a sequence, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameRange {
    pub start: i32,
    pub end: i32,
}

impl FrameRange {
    pub fn contains(&self, frame: i32) -> bool {
        frame >= self.start && frame <= self.end
    }
}

/// Playback parametrization of a sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaybackInfo {
    pub frame_count: u32,
    pub framerate_numerator: u32,
    pub framerate_denominator: u32,
    pub sequence_start_index: i32,
    pub sequence_index_increment: u32,
}

/// Sequence-level record: identity, union bounds and channel layout.
#[derive(Debug, Clone)]
pub struct SequenceInfo {
    pub file_uuid: Uuid,
    /// Union AABB dimensions over all frames, in blocks.
    pub max_aabb_size: [u32; 3],
    pub channels: Vec<String>,
}

/// Sizes and strides the decompressor requires for its external buffers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourcesRequirements {
    pub per_channel_block_data_size: u64,
    pub per_channel_block_data_stride: u32,
    pub per_channel_block_info_size: u64,
    pub per_channel_block_info_stride: u32,
    pub per_spatial_block_info_size: u64,
    pub per_spatial_block_info_stride: u32,
}

/// External GPU buffers registered with the decompressor.
#[derive(Debug, Clone, Copy)]
pub struct DecompressorResources {
    pub per_channel_block_data: BufferId,
    pub per_channel_block_info: BufferId,
    pub per_spatial_block_info: BufferId,
}

/// One chunked decompression submission.
#[derive(Debug, Clone, Copy)]
pub struct DecompressFrameDesc {
    pub first_spatial_block_index: u32,
    pub spatial_blocks_count: u32,
}

/// What the engine actually produced for a submission.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecompressedFrameFeedback {
    pub first_channel_block_index: u32,
    pub channel_blocks_count: u32,
}
