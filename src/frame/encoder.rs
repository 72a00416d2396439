//! Sparse-frame encoder: a set of grids becomes one block-structured,
//! channel-interleaved frame.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::constants::{SPARSE_BLOCK_SIZE, SPARSE_BLOCK_VOXEL_COUNT};
use crate::error::PipelineResult;
use crate::grid::{
    index_space_relative_transform, resample_to_index_space, BlockCoord, Leaf, SparseGrid,
};
use crate::math::Aabb;
use crate::voxel::{first_channel_index, ActiveMask, ChannelBlock, ChannelMask, ChannelTable};

use super::decoder::GridDescriptor;
use super::sparse_frame::{
    EncodingMetadata, FrameChannel, SparseFrame, SpatialBlockInfo, VoxelStatistics,
};

/// One scalar channel split off an input grid.
#[derive(Debug, Clone)]
struct ChannelSource {
    name: String,
    mask: ChannelMask,
    grid_index: usize,
    component_offset: usize,
    component_stride: usize,
}

/// Borrowed view of one leaf's contribution to a spatial block.
struct BlockRef<'a> {
    leaf: &'a Leaf,
    component_offset: usize,
    component_stride: usize,
}

/// Accumulator for one occupied spatial cell.
struct SpatialIntermediate<'a> {
    dest_index: u32,
    first_channel_block: u32,
    blocks: BTreeMap<ChannelMask, BlockRef<'a>>,
}

/// Result of packing one spatial cell, produced in parallel and placed
/// sequentially.
struct PackedSpatial {
    dest_index: u32,
    first_channel_block: u32,
    coords: [i32; 3],
    mask: ChannelMask,
    blocks: Vec<(u32, ChannelBlock, VoxelStatistics)>,
}

/// Grid-to-frame encoder.
///
/// Construction preprocesses the inputs (deep copy, tile voxelization and
/// optional resampling into the finest grid's index space) and splits them
/// into scalar channels; [`FrameEncoder::encode`] then emits the frame.
/// Input grids are borrowed read-only.
pub struct FrameEncoder {
    grids: Vec<SparseGrid>,
    channels: Vec<ChannelSource>,
    shuffle: Vec<GridDescriptor>,
}

fn component_letter(index: usize) -> String {
    match index {
        0 => "x".into(),
        1 => "y".into(),
        2 => "z".into(),
        3 => "w".into(),
        other => format!("c{}", other),
    }
}

impl FrameEncoder {
    /// Prepares the encoder over the given grids.
    ///
    /// With `match_voxel_size` the grid with the finest uniform voxel
    /// scale becomes the origin and every other grid is box-resampled
    /// into its index space.
    pub fn new(grids: &[SparseGrid], match_voxel_size: bool) -> PipelineResult<Self> {
        if grids.is_empty() {
            return Ok(Self { grids: Vec::new(), channels: Vec::new(), shuffle: Vec::new() });
        }

        let mut origin_index = 0;
        if match_voxel_size {
            let mut min_scale = f32::MAX;
            for (i, grid) in grids.iter().enumerate() {
                let scale = grid.transform().uniform_voxel_scale();
                if scale < min_scale {
                    min_scale = scale;
                    origin_index = i;
                }
            }
        }
        let origin_transform = *grids[origin_index].transform();

        let processed: Vec<SparseGrid> = grids
            .par_iter()
            .map(|grid| {
                let mut copy = grid.clone();
                copy.voxelize_active_tiles();
                if match_voxel_size {
                    let relative = index_space_relative_transform(grid, &grids[origin_index]);
                    if !relative.is_nearly_identity() {
                        copy = resample_to_index_space(&copy, &relative, &origin_transform);
                    }
                }
                copy
            })
            .collect();

        let mut table = ChannelTable::new();
        let mut channels = Vec::new();
        let mut shuffle = Vec::new();
        for (grid_index, grid) in processed.iter().enumerate() {
            let component_count = grid.voxel_type().component_count();
            let mut sources: [Option<String>; 4] = Default::default();
            for component in 0..component_count {
                let name = if component_count > 1 {
                    format!("{}.{}", grid.name(), component_letter(component))
                } else {
                    grid.name().to_owned()
                };
                let bit = table.insert(&name)?;
                channels.push(ChannelSource {
                    name: name.clone(),
                    mask: 1 << bit,
                    grid_index,
                    component_offset: component,
                    component_stride: component_count,
                });
                sources[component] = Some(name);
            }
            shuffle.push(GridDescriptor {
                name: grid.name().to_owned(),
                voxel_type: grid.voxel_type(),
                ch_source: sources,
            });
        }

        log::debug!(
            "[FrameEncoder::new] {} grids split into {} channels",
            processed.len(),
            channels.len()
        );
        Ok(Self { grids: processed, channels, shuffle })
    }

    /// Grid-descriptor list describing how decoded channels fuse back
    /// into grids; serialized as the frame's shuffle metadata.
    pub fn grid_shuffle(&self) -> &[GridDescriptor] {
        &self.shuffle
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    /// Builds the sparse frame and its encoding metadata.
    pub fn encode(&self) -> PipelineResult<(SparseFrame, EncodingMetadata)> {
        let mut spatial: BTreeMap<BlockCoord, SpatialIntermediate> = BTreeMap::new();
        let mut total_aabb = Aabb::default();

        for channel in &self.channels {
            let grid = &self.grids[channel.grid_index];
            for (coord, leaf) in grid.leaves() {
                total_aabb = total_aabb.union(&coord.to_aabb());
                let next_index = spatial.len() as u32;
                let entry = spatial.entry(*coord).or_insert_with(|| SpatialIntermediate {
                    dest_index: next_index,
                    first_channel_block: 0,
                    blocks: BTreeMap::new(),
                });
                entry.blocks.insert(
                    channel.mask,
                    BlockRef {
                        leaf,
                        component_offset: channel.component_offset,
                        component_stride: channel.component_stride,
                    },
                );
            }
        }

        let metadata = if total_aabb.is_empty() {
            EncodingMetadata::default()
        } else {
            EncodingMetadata::from_block_min(&total_aabb)
        };
        let shift = [
            metadata.offset_x / SPARSE_BLOCK_SIZE,
            metadata.offset_y / SPARSE_BLOCK_SIZE,
            metadata.offset_z / SPARSE_BLOCK_SIZE,
        ];

        // Fix contiguous channel-block offsets in destination order.
        let mut order = vec![BlockCoord::new(0, 0, 0); spatial.len()];
        for (coord, entry) in &spatial {
            order[entry.dest_index as usize] = *coord;
        }
        let mut channel_block_total = 0u32;
        for coord in &order {
            if let Some(entry) = spatial.get_mut(coord) {
                entry.first_channel_block = channel_block_total;
                channel_block_total += entry.blocks.len() as u32;
            }
        }

        // Pack voxel data and fold per-block statistics in parallel; the
        // scatter below is sequential into disjoint precomputed ranges.
        let entries: Vec<(&BlockCoord, &SpatialIntermediate)> = spatial.iter().collect();
        let packed: Vec<PackedSpatial> = entries
            .par_iter()
            .map(|(coord, entry)| {
                let mut mask: ChannelMask = 0;
                let mut blocks = Vec::with_capacity(entry.blocks.len());
                for (channel_mask, block_ref) in &entry.blocks {
                    mask |= channel_mask;
                    let mut block = ChannelBlock::zeroed();
                    pack_from_stride(
                        &mut block,
                        block_ref.leaf.data(),
                        block_ref.component_offset,
                        block_ref.component_stride,
                    );
                    let stats = block_statistics(&block, block_ref.leaf.active());
                    blocks.push((first_channel_index(*channel_mask), block, stats));
                }
                PackedSpatial {
                    dest_index: entry.dest_index,
                    first_channel_block: entry.first_channel_block,
                    coords: [
                        coord.x - shift[0],
                        coord.y - shift[1],
                        coord.z - shift[2],
                    ],
                    mask,
                    blocks,
                }
            })
            .collect();

        let mut frame = SparseFrame::empty();
        frame.channel_blocks = vec![ChannelBlock::zeroed(); channel_block_total as usize];
        frame.channel_index_per_block = vec![0; channel_block_total as usize];
        frame.spatial_blocks = vec![
            SpatialBlockInfo {
                coords: [0; 3],
                channel_blocks_offset: 0,
                channel_mask: 0,
                channel_count: 0,
            };
            spatial.len()
        ];
        let mut per_block_stats = vec![VoxelStatistics::default(); channel_block_total as usize];

        for item in packed {
            frame.spatial_blocks[item.dest_index as usize] = SpatialBlockInfo {
                coords: item.coords,
                channel_blocks_offset: item.first_channel_block,
                channel_mask: item.mask,
                channel_count: item.blocks.len() as u32,
            };
            for (i, (channel_index, block, stats)) in item.blocks.into_iter().enumerate() {
                let block_index = item.first_channel_block as usize + i;
                frame.channel_blocks[block_index] = block;
                frame.channel_index_per_block[block_index] = channel_index;
                per_block_stats[block_index] = stats;
            }
        }

        // Per-channel transforms compensate for the origin shift so
        // world-space positions survive the round trip.
        let compensation = [
            metadata.offset_x as f32,
            metadata.offset_y as f32,
            metadata.offset_z as f32,
        ];
        frame.channels = self
            .channels
            .iter()
            .map(|channel| {
                let transform = self.grids[channel.grid_index].transform();
                let translated =
                    transform.post_translate(transform.transform_vector3(compensation));
                FrameChannel {
                    name: channel.name.clone(),
                    statistics: VoxelStatistics::default(),
                    grid_transform: translated,
                }
            })
            .collect();

        // Roll per-block statistics into channel statistics: per-block
        // mean contributions divide by the dense voxel count, the frame
        // mean divides their sum by the active block count.
        let mut blocks_per_channel = vec![0u64; frame.channels.len()];
        for (block_index, stats) in per_block_stats.iter().enumerate() {
            let channel_index = frame.channel_index_per_block[block_index] as usize;
            let dst = &mut frame.channels[channel_index].statistics;
            dst.min_value = dst.min_value.min(stats.min_value);
            dst.max_value = dst.max_value.max(stats.max_value);
            dst.mean_positive_value += stats.mean_positive_value;
            dst.mean_negative_value += stats.mean_negative_value;
            blocks_per_channel[channel_index] += 1;
        }
        for (channel_index, channel) in frame.channels.iter_mut().enumerate() {
            let stats = &mut channel.statistics;
            let blocks = blocks_per_channel[channel_index];
            if blocks == 0 {
                stats.min_value = 0.0;
                stats.max_value = 0.0;
            } else {
                stats.mean_positive_value /= blocks as f32;
                stats.mean_negative_value /= blocks as f32;
                stats.voxel_count = blocks * SPARSE_BLOCK_VOXEL_COUNT as u64;
            }
        }

        frame.aabb = if total_aabb.is_empty() {
            Aabb::zero()
        } else {
            Aabb::new(
                0,
                0,
                0,
                total_aabb.max_x - total_aabb.min_x,
                total_aabb.max_y - total_aabb.min_y,
                total_aabb.max_z - total_aabb.min_z,
            )
        };

        log::debug!(
            "[FrameEncoder::encode] {} spatial blocks, {} channel blocks, aabb {:?}",
            frame.spatial_blocks.len(),
            frame.channel_blocks.len(),
            frame.aabb
        );
        Ok((frame, metadata))
    }
}

/// Gathers one component out of an interleaved leaf buffer.
fn pack_from_stride(dst: &mut ChannelBlock, src: &[f32], offset: usize, stride: usize) {
    if stride == 1 && offset == 0 {
        dst.voxels.copy_from_slice(&src[..SPARSE_BLOCK_VOXEL_COUNT]);
        return;
    }
    for (i, voxel) in dst.voxels.iter_mut().enumerate() {
        *voxel = src[i * stride + offset];
    }
}

/// Statistics over one channel block; min/max fold active voxels only,
/// mean contributions normalize by the dense voxel count.
fn block_statistics(block: &ChannelBlock, active: &ActiveMask) -> VoxelStatistics {
    let mut stats = VoxelStatistics::default();
    let mut positive_sum = 0.0f32;
    let mut negative_sum = 0.0f32;
    for (i, &value) in block.voxels.iter().enumerate() {
        if !active.get(i) {
            continue;
        }
        stats.min_value = stats.min_value.min(value);
        stats.max_value = stats.max_value.max(value);
        if value > 0.0 {
            positive_sum += value;
        } else if value < 0.0 {
            negative_sum += value;
        }
    }
    stats.mean_positive_value = positive_sum / SPARSE_BLOCK_VOXEL_COUNT as f32;
    stats.mean_negative_value = negative_sum / SPARSE_BLOCK_VOXEL_COUNT as f32;
    stats
}
