//! Sparse-frame decoder: GPU-produced block buffers become sparse grids.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use parking_lot::Mutex;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::constants::{MAX_CHANNEL_COUNT, SPARSE_BLOCK_VOXEL_COUNT};
use crate::engine::types::{ChannelInfo, FrameInfo};
use crate::error::{PipelineError, PipelineResult};
use crate::grid::{BlockCoord, Leaf, SparseGrid, VoxelType};
use crate::math::Transform;
use crate::voxel::HalfBlock;

use super::sparse_frame::{EncodingMetadata, SpatialBlockInfo};

/// Declaration fusing up to four named source channels into one output
/// grid of the given voxel type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridDescriptor {
    pub name: String,
    pub voxel_type: VoxelType,
    pub ch_source: [Option<String>; 4],
}

impl GridDescriptor {
    pub fn scalar(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            voxel_type: VoxelType::Float1,
            ch_source: [Some(source.into()), None, None, None],
        }
    }

    pub fn float3(name: impl Into<String>, sources: [&str; 3]) -> Self {
        Self {
            name: name.into(),
            voxel_type: VoxelType::Float3,
            ch_source: [
                Some(sources[0].to_owned()),
                Some(sources[1].to_owned()),
                Some(sources[2].to_owned()),
                None,
            ],
        }
    }

    /// Default mapping when a frame carries no shuffle metadata: one
    /// scalar output grid per channel, named after it.
    pub fn defaults_for_channels(channels: &[ChannelInfo]) -> Vec<GridDescriptor> {
        channels
            .iter()
            .map(|c| GridDescriptor::scalar(c.name.clone(), c.name.clone()))
            .collect()
    }
}

/// One chunk of decompressed frame data as read back from the GPU.
pub struct ChunkFrameData<'a> {
    pub spatial_blocks: &'a [SpatialBlockInfo],
    pub channel_blocks: &'a [HalfBlock],
    /// Global index of `channel_blocks[0]` within the frame.
    pub first_channel_block_index: u32,
}

struct LeafIntermediate {
    ch_blocks: [Option<usize>; 4],
}

struct GridIntermediate {
    voxel_type: VoxelType,
    transform: Transform,
    leaves: BTreeMap<BlockCoord, LeafIntermediate>,
}

/// Chunk accumulator reconstructing output grids from decompressed block
/// buffers according to a grid-descriptor list.
pub struct FrameDecoder {
    frame_info: FrameInfo,
    descriptors: Vec<GridDescriptor>,
    /// source channel name -> (descriptor index, component index) list;
    /// one channel may drive several outputs.
    targets_by_channel: FxHashMap<String, Vec<(usize, usize)>>,
    encoding_metadata: Option<EncodingMetadata>,
    grids: BTreeMap<String, SparseGrid>,
}

impl FrameDecoder {
    pub fn new(
        frame_info: FrameInfo,
        descriptors: Vec<GridDescriptor>,
        encoding_metadata: Option<EncodingMetadata>,
    ) -> Self {
        let mut targets_by_channel: FxHashMap<String, Vec<(usize, usize)>> =
            FxHashMap::default();
        for (descriptor_index, descriptor) in descriptors.iter().enumerate() {
            let component_count = descriptor.voxel_type.component_count();
            for (component, source) in descriptor.ch_source.iter().take(component_count).enumerate()
            {
                if let Some(source) = source {
                    targets_by_channel
                        .entry(source.clone())
                        .or_default()
                        .push((descriptor_index, component));
                }
            }
        }
        Self {
            frame_info,
            descriptors,
            targets_by_channel,
            encoding_metadata,
            grids: BTreeMap::new(),
        }
    }

    /// Folds one chunk into the output grids.
    ///
    /// Chunks must arrive in ascending spatial-block order, matching the
    /// orchestrator's submission order.
    pub fn decode_chunk(&mut self, chunk: &ChunkFrameData<'_>) -> PipelineResult<()> {
        let mut intermediates: BTreeMap<usize, GridIntermediate> = BTreeMap::new();

        for spatial in chunk.spatial_blocks {
            let mut local_channel_index = 0u32;
            for bit in 0..MAX_CHANNEL_COUNT {
                if spatial.channel_mask & (1 << bit) == 0 {
                    continue;
                }
                let channel = self.frame_info.channels.get(bit).ok_or_else(|| {
                    PipelineError::InvalidInput(format!(
                        "spatial block mask bit {} has no declared channel",
                        bit
                    ))
                })?;
                let Some(targets) = self.targets_by_channel.get(&channel.name) else {
                    // Channel claimed by no output grid; its payload was
                    // not materialized for this chunk.
                    continue;
                };

                let coord = BlockCoord::new(
                    spatial.coords[0] + self.frame_info.aabb.min_x,
                    spatial.coords[1] + self.frame_info.aabb.min_y,
                    spatial.coords[2] + self.frame_info.aabb.min_z,
                );
                let block_index = (spatial.channel_blocks_offset + local_channel_index)
                    .checked_sub(chunk.first_channel_block_index)
                    .map(|i| i as usize)
                    .filter(|&i| i < chunk.channel_blocks.len())
                    .ok_or_else(|| {
                        PipelineError::Internal(format!(
                            "channel block for '{}' outside chunk range",
                            channel.name
                        ))
                    })?;

                for &(descriptor_index, component) in targets {
                    let intermediate =
                        intermediates.entry(descriptor_index).or_insert_with(|| {
                            GridIntermediate {
                                voxel_type: self.descriptors[descriptor_index].voxel_type,
                                transform: channel.grid_transform,
                                leaves: BTreeMap::new(),
                            }
                        });
                    let leaf = intermediate
                        .leaves
                        .entry(coord)
                        .or_insert(LeafIntermediate { ch_blocks: [None; 4] });
                    leaf.ch_blocks[component] = Some(block_index);
                }
                local_channel_index += 1;
            }
        }

        for (descriptor_index, intermediate) in intermediates {
            self.assemble_grid(descriptor_index, intermediate, chunk);
        }
        Ok(())
    }

    fn assemble_grid(
        &mut self,
        descriptor_index: usize,
        intermediate: GridIntermediate,
        chunk: &ChunkFrameData<'_>,
    ) {
        let name = self.descriptors[descriptor_index].name.clone();
        let grid = match self.grids.entry(name) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let mut grid = SparseGrid::new(entry.key().clone(), intermediate.voxel_type);
                let mut transform = intermediate.transform.sanitized();
                if let Some(metadata) = &self.encoding_metadata {
                    let translation =
                        transform.transform_vector3(metadata.decode_translation());
                    transform = transform.post_translate(translation);
                }
                grid.set_transform(transform);
                entry.insert(grid)
            }
        };

        let voxel_type = intermediate.voxel_type;
        let component_count = voxel_type.component_count();
        let entries: Vec<(BlockCoord, LeafIntermediate)> =
            intermediate.leaves.into_iter().collect();

        let grid_mutex = Mutex::new(grid);
        entries.par_iter().for_each(|(coord, leaf_intermediate)| {
            let mut leaf = Leaf::dense(voxel_type);
            for component in 0..component_count {
                // Missing components stay zero-filled.
                if let Some(block_index) = leaf_intermediate.ch_blocks[component] {
                    copy_to_strided(
                        leaf.data_mut(),
                        &chunk.channel_blocks[block_index],
                        component_count,
                        component,
                    );
                }
            }
            grid_mutex.lock().add_leaf(*coord, leaf);
        });
    }

    /// Finishes decoding and hands out the reconstructed grids, ordered
    /// by name.
    pub fn into_grids(self) -> Vec<SparseGrid> {
        self.grids.into_values().collect()
    }
}

/// Widens one f16 channel block into an interleaved leaf buffer.
fn copy_to_strided(dst: &mut [f32], src: &HalfBlock, component_count: usize, component: usize) {
    for i in 0..SPARSE_BLOCK_VOXEL_COUNT {
        dst[i * component_count + component] = src.voxels[i].to_f32();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Aabb;
    use half::f16;

    fn half_block_with(values: &[(usize, f32)]) -> HalfBlock {
        let mut block = HalfBlock::zeroed();
        for &(index, value) in values {
            block.voxels[index] = f16::from_f32(value);
        }
        block
    }

    fn frame_info(channel_names: &[&str]) -> FrameInfo {
        FrameInfo {
            channels: channel_names
                .iter()
                .map(|&name| ChannelInfo { name: name.to_owned(), ..Default::default() })
                .collect(),
            spatial_block_count: 1,
            channel_block_count: channel_names.len() as u32,
            aabb: Aabb::new(0, 0, 0, 1, 1, 1),
        }
    }

    #[test]
    fn shuffle_fuses_three_scalars_into_one_vector_grid() {
        let info = frame_info(&["a", "b", "c"]);
        let descriptors = vec![GridDescriptor::float3("V", ["a", "b", "c"])];
        let mut decoder = FrameDecoder::new(info, descriptors, None);

        let spatial = [SpatialBlockInfo {
            coords: [0, 0, 0],
            channel_blocks_offset: 0,
            channel_mask: 0b111,
            channel_count: 3,
        }];
        let blocks = [
            half_block_with(&[(0, 1.0)]),
            half_block_with(&[(0, 2.0)]),
            half_block_with(&[(0, 3.0)]),
        ];
        decoder
            .decode_chunk(&ChunkFrameData {
                spatial_blocks: &spatial,
                channel_blocks: &blocks,
                first_channel_block_index: 0,
            })
            .unwrap();

        let grids = decoder.into_grids();
        assert_eq!(grids.len(), 1);
        let grid = &grids[0];
        assert_eq!(grid.name(), "V");
        assert_eq!(grid.voxel_type(), VoxelType::Float3);
        assert_eq!(grid.voxel_component(0, 0, 0, 0), 1.0);
        assert_eq!(grid.voxel_component(0, 0, 0, 1), 2.0);
        assert_eq!(grid.voxel_component(0, 0, 0, 2), 3.0);
    }

    #[test]
    fn one_channel_can_drive_multiple_outputs() {
        let info = frame_info(&["density"]);
        let descriptors = vec![
            GridDescriptor::scalar("a", "density"),
            GridDescriptor::scalar("b", "density"),
        ];
        let mut decoder = FrameDecoder::new(info, descriptors, None);

        let spatial = [SpatialBlockInfo {
            coords: [0, 0, 0],
            channel_blocks_offset: 0,
            channel_mask: 0b1,
            channel_count: 1,
        }];
        let blocks = [half_block_with(&[(5, 7.0)])];
        decoder
            .decode_chunk(&ChunkFrameData {
                spatial_blocks: &spatial,
                channel_blocks: &blocks,
                first_channel_block_index: 0,
            })
            .unwrap();

        let grids = decoder.into_grids();
        assert_eq!(grids.len(), 2);
        for grid in &grids {
            assert_eq!(grid.voxel_component(5, 0, 0, 0), 7.0);
        }
    }

    #[test]
    fn unclaimed_channels_do_not_advance_the_local_index() {
        // Channels: a (unclaimed), b (claimed). The chunk only carries
        // payloads for claimed channels, so b's payload is block 0.
        let info = frame_info(&["a", "b"]);
        let descriptors = vec![GridDescriptor::scalar("out", "b")];
        let mut decoder = FrameDecoder::new(info, descriptors, None);

        let spatial = [SpatialBlockInfo {
            coords: [0, 0, 0],
            channel_blocks_offset: 0,
            channel_mask: 0b11,
            channel_count: 2,
        }];
        let blocks = [half_block_with(&[(0, 9.0)])];
        decoder
            .decode_chunk(&ChunkFrameData {
                spatial_blocks: &spatial,
                channel_blocks: &blocks,
                first_channel_block_index: 0,
            })
            .unwrap();

        let grids = decoder.into_grids();
        assert_eq!(grids.len(), 1);
        assert_eq!(grids[0].voxel_component(0, 0, 0, 0), 9.0);
    }

    #[test]
    fn chunks_accumulate_into_one_grid() {
        let mut info = frame_info(&["density"]);
        info.spatial_block_count = 2;
        info.channel_block_count = 2;
        info.aabb = Aabb::new(0, 0, 0, 2, 1, 1);
        let descriptors = GridDescriptor::defaults_for_channels(&info.channels);
        let mut decoder = FrameDecoder::new(info, descriptors, None);

        for (index, value) in [(0, 1.0f32), (1, 2.0f32)] {
            let spatial = [SpatialBlockInfo {
                coords: [index, 0, 0],
                channel_blocks_offset: index as u32,
                channel_mask: 0b1,
                channel_count: 1,
            }];
            let blocks = [half_block_with(&[(0, value)])];
            decoder
                .decode_chunk(&ChunkFrameData {
                    spatial_blocks: &spatial,
                    channel_blocks: &blocks,
                    first_channel_block_index: index as u32,
                })
                .unwrap();
        }

        let grids = decoder.into_grids();
        assert_eq!(grids.len(), 1);
        let grid = &grids[0];
        assert_eq!(grid.leaf_count(), 2);
        assert_eq!(grid.voxel_component(0, 0, 0, 0), 1.0);
        assert_eq!(grid.voxel_component(8, 0, 0, 0), 2.0);
    }

    #[test]
    fn transform_compensation_undoes_origin_shift() {
        let mut info = frame_info(&["density"]);
        info.channels[0].grid_transform = Transform::IDENTITY;
        let descriptors = GridDescriptor::defaults_for_channels(&info.channels);
        let metadata = EncodingMetadata { offset_x: -8, offset_y: 0, offset_z: 16 };
        let mut decoder = FrameDecoder::new(info, descriptors, Some(metadata));

        let spatial = [SpatialBlockInfo {
            coords: [0, 0, 0],
            channel_blocks_offset: 0,
            channel_mask: 0b1,
            channel_count: 1,
        }];
        let blocks = [half_block_with(&[(0, 1.0)])];
        decoder
            .decode_chunk(&ChunkFrameData {
                spatial_blocks: &spatial,
                channel_blocks: &blocks,
                first_channel_block_index: 0,
            })
            .unwrap();

        let grids = decoder.into_grids();
        let world = grids[0].transform().transform_point3([0.0, 0.0, 0.0]);
        assert_eq!(world, [8.0, 0.0, -16.0]);
    }

    #[test]
    fn empty_transform_decodes_as_identity() {
        let info = frame_info(&["density"]);
        let descriptors = GridDescriptor::defaults_for_channels(&info.channels);
        let mut decoder = FrameDecoder::new(info, descriptors, None);

        let spatial = [SpatialBlockInfo {
            coords: [0, 0, 0],
            channel_blocks_offset: 0,
            channel_mask: 0b1,
            channel_count: 1,
        }];
        let blocks = [half_block_with(&[(0, 1.0)])];
        decoder
            .decode_chunk(&ChunkFrameData {
                spatial_blocks: &spatial,
                channel_blocks: &blocks,
                first_channel_block_index: 0,
            })
            .unwrap();

        let grids = decoder.into_grids();
        assert!(grids[0].transform().is_nearly_identity());
    }
}
