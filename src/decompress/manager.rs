//! Per-file decompression manager: owns the engine handles and GPU
//! buffers, drives chunked decompression and frame assembly.

use std::path::Path;
use std::sync::Arc;

use bytemuck::Zeroable;

use crate::constants::DEFAULT_MEMORY_LIMIT_PER_RESOURCE;
use crate::engine::types::{
    DecompressFrameDesc, DecompressorResources, FrameRange, PlaybackInfo, SequenceInfo,
};
use crate::engine::{CompressionEngine, Decompressor, DecompressorFactory, FrameContainer};
use crate::error::{PipelineError, PipelineResult};
use crate::frame::{ChunkFrameData, FrameDecoder, GridDescriptor};
use crate::gpu::{BufferId, PackedSpatialBlockInfo, ResourceUsage, RhiFactory, RhiRuntime};
use crate::grid::SparseGrid;
use crate::metadata::helper as metadata_helper;
use crate::voxel::HalfBlock;

/// Lifecycle state of a [`DecompressorManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Uninit,
    Ready,
    Bound,
}

#[derive(Default)]
struct BufferSlot {
    buffer: Option<BufferId>,
    size: u64,
    stride: u32,
}

/// Decompression state machine for one compressed file.
///
/// `Uninit -> initialize -> Ready -> register_decompressor -> Bound`;
/// `release` returns to `Uninit` from any state and is idempotent. One
/// decompression is in flight at a time per manager.
pub struct DecompressorManager {
    state: ManagerState,
    engine: Option<Arc<dyn CompressionEngine>>,
    rhi: Option<Box<dyn RhiRuntime>>,
    factory: Option<Box<dyn DecompressorFactory>>,
    decompressor: Option<Box<dyn Decompressor>>,
    channel_block_data: BufferSlot,
    channel_block_info: BufferSlot,
    spatial_block_info: BufferSlot,
}

impl Default for DecompressorManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DecompressorManager {
    pub fn new() -> Self {
        Self {
            state: ManagerState::Uninit,
            engine: None,
            rhi: None,
            factory: None,
            decompressor: None,
            channel_block_data: BufferSlot::default(),
            channel_block_info: BufferSlot::default(),
            spatial_block_info: BufferSlot::default(),
        }
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    /// Acquires the GPU runtime and the decompressor factory and applies
    /// the per-resource memory budget. On failure the manager stays
    /// `Uninit` with no partial state.
    pub fn initialize(
        &mut self,
        engine: Arc<dyn CompressionEngine>,
        rhi_factory: &dyn RhiFactory,
    ) -> PipelineResult<()> {
        if self.state != ManagerState::Uninit {
            return Ok(());
        }

        let rhi = rhi_factory.create()?;
        let mut factory = engine.create_decompressor_factory()?;
        factory.set_memory_limit_per_resource(DEFAULT_MEMORY_LIMIT_PER_RESOURCE);

        self.rhi = Some(rhi);
        self.factory = Some(factory);
        self.engine = Some(engine);
        self.state = ManagerState::Ready;
        log::info!("[DecompressorManager::initialize] Ready");
        Ok(())
    }

    /// Opens the file's decoder, builds its decompressor and sizes the
    /// external GPU buffers to its requirements.
    pub fn register_decompressor(&mut self, path: &Path) -> PipelineResult<()> {
        if self.state == ManagerState::Uninit {
            return Err(PipelineError::Internal(
                "register_decompressor called before initialize".into(),
            ));
        }
        // Any previous binding is void from here on; a failure below
        // leaves the manager Ready, not half-bound.
        self.state = ManagerState::Ready;
        self.decompressor = None;

        let engine = self
            .engine
            .as_ref()
            .ok_or_else(|| PipelineError::Internal("engine handle missing".into()))?;
        let factory = self
            .factory
            .as_mut()
            .ok_or_else(|| PipelineError::Internal("decompressor factory missing".into()))?;

        let decoder = engine.open_decoder(path)?;
        log::debug!(
            "[DecompressorManager::register_decompressor] {} (format v{})",
            path.display(),
            decoder.format_version()
        );

        let mut decompressor = factory.create(decoder)?;
        decompressor.initialize()?;

        let requirements = decompressor.resources_requirements();
        let rhi = self
            .rhi
            .as_mut()
            .ok_or_else(|| PipelineError::Internal("RHI runtime missing".into()))?;
        allocate_external_buffer(
            rhi.as_mut(),
            &mut self.channel_block_data,
            requirements.per_channel_block_data_size,
            requirements.per_channel_block_data_stride,
            "decompressionPerChannelBlockData",
        )?;
        allocate_external_buffer(
            rhi.as_mut(),
            &mut self.channel_block_info,
            requirements.per_channel_block_info_size,
            requirements.per_channel_block_info_stride,
            "decompressionPerChannelBlockInfo",
        )?;
        allocate_external_buffer(
            rhi.as_mut(),
            &mut self.spatial_block_info,
            requirements.per_spatial_block_info_size,
            requirements.per_spatial_block_info_stride,
            "decompressionPerSpatialBlockInfo",
        )?;

        if let (Some(data), Some(info), Some(spatial)) = (
            self.channel_block_data.buffer,
            self.channel_block_info.buffer,
            self.spatial_block_info.buffer,
        ) {
            decompressor.register_resources(DecompressorResources {
                per_channel_block_data: data,
                per_channel_block_info: info,
                per_spatial_block_info: spatial,
            })?;
        }

        self.decompressor = Some(decompressor);
        self.state = ManagerState::Bound;
        Ok(())
    }

    fn bound_decompressor(&self) -> PipelineResult<&dyn Decompressor> {
        match (&self.decompressor, self.state) {
            (Some(decompressor), ManagerState::Bound) => Ok(decompressor.as_ref()),
            _ => Err(PipelineError::Internal("no decompressor registered".into())),
        }
    }

    /// Fetches the compressed container for `frame`; the caller owns it.
    pub fn fetch_frame_container(&self, frame: i32) -> PipelineResult<Box<dyn FrameContainer>> {
        let mapper = self.bound_decompressor()?.format_mapper();
        let range = mapper.frame_range();
        if !range.contains(frame) {
            return Err(PipelineError::OutOfBounds {
                index: frame,
                start: range.start,
                end: range.end,
            });
        }
        mapper.fetch_frame(frame)
    }

    pub fn frame_range(&self) -> PipelineResult<FrameRange> {
        Ok(self.bound_decompressor()?.format_mapper().frame_range())
    }

    pub fn sequence_info(&self) -> PipelineResult<SequenceInfo> {
        Ok(self.bound_decompressor()?.format_mapper().sequence_info())
    }

    pub fn playback_info(&self) -> PipelineResult<PlaybackInfo> {
        Ok(self.bound_decompressor()?.format_mapper().playback_info())
    }

    /// Decompresses one frame, reading GPU output back chunk by chunk and
    /// assembling the output grids.
    ///
    /// A failure here leaves GPU state undefined; the caller must
    /// `release` before another attempt.
    pub fn decompress_frame(
        &mut self,
        container: &dyn FrameContainer,
    ) -> PipelineResult<Vec<SparseGrid>> {
        if self.state != ManagerState::Bound {
            return Err(PipelineError::Internal("no decompressor registered".into()));
        }
        let frame_info = container.info();

        let mut descriptors = metadata_helper::read_grid_shuffle(container);
        if descriptors.is_empty() {
            descriptors = GridDescriptor::defaults_for_channels(&frame_info.channels);
        }
        let encoding_metadata = metadata_helper::read_encoding_metadata(container);
        let mut decoder = FrameDecoder::new(frame_info.clone(), descriptors, encoding_metadata);

        let rhi = self
            .rhi
            .as_mut()
            .ok_or_else(|| PipelineError::Internal("RHI runtime missing".into()))?;
        let decompressor = self
            .decompressor
            .as_mut()
            .ok_or_else(|| PipelineError::Internal("decompressor missing".into()))?;
        let spatial_buffer = self
            .spatial_block_info
            .buffer
            .ok_or_else(|| PipelineError::Internal("spatial block buffer missing".into()))?;
        let data_buffer = self
            .channel_block_data
            .buffer
            .ok_or_else(|| PipelineError::Internal("channel block buffer missing".into()))?;

        rhi.start_recording()?;

        let max_chunk = decompressor.max_spatial_blocks_per_submit().max(1);
        let chunk_count = (frame_info.spatial_block_count + max_chunk - 1) / max_chunk;
        log::debug!(
            "[DecompressorManager::decompress_frame] {} spatial blocks in {} chunks",
            frame_info.spatial_block_count,
            chunk_count
        );

        for chunk_index in 0..chunk_count {
            let first = max_chunk * chunk_index;
            let desc = DecompressFrameDesc {
                first_spatial_block_index: first,
                spatial_blocks_count: max_chunk.min(frame_info.spatial_block_count - first),
            };
            let feedback = decompressor.decompress_frame(container, &desc)?;

            let mut packed_spatial =
                vec![PackedSpatialBlockInfo::zeroed(); desc.spatial_blocks_count as usize];
            rhi.read_buffer(spatial_buffer, bytemuck::cast_slice_mut(&mut packed_spatial), 0)?;

            let mut channel_blocks =
                vec![HalfBlock::zeroed(); feedback.channel_blocks_count as usize];
            rhi.read_buffer(data_buffer, bytemuck::cast_slice_mut(&mut channel_blocks), 0)?;

            rhi.garbage_collect();

            let spatial_blocks: Vec<_> =
                packed_spatial.iter().map(PackedSpatialBlockInfo::unpack).collect();
            decoder.decode_chunk(&ChunkFrameData {
                spatial_blocks: &spatial_blocks,
                channel_blocks: &channel_blocks,
                first_channel_block_index: feedback.first_channel_block_index,
            })?;
        }

        rhi.stop_recording()?;
        Ok(decoder.into_grids())
    }

    /// Tears everything down in order: buffers, decompressor, factory,
    /// then the RHI. Safe to call repeatedly and from any state.
    pub fn release(&mut self) {
        if self.state == ManagerState::Uninit {
            return;
        }
        if let Some(rhi) = self.rhi.as_mut() {
            for slot in [
                &mut self.channel_block_data,
                &mut self.channel_block_info,
                &mut self.spatial_block_info,
            ] {
                if let Some(buffer) = slot.buffer.take() {
                    if let Err(e) = rhi.release_buffer(buffer) {
                        log::warn!("[DecompressorManager::release] buffer release: {}", e);
                    }
                }
                *slot = BufferSlot::default();
            }
        }
        self.decompressor = None;
        self.factory = None;
        if let Some(rhi) = self.rhi.as_mut() {
            rhi.garbage_collect();
        }
        self.rhi = None;
        self.engine = None;
        self.state = ManagerState::Uninit;
        log::info!("[DecompressorManager::release] Released");
    }
}

impl Drop for DecompressorManager {
    fn drop(&mut self) {
        self.release();
    }
}

/// Re-creates a GPU buffer when the required size or stride changed;
/// zero-sized requirements leave the slot empty.
fn allocate_external_buffer(
    rhi: &mut dyn RhiRuntime,
    slot: &mut BufferSlot,
    size: u64,
    stride: u32,
    name: &str,
) -> PipelineResult<()> {
    if slot.size == size && slot.stride == stride {
        return Ok(());
    }
    if let Some(buffer) = slot.buffer.take() {
        rhi.release_buffer(buffer)?;
    }
    *slot = BufferSlot::default();
    if size == 0 {
        return Ok(());
    }
    let usage =
        ResourceUsage::UNORDERED_ACCESS | ResourceUsage::SHADER_RESOURCE | ResourceUsage::COPY_SOURCE;
    let buffer = rhi.create_buffer(size, stride, usage, name)?;
    *slot = BufferSlot { buffer: Some(buffer), size, stride };
    Ok(())
}
