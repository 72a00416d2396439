//! Decompression-side engine traits.
//!
//! Every handle is an owned box; dropping it releases the underlying
//! engine object. Containers fetched from a format mapper stay valid for
//! as long as the caller holds them.

use std::path::Path;

use crate::error::PipelineResult;

use super::types::{
    DecompressFrameDesc, DecompressedFrameFeedback, DecompressorResources, FrameInfo,
    FrameRange, PlaybackInfo, ResourcesRequirements, SequenceInfo,
};

/// Open handle onto one compressed file.
pub trait FileDecoder: Send {
    fn path(&self) -> &Path;
    /// Container format version of the file.
    fn format_version(&self) -> u64;
}

/// One compressed frame plus its flat string metadata dictionary.
pub trait FrameContainer: Send {
    fn info(&self) -> FrameInfo;
    fn metadata_by_key(&self, key: &str) -> Option<String>;
    fn metadata_count(&self) -> usize;
    fn metadata_by_index(&self, index: usize) -> Option<(String, String)>;
}

/// Frame-index to compressed-frame-container service of one file.
pub trait FormatMapper: Send {
    /// Allocates the container for `frame`. Out-of-range indices fail with
    /// [`crate::error::PipelineError::OutOfBounds`].
    fn fetch_frame(&self, frame: i32) -> PipelineResult<Box<dyn FrameContainer>>;
    fn fetch_frame_info(&self, frame: i32) -> PipelineResult<FrameInfo>;
    fn frame_range(&self) -> FrameRange;
    fn sequence_info(&self) -> SequenceInfo;
    fn playback_info(&self) -> PlaybackInfo;
    /// File-level metadata lookup.
    fn metadata_by_key(&self, key: &str) -> Option<String>;
}

/// GPU decompressor for one file. Writes into externally registered
/// buffers; one submission in flight at a time.
pub trait Decompressor: Send {
    /// Must be called before any other method; may submit GPU work.
    fn initialize(&mut self) -> PipelineResult<()>;
    fn resources_requirements(&self) -> ResourcesRequirements;
    /// Registers the external output buffers. Must precede decompression.
    fn register_resources(&mut self, resources: DecompressorResources) -> PipelineResult<()>;
    fn format_mapper(&self) -> &dyn FormatMapper;
    /// Engine-advertised ceiling on spatial blocks per submission.
    fn max_spatial_blocks_per_submit(&self) -> u32;
    /// Enqueues decompression of one chunk and reports the channel-block
    /// range it produced.
    fn decompress_frame(
        &mut self,
        frame: &dyn FrameContainer,
        desc: &DecompressFrameDesc,
    ) -> PipelineResult<DecompressedFrameFeedback>;
}

/// Builds [`Decompressor`] instances for open file decoders.
pub trait DecompressorFactory: Send {
    fn set_memory_limit_per_resource(&mut self, bytes: u64);
    fn create(&mut self, decoder: Box<dyn FileDecoder>) -> PipelineResult<Box<dyn Decompressor>>;
}

/// Entry point to a loaded compression engine.
pub trait CompressionEngine: Send + Sync {
    fn create_decompressor_factory(&self) -> PipelineResult<Box<dyn DecompressorFactory>>;
    /// Opens the file's decoder; missing or unreadable files fail with
    /// [`crate::error::PipelineError::NotFound`].
    fn open_decoder(&self, path: &Path) -> PipelineResult<Box<dyn FileDecoder>>;
}
