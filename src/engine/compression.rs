//! Compression-side engine traits.

use std::io::{Read, Write};

use crate::error::PipelineResult;
use crate::frame::SparseFrame;

/// Opaque compressor consuming encoder-produced sparse frames.
pub trait SequenceCompressor: Send {
    /// Appends one frame together with its per-frame metadata entries.
    fn add_frame(
        &mut self,
        frame: &SparseFrame,
        metadata: &[(String, String)],
    ) -> PipelineResult<()>;
    /// Finalizes the sequence with its file-level metadata.
    fn finish(&mut self, metadata: &[(String, String)]) -> PipelineResult<()>;
}

/// Disk-backed staging cache the compressor uses for intermediate
/// artifacts, keyed by string fingerprint.
///
/// Contract: at most one writer per id; a bound id (open writer or
/// reader) cannot be released; `release` deletes the backing file.
pub trait BuildCache: Send {
    fn start_store(&mut self, id: &str) -> PipelineResult<Box<dyn Write + Send>>;
    fn finish_store(&mut self, id: &str) -> PipelineResult<()>;
    fn start_read(&mut self, id: &str) -> PipelineResult<Box<dyn Read + Send>>;
    fn finish_read(&mut self, id: &str) -> PipelineResult<()>;
    fn release(&mut self, id: &str) -> PipelineResult<()>;
}
