//! Interface contract for the opaque compression engine.
//!
//! The engine itself is an external collaborator; the pipeline only
//! traverses its metadata surfaces and drives decompression through the
//! traits declared here.

pub mod compression;
pub mod decompression;
pub mod library;
pub mod types;

pub use compression::{BuildCache, SequenceCompressor};
pub use decompression::{
    CompressionEngine, Decompressor, DecompressorFactory, FileDecoder, FormatMapper,
    FrameContainer,
};
pub use library::{engine_library_available, load_engine_library, EngineLibrary};
pub use types::{
    ChannelInfo, DecompressFrameDesc, DecompressedFrameFeedback, DecompressorResources,
    FrameInfo, FrameRange, PlaybackInfo, ResourcesRequirements, SequenceInfo,
};
