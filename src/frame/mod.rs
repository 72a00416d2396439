//! Sparse-frame data model, the grid-to-frame encoder and the
//! frame-to-grid decoder.

pub mod decoder;
pub mod encoder;
pub mod sparse_frame;

pub use decoder::{ChunkFrameData, FrameDecoder, GridDescriptor};
pub use encoder::FrameEncoder;
pub use sparse_frame::{
    EncodingMetadata, FrameChannel, SparseFrame, SpatialBlockInfo, VoxelStatistics,
};
