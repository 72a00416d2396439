//! Compressed-volume pipeline for sparse 3D scalar and vector fields.
//!
//! The crate converts between sparse in-memory grids and a compressed
//! multi-frame sequence container: the [`frame::FrameEncoder`] turns a
//! set of grids into a block-structured sparse frame for the opaque
//! compression engine, the [`frame::FrameDecoder`] reassembles grids from
//! GPU-decompressed block buffers, and the
//! [`decompress::DecompressorManager`] drives the engine across a file
//! with chunked submissions, blocking readback and bounded frame caching.

pub mod cache;
pub mod constants;
pub mod decompress;
pub mod engine;
pub mod error;
pub mod frame;
pub mod gpu;
pub mod grid;
pub mod math;
pub mod metadata;
pub mod resolver;
pub mod voxel;

pub use decompress::{DecompressionHelper, DecompressorManager, ManagerState};
pub use error::{PipelineError, PipelineResult};
pub use frame::{
    ChunkFrameData, EncodingMetadata, FrameDecoder, FrameEncoder, GridDescriptor, SparseFrame,
};
pub use grid::{BlockCoord, SparseGrid, VoxelType};
pub use math::{Aabb, Transform};
