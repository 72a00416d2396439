//! Crate-wide constants shared by the encoder, decoder and GPU layout.
//!
//! Every block-size assumption in the pipeline routes through this file so
//! the CPU packing code and the GPU buffer layout can never disagree.

/// Side length of a sparse block, in voxels.
pub const SPARSE_BLOCK_SIZE: i32 = 8;

/// Voxels per sparse block (8 x 8 x 8).
pub const SPARSE_BLOCK_VOXEL_COUNT: usize = 512;

/// Maximum channels a frame may carry; matches the width of the channel mask.
pub const MAX_CHANNEL_COUNT: usize = 8;

/// Default GPU memory budget per external decompression resource.
pub const DEFAULT_MEMORY_LIMIT_PER_RESOURCE: u64 = 128 * 1024 * 1024;

/// Default number of decompressed frame artifacts kept per compressed file.
pub const DEFAULT_MAX_CACHED_FRAMES: usize = 2;

/// Environment variable overriding [`DEFAULT_MAX_CACHED_FRAMES`].
pub const ENV_MAX_CACHED_FRAMES: &str = "VDBSEQ_MAX_CACHED_FRAMES";
