//! Disk-backed caches: the compressor's write-once build cache and the
//! bounded cache of decompressed frame files.

pub mod build_cache;
pub mod frame_cache;

pub use build_cache::DiskBuildCache;
pub use frame_cache::FrameFileCache;
