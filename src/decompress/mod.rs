//! Decompression orchestration: the per-file manager state machine and
//! the multi-file helper with its bounded frame cache.

pub mod helper;
pub mod manager;

pub use helper::DecompressionHelper;
pub use manager::{DecompressorManager, ManagerState};
