//! Thin GPU command-recording interface (RHI) and its wgpu backend.

pub mod types;
pub mod wgpu_runtime;

pub use types::{
    force_software_device_from_env, BufferId, GfxApi, PackedSpatialBlockInfo, ResourceUsage,
    RhiFactory, RhiRuntime,
};
pub use wgpu_runtime::{WgpuRhiFactory, WgpuRuntime};
