//! RHI contract types: buffers, usage flags, graphics-API selection and
//! the packed spatial-block layout shared with the GPU.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

use crate::error::PipelineResult;
use crate::frame::SpatialBlockInfo;
use crate::voxel::ChannelMask;

/// Environment variable selecting the graphics backend.
pub const ENV_GFX_API: &str = "VDBSEQ_GFX_API";

/// Environment variable forcing a software device.
pub const ENV_FORCE_SOFTWARE_DEVICE: &str = "VDBSEQ_FORCE_SOFTWARE_DEVICE";

/// Opaque handle to an RHI-owned buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

bitflags! {
    /// Buffer usage flags of the RHI contract.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ResourceUsage: u32 {
        const UNORDERED_ACCESS = 1 << 0;
        const SHADER_RESOURCE = 1 << 1;
        const COPY_SOURCE = 1 << 2;
        const COPY_DEST = 1 << 3;
    }
}

/// Graphics backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GfxApi {
    #[default]
    Auto,
    D3d12,
    Vulkan,
    Metal,
}

impl GfxApi {
    /// True when the host OS can run this backend at all.
    pub fn supported_on_host(&self) -> bool {
        match self {
            GfxApi::Auto => true,
            GfxApi::D3d12 => cfg!(target_os = "windows"),
            GfxApi::Vulkan => cfg!(any(target_os = "windows", target_os = "linux")),
            GfxApi::Metal => cfg!(target_os = "macos"),
        }
    }

    /// Reads the backend selection from the environment, falling back to
    /// `Auto` for unknown values and host-unsupported choices.
    pub fn from_env() -> GfxApi {
        let Ok(value) = std::env::var(ENV_GFX_API) else {
            return GfxApi::Auto;
        };
        let selected = match value.to_ascii_lowercase().as_str() {
            "d3d12" | "dx12" => GfxApi::D3d12,
            "vulkan" => GfxApi::Vulkan,
            "metal" => GfxApi::Metal,
            "auto" => GfxApi::Auto,
            other => {
                log::warn!("[GfxApi::from_env] Unknown {} value '{}'", ENV_GFX_API, other);
                GfxApi::Auto
            }
        };
        if !selected.supported_on_host() {
            log::warn!(
                "[GfxApi::from_env] {:?} is not supported on this platform, using Auto",
                selected
            );
            return GfxApi::Auto;
        }
        selected
    }
}

/// Reads the force-software-device flag from the environment.
pub fn force_software_device_from_env() -> bool {
    match std::env::var(ENV_FORCE_SOFTWARE_DEVICE) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => false,
    }
}

/// Spatial-block descriptor in its GPU buffer layout.
///
/// The three block coordinates are AABB-relative and bounded by 2^10, so
/// they pack into one word at 10 bits each.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct PackedSpatialBlockInfo {
    pub packed_coords: u32,
    pub channel_blocks_offset: u32,
    pub channel_mask: u32,
    pub channel_count: u32,
}

impl PackedSpatialBlockInfo {
    pub fn pack(info: &SpatialBlockInfo) -> Self {
        debug_assert!(info.coords.iter().all(|&c| (0..1 << 10).contains(&c)));
        Self {
            packed_coords: (info.coords[0] as u32 & 0x3FF)
                | ((info.coords[1] as u32 & 0x3FF) << 10)
                | ((info.coords[2] as u32 & 0x3FF) << 20),
            channel_blocks_offset: info.channel_blocks_offset,
            channel_mask: info.channel_mask as u32,
            channel_count: info.channel_count,
        }
    }

    pub fn unpack(&self) -> SpatialBlockInfo {
        SpatialBlockInfo {
            coords: [
                (self.packed_coords & 0x3FF) as i32,
                ((self.packed_coords >> 10) & 0x3FF) as i32,
                ((self.packed_coords >> 20) & 0x3FF) as i32,
            ],
            channel_blocks_offset: self.channel_blocks_offset,
            channel_mask: self.channel_mask as ChannelMask,
            channel_count: self.channel_count,
        }
    }
}

/// Minimal command-recording GPU runtime.
///
/// Readback is blocking; recording brackets a batch of submissions and
/// `garbage_collect` reclaims transient allocations between chunks.
pub trait RhiRuntime: Send {
    fn create_buffer(
        &mut self,
        size: u64,
        stride: u32,
        usage: ResourceUsage,
        name: &str,
    ) -> PipelineResult<BufferId>;
    fn release_buffer(&mut self, buffer: BufferId) -> PipelineResult<()>;
    /// Blocking GPU-to-CPU copy of `dst.len()` bytes starting at `offset`.
    fn read_buffer(&mut self, buffer: BufferId, dst: &mut [u8], offset: u64)
        -> PipelineResult<()>;
    fn start_recording(&mut self) -> PipelineResult<()>;
    fn stop_recording(&mut self) -> PipelineResult<()>;
    fn garbage_collect(&mut self);
}

/// Creates [`RhiRuntime`] instances for a configured backend.
pub trait RhiFactory: Send + Sync {
    fn create(&self) -> PipelineResult<Box<dyn RhiRuntime>>;
}
