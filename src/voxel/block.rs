//! Fixed-size voxel block payloads.

use bytemuck::{Pod, Zeroable};
use half::f16;
use serde::{Deserialize, Serialize};

use crate::constants::SPARSE_BLOCK_VOXEL_COUNT;

/// Dense 8x8x8 block of 32-bit voxels; the payload unit of compression.
///
/// Voxel (x, y, z) lives at linear index `x + y * 8 + z * 64`.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct ChannelBlock {
    pub voxels: [f32; SPARSE_BLOCK_VOXEL_COUNT],
}

impl ChannelBlock {
    pub fn zeroed() -> Self {
        Zeroable::zeroed()
    }
}

impl Default for ChannelBlock {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl std::fmt::Debug for ChannelBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelBlock")
            .field("voxels", &format_args!("[f32; {}]", SPARSE_BLOCK_VOXEL_COUNT))
            .finish()
    }
}

/// Narrow-memory block variant used for GPU transfer: same 512 voxels at
/// 16-bit precision. Widened to [`ChannelBlock`] on assembly.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct HalfBlock {
    pub voxels: [f16; SPARSE_BLOCK_VOXEL_COUNT],
}

impl HalfBlock {
    pub fn zeroed() -> Self {
        Zeroable::zeroed()
    }

    pub fn from_f32(voxels: &[f32; SPARSE_BLOCK_VOXEL_COUNT]) -> Self {
        let mut out = Self::zeroed();
        for (dst, &src) in out.voxels.iter_mut().zip(voxels.iter()) {
            *dst = f16::from_f32(src);
        }
        out
    }

    pub fn widen(&self) -> ChannelBlock {
        let mut out = ChannelBlock::zeroed();
        for (dst, &src) in out.voxels.iter_mut().zip(self.voxels.iter()) {
            *dst = src.to_f32();
        }
        out
    }
}

impl Default for HalfBlock {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// 512-bit activity mask, one bit per voxel of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActiveMask {
    words: [u64; 8],
}

impl ActiveMask {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn full() -> Self {
        Self { words: [u64::MAX; 8] }
    }

    pub fn set(&mut self, index: usize) {
        debug_assert!(index < SPARSE_BLOCK_VOXEL_COUNT);
        self.words[index >> 6] |= 1u64 << (index & 63);
    }

    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < SPARSE_BLOCK_VOXEL_COUNT);
        self.words[index >> 6] & (1u64 << (index & 63)) != 0
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }
}
