//! Voxel-block payload types and channel-mask bookkeeping.

pub mod block;
pub mod mask;

pub use block::{ActiveMask, ChannelBlock, HalfBlock};
pub use mask::{
    active_channel_offset, channel_count, first_channel_index, ChannelMask, ChannelTable,
};
