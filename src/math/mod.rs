//! Math primitives: epsilon-tolerant rounding, block-space boxes and
//! affine transforms.

pub mod aabb;
pub mod numeric;
pub mod transform;

pub use aabb::Aabb;
pub use numeric::{
    ceil_to_block_size, ceil_with_epsilon, floor_to_block_size, floor_with_epsilon,
    is_nearly_equal, is_nearly_integer, lerp, round_if_nearly_zero,
};
pub use transform::Transform;
