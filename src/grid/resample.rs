//! Box-sampler resampling of one grid into another grid's index space.

use crate::constants::SPARSE_BLOCK_SIZE;
use crate::math::{ceil_with_epsilon, floor_with_epsilon, Transform};

use super::sparse_grid::SparseGrid;

/// Transform mapping `target`'s index space into `reference`'s index space:
/// `T_target_world * T_reference_world^-1`.
///
/// Grids within one frame are assumed to share a rotation, so the result
/// is a scale-translation matrix up to floating-point error.
pub fn index_space_relative_transform(target: &SparseGrid, reference: &SparseGrid) -> Transform {
    target.transform().then(&reference.transform().inverse())
}

/// Resamples `source` into the index space described by `relative`
/// (source index -> destination index), producing a grid that carries
/// `destination_transform`.
///
/// Destination activity is the image of the source leaf bounds; values are
/// box-sampled (trilinear) from the source.
pub fn resample_to_index_space(
    source: &SparseGrid,
    relative: &Transform,
    destination_transform: &Transform,
) -> SparseGrid {
    let mut out = SparseGrid::new(source.name(), source.voxel_type());
    out.set_transform(*destination_transform);

    let inverse = relative.inverse();
    let comps = source.voxel_type().component_count();
    let mut components = [0.0f32; 3];

    for (coord, _leaf) in source.leaves() {
        let origin = coord.to_voxel_origin();
        let (dst_min, dst_max) = transformed_voxel_bounds(relative, origin);

        for z in dst_min[2]..dst_max[2] {
            for y in dst_min[1]..dst_max[1] {
                for x in dst_min[0]..dst_max[0] {
                    let src = inverse.transform_point3([x as f32, y as f32, z as f32]);
                    for (c, slot) in components[..comps].iter_mut().enumerate() {
                        *slot = source.sample_component(src, c);
                    }
                    match comps {
                        1 => out.set_scalar(x, y, z, components[0]),
                        _ => out.set_vec3(x, y, z, components),
                    }
                }
            }
        }
    }
    out
}

/// Destination-space voxel box covering one source leaf, conservatively
/// expanded by the epsilon floor/ceil.
fn transformed_voxel_bounds(relative: &Transform, origin: [i32; 3]) -> ([i32; 3], [i32; 3]) {
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    for corner in 0..8 {
        let p = [
            (origin[0] + if corner & 1 != 0 { SPARSE_BLOCK_SIZE } else { 0 }) as f32,
            (origin[1] + if corner & 2 != 0 { SPARSE_BLOCK_SIZE } else { 0 }) as f32,
            (origin[2] + if corner & 4 != 0 { SPARSE_BLOCK_SIZE } else { 0 }) as f32,
        ];
        let mapped = relative.transform_point3(p);
        for axis in 0..3 {
            min[axis] = min[axis].min(mapped[axis]);
            max[axis] = max[axis].max(mapped[axis]);
        }
    }
    (
        [
            floor_with_epsilon(min[0]),
            floor_with_epsilon(min[1]),
            floor_with_epsilon(min[2]),
        ],
        [
            ceil_with_epsilon(max[0]),
            ceil_with_epsilon(max[1]),
            ceil_with_epsilon(max[2]),
        ],
    )
}
