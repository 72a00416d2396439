//! Row-major 4x4 affine transform.
//!
//! The wire representation is sixteen floats in row-major order with the
//! row-vector convention: points transform as `v' = v * M`, so the
//! translation lives in the last row. An all-zero matrix is the "empty"
//! transform and decodes as identity.

use glam::Mat4;
use serde::{Deserialize, Serialize};

use super::numeric::is_nearly_equal;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub raw: [f32; 16],
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        raw: [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ],
    };

    pub const EMPTY: Transform = Transform { raw: [0.0; 16] };

    pub fn from_raw(raw: [f32; 16]) -> Self {
        Self { raw }
    }

    /// Uniform scale transform (voxel size `s`).
    pub fn from_scale(s: f32) -> Self {
        let mut t = Self::IDENTITY;
        t.raw[0] = s;
        t.raw[5] = s;
        t.raw[10] = s;
        t
    }

    /// Pure translation transform.
    pub fn from_translation(t: [f32; 3]) -> Self {
        let mut m = Self::IDENTITY;
        m.raw[12] = t[0];
        m.raw[13] = t[1];
        m.raw[14] = t[2];
        m
    }

    /// True when every entry is within one epsilon of zero.
    pub fn is_nearly_zero(&self) -> bool {
        self.raw.iter().all(|&v| is_nearly_equal(v, 0.0))
    }

    /// Empty transform decodes as identity; anything else passes through.
    pub fn sanitized(&self) -> Transform {
        if self.is_nearly_zero() {
            return Transform::IDENTITY;
        }
        *self
    }

    /// Matrix product `self * other`: applies `self` first under the
    /// row-vector convention.
    pub fn then(&self, other: &Transform) -> Transform {
        let mut out = [0.0f32; 16];
        for row in 0..4 {
            for col in 0..4 {
                let mut acc = 0.0;
                for k in 0..4 {
                    acc += self.raw[row * 4 + k] * other.raw[k * 4 + col];
                }
                out[row * 4 + col] = acc;
            }
        }
        Transform { raw: out }
    }

    /// Applies only the upper-left 3x3 part, without translation.
    pub fn transform_vector3(&self, v: [f32; 3]) -> [f32; 3] {
        let mut out = [0.0f32; 3];
        for col in 0..3 {
            out[col] =
                v[0] * self.raw[col] + v[1] * self.raw[4 + col] + v[2] * self.raw[8 + col];
        }
        out
    }

    /// Applies the full affine transform to a point.
    pub fn transform_point3(&self, p: [f32; 3]) -> [f32; 3] {
        let linear = self.transform_vector3(p);
        [
            linear[0] + self.raw[12],
            linear[1] + self.raw[13],
            linear[2] + self.raw[14],
        ]
    }

    /// Adds a translation after this transform.
    pub fn post_translate(&self, t: [f32; 3]) -> Transform {
        let mut out = *self;
        out.raw[12] += t[0];
        out.raw[13] += t[1];
        out.raw[14] += t[2];
        out
    }

    pub fn inverse(&self) -> Transform {
        // glam stores column-major; feeding row-major data transposes the
        // matrix, and inversion commutes with transposition, so the result
        // array is already row-major again.
        Transform { raw: Mat4::from_cols_array(&self.raw).inverse().to_cols_array() }
    }

    /// Voxel size for grids with uniform scaling: length of the first
    /// basis row.
    pub fn uniform_voxel_scale(&self) -> f32 {
        (self.raw[0] * self.raw[0] + self.raw[1] * self.raw[1] + self.raw[2] * self.raw[2]).sqrt()
    }

    pub fn is_nearly_identity(&self) -> bool {
        self.raw
            .iter()
            .zip(Transform::IDENTITY.raw.iter())
            .all(|(&a, &b)| is_nearly_equal(a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sanitizes_to_identity() {
        assert_eq!(Transform::EMPTY.sanitized(), Transform::IDENTITY);
        let scaled = Transform::from_scale(0.5);
        assert_eq!(scaled.sanitized(), scaled);
    }

    #[test]
    fn translation_lands_in_last_row() {
        let t = Transform::from_translation([1.0, 2.0, 3.0]);
        assert_eq!(t.transform_point3([0.0, 0.0, 0.0]), [1.0, 2.0, 3.0]);
        // Linear part ignores translation.
        assert_eq!(t.transform_vector3([1.0, 1.0, 1.0]), [1.0, 1.0, 1.0]);
    }

    #[test]
    fn composition_applies_left_first() {
        let scale = Transform::from_scale(2.0);
        let shift = Transform::from_translation([1.0, 0.0, 0.0]);
        // Scale then shift: (1,0,0) -> (2,0,0) -> (3,0,0).
        let m = scale.then(&shift);
        assert_eq!(m.transform_point3([1.0, 0.0, 0.0]), [3.0, 0.0, 0.0]);
        // Shift then scale: (1,0,0) -> (2,0,0) -> (4,0,0).
        let m = shift.then(&scale);
        assert_eq!(m.transform_point3([1.0, 0.0, 0.0]), [4.0, 0.0, 0.0]);
    }

    #[test]
    fn inverse_round_trips() {
        let m = Transform::from_scale(0.25).then(&Transform::from_translation([3.0, -1.0, 7.0]));
        let round = m.then(&m.inverse());
        assert!(round.is_nearly_identity());
    }

    #[test]
    fn uniform_scale_reads_back() {
        assert!(is_nearly_equal(Transform::from_scale(0.5).uniform_voxel_scale(), 0.5));
        assert!(is_nearly_equal(Transform::IDENTITY.uniform_voxel_scale(), 1.0));
    }
}
