// Transform utilities for Mat4 and Quat
//
// COLLADA stores matrices row-major; glam is column-major. Everything that
// crosses that boundary goes through `from_row_major` / `to_row_major`.

use glam::{Mat3, Mat4, Quat, Vec3};

/// Extension trait for Mat4 with the helpers the converter needs.
pub trait Mat4Ext {
    /// Build a matrix from 16 row-major values (COLLADA `<matrix>` order).
    /// Missing values are taken from the identity.
    fn from_row_major(values: &[f32]) -> Mat4;

    /// The 16 values in row-major order.
    fn to_row_major(&self) -> [f32; 16];

    /// Inverse-transpose of the upper 3x3, for transforming normals.
    fn normal_matrix(&self) -> Mat3;

    /// Transform a normal and renormalize it.
    fn transform_normal3(&self, normal: Vec3) -> Vec3;

    /// Component-wise comparison with an absolute tolerance.
    fn approx_eq(&self, other: &Mat4, eps: f32) -> bool;

    /// Split into (translation, rotation, scale).
    fn decompose(&self) -> (Vec3, Quat, Vec3);
}

impl Mat4Ext for Mat4 {
    fn from_row_major(values: &[f32]) -> Mat4 {
        let mut rows = Mat4::IDENTITY.to_cols_array();
        for (i, v) in values.iter().take(16).enumerate() {
            rows[i] = *v;
        }
        // Interpreting row-major data as columns yields the transpose.
        Mat4::from_cols_array(&rows).transpose()
    }

    fn to_row_major(&self) -> [f32; 16] {
        self.transpose().to_cols_array()
    }

    fn normal_matrix(&self) -> Mat3 {
        let m = Mat3::from_mat4(*self);
        if m.determinant().abs() < f32::EPSILON {
            return m;
        }
        m.inverse().transpose()
    }

    fn transform_normal3(&self, normal: Vec3) -> Vec3 {
        (self.normal_matrix() * normal).normalize_or_zero()
    }

    fn approx_eq(&self, other: &Mat4, eps: f32) -> bool {
        self.to_cols_array()
            .iter()
            .zip(other.to_cols_array().iter())
            .all(|(a, b)| (a - b).abs() <= eps)
    }

    fn decompose(&self) -> (Vec3, Quat, Vec3) {
        let (scale, rotation, translation) = self.to_scale_rotation_translation();
        (translation, rotation, scale)
    }
}

/// Extension trait for Quat.
pub trait QuatExt {
    /// Rotation angle in radians, in `[0, pi]`.
    fn rotation_angle(&self) -> f32;
}

impl QuatExt for Quat {
    fn rotation_angle(&self) -> f32 {
        2.0 * self.w.abs().min(1.0).acos()
    }
}
