//! Conversion options.
//!
//! All fields have defaults, so a partial JSON file (or none) is valid.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use dax_math::{Mat4, Quat, Vec3};

/// Option values a conversion cannot run with.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptionsError {
    #[error("world scale must be finite and non-zero, got {0}")]
    WorldScale(f32),

    #[error("animation fps must be finite and positive, got {0}")]
    AnimationFps(f32),
}

/// Global transform applied to the whole scene.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldTransformOptions {
    pub enabled: bool,
    /// Uniform scale.
    pub scale: f32,
    pub rotation_axis: [f32; 3],
    /// Degrees.
    pub rotation_angle: f32,
    /// Keep scale out of the node transforms (only translations get scaled).
    pub unit_scale: bool,
    /// Rotate X_UP / Z_UP documents to Y up.
    pub convert_up_axis: bool,
    /// Multiply the scale by the document's `<unit meter>`.
    pub apply_unit: bool,
}

impl Default for WorldTransformOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            scale: 1.0,
            rotation_axis: [0.0, 1.0, 0.0],
            rotation_angle: 0.0,
            unit_scale: false,
            convert_up_axis: false,
            apply_unit: false,
        }
    }
}

/// Thresholds under which a resampled track counts as constant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackTolerances {
    /// Distance in scene units.
    pub position: f32,
    /// Angle in radians.
    pub rotation: f32,
    /// Relative scale deviation.
    pub scale: f32,
}

impl Default for TrackTolerances {
    fn default() -> Self {
        Self {
            position: 1e-4,
            rotation: 0.05,
            scale: 0.05,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterOptions {
    pub enable_animations: bool,
    pub enable_skinning: bool,
    /// Collapse all animations into one clip.
    pub single_animation: bool,
    /// Resampling rate; the median of the source rates when unset.
    pub animation_fps: Option<f32>,
    /// Truncate the clip to the keyframe grid (true) or stretch the rate (false).
    pub truncate_resampled_animations: bool,
    pub remove_constant_tracks: bool,
    pub export_relative_tracks: bool,
    pub sort_bones: bool,
    pub merge_chunks: bool,
    pub bake_node_transforms: bool,
    pub apply_bind_shape: bool,
    pub flip_texcoord_v: bool,
    pub remove_texture_path: bool,
    pub world_transform: WorldTransformOptions,
    pub tolerances: TrackTolerances,
}

impl Default for ConverterOptions {
    fn default() -> Self {
        Self {
            enable_animations: true,
            enable_skinning: true,
            single_animation: false,
            animation_fps: None,
            truncate_resampled_animations: true,
            remove_constant_tracks: true,
            export_relative_tracks: false,
            sort_bones: true,
            merge_chunks: false,
            bake_node_transforms: true,
            apply_bind_shape: true,
            flip_texcoord_v: false,
            remove_texture_path: false,
            world_transform: WorldTransformOptions::default(),
            tolerances: TrackTolerances::default(),
        }
    }
}

impl ConverterOptions {
    /// Reject values that would produce a degenerate conversion.
    pub fn validate(&self) -> Result<(), OptionsError> {
        let scale = self.world_transform.scale;
        if self.world_transform.enabled && (scale == 0.0 || !scale.is_finite()) {
            return Err(OptionsError::WorldScale(scale));
        }
        if let Some(fps) = self.animation_fps {
            if !(fps.is_finite() && fps > 0.0) {
                return Err(OptionsError::AnimationFps(fps));
            }
        }
        Ok(())
    }
}

impl WorldTransformOptions {
    /// Rotation part of the world transform, including the up-axis fix.
    pub fn rotation(&self, up_axis: crate::collada::UpAxis) -> Quat {
        let axis = Vec3::from(self.rotation_axis);
        let user = if self.enabled && axis.length_squared() > 0.0 {
            Quat::from_axis_angle(axis.normalize(), self.rotation_angle.to_radians())
        } else {
            Quat::IDENTITY
        };
        let up = if self.convert_up_axis {
            match up_axis {
                crate::collada::UpAxis::Y => Quat::IDENTITY,
                crate::collada::UpAxis::Z => Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2),
                crate::collada::UpAxis::X => Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            }
        } else {
            Quat::IDENTITY
        };
        user * up
    }

    /// Uniform scale part of the world transform.
    pub fn uniform_scale(&self, unit_meter: f32) -> f32 {
        let mut scale = if self.enabled { self.scale } else { 1.0 };
        if self.apply_unit && unit_meter > 0.0 {
            scale *= unit_meter;
        }
        if scale == 0.0 || !scale.is_finite() {
            log::warn!("Invalid world scale {}, using 1", scale);
            scale = 1.0;
        }
        scale
    }

    /// World matrix = rotation · scale.
    pub fn matrix(&self, up_axis: crate::collada::UpAxis, unit_meter: f32) -> Mat4 {
        Mat4::from_quat(self.rotation(up_axis)) * Mat4::from_scale(Vec3::splat(self.uniform_scale(unit_meter)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collada::UpAxis;

    #[test]
    fn test_defaults() {
        let options = ConverterOptions::default();
        assert!(options.enable_animations);
        assert!(options.truncate_resampled_animations);
        assert_eq!(options.animation_fps, None);
        assert!((options.tolerances.rotation - 0.05).abs() < 1e-9);
        assert_eq!(options.validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_degenerate_values() {
        let mut options = ConverterOptions::default();
        options.world_transform.scale = 0.0;
        // Ignored while the world transform is off
        assert_eq!(options.validate(), Ok(()));

        options.world_transform.enabled = true;
        assert_eq!(options.validate(), Err(OptionsError::WorldScale(0.0)));
        options.world_transform.scale = f32::INFINITY;
        assert!(options.validate().is_err());

        let options = ConverterOptions {
            animation_fps: Some(-24.0),
            ..Default::default()
        };
        assert_eq!(options.validate(), Err(OptionsError::AnimationFps(-24.0)));
    }

    #[test]
    fn test_world_matrix_is_rotation_times_scale() {
        let wt = WorldTransformOptions {
            enabled: true,
            scale: 2.0,
            rotation_axis: [0.0, 0.0, 1.0],
            rotation_angle: 90.0,
            ..Default::default()
        };
        let m = wt.matrix(UpAxis::Y, 1.0);
        let p = m.transform_point3(Vec3::X);
        assert!((p - Vec3::new(0.0, 2.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_z_up_conversion() {
        let wt = WorldTransformOptions {
            convert_up_axis: true,
            ..Default::default()
        };
        let p = wt.matrix(UpAxis::Z, 1.0).transform_point3(Vec3::Z);
        assert!((p - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_unit_scale() {
        let wt = WorldTransformOptions {
            apply_unit: true,
            ..Default::default()
        };
        assert!((wt.uniform_scale(0.01) - 0.01).abs() < 1e-7);
        assert!((WorldTransformOptions::default().uniform_scale(0.01) - 1.0).abs() < 1e-7);
    }
}
