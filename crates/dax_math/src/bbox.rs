use serde::{Deserialize, Serialize};

use crate::{Mat4, Vec3};

/// Axis-aligned bounding box of a chunk or of the whole model.
///
/// An empty box has `min = +inf` and `max = -inf`, so extending it with the
/// first point yields a degenerate box around that point.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl BoundingBox {
    /// A box containing nothing.
    pub const EMPTY: BoundingBox = BoundingBox {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Create a box from two corner points (in any order).
    pub fn from_points(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Compute the bounds of a flat `[x, y, z, x, y, z, ...]` position array.
    pub fn from_positions(positions: &[f32]) -> Self {
        let mut bbox = Self::EMPTY;
        for p in positions.chunks_exact(3) {
            bbox.extend_point(Vec3::new(p[0], p[1], p[2]));
        }
        bbox
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn extend_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn extend_box(&mut self, other: &BoundingBox) {
        if other.is_empty() {
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Returns the center point of the bounding box.
    pub fn centroid(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }

    /// Bounds of all 8 transformed corners.
    pub fn transformed(&self, matrix: &Mat4) -> BoundingBox {
        if self.is_empty() {
            return *self;
        }
        let mut result = Self::EMPTY;
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            result.extend_point(matrix.transform_point3(corner));
        }
        result
    }

    /// `[min.x, min.y, min.z, max.x, max.y, max.z]`, the layout used by the descriptor.
    pub fn to_array(&self) -> [f32; 6] {
        if self.is_empty() {
            return [0.0; 6];
        }
        [
            self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z,
        ]
    }

    pub fn from_array(a: [f32; 6]) -> Self {
        Self {
            min: Vec3::new(a[0], a[1], a[2]),
            max: Vec3::new(a[3], a[4], a[5]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_from_positions() {
        let bbox = BoundingBox::from_positions(&[-1.0, -2.0, -3.0, 4.0, 5.0, 6.0, 0.0, 0.0, 0.0]);

        assert_eq!(bbox.min, Vec3::new(-1.0, -2.0, -3.0));
        assert_eq!(bbox.max, Vec3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_bbox_empty() {
        let bbox = BoundingBox::from_positions(&[]);
        assert!(bbox.is_empty());
        assert_eq!(bbox.to_array(), [0.0; 6]);
        assert_eq!(bbox.size(), Vec3::ZERO);
    }

    #[test]
    fn test_bbox_extend_ignores_empty() {
        let mut bbox = BoundingBox::from_points(Vec3::ZERO, Vec3::ONE);
        bbox.extend_box(&BoundingBox::EMPTY);
        assert_eq!(bbox, BoundingBox::from_points(Vec3::ZERO, Vec3::ONE));
    }

    #[test]
    fn test_bbox_transformed() {
        let bbox = BoundingBox::from_points(Vec3::ZERO, Vec3::ONE);
        let moved = bbox.transformed(&Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)));

        assert!((moved.min - Vec3::new(5.0, 0.0, 0.0)).length() < 0.001);
        assert!((moved.max - Vec3::new(6.0, 1.0, 1.0)).length() < 0.001);
        assert_eq!(moved.centroid(), Vec3::new(5.5, 0.5, 0.5));
    }
}
