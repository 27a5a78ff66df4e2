//! Math types shared by the converter and the exporter.
//!
//! `glam` is the host math library; this crate adds the pieces COLLADA
//! conversion needs on top of it (row-major matrix import, bounding boxes,
//! tolerant comparisons).

// Re-export glam for convenience
pub use glam::*;

mod bbox;
mod transform;

pub use bbox::BoundingBox;
pub use transform::{Mat4Ext, QuatExt};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_operations() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);
        let c = a + b;
        assert_eq!(c, Vec3::new(5.0, 7.0, 9.0));
    }
}
