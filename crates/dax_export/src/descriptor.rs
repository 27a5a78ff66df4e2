//! JSON descriptor of an exported model.
//!
//! The descriptor holds everything but the bulk data; array fields are
//! [`ArrayDescriptor`]s pointing into the binary blob. Matrices are
//! column-major, quaternions xyzw.

use serde::{Deserialize, Serialize};

use dax_core::ConvertedMaterial;

use crate::data_chunk::DataType;

/// A typed view into the blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayDescriptor {
    #[serde(rename = "type")]
    pub data_type: DataType,
    pub byte_offset: usize,
    pub stride: usize,
    pub count: usize,
}

impl ArrayDescriptor {
    /// Number of elements in the view, saturating at `usize::MAX`.
    pub fn len(&self) -> usize {
        self.checked_len().unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0 || self.stride == 0
    }

    /// Size of the view in bytes, saturating at `usize::MAX`.
    pub fn byte_len(&self) -> usize {
        self.checked_byte_len().unwrap_or(usize::MAX)
    }

    /// Number of elements, or `None` if it does not fit in `usize`.
    pub fn checked_len(&self) -> Option<usize> {
        self.count.checked_mul(self.stride)
    }

    /// Size in bytes, or `None` if it does not fit in `usize`.
    pub fn checked_byte_len(&self) -> Option<usize> {
        self.checked_len()?.checked_mul(self.data_type.size())
    }

    /// One past the last byte of the view, or `None` on overflow.
    pub fn checked_byte_end(&self) -> Option<usize> {
        self.byte_offset.checked_add(self.checked_byte_len()?)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InfoDescriptor {
    /// min xyz, max xyz
    pub bounding_box: [f32; 6],
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diffuse: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specular: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal: Option<String>,
    #[serde(rename = "diffuseColor")]
    pub diffuse_color: [f32; 4],
    #[serde(rename = "specularColor")]
    pub specular_color: [f32; 4],
    #[serde(rename = "emissiveColor")]
    pub emissive_color: [f32; 4],
}

impl From<&ConvertedMaterial> for MaterialDescriptor {
    fn from(material: &ConvertedMaterial) -> Self {
        Self {
            name: material.name.clone(),
            diffuse: material.diffuse.clone(),
            specular: material.specular.clone(),
            normal: material.normal.clone(),
            diffuse_color: material.diffuse_color,
            specular_color: material.specular_color,
            emissive_color: material.emissive_color,
        }
    }
}

impl From<&MaterialDescriptor> for ConvertedMaterial {
    fn from(material: &MaterialDescriptor) -> Self {
        Self {
            name: material.name.clone(),
            diffuse: material.diffuse.clone(),
            specular: material.specular.clone(),
            normal: material.normal.clone(),
            diffuse_color: material.diffuse_color,
            specular_color: material.specular_color,
            emissive_color: material.emissive_color,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    pub name: String,
    pub material: usize,
    pub vertex_count: usize,
    pub triangle_count: usize,
    /// First vertex of the chunk in the (possibly shared) vertex arrays.
    pub vertex_offset: usize,
    /// First index of the chunk in the (possibly shared) index array.
    pub index_offset: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indices: Option<ArrayDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<ArrayDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal: Option<ArrayDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texcoord: Option<ArrayDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boneweight: Option<ArrayDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boneindex: Option<ArrayDescriptor>,
    pub bounding_box: [f32; 6],
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoneDescriptor {
    pub name: String,
    /// Index of the parent bone, `null` for roots.
    pub parent: Option<usize>,
    pub skinned: bool,
    pub inv_bind_mat: [f32; 16],
    /// Rest pose relative to the parent.
    pub pos: [f32; 3],
    pub rot: [f32; 4],
    pub scl: [f32; 3],
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    pub bone: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<ArrayDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rot: Option<ArrayDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scl: Option<ArrayDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel_pos: Option<ArrayDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel_rot: Option<ArrayDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel_scl: Option<ArrayDescriptor>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimationDescriptor {
    pub name: String,
    pub frames: usize,
    pub fps: f32,
    pub tracks: Vec<TrackDescriptor>,
}

/// Root of the descriptor file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub info: InfoDescriptor,
    #[serde(default)]
    pub materials: Vec<MaterialDescriptor>,
    #[serde(default)]
    pub chunks: Vec<ChunkDescriptor>,
    #[serde(default)]
    pub bones: Vec<BoneDescriptor>,
    #[serde(default)]
    pub animations: Vec<AnimationDescriptor>,
}

impl Descriptor {
    /// Every array view in the descriptor, with a label for error messages.
    pub fn views(&self) -> Vec<(String, ArrayDescriptor)> {
        let mut views = Vec::new();
        for (i, chunk) in self.chunks.iter().enumerate() {
            let fields = [
                ("indices", chunk.indices),
                ("position", chunk.position),
                ("normal", chunk.normal),
                ("texcoord", chunk.texcoord),
                ("boneweight", chunk.boneweight),
                ("boneindex", chunk.boneindex),
            ];
            for (field, view) in fields {
                if let Some(view) = view {
                    views.push((format!("chunks[{}].{}", i, field), view));
                }
            }
        }
        for (a, animation) in self.animations.iter().enumerate() {
            for (t, track) in animation.tracks.iter().enumerate() {
                let fields = [
                    ("pos", track.pos),
                    ("rot", track.rot),
                    ("scl", track.scl),
                    ("rel_pos", track.rel_pos),
                    ("rel_rot", track.rel_rot),
                    ("rel_scl", track.rel_scl),
                ];
                for (field, view) in fields {
                    if let Some(view) = view {
                        views.push((format!("animations[{}].tracks[{}].{}", a, t, field), view));
                    }
                }
            }
        }
        views
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_color_keys() {
        let material = MaterialDescriptor::from(&ConvertedMaterial::default());
        let json = serde_json::to_value(&material).unwrap();
        assert!(json.get("diffuseColor").is_some());
        assert!(json.get("emissiveColor").is_some());
        assert!(json.get("diffuse").is_none());
        assert_eq!(ConvertedMaterial::from(&material), ConvertedMaterial::default());
    }

    #[test]
    fn test_array_descriptor_json() {
        let view = ArrayDescriptor {
            data_type: DataType::U16,
            byte_offset: 24,
            stride: 4,
            count: 3,
        };
        let json = serde_json::to_string(&view).unwrap();
        assert_eq!(json, r#"{"type":"u16","byte_offset":24,"stride":4,"count":3}"#);
        assert_eq!(view.byte_len(), 24);
        assert_eq!(view.checked_byte_end(), Some(48));
    }

    #[test]
    fn test_array_descriptor_overflow() {
        let view = ArrayDescriptor {
            data_type: DataType::F32,
            byte_offset: 0,
            stride: 3,
            count: usize::MAX,
        };
        assert_eq!(view.checked_len(), None);
        assert_eq!(view.checked_byte_len(), None);
        assert_eq!(view.byte_len(), usize::MAX);
        assert!(!view.is_empty());

        let view = ArrayDescriptor {
            byte_offset: usize::MAX,
            count: 1,
            ..view
        };
        assert_eq!(view.checked_byte_len(), Some(12));
        assert_eq!(view.checked_byte_end(), None);
    }

    #[test]
    fn test_views_labels() {
        let view = ArrayDescriptor {
            data_type: DataType::F32,
            byte_offset: 0,
            stride: 3,
            count: 1,
        };
        let descriptor = Descriptor {
            chunks: vec![ChunkDescriptor {
                position: Some(view),
                ..Default::default()
            }],
            animations: vec![AnimationDescriptor {
                tracks: vec![TrackDescriptor {
                    bone: 0,
                    rot: Some(view),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        let labels: Vec<String> = descriptor.views().into_iter().map(|(label, _)| label).collect();
        assert_eq!(labels, vec!["chunks[0].position", "animations[0].tracks[0].rot"]);
    }
}
