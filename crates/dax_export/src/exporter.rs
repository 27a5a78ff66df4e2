//! Model export to a JSON descriptor plus a binary blob.
//!
//! # Example
//!
//! ```ignore
//! use dax_core::{collada::load_collada, convert, ConverterOptions};
//! use dax_export::Exporter;
//!
//! let doc = load_collada("character.dae")?;
//! let model = convert(&doc, &ConverterOptions::default())?;
//! let exported = Exporter::new(&model).export();
//! exported.write("out/character")?; // character.json + character.bin
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use dax_core::{AnimationClip, ChunkData, GeometryChunk, Model};
use log::{debug, info};
use thiserror::Error;

use crate::data_chunk::{DataChunk, ExportContext};
use crate::descriptor::{
    AnimationDescriptor, ArrayDescriptor, BoneDescriptor, ChunkDescriptor, Descriptor, InfoDescriptor,
    MaterialDescriptor, TrackDescriptor,
};

/// Errors that can occur while writing an export.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

/// Largest skeleton whose bone indices are written as u8.
pub const MAX_U8_BONES: usize = 256;

/// Vertex attribute and index views of one chunk.
#[derive(Clone, Copy, Debug, Default)]
struct ChunkViews {
    indices: Option<ArrayDescriptor>,
    position: Option<ArrayDescriptor>,
    normal: Option<ArrayDescriptor>,
    texcoord: Option<ArrayDescriptor>,
    boneweight: Option<ArrayDescriptor>,
    boneindex: Option<ArrayDescriptor>,
}

/// Descriptor and blob of an exported model.
#[derive(Clone, Debug)]
pub struct Exported {
    pub descriptor: Descriptor,
    pub blob: Vec<u8>,
}

impl Exported {
    pub fn to_json(&self) -> ExportResult<String> {
        Ok(serde_json::to_string_pretty(&self.descriptor)?)
    }

    /// Write the descriptor and blob next to each other.
    ///
    /// The extension of `base` is replaced by `json` and `bin`.
    pub fn write<P: AsRef<Path>>(&self, base: P) -> ExportResult<(PathBuf, PathBuf)> {
        let base = base.as_ref();
        let json_path = base.with_extension("json");
        let bin_path = base.with_extension("bin");

        fs::write(&json_path, self.to_json()?)?;
        fs::write(&bin_path, &self.blob)?;

        info!(
            "Wrote {} and {} ({} bytes)",
            json_path.display(),
            bin_path.display(),
            self.blob.len()
        );
        Ok((json_path, bin_path))
    }
}

/// Builds the descriptor and blob of one model.
pub struct Exporter<'a> {
    model: &'a Model,
    context: ExportContext,
    relative_tracks: bool,
}

impl<'a> Exporter<'a> {
    pub fn new(model: &'a Model) -> Self {
        Self {
            model,
            context: ExportContext::new(),
            relative_tracks: false,
        }
    }

    /// Also write the rest-pose relative track streams.
    pub fn with_relative_tracks(mut self, enabled: bool) -> Self {
        self.relative_tracks = enabled;
        self
    }

    pub fn export(mut self) -> Exported {
        let model = self.model;
        let chunks = self.export_chunks();
        let bones = self.export_bones();
        let animations = model
            .animations
            .iter()
            .map(|clip| self.export_animation(clip))
            .collect();

        let descriptor = Descriptor {
            info: InfoDescriptor {
                bounding_box: model.bounding_box.to_array(),
            },
            materials: model.materials.iter().map(MaterialDescriptor::from).collect(),
            chunks,
            bones,
            animations,
        };
        let blob = self.context.assemble_data();

        debug!(
            "Exported {} chunks, {} bones, {} animations into {} data chunks ({} bytes)",
            descriptor.chunks.len(),
            descriptor.bones.len(),
            descriptor.animations.len(),
            self.context.chunks().len(),
            blob.len()
        );
        Exported { descriptor, blob }
    }

    fn export_chunk_data(&mut self, data: &ChunkData) -> ChunkViews {
        let narrow_bones = self.model.skeleton.len() <= MAX_U8_BONES;
        let context = &mut self.context;
        let boneindex = data.bone_indices.as_ref().and_then(|indices| {
            if narrow_bones {
                let narrow: Vec<u8> = indices.iter().map(|&i| i as u8).collect();
                DataChunk::create(context, narrow, 4)
            } else {
                DataChunk::create(context, indices.clone(), 4)
            }
        });

        ChunkViews {
            indices: DataChunk::create(context, data.indices.clone(), 3),
            position: DataChunk::create(context, data.positions.clone(), 3),
            normal: data.normals.clone().and_then(|n| DataChunk::create(context, n, 3)),
            texcoord: data.texcoords.clone().and_then(|t| DataChunk::create(context, t, 2)),
            boneweight: data.bone_weights.clone().and_then(|w| DataChunk::create(context, w, 4)),
            boneindex,
        }
    }

    fn export_chunks(&mut self) -> Vec<ChunkDescriptor> {
        // Merged chunks all point into one set of views
        let model = self.model;
        let shared = model.merged.as_ref().map(|merged| self.export_chunk_data(merged));

        model
            .chunks
            .iter()
            .map(|chunk| {
                let views = match shared {
                    Some(views) => views,
                    None => self.export_chunk_data(&chunk.data),
                };
                chunk_descriptor(chunk, views)
            })
            .collect()
    }

    fn export_bones(&self) -> Vec<BoneDescriptor> {
        let skeleton = &self.model.skeleton;
        skeleton
            .bones
            .iter()
            .enumerate()
            .map(|(i, bone)| {
                let (pos, rot, scl) = self.model.bone_rest_pose(i);
                BoneDescriptor {
                    name: bone.name.clone(),
                    parent: bone.parent,
                    skinned: bone.skinned,
                    inv_bind_mat: bone.inverse_bind.to_cols_array(),
                    pos: pos.to_array(),
                    rot: rot.to_array(),
                    scl: scl.to_array(),
                }
            })
            .collect()
    }

    fn export_animation(&mut self, clip: &AnimationClip) -> AnimationDescriptor {
        let context = &mut self.context;
        let relative = self.relative_tracks;
        let mut stream = |values: &Option<Vec<f32>>, stride: usize| {
            values.clone().and_then(|v| DataChunk::create(context, v, stride))
        };

        let tracks = clip
            .tracks
            .iter()
            .map(|track| {
                let mut descriptor = TrackDescriptor {
                    bone: track.bone,
                    pos: stream(&track.positions, 3),
                    rot: stream(&track.rotations, 4),
                    scl: stream(&track.scales, 3),
                    ..Default::default()
                };
                if relative {
                    descriptor.rel_pos = stream(&track.rel_positions, 3);
                    descriptor.rel_rot = stream(&track.rel_rotations, 4);
                    descriptor.rel_scl = stream(&track.rel_scales, 3);
                }
                descriptor
            })
            .collect();

        AnimationDescriptor {
            name: clip.name.clone(),
            frames: clip.frames,
            fps: clip.fps,
            tracks,
        }
    }
}

fn chunk_descriptor(chunk: &GeometryChunk, views: ChunkViews) -> ChunkDescriptor {
    ChunkDescriptor {
        name: chunk.name.clone(),
        material: chunk.material,
        vertex_count: chunk.vertex_count,
        triangle_count: chunk.triangle_count,
        vertex_offset: chunk.vertex_offset,
        index_offset: chunk.index_offset,
        indices: views.indices,
        position: views.position,
        normal: views.normal,
        texcoord: views.texcoord,
        boneweight: views.boneweight,
        boneindex: views.boneindex,
        bounding_box: chunk.bounding_box.to_array(),
    }
}

/// Export `model` with default settings.
pub fn export_model(model: &Model) -> Exported {
    Exporter::new(model).export()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_chunk::DataType;
    use dax_core::{Bone, ConvertedMaterial, Skeleton, Track};
    use dax_core::scene::{ConverterNode, SceneNodes};
    use dax_math::{BoundingBox, Mat4};

    fn triangle() -> ChunkData {
        ChunkData {
            positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            normals: Some(vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0]),
            bone_indices: Some(vec![0, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0]),
            bone_weights: Some(vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]),
            indices: vec![0, 1, 2],
            ..Default::default()
        }
    }

    fn model(bone_count: usize) -> Model {
        let mut nodes = SceneNodes::new();
        let mut skeleton = Skeleton::new();
        let mut parent = None;
        for i in 0..bone_count {
            let node = nodes.push_node(ConverterNode::new(format!("bone{}", i)), parent);
            skeleton.bones.push(Bone {
                name: format!("bone{}", i),
                node,
                inverse_bind: Mat4::IDENTITY,
                parent: i.checked_sub(1),
                skinned: true,
            });
            parent = Some(node);
        }
        nodes.update_matrices();

        let chunk = GeometryChunk::new("tri", 0, triangle());
        Model {
            bounding_box: chunk.bounding_box,
            nodes,
            chunks: vec![chunk],
            merged: None,
            skeleton,
            materials: vec![ConvertedMaterial::default()],
            animations: vec![AnimationClip {
                name: "wave".to_string(),
                fps: 10.0,
                frames: 2,
                tracks: vec![Track {
                    bone: 0,
                    positions: Some(vec![0.0; 6]),
                    rel_positions: Some(vec![0.0; 6]),
                    ..Default::default()
                }],
            }],
        }
    }

    #[test]
    fn test_descriptor_layout() {
        let model = model(2);
        let exported = Exporter::new(&model).export();
        let descriptor = &exported.descriptor;

        assert_eq!(descriptor.chunks.len(), 1);
        let chunk = &descriptor.chunks[0];
        assert_eq!(chunk.vertex_count, 3);
        assert_eq!(chunk.triangle_count, 1);
        assert!(chunk.texcoord.is_none());
        assert_eq!(chunk.indices.unwrap().data_type, DataType::U32);
        assert_eq!(chunk.boneindex.unwrap().data_type, DataType::U8);
        assert_eq!(chunk.position.unwrap().count, 3);

        assert_eq!(descriptor.bones.len(), 2);
        assert_eq!(descriptor.bones[1].parent, Some(0));
        assert_eq!(descriptor.materials[0].name, "default");

        let track = &descriptor.animations[0].tracks[0];
        assert!(track.pos.is_some());
        assert!(track.rel_pos.is_none());

        let total: usize = exported.descriptor.views().iter().map(|(_, v)| v.byte_len()).sum();
        assert_eq!(total, exported.blob.len());
    }

    #[test]
    fn test_wide_bone_indices() {
        let model = model(MAX_U8_BONES + 1);
        let exported = export_model(&model);
        assert_eq!(exported.descriptor.chunks[0].boneindex.unwrap().data_type, DataType::U16);
    }

    #[test]
    fn test_relative_tracks() {
        let model = model(1);
        let exported = Exporter::new(&model).with_relative_tracks(true).export();
        let track = &exported.descriptor.animations[0].tracks[0];
        assert!(track.rel_pos.is_some());
        assert!(track.rel_rot.is_none());
    }

    #[test]
    fn test_merged_chunks_share_views() {
        let mut model = model(1);
        model.chunks.push(GeometryChunk::new("tri2", 0, triangle()));
        let merged = dax_core::mesh::merge_chunk_data(&mut model.chunks);
        model.merged = Some(merged);

        let exported = export_model(&model);
        let chunks = &exported.descriptor.chunks;
        assert_eq!(chunks[0].position, chunks[1].position);
        assert_eq!(chunks[1].vertex_offset, 3);
        assert_eq!(chunks[1].index_offset, 3);
        assert_eq!(chunks[0].position.unwrap().count, 6);
    }

    #[test]
    fn test_empty_model() {
        let model = Model {
            nodes: SceneNodes::new(),
            chunks: Vec::new(),
            merged: None,
            skeleton: Skeleton::new(),
            materials: Vec::new(),
            animations: Vec::new(),
            bounding_box: BoundingBox::EMPTY,
        };
        let exported = export_model(&model);
        assert!(exported.blob.is_empty());
        assert_eq!(exported.descriptor.info.bounding_box, [0.0; 6]);
        assert!(exported.to_json().unwrap().contains("\"chunks\": []"));
    }
}
