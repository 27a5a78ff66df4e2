//! Runtime loader.
//!
//! Reads a descriptor and its blob back into chunks, bones, materials and
//! animation clips. Every view is checked against the blob length, its
//! declared type and the stride its field requires before any data is used.
//!
//! # Example
//!
//! ```ignore
//! use dax_export::runtime::load_runtime_files;
//!
//! let model = load_runtime_files("out/character")?;
//! for chunk in &model.chunks {
//!     println!("{}: {} triangles", chunk.name, chunk.triangle_count);
//! }
//! ```

use std::fs;
use std::path::Path;

use dax_core::{AnimationClip, ChunkData, ConvertedMaterial, GeometryChunk, Track};
use dax_math::{BoundingBox, Mat4, Quat, Vec3};
use log::{debug, warn};
use thiserror::Error;

use crate::data_chunk::{DataType, TypedArray};
use crate::descriptor::{AnimationDescriptor, ArrayDescriptor, BoneDescriptor, ChunkDescriptor, Descriptor};

/// Errors that can occur while loading an export at runtime.
#[derive(Error, Debug)]
pub enum RuntimeLoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{view}: bytes {start}..{end} exceed the blob of {len} bytes")]
    OutOfBounds {
        view: String,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("{view}: {found:?} data, expected {expected}")]
    UnexpectedType {
        view: String,
        found: DataType,
        expected: &'static str,
    },

    #[error("{view}: stride {found}, expected {expected}")]
    UnexpectedStride {
        view: String,
        found: usize,
        expected: usize,
    },

    #[error("{view}: items {start}..{end} exceed the {count} items of the view")]
    RangeOutOfBounds {
        view: String,
        start: usize,
        end: usize,
        count: usize,
    },

    #[error("Chunk '{0}' has vertices but no position data")]
    MissingPositions(String),

    #[error("Chunk '{chunk}' uses material {material}, {count} materials exist")]
    InvalidMaterial {
        chunk: String,
        material: usize,
        count: usize,
    },

    #[error("Bone {bone} has parent {parent}, {count} bones exist")]
    InvalidParent { bone: usize, parent: usize, count: usize },

    #[error("Animation '{animation}' has a track for bone {bone}, {count} bones exist")]
    InvalidTrackBone {
        animation: String,
        bone: usize,
        count: usize,
    },
}

/// Result type for runtime loading.
pub type RuntimeLoadResult<T> = Result<T, RuntimeLoadError>;

/// A bone as stored in the descriptor.
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeBone {
    pub name: String,
    pub parent: Option<usize>,
    pub skinned: bool,
    pub inverse_bind: Mat4,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

/// A model rebuilt from a descriptor and blob.
///
/// Chunks always own their data, even when the export shared merged
/// buffers; `vertex_offset` / `index_offset` keep the recorded values.
#[derive(Clone, Debug)]
pub struct RuntimeModel {
    pub bounding_box: BoundingBox,
    pub materials: Vec<ConvertedMaterial>,
    pub chunks: Vec<GeometryChunk>,
    pub bones: Vec<RuntimeBone>,
    pub animations: Vec<AnimationClip>,
}

/// Typed view of `view` in `blob`.
pub fn read_view(blob: &[u8], label: &str, view: &ArrayDescriptor) -> RuntimeLoadResult<TypedArray> {
    let start = view.byte_offset;
    let end = view.checked_byte_end().unwrap_or(usize::MAX);
    if end > blob.len() {
        return Err(RuntimeLoadError::OutOfBounds {
            view: label.to_string(),
            start,
            end,
            len: blob.len(),
        });
    }
    Ok(TypedArray::from_le_bytes(view.data_type, &blob[start..end]))
}

fn check_stride(label: &str, view: &ArrayDescriptor, expected: usize) -> RuntimeLoadResult<()> {
    if view.stride != expected {
        return Err(RuntimeLoadError::UnexpectedStride {
            view: label.to_string(),
            found: view.stride,
            expected,
        });
    }
    Ok(())
}

fn float_view(
    blob: &[u8],
    label: &str,
    view: Option<ArrayDescriptor>,
    stride: usize,
) -> RuntimeLoadResult<Option<Vec<f32>>> {
    let Some(view) = view else {
        return Ok(None);
    };
    check_stride(label, &view, stride)?;
    match read_view(blob, label, &view)? {
        TypedArray::F32(values) => Ok(Some(values)),
        other => Err(RuntimeLoadError::UnexpectedType {
            view: label.to_string(),
            found: other.data_type(),
            expected: "f32",
        }),
    }
}

fn index_view(
    blob: &[u8],
    label: &str,
    view: Option<ArrayDescriptor>,
    stride: usize,
) -> RuntimeLoadResult<Option<Vec<u32>>> {
    let Some(view) = view else {
        return Ok(None);
    };
    check_stride(label, &view, stride)?;
    let array = read_view(blob, label, &view)?;
    array.to_u32_vec().map(Some).ok_or_else(|| RuntimeLoadError::UnexpectedType {
        view: label.to_string(),
        found: array.data_type(),
        expected: "u8, u16 or u32",
    })
}

/// Items `start..start + count` of a view with `width` elements per item.
fn items<T: Clone>(values: &[T], label: &str, start: usize, count: usize, width: usize) -> RuntimeLoadResult<Vec<T>> {
    let available = values.len() / width;
    let end = start.checked_add(count).unwrap_or(usize::MAX);
    if end > available {
        return Err(RuntimeLoadError::RangeOutOfBounds {
            view: label.to_string(),
            start,
            end,
            count: available,
        });
    }
    Ok(values[start * width..end * width].to_vec())
}

fn load_chunk(blob: &[u8], index: usize, chunk: &ChunkDescriptor, materials: usize) -> RuntimeLoadResult<GeometryChunk> {
    if chunk.material >= materials {
        return Err(RuntimeLoadError::InvalidMaterial {
            chunk: chunk.name.clone(),
            material: chunk.material,
            count: materials,
        });
    }

    let label = |field: &str| format!("chunks[{}].{}", index, field);
    let (first, vertices) = (chunk.vertex_offset, chunk.vertex_count);

    let vertex_items = |field: &str, view: Option<ArrayDescriptor>, width: usize| -> RuntimeLoadResult<Option<Vec<f32>>> {
        float_view(blob, &label(field), view, width)?
            .map(|values| items(&values, &label(field), first, vertices, width))
            .transpose()
    };

    let positions = match vertex_items("position", chunk.position, 3)? {
        Some(positions) => positions,
        None if vertices == 0 => Vec::new(),
        None => return Err(RuntimeLoadError::MissingPositions(chunk.name.clone())),
    };
    let normals = vertex_items("normal", chunk.normal, 3)?;
    let texcoords = vertex_items("texcoord", chunk.texcoord, 2)?;
    let bone_weights = vertex_items("boneweight", chunk.boneweight, 4)?;
    let bone_indices = index_view(blob, &label("boneindex"), chunk.boneindex, 4)?
        .map(|values| items(&values, &label("boneindex"), first, vertices, 4))
        .transpose()?
        .map(|values| values.into_iter().map(|i| i as u16).collect());

    // Index items are triangles; index_offset counts single indices
    let indices = match index_view(blob, &label("indices"), chunk.indices, 3)? {
        Some(values) => {
            let start = chunk.index_offset;
            let end = chunk
                .triangle_count
                .checked_mul(3)
                .and_then(|n| start.checked_add(n))
                .unwrap_or(usize::MAX);
            if end > values.len() {
                return Err(RuntimeLoadError::RangeOutOfBounds {
                    view: label("indices"),
                    start,
                    end,
                    count: values.len(),
                });
            }
            values[start..end].to_vec()
        }
        None => Vec::new(),
    };

    let data = ChunkData {
        positions,
        normals,
        texcoords,
        bone_indices,
        bone_weights,
        indices,
        source_positions: Vec::new(),
    };
    Ok(GeometryChunk {
        name: chunk.name.clone(),
        material: chunk.material,
        vertex_count: chunk.vertex_count,
        triangle_count: chunk.triangle_count,
        vertex_offset: chunk.vertex_offset,
        index_offset: chunk.index_offset,
        bounding_box: BoundingBox::from_array(chunk.bounding_box),
        data,
    })
}

fn load_bone(index: usize, bone: &BoneDescriptor, count: usize) -> RuntimeLoadResult<RuntimeBone> {
    if let Some(parent) = bone.parent {
        if parent >= count {
            return Err(RuntimeLoadError::InvalidParent {
                bone: index,
                parent,
                count,
            });
        }
    }
    Ok(RuntimeBone {
        name: bone.name.clone(),
        parent: bone.parent,
        skinned: bone.skinned,
        inverse_bind: Mat4::from_cols_array(&bone.inv_bind_mat),
        position: Vec3::from_array(bone.pos),
        rotation: Quat::from_array(bone.rot),
        scale: Vec3::from_array(bone.scl),
    })
}

fn load_animation(
    blob: &[u8],
    index: usize,
    animation: &AnimationDescriptor,
    bones: usize,
) -> RuntimeLoadResult<AnimationClip> {
    let mut tracks = Vec::with_capacity(animation.tracks.len());
    for (t, track) in animation.tracks.iter().enumerate() {
        if track.bone >= bones {
            return Err(RuntimeLoadError::InvalidTrackBone {
                animation: animation.name.clone(),
                bone: track.bone,
                count: bones,
            });
        }
        let label = |field: &str| format!("animations[{}].tracks[{}].{}", index, t, field);
        let stream = |field: &str, view: Option<ArrayDescriptor>, width: usize| {
            if let Some(view) = view {
                if view.count != animation.frames {
                    warn!(
                        "{}: {} keys in a clip of {} frames",
                        label(field),
                        view.count,
                        animation.frames
                    );
                }
            }
            float_view(blob, &label(field), view, width)
        };
        tracks.push(Track {
            bone: track.bone,
            positions: stream("pos", track.pos, 3)?,
            rotations: stream("rot", track.rot, 4)?,
            scales: stream("scl", track.scl, 3)?,
            rel_positions: stream("rel_pos", track.rel_pos, 3)?,
            rel_rotations: stream("rel_rot", track.rel_rot, 4)?,
            rel_scales: stream("rel_scl", track.rel_scl, 3)?,
        });
    }
    Ok(AnimationClip {
        name: animation.name.clone(),
        fps: animation.fps,
        frames: animation.frames,
        tracks,
    })
}

/// Rebuild a model from a parsed descriptor and its blob.
pub fn load_runtime_model(descriptor: &Descriptor, blob: &[u8]) -> RuntimeLoadResult<RuntimeModel> {
    let materials: Vec<ConvertedMaterial> = descriptor.materials.iter().map(ConvertedMaterial::from).collect();

    let chunks = descriptor
        .chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| load_chunk(blob, i, chunk, materials.len()))
        .collect::<RuntimeLoadResult<Vec<_>>>()?;

    let bone_count = descriptor.bones.len();
    let bones = descriptor
        .bones
        .iter()
        .enumerate()
        .map(|(i, bone)| load_bone(i, bone, bone_count))
        .collect::<RuntimeLoadResult<Vec<_>>>()?;

    let animations = descriptor
        .animations
        .iter()
        .enumerate()
        .map(|(i, animation)| load_animation(blob, i, animation, bone_count))
        .collect::<RuntimeLoadResult<Vec<_>>>()?;

    debug!(
        "Loaded {} chunks, {} bones, {} animations from {} bytes",
        chunks.len(),
        bones.len(),
        animations.len(),
        blob.len()
    );

    Ok(RuntimeModel {
        bounding_box: BoundingBox::from_array(descriptor.info.bounding_box),
        materials,
        chunks,
        bones,
        animations,
    })
}

/// Parse descriptor JSON and rebuild the model.
pub fn load_runtime_from_slice(json: &str, blob: &[u8]) -> RuntimeLoadResult<RuntimeModel> {
    let descriptor: Descriptor = serde_json::from_str(json)?;
    load_runtime_model(&descriptor, blob)
}

/// Load `<base>.json` and `<base>.bin`.
pub fn load_runtime_files<P: AsRef<Path>>(base: P) -> RuntimeLoadResult<RuntimeModel> {
    let base = base.as_ref();
    let json = fs::read_to_string(base.with_extension("json"))?;
    let blob = fs::read(base.with_extension("bin"))?;
    load_runtime_from_slice(&json, &blob)
}
