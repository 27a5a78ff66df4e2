//! Geometry chunks.
//!
//! COLLADA indexes every vertex attribute independently. A [`ChunkData`]
//! holds one shared vertex index space instead: vertices are keyed by their
//! position index and every other attribute is copied into that space.

use std::collections::HashMap;

use dax_math::{BoundingBox, Mat4, Mat4Ext, Vec3};
use thiserror::Error;

/// Influences kept per vertex.
pub const MAX_INFLUENCES: usize = 4;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeshError {
    #[error("primitive has no POSITION input")]
    MissingPosition,

    #[error("face {face} has {vertices} vertices, only triangles are supported")]
    NonTriangle { face: usize, vertices: u32 },

    #[error("index array holds {len} values, {expected} needed")]
    Truncated { len: usize, expected: usize },

    #[error("{attribute:?} index {index} out of range ({count} elements)")]
    IndexOutOfRange {
        attribute: VertexAttribute,
        index: i64,
        count: usize,
    },
}

pub type MeshResult<T> = Result<T, MeshError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexAttribute {
    Position,
    Normal,
    Texcoord,
}

impl VertexAttribute {
    /// Components stored per vertex.
    pub fn width(self) -> usize {
        match self {
            VertexAttribute::Position | VertexAttribute::Normal => 3,
            VertexAttribute::Texcoord => 2,
        }
    }
}

/// One independently indexed attribute stream of a primitive.
#[derive(Clone, Copy, Debug)]
pub struct AttributeStream<'a> {
    pub attribute: VertexAttribute,
    /// Flat source values, `stride` per element.
    pub values: &'a [f32],
    pub stride: usize,
    /// Offset of this attribute inside each index tuple.
    pub index_offset: usize,
}

impl AttributeStream<'_> {
    pub fn count(&self) -> usize {
        self.values.len() / self.stride.max(1)
    }
}

/// De-indexed vertex data of one draw unit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkData {
    /// xyz per vertex
    pub positions: Vec<f32>,
    pub normals: Option<Vec<f32>>,
    /// uv per vertex
    pub texcoords: Option<Vec<f32>>,
    /// `MAX_INFLUENCES` bone indices per vertex
    pub bone_indices: Option<Vec<u16>>,
    /// `MAX_INFLUENCES` weights per vertex
    pub bone_weights: Option<Vec<f32>>,
    /// Triangle list into this chunk's vertices.
    pub indices: Vec<u32>,
    /// Source position index of every vertex.
    pub source_positions: Vec<u32>,
}

impl ChunkData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_positions(&self.positions)
    }

    /// Transform positions by `matrix` and normals by its normal matrix.
    pub fn transform(&mut self, matrix: &Mat4) {
        for p in self.positions.chunks_exact_mut(3) {
            let v = matrix.transform_point3(Vec3::new(p[0], p[1], p[2]));
            p.copy_from_slice(&v.to_array());
        }
        if let Some(normals) = &mut self.normals {
            let normal_matrix = matrix.normal_matrix();
            for n in normals.chunks_exact_mut(3) {
                let v = (normal_matrix * Vec3::new(n[0], n[1], n[2])).normalize_or_zero();
                n.copy_from_slice(&v.to_array());
            }
        }
    }

    /// v -> 1 - v
    pub fn flip_texcoord_v(&mut self) {
        if let Some(texcoords) = &mut self.texcoords {
            for uv in texcoords.chunks_exact_mut(2) {
                uv[1] = 1.0 - uv[1];
            }
        }
    }

    /// Reverse triangle winding, used when a transform mirrors the geometry.
    pub fn flip_winding(&mut self) {
        for tri in self.indices.chunks_exact_mut(3) {
            tri.swap(1, 2);
        }
    }
}

/// A converted draw unit.
#[derive(Clone, Debug)]
pub struct GeometryChunk {
    pub name: String,
    /// Index into the model's materials.
    pub material: usize,
    /// Emptied by [`merge_chunk_data`].
    pub data: ChunkData,
    pub vertex_count: usize,
    pub triangle_count: usize,
    /// First vertex in the merged buffers.
    pub vertex_offset: usize,
    /// First index in the merged index buffer.
    pub index_offset: usize,
    pub bounding_box: BoundingBox,
}

impl GeometryChunk {
    pub fn new(name: impl Into<String>, material: usize, data: ChunkData) -> Self {
        Self {
            name: name.into(),
            material,
            vertex_count: data.vertex_count(),
            triangle_count: data.triangle_count(),
            vertex_offset: 0,
            index_offset: 0,
            bounding_box: data.bounding_box(),
            data,
        }
    }

    /// Recompute counts and bounds after the data changed.
    pub fn refresh(&mut self) {
        self.vertex_count = self.data.vertex_count();
        self.triangle_count = self.data.triangle_count();
        self.bounding_box = self.data.bounding_box();
    }
}

fn checked_index(
    indices: &[i32],
    position: usize,
    attribute: VertexAttribute,
    count: usize,
) -> MeshResult<usize> {
    let raw = indices[position];
    if raw < 0 || raw as usize >= count {
        return Err(MeshError::IndexOutOfRange {
            attribute,
            index: raw as i64,
            count,
        });
    }
    Ok(raw as usize)
}

/// Build one chunk from independently indexed attribute streams.
///
/// `indices` is the interleaved index array with `index_stride` indices per
/// face corner, `vcount` the number of corners per face. Vertices are
/// created once per distinct position index, in first-use order; other
/// attributes are written per corner, so the last corner referencing a
/// vertex wins.
pub fn create_chunk(
    streams: &[AttributeStream<'_>],
    indices: &[i32],
    index_stride: usize,
    vcount: &[u32],
) -> MeshResult<ChunkData> {
    let position = streams
        .iter()
        .find(|s| s.attribute == VertexAttribute::Position)
        .ok_or(MeshError::MissingPosition)?;

    if let Some((face, &vertices)) = vcount.iter().enumerate().find(|(_, &n)| n != 3) {
        return Err(MeshError::NonTriangle { face, vertices });
    }

    let index_stride = index_stride.max(1);
    let corners = vcount.len() * 3;
    let expected = corners * index_stride;
    if indices.len() < expected {
        return Err(MeshError::Truncated {
            len: indices.len(),
            expected,
        });
    }

    // Unique vertex per position index
    let position_count = position.count();
    let mut vertex_of_position: HashMap<usize, u32> = HashMap::new();
    let mut source_positions = Vec::new();
    let mut corner_vertices = Vec::with_capacity(corners);
    for corner in 0..corners {
        let p = checked_index(
            indices,
            corner * index_stride + position.index_offset,
            VertexAttribute::Position,
            position_count,
        )?;
        let vertex = *vertex_of_position.entry(p).or_insert_with(|| {
            source_positions.push(p as u32);
            (source_positions.len() - 1) as u32
        });
        corner_vertices.push(vertex);
    }

    let vertex_count = source_positions.len();
    let mut chunk = ChunkData {
        indices: corner_vertices,
        source_positions,
        ..Default::default()
    };

    for stream in streams {
        let width = stream.attribute.width();
        let stride = stream.stride.max(1);
        let copied = width.min(stride);
        let count = stream.count();
        let mut values = vec![0.0f32; vertex_count * width];

        for corner in 0..corners {
            let element = checked_index(
                indices,
                corner * index_stride + stream.index_offset,
                stream.attribute,
                count,
            )?;
            let vertex = chunk.indices[corner] as usize;
            values[vertex * width..vertex * width + copied]
                .copy_from_slice(&stream.values[element * stride..element * stride + copied]);
        }

        match stream.attribute {
            VertexAttribute::Position => chunk.positions = values,
            VertexAttribute::Normal => chunk.normals = Some(values),
            VertexAttribute::Texcoord => chunk.texcoords = Some(values),
        }
    }

    Ok(chunk)
}

fn extend_or_fill<T: Copy>(target: &mut Option<Vec<T>>, source: &Option<Vec<T>>, len: usize, fill: T) {
    let Some(target) = target else { return };
    match source {
        Some(values) => target.extend_from_slice(values),
        None => target.extend(std::iter::repeat(fill).take(len)),
    }
}

/// Concatenate the data of all chunks into shared buffers.
///
/// Each chunk's data is moved out and replaced by its
/// `vertex_offset` / `index_offset` into the merged buffers. Indices stay
/// relative to the chunk's first vertex. An attribute present in any chunk
/// is present in the result; chunks without it are zero filled.
pub fn merge_chunk_data(chunks: &mut [GeometryChunk]) -> ChunkData {
    let any = |f: fn(&ChunkData) -> bool| chunks.iter().any(|c| f(&c.data));
    let mut merged = ChunkData {
        normals: any(|d| d.normals.is_some()).then(Vec::new),
        texcoords: any(|d| d.texcoords.is_some()).then(Vec::new),
        bone_indices: any(|d| d.bone_indices.is_some()).then(Vec::new),
        bone_weights: any(|d| d.bone_weights.is_some()).then(Vec::new),
        ..Default::default()
    };

    for chunk in chunks.iter_mut() {
        let data = std::mem::take(&mut chunk.data);
        let vertices = data.vertex_count();
        chunk.vertex_offset = merged.vertex_count();
        chunk.index_offset = merged.indices.len();
        chunk.vertex_count = vertices;
        chunk.triangle_count = data.triangle_count();

        merged.positions.extend_from_slice(&data.positions);
        extend_or_fill(&mut merged.normals, &data.normals, vertices * 3, 0.0);
        extend_or_fill(&mut merged.texcoords, &data.texcoords, vertices * 2, 0.0);
        extend_or_fill(&mut merged.bone_indices, &data.bone_indices, vertices * MAX_INFLUENCES, 0);
        extend_or_fill(&mut merged.bone_weights, &data.bone_weights, vertices * MAX_INFLUENCES, 0.0);
        merged.indices.extend_from_slice(&data.indices);
        merged.source_positions.extend_from_slice(&data.source_positions);
    }

    log::debug!(
        "Merged {} chunks: {} vertices, {} triangles",
        chunks.len(),
        merged.vertex_count(),
        merged.triangle_count()
    );
    merged
}
