//! Typed binary runs and the blob they are packed into.
//!
//! Every [`DataChunk`] is a typed array with a stride. Registering a chunk
//! with an [`ExportContext`] assigns it a byte offset equal to the size of
//! all chunks registered before it; the blob is their concatenation in
//! registration order, little-endian, without header or padding.
//!
//! # Example
//!
//! ```ignore
//! use dax_export::{DataChunk, ExportContext};
//!
//! let mut context = ExportContext::new();
//! let positions = DataChunk::create(&mut context, vec![0.0f32; 9], 3);
//! let indices = DataChunk::create(&mut context, vec![0u32, 1, 2], 3);
//! let blob = context.assemble_data();
//! assert_eq!(blob.len(), 9 * 4 + 3 * 4);
//! ```

use bytemuck::Pod;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::descriptor::ArrayDescriptor;

/// Element type of a data chunk, as written to the descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    F32,
    F64,
    I8,
    I16,
    I32,
    U8,
    U16,
    U32,
}

impl DataType {
    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            DataType::I8 | DataType::U8 => 1,
            DataType::I16 | DataType::U16 => 2,
            DataType::F32 | DataType::I32 | DataType::U32 => 4,
            DataType::F64 => 8,
        }
    }
}

/// A plain element type that can live in a blob.
pub trait Element: Pod {
    const DATA_TYPE: DataType;

    /// Swap between native and little-endian order. A no-op on
    /// little-endian targets, its own inverse everywhere.
    fn swap_le(self) -> Self;
}

macro_rules! int_element {
    ($($ty:ty => $tag:ident),* $(,)?) => {$(
        impl Element for $ty {
            const DATA_TYPE: DataType = DataType::$tag;

            fn swap_le(self) -> Self {
                <$ty>::to_le(self)
            }
        }
    )*};
}

int_element!(i8 => I8, i16 => I16, i32 => I32, u8 => U8, u16 => U16, u32 => U32);

impl Element for f32 {
    const DATA_TYPE: DataType = DataType::F32;

    fn swap_le(self) -> Self {
        f32::from_bits(self.to_bits().to_le())
    }
}

impl Element for f64 {
    const DATA_TYPE: DataType = DataType::F64;

    fn swap_le(self) -> Self {
        f64::from_bits(self.to_bits().to_le())
    }
}

fn encode<T: Element>(values: &[T]) -> Vec<u8> {
    if cfg!(target_endian = "little") {
        bytemuck::cast_slice(values).to_vec()
    } else {
        let swapped: Vec<T> = values.iter().map(|v| v.swap_le()).collect();
        bytemuck::cast_slice(&swapped).to_vec()
    }
}

/// `bytes.len()` must be a multiple of the element size.
fn decode<T: Element>(bytes: &[u8]) -> Vec<T> {
    // Copies, so the blob needs no particular alignment
    let mut values: Vec<T> = bytemuck::pod_collect_to_vec(bytes);
    if cfg!(target_endian = "big") {
        for value in &mut values {
            *value = value.swap_le();
        }
    }
    values
}

/// An owned array of one of the blob element types.
#[derive(Clone, Debug, PartialEq)]
pub enum TypedArray {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
}

macro_rules! with_values {
    ($array:expr, $values:ident => $body:expr) => {
        match $array {
            TypedArray::F32($values) => $body,
            TypedArray::F64($values) => $body,
            TypedArray::I8($values) => $body,
            TypedArray::I16($values) => $body,
            TypedArray::I32($values) => $body,
            TypedArray::U8($values) => $body,
            TypedArray::U16($values) => $body,
            TypedArray::U32($values) => $body,
        }
    };
}

macro_rules! typed_array_from {
    ($($ty:ty => $tag:ident),* $(,)?) => {$(
        impl From<Vec<$ty>> for TypedArray {
            fn from(values: Vec<$ty>) -> Self {
                TypedArray::$tag(values)
            }
        }
    )*};
}

typed_array_from!(
    f32 => F32,
    f64 => F64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    u8 => U8,
    u16 => U16,
    u32 => U32,
);

impl TypedArray {
    pub fn data_type(&self) -> DataType {
        match self {
            TypedArray::F32(_) => DataType::F32,
            TypedArray::F64(_) => DataType::F64,
            TypedArray::I8(_) => DataType::I8,
            TypedArray::I16(_) => DataType::I16,
            TypedArray::I32(_) => DataType::I32,
            TypedArray::U8(_) => DataType::U8,
            TypedArray::U16(_) => DataType::U16,
            TypedArray::U32(_) => DataType::U32,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        with_values!(self, values => values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_len(&self) -> usize {
        self.len() * self.data_type().size()
    }

    /// Little-endian bytes of all elements.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        with_values!(self, values => encode(values))
    }

    /// Read an array of `data_type` from little-endian bytes.
    ///
    /// Trailing bytes that do not make up a whole element are ignored.
    pub fn from_le_bytes(data_type: DataType, bytes: &[u8]) -> Self {
        let whole = bytes.len() - bytes.len() % data_type.size();
        let bytes = &bytes[..whole];
        match data_type {
            DataType::F32 => TypedArray::F32(decode(bytes)),
            DataType::F64 => TypedArray::F64(decode(bytes)),
            DataType::I8 => TypedArray::I8(decode(bytes)),
            DataType::I16 => TypedArray::I16(decode(bytes)),
            DataType::I32 => TypedArray::I32(decode(bytes)),
            DataType::U8 => TypedArray::U8(decode(bytes)),
            DataType::U16 => TypedArray::U16(decode(bytes)),
            DataType::U32 => TypedArray::U32(decode(bytes)),
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            TypedArray::F32(values) => Some(values),
            _ => None,
        }
    }

    /// Unsigned integer elements widened to u32.
    pub fn to_u32_vec(&self) -> Option<Vec<u32>> {
        match self {
            TypedArray::U8(values) => Some(values.iter().map(|&v| v as u32).collect()),
            TypedArray::U16(values) => Some(values.iter().map(|&v| v as u32).collect()),
            TypedArray::U32(values) => Some(values.clone()),
            _ => None,
        }
    }
}

/// A registered typed run of the blob.
#[derive(Clone, Debug, PartialEq)]
pub struct DataChunk {
    pub data: TypedArray,
    /// Elements per item.
    pub stride: usize,
    /// Whole items, `data.len() / stride`.
    pub count: usize,
    pub byte_offset: usize,
}

impl DataChunk {
    /// Register `data` with the context.
    ///
    /// Empty arrays are not registered and yield `None`, so absent and
    /// empty attributes look the same in the descriptor.
    pub fn create(context: &mut ExportContext, data: impl Into<TypedArray>, stride: usize) -> Option<ArrayDescriptor> {
        let data = data.into();
        if data.is_empty() {
            return None;
        }
        let stride = stride.max(1);
        if data.len() % stride != 0 {
            warn!(
                "Data chunk of {} elements is not a multiple of stride {}; trailing elements are unreachable",
                data.len(),
                stride
            );
        }
        let count = data.len() / stride;
        Some(context.register(data, stride, count))
    }

    pub fn descriptor(&self) -> ArrayDescriptor {
        ArrayDescriptor {
            data_type: self.data.data_type(),
            byte_offset: self.byte_offset,
            stride: self.stride,
            count: self.count,
        }
    }
}

/// Collects the data chunks of one export.
#[derive(Clone, Debug, Default)]
pub struct ExportContext {
    chunks: Vec<DataChunk>,
    byte_len: usize,
}

impl ExportContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered chunks in blob order.
    pub fn chunks(&self) -> &[DataChunk] {
        &self.chunks
    }

    /// Size of the assembled blob.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    fn register(&mut self, data: TypedArray, stride: usize, count: usize) -> ArrayDescriptor {
        let chunk = DataChunk {
            byte_offset: self.byte_len,
            data,
            stride,
            count,
        };
        self.byte_len += chunk.data.byte_len();
        let descriptor = chunk.descriptor();
        self.chunks.push(chunk);
        descriptor
    }

    /// Concatenate every chunk's bytes at its offset.
    pub fn assemble_data(&self) -> Vec<u8> {
        let mut blob = vec![0u8; self.byte_len];
        for chunk in &self.chunks {
            let bytes = chunk.data.to_le_bytes();
            blob[chunk.byte_offset..chunk.byte_offset + bytes.len()].copy_from_slice(&bytes);
        }
        blob
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_are_running_totals() {
        let mut context = ExportContext::new();
        let a = DataChunk::create(&mut context, vec![1.0f32, 2.0, 3.0], 3).unwrap();
        let b = DataChunk::create(&mut context, vec![7u8, 8], 2).unwrap();
        let c = DataChunk::create(&mut context, vec![1.0f64], 1).unwrap();

        assert_eq!(a.byte_offset, 0);
        assert_eq!(b.byte_offset, 12);
        assert_eq!(c.byte_offset, 14);
        assert_eq!(context.byte_len(), 22);
        assert_eq!(b.data_type, DataType::U8);
        assert_eq!(b.count, 1);
    }

    #[test]
    fn test_empty_is_not_registered() {
        let mut context = ExportContext::new();
        assert!(DataChunk::create(&mut context, Vec::<f32>::new(), 3).is_none());
        assert!(context.chunks().is_empty());
        assert_eq!(context.assemble_data().len(), 0);
    }

    #[test]
    fn test_count_truncates() {
        let mut context = ExportContext::new();
        let view = DataChunk::create(&mut context, vec![0u16; 7], 3).unwrap();
        assert_eq!(view.count, 2);
        assert_eq!(view.stride, 3);
    }

    #[test]
    fn test_blob_is_little_endian() {
        let mut context = ExportContext::new();
        DataChunk::create(&mut context, vec![0x0102u16], 1);
        DataChunk::create(&mut context, vec![1.0f32], 1);
        let blob = context.assemble_data();
        assert_eq!(&blob[..2], &[0x02, 0x01]);
        assert_eq!(&blob[2..], &1.0f32.to_le_bytes());
    }

    #[test]
    fn test_decode_unaligned() {
        let values = vec![-1i32, 5, i32::MAX];
        let mut bytes = vec![0u8];
        bytes.extend(TypedArray::from(values.clone()).to_le_bytes());
        let decoded = TypedArray::from_le_bytes(DataType::I32, &bytes[1..]);
        assert_eq!(decoded, TypedArray::I32(values));
    }

    #[test]
    fn test_data_type_names() {
        assert_eq!(serde_json::to_string(&DataType::F32).unwrap(), "\"f32\"");
        assert_eq!(serde_json::from_str::<DataType>("\"u16\"").unwrap(), DataType::U16);
        assert_eq!(DataType::F64.size(), 8);
    }
}
