//! DAX Export - binary blob + JSON descriptor output.
//!
//! This crate provides:
//!
//! - **Data chunks**: typed, strided runs packed append-only into one blob
//! - **Descriptor**: the JSON document describing materials, chunks, bones
//!   and animations, with array fields pointing into the blob
//! - **Exporter**: turns a converted [`dax_core::Model`] into both
//! - **Runtime loader**: the exact inverse, with validation of every view
//!
//! # Example
//!
//! ```ignore
//! use dax_core::{collada::load_collada, convert, ConverterOptions};
//! use dax_export::{runtime::load_runtime_files, Exporter};
//!
//! let doc = load_collada("character.dae")?;
//! let model = convert(&doc, &ConverterOptions::default())?;
//! Exporter::new(&model).export().write("character")?;
//!
//! let runtime = load_runtime_files("character")?;
//! assert_eq!(runtime.chunks.len(), model.chunks.len());
//! ```

pub mod data_chunk;
pub mod descriptor;
pub mod exporter;
pub mod runtime;

// Re-export commonly used types
pub use data_chunk::{DataChunk, DataType, ExportContext, TypedArray};
pub use descriptor::{ArrayDescriptor, Descriptor};
pub use exporter::{export_model, ExportError, ExportResult, Exported, Exporter};
pub use runtime::{load_runtime_files, load_runtime_model, RuntimeLoadError, RuntimeLoadResult, RuntimeModel};
