//! DAX Core - COLLADA loading and conversion.
//!
//! This crate provides:
//!
//! - **COLLADA support**: XML parsing into an addressable element graph
//! - **Conversion**: scene nodes, geometry chunks, skeletons, materials and
//!   resampled animations of an engine-neutral [`Model`]
//!
//! # Example
//!
//! ```ignore
//! use dax_core::{collada::load_collada, convert, ConverterOptions};
//!
//! let doc = load_collada("character.dae")?;
//! let model = convert(&doc, &ConverterOptions::default())?;
//! println!("{} chunks, {} bones, {} clips",
//!     model.chunks.len(),
//!     model.skeleton.len(),
//!     model.animations.len());
//! ```

pub mod animation;
pub mod collada;
pub mod converter;
pub mod diagnostics;
pub mod material;
pub mod mesh;
pub mod options;
pub mod scene;
pub mod skeleton;

// Re-export commonly used types
pub use animation::{AnimationClip, Track};
pub use collada::{load_collada, load_collada_from_string, Document, ParseError};
pub use converter::{convert, ConvertError, ConvertResult, ConverterContext, Model};
pub use material::ConvertedMaterial;
pub use mesh::{ChunkData, GeometryChunk};
pub use options::{ConverterOptions, OptionsError};
pub use skeleton::{Bone, Skeleton};
