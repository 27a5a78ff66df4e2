//! COLLADA (`.dae`) support.
//!
//! This module parses COLLADA XML into an addressable element graph:
//!
//! - [`dom`]: generic XML tree on top of `quick-xml`
//! - [`types`]: the element arena and the typed element variants
//! - [`resolver`]: URL / SID / FX link resolution
//! - [`parser`]: XML tree to element graph
//! - [`loader`]: file and string entry points
//!
//! # Example
//!
//! ```ignore
//! use dax_core::collada::load_collada;
//!
//! let doc = load_collada("character.dae")?;
//! println!("{} geometries, {} animations", doc.geometries.len(), doc.animations.len());
//! ```

pub mod dom;
mod loader;
mod parser;
pub mod resolver;
mod types;

pub use loader::*;
pub use parser::*;
pub use resolver::{AddressResolver, Link, LinkId, LinkKind, SidAccessor};
pub use types::*;
