//! Entry points for loading COLLADA documents.

use std::path::Path;

use super::dom::parse_xml;
use super::parser::{parse_document, ParseResult};
use super::types::Document;

/// Load and resolve a COLLADA file.
///
/// # Example
///
/// ```ignore
/// use dax_core::collada::load_collada;
///
/// let doc = load_collada("scene.dae")?;
/// ```
pub fn load_collada<P: AsRef<Path>>(path: P) -> ParseResult<Document> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    log::info!("Parsing {} ({} bytes)", path.display(), content.len());
    load_collada_from_string(&content)
}

/// Parse and resolve COLLADA XML held in memory (useful for testing).
pub fn load_collada_from_string(content: &str) -> ParseResult<Document> {
    let root = parse_xml(content)?;
    let doc = parse_document(&root)?;
    log::debug!(
        "Parsed {} elements: {} geometries, {} controllers, {} animations, {} visual scenes",
        doc.elements.len(),
        doc.geometries.len(),
        doc.controllers.len(),
        doc.animations.len(),
        doc.visual_scenes.len()
    );
    Ok(doc)
}
