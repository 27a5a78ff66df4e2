//! Minimal XML tree built on top of `quick-xml`.
//!
//! The parser works on a generic DOM-like tree: element name, attributes,
//! child elements and the concatenated text content. Namespace prefixes are
//! dropped from element names.

use std::fmt::Display;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use super::parser::{ParseError, ParseResult};

/// One XML element.
#[derive(Clone, Debug, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Value of an attribute, if present.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First child element with the given name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All child elements with the given name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed text content.
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// Text of a direct child element.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text())
    }

    /// Attribute parsed as an unsigned integer.
    pub fn attr_usize(&self, name: &str) -> Option<usize> {
        let value = self.attr(name)?;
        match value.trim().parse() {
            Ok(v) => Some(v),
            Err(_) => {
                log::warn!("<{}> attribute {}=\"{}\" is not an integer", self.name, name, value);
                None
            }
        }
    }

    pub fn floats(&self) -> Vec<f32> {
        parse_floats(self.text())
    }

    pub fn ints(&self) -> Vec<i32> {
        parse_ints(self.text())
    }

    pub fn names(&self) -> Vec<String> {
        self.text().split_whitespace().map(str::to_string).collect()
    }
}

/// Parse whitespace-separated floats; unparsable tokens are logged and skipped.
pub fn parse_floats(text: &str) -> Vec<f32> {
    let mut out = Vec::new();
    let mut bad = 0usize;
    for token in text.split_whitespace() {
        match token.parse::<f32>() {
            Ok(v) => out.push(v),
            Err(_) => match token.to_ascii_uppercase().as_str() {
                "INF" => out.push(f32::INFINITY),
                "-INF" => out.push(f32::NEG_INFINITY),
                "NAN" => out.push(f32::NAN),
                _ => bad += 1,
            },
        }
    }
    if bad > 0 {
        log::warn!("Skipped {} invalid float value(s)", bad);
    }
    out
}

/// Parse whitespace-separated integers; unparsable tokens are logged and skipped.
pub fn parse_ints(text: &str) -> Vec<i32> {
    let mut out = Vec::new();
    let mut bad = 0usize;
    for token in text.split_whitespace() {
        match token.parse::<i32>() {
            Ok(v) => out.push(v),
            Err(_) => bad += 1,
        }
    }
    if bad > 0 {
        log::warn!("Skipped {} invalid integer value(s)", bad);
    }
    out
}

pub fn parse_bools(text: &str) -> Vec<bool> {
    text.split_whitespace()
        .map(|t| matches!(t, "true" | "1"))
        .collect()
}

fn xml_error(e: impl Display) -> ParseError {
    ParseError::Xml(e.to_string())
}

fn local_name(bytes: &[u8]) -> String {
    let name = String::from_utf8_lossy(bytes);
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.into_owned(),
    }
}

fn start_element(e: &BytesStart) -> ParseResult<XmlElement> {
    let mut element = XmlElement::new(local_name(e.name().as_ref()));
    for attr in e.attributes() {
        let attr = attr.map_err(xml_error)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(xml_error)?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

/// Parse an XML document into its single root element.
pub fn parse_xml(content: &str) -> ParseResult<XmlElement> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    let mut finish = |element: XmlElement, stack: &mut Vec<XmlElement>| -> ParseResult<()> {
        match stack.last_mut() {
            Some(parent) => parent.children.push(element),
            None => {
                if root.is_some() {
                    return Err(ParseError::Structure(format!(
                        "multiple root elements (second is <{}>)",
                        element.name
                    )));
                }
                root = Some(element);
            }
        }
        Ok(())
    };

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => stack.push(start_element(&e)?),
            Event::Empty(e) => {
                let element = start_element(&e)?;
                finish(element, &mut stack)?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| xml_error("unbalanced end tag"))?;
                finish(element, &mut stack)?;
            }
            Event::Text(t) => {
                if let Some(current) = stack.last_mut() {
                    let text = t.unescape().map_err(xml_error)?;
                    if !current.text.is_empty() {
                        current.text.push(' ');
                    }
                    current.text.push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ParseError::Xml(format!("unclosed element <{}>", stack[stack.len() - 1].name)));
    }

    root.ok_or_else(|| ParseError::Structure("document has no root element".to_string()))
}
