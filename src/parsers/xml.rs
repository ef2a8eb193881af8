//! Minimal namespace-aware element tree built on `quick-xml` events.
//!
//! Benchmark documents are small enough to hold in memory, and the XCCDF
//! lookups (child by name, all descendants by name, group ancestry) read far
//! more naturally against a tree than against a raw event stream.

use quick_xml::encoding::{Decoder, EncodingError};
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;

use crate::errors::ChecklistError;

/// One element of a parsed XML document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    /// Resolved namespace URI, if the element name is bound to one.
    pub namespace: Option<String>,
    /// Local (unprefixed) element name.
    pub name: String,
    /// Attributes keyed by their qualified name as written.
    pub attributes: Vec<(String, String)>,
    /// Concatenated direct text content (children's text is not included).
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// Whether this element has the given local name in one of the namespaces.
    pub fn is(&self, namespaces: &[&str], local: &str) -> bool {
        self.name == local
            && self
                .namespace
                .as_deref()
                .is_some_and(|ns| namespaces.contains(&ns))
    }

    /// Attribute value by qualified name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// First direct child matching the name.
    pub fn child(&self, namespaces: &[&str], local: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.is(namespaces, local))
    }

    /// First descendant (depth-first, document order) matching the name.
    pub fn descendant(&self, namespaces: &[&str], local: &str) -> Option<&XmlElement> {
        for child in &self.children {
            if child.is(namespaces, local) {
                return Some(child);
            }
            if let Some(found) = child.descendant(namespaces, local) {
                return Some(found);
            }
        }
        None
    }

    /// All descendants matching the name, in document order.
    pub fn descendants<'a>(&'a self, namespaces: &[&str], local: &str) -> Vec<&'a XmlElement> {
        let mut found = Vec::new();
        self.collect_descendants(namespaces, local, &mut found);
        found
    }

    fn collect_descendants<'a>(
        &'a self,
        namespaces: &[&str],
        local: &str,
        found: &mut Vec<&'a XmlElement>,
    ) {
        for child in &self.children {
            if child.is(namespaces, local) {
                found.push(child);
            }
            child.collect_descendants(namespaces, local, found);
        }
    }
}

/// Parse a complete document and return its root element.
///
/// Fails on any well-formedness error, including bytes that are not valid
/// UTF-8; never returns a partial tree.
pub fn parse_document(data: &[u8]) -> Result<XmlElement, ChecklistError> {
    let mut reader = NsReader::from_reader(data);
    let decoder = reader.decoder();
    let mut buf = Vec::new();

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let read = reader
            .read_resolved_event_into(&mut buf)
            .map(|(resolved, event)| (namespace_uri(resolved), event));
        let (namespace, event) = match read {
            Ok(pair) => pair,
            Err(e) => {
                return Err(ChecklistError::Parse(format!(
                    "malformed XML at byte {}: {e}",
                    reader.error_position()
                )))
            }
        };

        match event {
            Event::Start(start) => {
                stack.push(open_element(&start, namespace?, decoder)?);
            }
            Event::Empty(start) => {
                let element = open_element(&start, namespace?, decoder)?;
                attach(element, &mut stack, &mut root)?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| {
                    ChecklistError::Parse("closing tag without matching open tag".to_string())
                })?;
                attach(element, &mut stack, &mut root)?;
            }
            Event::Text(text) => {
                let text = text.decode().map_err(invalid_text)?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Event::CData(cdata) => {
                let text = cdata.decode().map_err(invalid_text)?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Event::GeneralRef(reference) => {
                let resolved = resolve_reference(&reference)?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&resolved);
                }
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions, doctype.
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(ChecklistError::Parse(format!(
            "unexpected end of document inside <{}>",
            open.name
        )));
    }

    root.ok_or_else(|| ChecklistError::Parse("document has no root element".to_string()))
}

fn invalid_text(e: EncodingError) -> ChecklistError {
    ChecklistError::Parse(format!("invalid text content: {e}"))
}

/// Namespace URI an element name resolved to. An undeclared prefix is an error.
fn namespace_uri(resolved: ResolveResult<'_>) -> Result<Option<String>, ChecklistError> {
    match resolved {
        ResolveResult::Bound(ns) => std::str::from_utf8(ns.into_inner())
            .map(|uri| Some(uri.to_string()))
            .map_err(|e| ChecklistError::Parse(format!("invalid namespace URI: {e}"))),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(ChecklistError::Parse(format!(
            "unbound namespace prefix '{}'",
            String::from_utf8_lossy(&prefix)
        ))),
    }
}

/// Build an element from a start tag whose namespace is already resolved.
fn open_element(
    start: &BytesStart<'_>,
    namespace: Option<String>,
    decoder: Decoder,
) -> Result<XmlElement, ChecklistError> {
    let name = decoder
        .decode(start.local_name().as_ref())
        .map_err(|e| ChecklistError::Parse(format!("invalid element name: {e}")))?
        .into_owned();

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ChecklistError::Parse(format!("invalid attribute: {e}")))?;
        let key = decoder
            .decode(attr.key.as_ref())
            .map_err(|e| ChecklistError::Parse(format!("invalid attribute name: {e}")))?
            .into_owned();
        let value = attr
            .decode_and_unescape_value(decoder)
            .map_err(|e| ChecklistError::Parse(format!("invalid value for attribute {key}: {e}")))?
            .into_owned();
        attributes.push((key, value));
    }

    Ok(XmlElement {
        namespace,
        name,
        attributes,
        text: String::new(),
        children: Vec::new(),
    })
}

/// Append a finished element to its parent, or make it the root.
fn attach(
    element: XmlElement,
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
) -> Result<(), ChecklistError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => {
            return Err(ChecklistError::Parse(
                "document has more than one root element".to_string(),
            ))
        }
    }
    Ok(())
}

/// Character references and the predefined entities; anything else is rejected.
fn resolve_reference(reference: &BytesRef<'_>) -> Result<String, ChecklistError> {
    if let Some(ch) = reference
        .resolve_char_ref()
        .map_err(|e| ChecklistError::Parse(format!("invalid character reference: {e}")))?
    {
        return Ok(ch.to_string());
    }
    let name = reference
        .decode()
        .map_err(|e| ChecklistError::Parse(format!("invalid entity reference: {e}")))?;
    resolve_predefined_entity(&name)
        .map(str::to_string)
        .ok_or_else(|| ChecklistError::Parse(format!("unknown entity reference &{name};")))
}
