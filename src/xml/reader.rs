//! Build an [`XmlElement`] tree with quick-xml.

use std::fs;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use super::{SourceEncoding, XmlElement, XmlError, XmlResult};

/// Read and parse a file stored in the declared encoding.
pub fn read_document(path: &Path, encoding: SourceEncoding) -> XmlResult<XmlElement> {
    let bytes = fs::read(path)?;
    let text = encoding.decode(&bytes)?;
    parse_document(&text)
}

/// Parse a decoded document into its root element.
pub fn parse_document(text: &str) -> XmlResult<XmlElement> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| malformed(reader.buffer_position() as u64, e))?;
        let position = reader.buffer_position() as u64;

        match event {
            Event::Start(start) => stack.push(open_element(&start, position)?),
            Event::Empty(start) => {
                let element = open_element(&start, position)?;
                attach(&mut stack, &mut root, element, position)?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| XmlError::Malformed {
                    position,
                    message: "closing tag without matching start".to_string(),
                })?;
                attach(&mut stack, &mut root, element, position)?;
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    let text = text.unescape().map_err(|e| malformed(position, e))?;
                    push_text(current, &text);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    let bytes = data.into_inner();
                    push_text(current, String::from_utf8_lossy(&bytes).trim());
                }
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions and doctypes
            // carry no data for the relational mapping.
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::Malformed {
            position: reader.buffer_position() as u64,
            message: format!("unclosed element <{}>", open.name),
        });
    }

    root.ok_or(XmlError::Empty)
}

fn open_element(start: &BytesStart<'_>, position: u64) -> XmlResult<XmlElement> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = XmlElement::new(name);

    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(position, e))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| malformed(position, e))?
            .into_owned();
        element.attributes.push((key, value));
    }

    Ok(element)
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
    position: u64,
) -> XmlResult<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            Ok(())
        }
        None if root.is_some() => Err(XmlError::Malformed {
            position,
            message: format!("second root element <{}>", element.name),
        }),
        None => {
            *root = Some(element);
            Ok(())
        }
    }
}

fn push_text(element: &mut XmlElement, text: &str) {
    if text.is_empty() {
        return;
    }
    match element.text.as_mut() {
        Some(existing) => existing.push_str(text),
        None => element.text = Some(text.to_string()),
    }
}

fn malformed(position: u64, err: impl std::fmt::Display) -> XmlError {
    XmlError::Malformed {
        position,
        message: err.to_string(),
    }
}
