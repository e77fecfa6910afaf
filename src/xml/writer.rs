//! Indented XML serialization.

use quick_xml::escape::escape;

use super::{SourceEncoding, XmlElement};

const INDENT: &str = "  ";

/// XML declaration line for the given encoding, including the newline.
pub fn declaration(encoding: SourceEncoding) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"{}\"?>\n",
        encoding.label()
    )
}

/// Serialize a whole document, declaration and BOM included.
pub fn write_document(root: &XmlElement, encoding: SourceEncoding) -> Vec<u8> {
    let mut text = declaration(encoding);
    write_element(&mut text, root, 0);
    encoding.encode(&text)
}

/// Append `element` to `out` at the given depth, ending with a newline.
pub fn write_element(out: &mut String, element: &XmlElement, depth: usize) {
    let pad = INDENT.repeat(depth);
    out.push_str(&pad);
    out.push('<');
    out.push_str(&element.name);
    for (key, value) in &element.attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape(value.as_str()));
        out.push('"');
    }

    let text = element.text.as_deref().filter(|t| !t.is_empty());
    match (text, element.children.is_empty()) {
        (None, true) => out.push_str("/>\n"),
        (Some(text), true) => {
            out.push('>');
            out.push_str(&escape(text));
            close(out, &element.name);
        }
        (text, false) => {
            out.push('>');
            if let Some(text) = text {
                out.push_str(&escape(text));
            }
            out.push('\n');
            for child in &element.children {
                write_element(out, child, depth + 1);
            }
            out.push_str(&pad);
            close(out, &element.name);
        }
    }
}

fn close(out: &mut String, name: &str) {
    out.push_str("</");
    out.push_str(name);
    out.push_str(">\n");
}
