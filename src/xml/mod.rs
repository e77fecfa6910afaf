//! In-memory XML element tree with a quick-xml reader and writer.
//!
//! The tree keeps only what the relational mapping needs: element names,
//! attributes in document order, trimmed text, and child elements. Comments,
//! processing instructions and the XML declaration are dropped on read.

mod encoding;
mod reader;
mod writer;

pub use encoding::SourceEncoding;
pub use reader::{parse_document, read_document};
pub use writer::{declaration, write_document, write_element};

/// Errors raised while decoding, parsing or writing XML.
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("Malformed XML at byte {position}: {message}")]
    Malformed { position: u64, message: String },

    #[error("Document has no root element")]
    Empty,

    #[error("Declared encoding {declared} does not match the data (looks like {detected})")]
    EncodingMismatch {
        declared: &'static str,
        detected: &'static str,
    },

    #[error("Input is not valid {0}")]
    InvalidEncoding(&'static str),

    #[error("Unknown encoding: {0}")]
    UnknownEncoding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type XmlResult<T> = Result<T, XmlError>;

/// A single XML element.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    pub name: String,
    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,
    /// Trimmed text content; `None` when the element had no text.
    pub text: Option<String>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder-style attribute.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Builder-style text content.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Builder-style child element.
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    /// Leaf element holding only text: `<name>text</name>`.
    pub fn leaf(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name).with_text(text)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing an existing value.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    /// First child with the given name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the element, or `""` when it has none.
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Follow a path of child names, taking the first match at each step.
    pub fn descend(&self, segments: &[&str]) -> Option<&XmlElement> {
        segments
            .iter()
            .try_fold(self, |current, segment| current.child(segment))
    }
}
