//! Declared per-dataset source encodings.
//!
//! Encodings are never guessed for import/export: every dataset declares one,
//! and bytes that contradict the declaration are rejected.

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};

use super::{XmlError, XmlResult};

/// Dataset name whose files are stored as UTF-16 unless configured otherwise.
pub const WORLD_DATASET: &str = "world";

/// Text encoding of an XML data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceEncoding {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
}

impl SourceEncoding {
    /// Parse an encoding label such as `utf-8`, `utf-16` or `UTF-16BE`.
    pub fn parse(label: &str) -> XmlResult<Self> {
        match label.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "utf-16" | "utf16" | "utf-16le" | "utf16le" => Ok(Self::Utf16Le),
            "utf-16be" | "utf16be" => Ok(Self::Utf16Be),
            other => Err(XmlError::UnknownEncoding(other.to_string())),
        }
    }

    /// Encoding for a dataset: the configured label if any, otherwise UTF-16
    /// for world data and UTF-8 for everything else.
    pub fn for_dataset(dataset: &str, configured: Option<&str>) -> XmlResult<Self> {
        match configured {
            Some(label) => Self::parse(label),
            None if dataset.eq_ignore_ascii_case(WORLD_DATASET) => Ok(Self::Utf16Le),
            None => Ok(Self::Utf8),
        }
    }

    /// Encoding indicated by a byte-order mark, UTF-8 when there is none.
    ///
    /// Only used where no declaration exists (corpus analysis).
    pub fn sniff(bytes: &[u8]) -> Self {
        match Encoding::for_bom(bytes) {
            Some((enc, _)) if enc == UTF_16LE => Self::Utf16Le,
            Some((enc, _)) if enc == UTF_16BE => Self::Utf16Be,
            _ => Self::Utf8,
        }
    }

    /// Name used in the XML declaration.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Utf16Le | Self::Utf16Be => "UTF-16",
        }
    }

    fn display_name(&self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Utf16Le => "UTF-16LE",
            Self::Utf16Be => "UTF-16BE",
        }
    }

    fn encoding(&self) -> &'static Encoding {
        match self {
            Self::Utf8 => UTF_8,
            Self::Utf16Le => UTF_16LE,
            Self::Utf16Be => UTF_16BE,
        }
    }

    /// Decode bytes that are declared to be in this encoding.
    pub fn decode(&self, bytes: &[u8]) -> XmlResult<String> {
        if let Some((bom_encoding, _)) = Encoding::for_bom(bytes) {
            if bom_encoding != self.encoding() {
                return Err(XmlError::EncodingMismatch {
                    declared: self.display_name(),
                    detected: Self::sniff(bytes).display_name(),
                });
            }
        } else {
            self.check_unmarked(bytes)?;
        }

        let (text, malformed) = self.encoding().decode_with_bom_removal(bytes);
        if malformed {
            return Err(XmlError::InvalidEncoding(self.display_name()));
        }
        Ok(text.into_owned())
    }

    /// Guard against unmarked input in the wrong width: XML starts with an
    /// ASCII `<` (possibly after whitespace), so the position of NUL bytes in
    /// the first code unit tells UTF-8 and the two UTF-16 orders apart.
    fn check_unmarked(&self, bytes: &[u8]) -> XmlResult<()> {
        let Some(first) = bytes.iter().position(|b| !b.is_ascii_whitespace() && *b != 0) else {
            return Ok(());
        };
        let detected = if first + 1 < bytes.len() && bytes[first + 1] == 0 && first % 2 == 0 {
            Self::Utf16Le
        } else if first > 0 && bytes[first - 1] == 0 && first % 2 == 1 {
            Self::Utf16Be
        } else {
            Self::Utf8
        };
        if detected != *self {
            return Err(XmlError::EncodingMismatch {
                declared: self.display_name(),
                detected: detected.display_name(),
            });
        }
        Ok(())
    }

    /// Byte-order mark written at the start of a file.
    pub fn bom(&self) -> &'static [u8] {
        match self {
            Self::Utf8 => &[],
            Self::Utf16Le => &[0xFF, 0xFE],
            Self::Utf16Be => &[0xFE, 0xFF],
        }
    }

    /// Encode text without a byte-order mark.
    ///
    /// encoding_rs only encodes to UTF-8 for the UTF-16 labels, so UTF-16 is
    /// produced from the string's code units directly.
    pub fn encode_body(&self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => text.as_bytes().to_vec(),
            Self::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            Self::Utf16Be => text.encode_utf16().flat_map(u16::to_be_bytes).collect(),
        }
    }

    /// Encode a complete document, including the byte-order mark.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        let mut out = self.bom().to_vec();
        out.extend(self.encode_body(text));
        out
    }
}
