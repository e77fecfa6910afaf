//! SQL-level column types.
//!
//! Everything read from XML is stored as text, so the set of types is small:
//! bounded strings, unbounded text, and the integer order column.

use std::fmt;

/// SQL column type for DDL generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 32-bit signed integer (INT).
    Int32,

    /// Variable-length string with maximum length.
    Varchar(u16),

    /// Unbounded text.
    Text,
}

impl DataType {
    /// Parse a type name such as `varchar(64)`, `text` or `int`.
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "int" | "integer" | "int32" => return Some(DataType::Int32),
            "text" | "longtext" | "clob" => return Some(DataType::Text),
            _ => {}
        }
        let inner = lower
            .strip_prefix("varchar(")
            .and_then(|rest| rest.strip_suffix(')'))?;
        inner.trim().parse().ok().map(DataType::Varchar)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int32 => write!(f, "INT"),
            DataType::Varchar(n) => write!(f, "VARCHAR({})", n),
            DataType::Text => write!(f, "TEXT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(DataType::parse("VARCHAR(64)"), Some(DataType::Varchar(64)));
        assert_eq!(DataType::parse("varchar( 16 )"), Some(DataType::Varchar(16)));
        assert_eq!(DataType::parse("text"), Some(DataType::Text));
        assert_eq!(DataType::parse("INT"), Some(DataType::Int32));
        assert_eq!(DataType::parse("varchar(abc)"), None);
        assert_eq!(DataType::parse("blob"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(DataType::Varchar(255).to_string(), "VARCHAR(255)");
        assert_eq!(DataType::Text.to_string(), "TEXT");
    }
}
