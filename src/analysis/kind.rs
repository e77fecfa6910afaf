//! Coarse semantic classification of columns.

use serde::{Deserialize, Serialize};

use super::collector::ColumnCollector;

/// Largest distinct count still considered an enumeration.
const ENUM_MAX_DISTINCT: usize = 16;
/// Rows per distinct value an enumeration needs.
const ENUM_MIN_REPEAT: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SemanticKind {
    Id,
    Code,
    Name,
    Desc,
    Enum,
    Numeric,
    Other,
}

impl SemanticKind {
    /// Classify by name tokens first, then by the shape of the values.
    pub fn classify(column: &ColumnCollector) -> Self {
        Self::from_tokens(&column.tokens).unwrap_or_else(|| Self::from_values(column))
    }

    pub fn from_tokens(tokens: &[String]) -> Option<Self> {
        let has = |words: &[&str]| tokens.iter().any(|t| words.contains(&t.as_str()));
        if has(&["id"]) {
            Some(Self::Id)
        } else if has(&["code", "key", "type"]) {
            Some(Self::Code)
        } else if has(&["name"]) {
            Some(Self::Name)
        } else if has(&["desc", "description", "comment", "msg", "message"]) {
            Some(Self::Desc)
        } else {
            None
        }
    }

    fn from_values(column: &ColumnCollector) -> Self {
        let values = column.values();
        if values.is_empty() {
            return Self::Other;
        }
        if values.iter().all(|v| v.parse::<f64>().is_ok()) {
            return Self::Numeric;
        }
        let distinct = column.distinct();
        if distinct <= ENUM_MAX_DISTINCT && column.rows >= ENUM_MIN_REPEAT * distinct as u64 {
            return Self::Enum;
        }
        if values.iter().all(|v| is_identifier(v)) {
            return Self::Code;
        }
        Self::Other
    }

    pub fn is_id_like(self) -> bool {
        matches!(self, Self::Id | Self::Code)
    }

    /// Whether a relationship between the two kinds is plausible.
    pub fn compatible(self, other: Self) -> bool {
        self == other || (self.is_id_like() && other.is_id_like())
    }
}

fn is_identifier(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}
