//! Per-column value collection over an XML corpus.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tokens::name_tokens;
use super::{AnalysisConfig, AnalysisResult};
use crate::schema::attr_segment;
use crate::xml::{parse_document, SourceEncoding, XmlElement};

/// Identity of a column: file relative to its base directory plus the
/// element path inside the file (`quest/quest/reward/@kind`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnKey {
    pub file: String,
    pub path: String,
}

/// Values observed for one column.
#[derive(Debug, Clone)]
pub struct ColumnCollector {
    pub key: ColumnKey,
    /// Leaf element name, or `_attr_<name>` for attributes.
    pub name: String,
    pub tokens: Vec<String>,
    values: HashSet<String>,
    /// Unique count, frozen when the column overflows.
    distinct: usize,
    pub samples: Vec<String>,
    /// Non-blank values that were counted.
    pub rows: u64,
    pub blank: u64,
    pub overflow: bool,
}

impl ColumnCollector {
    pub fn new(file: impl Into<String>, path: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            key: ColumnKey {
                file: file.into(),
                path: path.into(),
            },
            tokens: name_tokens(&name),
            name,
            values: HashSet::new(),
            distinct: 0,
            samples: Vec::new(),
            rows: 0,
            blank: 0,
            overflow: false,
        }
    }

    /// Record one value. Over-long values are ignored entirely.
    pub fn observe(&mut self, value: &str, config: &AnalysisConfig) {
        let value = value.trim();
        if value.is_empty() {
            self.blank += 1;
            return;
        }
        if value.chars().count() > config.max_value_length {
            return;
        }
        self.rows += 1;
        if self.overflow || self.values.contains(value) {
            return;
        }

        self.values.insert(value.to_string());
        self.distinct += 1;
        if self.samples.len() < config.sample_size {
            self.samples.push(value.to_string());
        }
        if self.distinct > config.max_unique_values {
            debug!(file = %self.key.file, path = %self.key.path, cap = config.max_unique_values, "Column overflowed");
            self.overflow = true;
            self.values = HashSet::new();
        }
    }

    /// Unique non-blank values seen (up to the overflow point).
    pub fn distinct(&self) -> usize {
        self.distinct
    }

    pub fn values(&self) -> &HashSet<String> {
        &self.values
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values.contains(value)
    }

    /// Unique values per counted row.
    pub fn uniqueness(&self) -> f64 {
        if self.rows == 0 {
            0.0
        } else {
            self.distinct as f64 / self.rows as f64
        }
    }
}

/// Collect every leaf element and attribute of one document.
pub fn collect_document(
    file: &str,
    document: &XmlElement,
    config: &AnalysisConfig,
) -> Vec<ColumnCollector> {
    let mut columns: BTreeMap<String, ColumnCollector> = BTreeMap::new();
    let mut path = Vec::new();
    visit(file, document, &mut path, &mut columns, config);
    columns.into_values().collect()
}

fn visit<'a>(
    file: &str,
    element: &'a XmlElement,
    path: &mut Vec<&'a str>,
    columns: &mut BTreeMap<String, ColumnCollector>,
    config: &AnalysisConfig,
) {
    path.push(&element.name);
    let element_path = path.join("/");

    for (attr, value) in &element.attributes {
        let column_path = format!("{}/@{}", element_path, attr);
        columns
            .entry(column_path.clone())
            .or_insert_with(|| ColumnCollector::new(file, column_path, attr_segment(attr)))
            .observe(value, config);
    }

    if element.is_leaf() {
        columns
            .entry(element_path.clone())
            .or_insert_with(|| ColumnCollector::new(file, element_path.clone(), element.name.clone()))
            .observe(element.text_or_empty(), config);
    } else {
        for child in &element.children {
            visit(file, child, path, columns, config);
        }
    }
    path.pop();
}

/// Read a corpus file, sniffing its encoding from the byte-order mark.
pub fn read_corpus_file(path: &Path) -> AnalysisResult<XmlElement> {
    let bytes = fs::read(path)?;
    let text = SourceEncoding::sniff(&bytes).decode(&bytes)?;
    Ok(parse_document(&text)?)
}
