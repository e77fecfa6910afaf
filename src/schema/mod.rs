//! Relational schema derived from XML.
//!
//! A [`TableConf`] describes one table: root tables hold one row per record
//! element, auxiliary (collection) tables hold one row per repeated child
//! element. Tables are linked into a [`TableForest`] that drives DDL emission
//! and data transfer order.
//!
//! # Naming conventions
//!
//! ```text
//! quest                                   root table (document element name)
//! quest__fighter_selectable_reward__data  collection table (parent + "__" + path)
//! reward__item                            column for <reward><item>
//! _attr_id, stats___attr_type             columns for attributes
//! __text__                                own text of a leaf record/item
//! ```

mod emit;
mod forest;
mod inference;
mod stats;
mod store;

pub use emit::{
    column_def, create_table, drop_table, schema_ddl, synthetic_key_column, table_ddl,
};
pub use forest::TableForest;
pub use inference::{
    InferenceConfig, InferenceReport, SchemaConflict, SchemaInferenceEngine, SkippedDocument,
    WidenedColumn,
};
pub use stats::{AttributeStats, PathNode, RootStats, ValueStatsCollector};
pub use store::{load_schema, save_schema, SchemaFile};

use serde::{Deserialize, Serialize};

use crate::sql::DataType;

/// Separator between hierarchy levels in table and column names.
pub const SEPARATOR: &str = "__";
/// Segment prefix marking an attribute-derived column.
pub const ATTR_MARKER: &str = "_attr_";
/// Sibling position column.
pub const ORDER_INDEX: &str = "__order_index";
/// Record element tag column on root tables.
pub const TYPE_DESC: &str = "__type_desc__";
/// Set on root rows whose key was generated rather than read from the record.
pub const SYNTHETIC_KEY: &str = "__synthetic_key__";
/// Own text of a record or collection item without child elements.
pub const TEXT_COLUMN: &str = "__text__";
/// Primary key of root tables.
pub const KEY_COLUMN: &str = "id";
/// Primary key of collection tables.
pub const ROW_ID: &str = "__id";
/// Immediate parent row of a collection row.
pub const PARENT_ID: &str = "__parent_id";
/// Owning root record of a collection row.
pub const ROOT_ID: &str = "__root_id";
/// Width of all key columns.
pub const KEY_LENGTH: u16 = 255;
/// Width of the record tag column.
pub const TYPE_DESC_LENGTH: u16 = 64;

/// Errors raised by schema inference, persistence and forest construction.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Duplicate table name: {0}")]
    DuplicateTable(String),

    #[error("Table hierarchy contains a cycle through {0}")]
    Cycle(String),

    #[error("Failed to read schema file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse schema file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported schema file version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
}

pub type SchemaResult<T> = Result<T, SchemaError>;

/// Inferred column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "length")]
pub enum ColumnType {
    Varchar(u16),
    Text,
}

impl ColumnType {
    /// Type for a column whose longest observed value has `max_len` characters.
    ///
    /// Lengths are rounded up to a multiple of 16 (minimum 16) and capped at
    /// the threshold; anything longer than the threshold becomes TEXT.
    pub fn from_max_len(max_len: usize, threshold: u16) -> Self {
        if max_len > threshold as usize {
            return ColumnType::Text;
        }
        let rounded = max_len.div_ceil(16).max(1) * 16;
        ColumnType::Varchar(rounded.min(threshold as usize) as u16)
    }

    /// The wider of two types. TEXT wins over any VARCHAR.
    pub fn widen(self, other: ColumnType) -> ColumnType {
        match (self, other) {
            (ColumnType::Varchar(a), ColumnType::Varchar(b)) => ColumnType::Varchar(a.max(b)),
            _ => ColumnType::Text,
        }
    }

    pub fn to_data_type(self) -> DataType {
        match self {
            ColumnType::Varchar(n) => DataType::Varchar(n),
            ColumnType::Text => DataType::Text,
        }
    }
}

/// Where a column's value comes from, relative to its record element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnSource {
    /// Text of a (possibly nested) child element.
    Element,
    /// Attribute of the record or of a nested element.
    Attribute,
    /// Text of the record element itself.
    Text,
}

/// How root records are identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    /// `<id>` child element.
    Element,
    /// `id` attribute; the `_attr_id` column is kept for round-trip.
    Attribute,
    /// `<file stem>#<position>`.
    #[default]
    Synthetic,
}

/// Mapping between one column and its XML location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub name: String,
    /// Path relative to the record element: `a/b`, `a/@x`, `@x` or `.`.
    pub path: String,
    pub source: ColumnSource,
    pub column_type: ColumnType,
    /// Longest observed value, in characters.
    pub max_length: usize,
    pub nullable: bool,
}

impl ColumnMapping {
    /// Element path segments and optional attribute name.
    pub fn location(&self) -> (Vec<&str>, Option<&str>) {
        if self.path == "." {
            return (Vec::new(), None);
        }
        let mut segments: Vec<&str> = self.path.split('/').collect();
        let attribute = match segments.last() {
            Some(last) if last.starts_with('@') => {
                let attr = &last[1..];
                segments.pop();
                Some(attr)
            }
            _ => None,
        };
        (segments, attribute)
    }
}

/// One relational table derived from XML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConf {
    pub table_name: String,
    /// Absolute element path, e.g. `quest/fighter_selectable_reward/data`.
    pub xml_path: String,
    pub parent_table: Option<String>,
    pub is_root_table: bool,
    /// Path from the parent record to the repeated element (collections only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_path: Option<String>,
    /// Number of parent columns that precede this collection in document order.
    #[serde(default)]
    pub position: usize,
    #[serde(default)]
    pub key_source: KeySource,
    /// Default element name for rows of this table.
    pub record_tag: String,
    /// Data columns in document order.
    pub columns: Vec<ColumnMapping>,
}

impl TableConf {
    pub fn column(&self, name: &str) -> Option<&ColumnMapping> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_by_path(&self, path: &str) -> Option<&ColumnMapping> {
        self.columns.iter().find(|c| c.path == path)
    }

    /// Primary key column name.
    pub fn key_column(&self) -> &'static str {
        if self.is_root_table {
            KEY_COLUMN
        } else {
            ROW_ID
        }
    }

    /// Data columns that are physically stored.
    ///
    /// On root tables an element-sourced `id` is stored in the key column.
    pub fn stored_columns(&self) -> impl Iterator<Item = &ColumnMapping> {
        let root = self.is_root_table;
        self.columns
            .iter()
            .filter(move |c| !(root && c.name == KEY_COLUMN))
    }

    /// System columns in physical order.
    pub fn system_columns(&self) -> &'static [&'static str] {
        if self.is_root_table {
            &[KEY_COLUMN, TYPE_DESC, ORDER_INDEX, SYNTHETIC_KEY]
        } else {
            &[ROW_ID, PARENT_ID, ROOT_ID, ORDER_INDEX]
        }
    }

    /// Every physical column name, system columns first.
    pub fn physical_column_names(&self) -> Vec<&str> {
        self.system_columns()
            .iter()
            .copied()
            .chain(self.stored_columns().map(|c| c.name.as_str()))
            .collect()
    }
}

/// Join path segments into a table or column name.
pub fn join_name<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

/// Column-name segment for an attribute.
pub fn attr_segment(attribute: &str) -> String {
    format!("{}{}", ATTR_MARKER, attribute)
}
