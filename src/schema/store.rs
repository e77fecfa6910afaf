//! Persisted schema file.
//!
//! Once written, the schema file is the source of truth: later inference
//! runs merge into it instead of replacing it.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{SchemaError, SchemaResult, TableConf};
use crate::cache::compute_hash;

/// Current schema file format version.
pub const SCHEMA_VERSION: u32 = 1;

/// On-disk schema: every table plus a content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaFile {
    pub version: u32,
    /// SHA-256 over the tables, for change detection by external tooling.
    pub fingerprint: String,
    pub tables: Vec<TableConf>,
}

impl SchemaFile {
    pub fn new(tables: Vec<TableConf>) -> SchemaResult<Self> {
        let fingerprint = compute_hash(&tables)?;
        Ok(Self {
            version: SCHEMA_VERSION,
            fingerprint,
            tables,
        })
    }
}

/// Load tables from `path`. A missing file is an empty schema.
pub fn load_schema(path: &Path) -> SchemaResult<Vec<TableConf>> {
    if !path.exists() {
        debug!(path = %path.display(), "No schema file yet");
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path)?;
    let file: SchemaFile = serde_json::from_str(&text)?;
    if file.version != SCHEMA_VERSION {
        return Err(SchemaError::Version {
            found: file.version,
            expected: SCHEMA_VERSION,
        });
    }
    Ok(file.tables)
}

/// Write tables to `path` as pretty JSON, creating parent directories.
pub fn save_schema(path: &Path, tables: &[TableConf]) -> SchemaResult<SchemaFile> {
    let file = SchemaFile::new(tables.to_vec())?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, serde_json::to_string_pretty(&file)?)?;
    info!(path = %path.display(), tables = tables.len(), fingerprint = %file.fingerprint, "Saved schema");
    Ok(file)
}
