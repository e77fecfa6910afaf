//! Relationship report artifact (JSON).

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AnalysisConfig, AnalysisResult};

/// One discovered relationship: values of the source column are found in
/// the target column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source_file: String,
    pub source_column: String,
    pub source_path: String,
    pub target_file: String,
    pub target_column: String,
    pub target_path: String,
    pub match_count: usize,
    pub source_coverage: f64,
    pub target_coverage: f64,
    pub confidence: f64,
    pub name_similarity: f64,
    pub sample_values: Vec<String>,
}

/// Output of a relationship analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipReport {
    pub generated_at: DateTime<Utc>,
    pub base_directories: Vec<PathBuf>,
    pub relationship_count: usize,
    pub config: AnalysisConfig,
    #[serde(default)]
    pub files_scanned: usize,
    #[serde(default)]
    pub skipped_files: usize,
    #[serde(default)]
    pub columns_collected: usize,
    #[serde(default)]
    pub key_columns: usize,
    #[serde(default)]
    pub overflowed_columns: usize,
    pub relationships: Vec<Relationship>,
}

impl RelationshipReport {
    pub fn to_json(&self) -> AnalysisResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report, creating parent directories.
    pub fn write(&self, path: &Path) -> AnalysisResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> AnalysisResult<Self> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}
