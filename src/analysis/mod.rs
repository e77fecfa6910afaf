//! Relationship discovery across an XML corpus.
//!
//! ```text
//!  base dirs --glob--> files --rayon--> ColumnCollector[]
//!      --classify--> SemanticKind[] --key selection--> value index
//!      --match + score--> Candidate[] --rank--> RelationshipReport
//! ```
//!
//! A relationship `source -> target` means the values of the source column
//! are (mostly) found among the values of a key-like target column. Columns
//! whose unique values exceed `max_unique_values` overflow: their value sets
//! are dropped and they take no part in matching.

mod collector;
mod kind;
mod report;
mod scoring;
mod tokens;

pub use collector::{collect_document, read_corpus_file, ColumnCollector, ColumnKey};
pub use kind::SemanticKind;
pub use report::{Relationship, RelationshipReport};
pub use scoring::{build_value_index, confidence, is_key, match_columns, rank, Candidate};
pub use tokens::{jaccard, name_tokens};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::xml::XmlError;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Analysis cancelled")]
    Cancelled,

    #[error("XML error: {0}")]
    Xml(#[from] XmlError),

    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnalysisError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

// ============================================================================
// Configuration
// ============================================================================

/// Thresholds and weights for relationship discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Values longer than this (in characters) are ignored.
    pub max_value_length: usize,
    /// Unique values per column before it overflows.
    pub max_unique_values: usize,
    /// Sample values kept per column and per relationship.
    pub sample_size: usize,
    /// Rows a column needs before it can be a key.
    pub min_key_rows: u64,
    /// Uniqueness a name-like column needs to be a key.
    pub key_uniqueness: f64,
    /// Unique values a source column needs.
    pub min_source_unique: usize,
    pub min_match_count: usize,
    pub min_source_coverage: f64,
    pub min_target_coverage: f64,
    /// Name similarity needed when both columns are identifier-like.
    pub min_name_similarity_id: f64,
    pub min_name_similarity: f64,
    /// Share of confidence taken by coverage; the rest is name similarity.
    pub coverage_weight: f64,
    /// Share of the coverage term taken by source coverage.
    pub source_coverage_share: f64,
    pub identifier_bonus: f64,
    pub same_file_penalty: f64,
    pub min_confidence: f64,
    pub max_per_source: usize,
    /// Extension of corpus files, without the dot.
    pub file_extension: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_value_length: 256,
            max_unique_values: 120_000,
            sample_size: 5,
            min_key_rows: 10,
            key_uniqueness: 0.95,
            min_source_unique: 10,
            min_match_count: 5,
            min_source_coverage: 0.6,
            min_target_coverage: 0.02,
            min_name_similarity_id: 0.2,
            min_name_similarity: 0.5,
            coverage_weight: 0.7,
            source_coverage_share: 0.85,
            identifier_bonus: 0.05,
            same_file_penalty: 0.1,
            min_confidence: 0.3,
            max_per_source: 5,
            file_extension: "xml".to_string(),
        }
    }
}

// ============================================================================
// Cancellation and progress
// ============================================================================

/// Cooperative cancellation flag shared between the caller and a run.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested.
    pub fn check(&self) -> AnalysisResult<()> {
        if self.is_cancelled() {
            Err(AnalysisError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Reported after each scanned file.
#[derive(Debug, Clone)]
pub struct AnalysisProgress {
    pub files_done: usize,
    pub files_total: usize,
    pub current: PathBuf,
}

type ProgressFn = Box<dyn Fn(&AnalysisProgress) + Send + Sync>;

// ============================================================================
// Analyzer
// ============================================================================

pub struct RelationshipAnalyzer {
    config: AnalysisConfig,
    cancel: CancellationToken,
    progress: Option<ProgressFn>,
}

impl RelationshipAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: impl Fn(&AnalysisProgress) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Scan every corpus file under `base_dirs` and report relationships.
    ///
    /// Unreadable or malformed files are skipped and counted. Cancellation
    /// is checked between files and between matching steps.
    pub fn analyze(&self, base_dirs: &[PathBuf]) -> AnalysisResult<RelationshipReport> {
        let files = self.corpus_files(base_dirs)?;
        info!(files = files.len(), dirs = base_dirs.len(), "Scanning corpus");

        let total = files.len();
        let done = AtomicUsize::new(0);
        let scanned: Vec<Option<Vec<ColumnCollector>>> = files
            .par_iter()
            .map(|(path, name)| {
                self.cancel.check()?;
                let columns = match read_corpus_file(path) {
                    Ok(document) => Some(collect_document(name, &document, &self.config)),
                    Err(e) => {
                        warn!(file = %path.display(), error = %e, "Skipping unreadable file");
                        None
                    }
                };
                let files_done = done.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(progress) = &self.progress {
                    progress(&AnalysisProgress {
                        files_done,
                        files_total: total,
                        current: path.clone(),
                    });
                }
                Ok(columns)
            })
            .collect::<AnalysisResult<_>>()?;

        let skipped_files = scanned.iter().filter(|c| c.is_none()).count();
        let columns: Vec<ColumnCollector> = scanned.into_iter().flatten().flatten().collect();

        let mut report = self.analyze_columns(columns)?;
        report.base_directories = base_dirs.to_vec();
        report.files_scanned = total - skipped_files;
        report.skipped_files = skipped_files;
        Ok(report)
    }

    /// Match already collected columns.
    pub fn analyze_columns(&self, columns: Vec<ColumnCollector>) -> AnalysisResult<RelationshipReport> {
        self.cancel.check()?;
        let kinds: Vec<SemanticKind> = columns.iter().map(SemanticKind::classify).collect();
        let keys: Vec<bool> = columns
            .iter()
            .zip(&kinds)
            .map(|(c, &k)| is_key(c, k, &self.config))
            .collect();
        let overflowed = columns.iter().filter(|c| c.overflow).count();
        debug!(
            columns = columns.len(),
            keys = keys.iter().filter(|k| **k).count(),
            overflowed,
            "Columns collected"
        );

        let index = build_value_index(&columns, &keys);
        let candidates = match_columns(&columns, &kinds, &index, &self.config, &self.cancel)?;
        let ranked = rank(candidates, &columns, self.config.max_per_source);

        let relationships: Vec<Relationship> = ranked
            .into_iter()
            .map(|c| to_relationship(&columns, c))
            .collect();
        info!(relationships = relationships.len(), "Relationship analysis complete");

        Ok(RelationshipReport {
            generated_at: Utc::now(),
            base_directories: Vec::new(),
            relationship_count: relationships.len(),
            config: self.config.clone(),
            files_scanned: 0,
            skipped_files: 0,
            columns_collected: columns.len(),
            key_columns: keys.iter().filter(|k| **k).count(),
            overflowed_columns: overflowed,
            relationships,
        })
    }

    /// Corpus files with names relative to their base directory, sorted.
    fn corpus_files(&self, base_dirs: &[PathBuf]) -> AnalysisResult<Vec<(PathBuf, String)>> {
        let mut files = Vec::new();
        for dir in base_dirs {
            let pattern = format!(
                "{}/**/*.{}",
                glob::Pattern::escape(&dir.to_string_lossy()),
                self.config.file_extension
            );
            for entry in glob::glob(&pattern)? {
                match entry {
                    Ok(path) if path.is_file() => {
                        let name = relative_name(dir, &path);
                        files.push((path, name));
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Skipping unreadable path"),
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

fn relative_name(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn to_relationship(columns: &[ColumnCollector], candidate: Candidate) -> Relationship {
    let (source, target) = (&columns[candidate.source], &columns[candidate.target]);
    Relationship {
        source_file: source.key.file.clone(),
        source_column: source.name.clone(),
        source_path: source.key.path.clone(),
        target_file: target.key.file.clone(),
        target_column: target.name.clone(),
        target_path: target.key.path.clone(),
        match_count: candidate.match_count,
        source_coverage: candidate.source_coverage,
        target_coverage: candidate.target_coverage,
        confidence: candidate.confidence,
        name_similarity: candidate.name_similarity,
        sample_values: candidate.samples,
    }
}
