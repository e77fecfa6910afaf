//! XmlToDbImporter.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::flatten::{flatten_record, record_key, RecordRows};
use super::{file_stem, TransferError, TransferResult, TransferSettings};
use crate::db::{Database, DbError, RowBatch, TableRows};
use crate::schema::{TableConf, TableForest};
use crate::xml::{read_document, SourceEncoding, XmlElement};

/// One failed record, batch or file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportFailure {
    pub file: PathBuf,
    pub batch: Option<usize>,
    pub record: Option<String>,
    pub message: String,
}

/// Summary of an import run. Partial failures are counted, not raised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportResult {
    pub rows_written: usize,
    pub rows_failed: usize,
    pub batches_committed: usize,
    pub batches_failed: usize,
    pub errors: Vec<ImportFailure>,
}

impl ImportResult {
    pub fn merge(&mut self, other: ImportResult) {
        self.rows_written += other.rows_written;
        self.rows_failed += other.rows_failed;
        self.batches_committed += other.batches_committed;
        self.batches_failed += other.batches_failed;
        self.errors.extend(other.errors);
    }

    pub fn is_clean(&self) -> bool {
        self.rows_failed == 0 && self.batches_failed == 0 && self.errors.is_empty()
    }
}

/// Imports XML files into the tables of a [`TableForest`].
///
/// Re-importing is an upsert: root rows are replaced by key and their
/// collection rows are deleted and reinserted in the same transaction.
pub struct XmlToDbImporter<'a> {
    db: &'a dyn Database,
    forest: &'a TableForest,
    settings: TransferSettings,
}

impl<'a> XmlToDbImporter<'a> {
    pub fn new(db: &'a dyn Database, forest: &'a TableForest, settings: TransferSettings) -> Self {
        Self {
            db,
            forest,
            settings,
        }
    }

    /// Create missing tables and columns for every table in the forest.
    pub fn prepare(&self) -> TransferResult<()> {
        let mut session = self.db.session()?;
        for table in self.forest.tables_in_order() {
            session.ensure_table(table)?;
        }
        Ok(())
    }

    /// Import several files. Files that cannot be read are reported and
    /// skipped.
    ///
    /// Root records are ordered across the whole run: the records of each
    /// file follow those of the files before it.
    pub fn import_files(&self, files: &[PathBuf], encoding: SourceEncoding) -> TransferResult<ImportResult> {
        self.prepare()?;
        let mut total = ImportResult::default();
        let mut first_order = 0;
        for path in files {
            let imported = self.read(path, encoding).and_then(|document| {
                let result = self.import_document_at(path, &document, first_order);
                first_order += document.children.len() as i64;
                result
            });
            match imported {
                Ok(result) => total.merge(result),
                Err(err @ (TransferError::Xml { .. } | TransferError::UnknownRoot(_))) => {
                    warn!(path = %path.display(), error = %err, "Skipping file");
                    total.errors.push(ImportFailure {
                        file: path.clone(),
                        batch: None,
                        record: None,
                        message: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
        info!(
            files = files.len(),
            rows_written = total.rows_written,
            rows_failed = total.rows_failed,
            batches_committed = total.batches_committed,
            batches_failed = total.batches_failed,
            "Import finished"
        );
        Ok(total)
    }

    /// Import one file. Tables must exist (see [`prepare`](Self::prepare)).
    pub fn import_file(&self, path: &Path, encoding: SourceEncoding) -> TransferResult<ImportResult> {
        let document = self.read(path, encoding)?;
        self.import_document(path, &document)
    }

    fn read(&self, path: &Path, encoding: SourceEncoding) -> TransferResult<XmlElement> {
        read_document(path, encoding).map_err(|source| TransferError::Xml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Import an already parsed document; `path` names it in keys and reports.
    pub fn import_document(&self, path: &Path, document: &XmlElement) -> TransferResult<ImportResult> {
        self.import_document_at(path, document, 0)
    }

    /// Import a document whose first record takes order index `first_order`.
    pub fn import_document_at(
        &self,
        path: &Path,
        document: &XmlElement,
        first_order: i64,
    ) -> TransferResult<ImportResult> {
        let table = self
            .forest
            .root(&document.name)
            .ok_or_else(|| TransferError::UnknownRoot(document.name.clone()))?;

        let mut result = ImportResult::default();
        let records = self.flatten_document(path, table, document, first_order, &mut result);
        let batches = self.build_batches(table, records);
        debug!(path = %path.display(), batches = batches.len(), "Flattened document");

        let pool = self.settings.pool()?;
        let outcomes: Vec<(usize, Result<usize, DbError>)> = pool.install(|| {
            batches
                .par_iter()
                .map(|batch| (batch.row_count(), self.commit(batch)))
                .collect()
        });

        for (batch, (row_count, outcome)) in batches.iter().zip(outcomes) {
            match outcome {
                Ok(written) => {
                    result.rows_written += written;
                    result.batches_committed += 1;
                }
                Err(err) => {
                    error!(
                        path = %path.display(),
                        batch = batch.sequence,
                        rows = row_count,
                        error = %err,
                        "Batch failed, rolled back"
                    );
                    result.rows_failed += row_count;
                    result.batches_failed += 1;
                    result.errors.push(ImportFailure {
                        file: path.to_path_buf(),
                        batch: Some(batch.sequence),
                        record: None,
                        message: err.to_string(),
                    });
                }
            }
        }

        info!(
            path = %path.display(),
            rows_written = result.rows_written,
            rows_failed = result.rows_failed,
            batches_failed = result.batches_failed,
            "Imported file"
        );
        Ok(result)
    }

    /// Flatten every record. Records whose key repeats an earlier record of
    /// the same file are rejected.
    fn flatten_document(
        &self,
        path: &Path,
        table: &TableConf,
        document: &XmlElement,
        first_order: i64,
        result: &mut ImportResult,
    ) -> Vec<RecordRows> {
        let stem = file_stem(path);
        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(document.children.len());

        for (position, record) in document.children.iter().enumerate() {
            let key = record_key(table, record, &stem, position);
            let order_index = first_order + position as i64;
            if !seen.insert(key.clone()) {
                warn!(path = %path.display(), key = %key, position, "Duplicate record id, rejected");
                let rejected = flatten_record(self.forest, table, record, key.clone(), order_index);
                result.rows_failed += rejected.row_count();
                result.errors.push(ImportFailure {
                    file: path.to_path_buf(),
                    batch: None,
                    record: Some(key),
                    message: format!("duplicate id at record {}", position),
                });
                continue;
            }
            records.push(flatten_record(self.forest, table, record, key, order_index));
        }
        records
    }

    fn build_batches(&self, table: &TableConf, records: Vec<RecordRows>) -> Vec<RowBatch> {
        let mut order = vec![table.table_name.clone()];
        order.extend(
            self.forest
                .descendants(&table.table_name)
                .into_iter()
                .map(|t| t.table_name.clone()),
        );

        let batch_size = self.settings.batch_size.max(1);
        let mut batches = Vec::new();
        let mut records = records.into_iter().peekable();
        while records.peek().is_some() {
            let chunk: Vec<RecordRows> = records.by_ref().take(batch_size).collect();
            let mut batch = RowBatch {
                sequence: batches.len(),
                root_table: table.table_name.clone(),
                root_keys: chunk.iter().map(|r| r.key.clone()).collect(),
                tables: order
                    .iter()
                    .map(|name| TableRows {
                        table: name.clone(),
                        rows: Vec::new(),
                    })
                    .collect(),
            };
            for mut record in chunk {
                for table_rows in &mut batch.tables {
                    if let Some(rows) = record.tables.remove(&table_rows.table) {
                        table_rows.rows.extend(rows);
                    }
                }
            }
            batch.tables.retain(|t| !t.rows.is_empty());
            batches.push(batch);
        }
        batches
    }

    /// Write one batch, retrying transient failures.
    fn commit(&self, batch: &RowBatch) -> Result<usize, DbError> {
        self.settings.retry_policy().run(
            "import batch",
            |attempt| {
                debug!(batch = batch.sequence, attempt, "Writing batch");
                let mut session = self.db.session()?;
                session.write_batch(self.forest, batch)
            },
            DbError::is_transient,
        )
    }
}
