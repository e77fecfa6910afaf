//! Bidirectional XML <-> database transfer.
//!
//! ```text
//!  import:  file --read--> records --flatten--> RowBatch[] --worker pool--> Session::write_batch
//!  export:  Session::fetch_page --rebuild--> page shards (temp files) --ordered merge--> file
//! ```
//!
//! Both directions run units of work (batches or pages) on a rayon pool of
//! `workers` threads and collect results in submission order.

mod export;
mod flatten;
mod import;
mod rebuild;

pub use export::{DbToXmlExporter, ExportResult};
pub use flatten::{flatten_record, record_key, RecordRows};
pub use import::{ImportFailure, ImportResult, XmlToDbImporter};
pub use rebuild::{rebuild_record, ChildRows};

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::DbError;
use crate::retry::RetryPolicy;
use crate::xml::XmlError;

/// Errors that stop a whole file or table transfer.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("XML error in {path}: {source}")]
    Xml {
        path: PathBuf,
        #[source]
        source: XmlError,
    },

    #[error("No root table for document element <{0}>")]
    UnknownRoot(String),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TransferResult<T> = Result<T, TransferError>;

/// Batch, page and pool sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Root records per import batch.
    pub batch_size: usize,
    /// Root rows per export page.
    pub page_size: u64,
    pub workers: usize,
    /// Attempts per batch or page, the first try included.
    pub max_attempts: u32,
    /// Base of the linear backoff between attempts.
    pub retry_delay_ms: u64,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            batch_size: 500,
            page_size: 1000,
            workers: 10,
            max_attempts: 3,
            retry_delay_ms: 200,
        }
    }
}

impl TransferSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.retry_delay_ms))
    }

    fn pool(&self) -> TransferResult<rayon::ThreadPool> {
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers.max(1))
            .thread_name(|i| format!("xmlbridge-transfer-{}", i))
            .build()?)
    }
}

/// File name without extension, used for synthetic record keys.
pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
