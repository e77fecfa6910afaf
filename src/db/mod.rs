//! Relational storage seam.
//!
//! Transfer code talks to storage only through [`Database`] and [`Session`].
//! A `Database` is shared by all workers and hands out independent sessions;
//! each worker task owns one session for its lifetime.
//!
//! ```text
//!   Database (Send + Sync)
//!      |
//!      +-- session() --> Session (worker 1): write_batch, fetch_page, ...
//!      +-- session() --> Session (worker 2)
//!      +-- ...
//! ```
//!
//! The bundled backend is [`SqliteDatabase`]. It stores the same table layout
//! the MySQL DDL describes, without MySQL-only clauses.

mod sqlite;

pub use sqlite::{SqliteDatabase, SqliteSession};

use std::collections::BTreeMap;

use crate::schema::{TableConf, TableForest};
use crate::sql::Dialect;

/// Rows per `IN (...)` list when filtering by keys.
pub const KEY_CHUNK: usize = 500;

/// Errors raised by storage backends.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Backend temporarily unreachable (lost connection, failover).
    #[error("Database unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            DbError::Unavailable(_) => true,
            _ => false,
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

// ============================================================================
// Rows
// ============================================================================

/// One stored row. All data values are text; a missing value is NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    /// `id` on root tables, `__id` on collection tables.
    pub key: String,
    /// Immediate parent row (collection tables only).
    pub parent_key: Option<String>,
    /// Owning root record (collection tables only).
    pub root_key: Option<String>,
    pub order_index: i64,
    /// Record element tag (root tables only).
    pub type_desc: Option<String>,
    /// The key was generated because the record carried none (root tables only).
    pub synthetic_key: bool,
    /// Data columns by name.
    pub values: BTreeMap<String, String>,
}

impl Row {
    pub fn new(key: impl Into<String>, order_index: i64) -> Self {
        Self {
            key: key.into(),
            order_index,
            ..Default::default()
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.values.insert(column.into(), value.into());
    }
}

/// Rows destined for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRows {
    pub table: String,
    pub rows: Vec<Row>,
}

/// Unit of transactional import: a run of root records and all their
/// collection rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowBatch {
    /// Position of the batch within its file.
    pub sequence: usize,
    pub root_table: String,
    /// Keys of every root row in the batch; their collection rows are
    /// replaced wholesale.
    pub root_keys: Vec<String>,
    /// Root table first, then collection tables parents before children.
    pub tables: Vec<TableRows>,
}

impl RowBatch {
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|t| t.rows.len()).sum()
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Shared handle to a database.
pub trait Database: Send + Sync {
    /// SQL dialect spoken by sessions.
    fn dialect(&self) -> Dialect;

    /// Open an independent session.
    fn session(&self) -> DbResult<Box<dyn Session>>;
}

/// A single connection owned by one worker.
pub trait Session {
    /// Execute one or more DDL statements.
    fn execute_ddl(&mut self, sql: &str) -> DbResult<()>;

    /// Create the table if missing and add any columns it lacks.
    fn ensure_table(&mut self, table: &TableConf) -> DbResult<()>;

    fn table_exists(&mut self, table: &str) -> DbResult<bool>;

    /// Write a batch in one transaction: upsert the root rows by key and
    /// replace every collection row owned by the batch's root keys.
    ///
    /// Returns the number of rows written. On error nothing is committed.
    fn write_batch(&mut self, forest: &TableForest, batch: &RowBatch) -> DbResult<usize>;

    /// Root rows ordered by `__order_index, id`.
    fn fetch_page(&mut self, table: &TableConf, offset: u64, limit: u64) -> DbResult<Vec<Row>>;

    /// Collection rows whose parent is in `parent_keys`, ordered by
    /// `__parent_id, __order_index`.
    fn fetch_children(&mut self, table: &TableConf, parent_keys: &[String]) -> DbResult<Vec<Row>>;

    fn count(&mut self, table: &str) -> DbResult<u64>;

    /// Rows of `child` whose `__parent_id` matches no row of `parent`.
    fn count_orphans(&mut self, child: &TableConf, parent: &TableConf) -> DbResult<u64>;
}
