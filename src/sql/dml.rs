//! DML (Data Manipulation Language) support.
//!
//! Builders for the parameterized statements the storage layer runs.
//! Values are never inlined: every value position is a `?` placeholder.
//!
//! # Examples
//!
//! ```ignore
//! use xmlbridge::sql::{Delete, Dialect, Insert, Select};
//!
//! // INSERT ... upsert on the primary key
//! let insert = Insert::into("quest")
//!     .columns(["id", "name"])
//!     .upsert("id");
//!
//! // DELETE ... WHERE col IN (?, ?)
//! let delete = Delete::from("quest__reward").filter_in("__root_id", 2);
//!
//! // SELECT ... ORDER BY ... LIMIT ... OFFSET ...
//! let page = Select::from("quest")
//!     .columns(["id", "name"])
//!     .order_by(["__order_index", "id"])
//!     .limit(100)
//!     .offset(200);
//! ```

use super::dialect::{Dialect, SqlDialect};
use super::token::{Token, TokenStream};

// ============================================================================
// INSERT
// ============================================================================

/// Single-row parameterized INSERT statement.
#[derive(Debug, Clone)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    /// Key column for upserts; every other column is replaced on conflict.
    pub upsert_key: Option<String>,
}

impl Insert {
    /// Create a new INSERT statement.
    pub fn into(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            upsert_key: None,
        }
    }

    /// Set the column list.
    pub fn columns(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.columns = cols.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the stored row when `key` already exists.
    pub fn upsert(mut self, key: impl Into<String>) -> Self {
        self.upsert_key = Some(key.into());
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Insert)
            .space()
            .push(Token::Into)
            .space()
            .ident(self.table.as_str())
            .space()
            .lparen()
            .ident_list(&self.columns)
            .rparen()
            .space()
            .push(Token::Values)
            .space()
            .lparen()
            .placeholders(self.columns.len())
            .rparen();

        if let Some(ref key) = self.upsert_key {
            let updates: Vec<String> = self
                .columns
                .iter()
                .filter(|c| *c != key)
                .cloned()
                .collect();
            ts.space().append(&dialect.emit_upsert(key, &updates));
        }

        ts
    }
}

// ============================================================================
// DELETE
// ============================================================================

/// DELETE statement filtered by `column IN (?, ...)`.
#[derive(Debug, Clone)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Delete {
    pub table: String,
    pub filter: Option<(String, usize)>,
}

impl Delete {
    /// Create a new DELETE statement.
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
        }
    }

    /// Restrict to rows whose `column` matches one of `count` parameters.
    pub fn filter_in(mut self, column: impl Into<String>, count: usize) -> Self {
        self.filter = Some((column.into(), count));
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, _dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Delete)
            .space()
            .push(Token::From)
            .space()
            .ident(self.table.as_str());
        if let Some((ref column, count)) = self.filter {
            ts.space().append(&in_filter(column, count));
        }
        ts
    }
}

// ============================================================================
// SELECT
// ============================================================================

/// Single-table SELECT with an optional IN filter, ordering and pagination.
#[derive(Debug, Clone)]
#[must_use = "queries have no effect until converted to SQL with to_sql()"]
pub struct Select {
    pub table: String,
    /// Empty means `COUNT(*)`.
    pub columns: Vec<String>,
    pub filter: Option<(String, usize)>,
    pub order_by: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Select {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            filter: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// `SELECT COUNT(*) FROM table`.
    pub fn count(table: impl Into<String>) -> Self {
        Self::from(table)
    }

    pub fn columns(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.columns = cols.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter_in(mut self, column: impl Into<String>, count: usize) -> Self {
        self.filter = Some((column.into(), count));
        self
    }

    pub fn order_by(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.order_by = cols.into_iter().map(Into::into).collect();
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Select).space();
        if self.columns.is_empty() {
            ts.append(&count_star());
        } else {
            ts.ident_list(&self.columns);
        }
        ts.space()
            .push(Token::From)
            .space()
            .ident(self.table.as_str());

        if let Some((ref column, count)) = self.filter {
            ts.space().append(&in_filter(column, count));
        }

        if !self.order_by.is_empty() {
            ts.space()
                .push(Token::OrderBy)
                .space()
                .ident_list(&self.order_by);
        }

        let pagination = dialect.emit_limit_offset(self.limit, self.offset);
        if !pagination.is_empty() {
            ts.space().append(&pagination);
        }

        ts
    }
}

// ============================================================================
// Orphan count
// ============================================================================

/// Counts child rows whose parent row is missing:
///
/// ```sql
/// SELECT COUNT(*) FROM child WHERE NOT EXISTS
///   (SELECT 1 FROM parent WHERE parent.key = child.parent_column)
/// ```
#[derive(Debug, Clone)]
#[must_use = "queries have no effect until converted to SQL with to_sql()"]
pub struct CountOrphans {
    pub child: String,
    pub parent_column: String,
    pub parent: String,
    pub parent_key: String,
}

impl CountOrphans {
    pub fn new(
        child: impl Into<String>,
        parent_column: impl Into<String>,
        parent: impl Into<String>,
        parent_key: impl Into<String>,
    ) -> Self {
        Self {
            child: child.into(),
            parent_column: parent_column.into(),
            parent: parent.into(),
            parent_key: parent_key.into(),
        }
    }

    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    pub fn to_tokens(&self, _dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Select)
            .space()
            .append(&count_star())
            .space()
            .push(Token::From)
            .space()
            .ident(self.child.as_str())
            .space()
            .push(Token::Where)
            .space()
            .push(Token::Not)
            .space()
            .push(Token::Exists)
            .space()
            .lparen()
            .push(Token::Select)
            .space()
            .push(Token::LitInt(1))
            .space()
            .push(Token::From)
            .space()
            .ident(self.parent.as_str())
            .space()
            .push(Token::Where)
            .space()
            .ident(self.parent.as_str())
            .push(Token::Dot)
            .ident(self.parent_key.as_str())
            .space()
            .push(Token::Eq)
            .space()
            .ident(self.child.as_str())
            .push(Token::Dot)
            .ident(self.parent_column.as_str())
            .rparen();
        ts
    }
}

fn count_star() -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::Count).lparen().push(Token::Star).rparen();
    ts
}

fn in_filter(column: &str, count: usize) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::Where)
        .space()
        .ident(column)
        .space()
        .push(Token::In)
        .space()
        .lparen()
        .placeholders(count)
        .rparen();
    ts
}
