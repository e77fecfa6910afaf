//! SQL Dialect definitions and formatting rules.
//!
//! This module provides a trait-based abstraction for SQL dialect differences.
//! Two dialects are supported:
//!
//! - MySQL: the DDL handed to the game database (InnoDB, utf8mb4, inline
//!   column and table comments, `ON DUPLICATE KEY UPDATE` upserts)
//! - SQLite: the bundled local store (no comments or table options,
//!   separate `CREATE INDEX`, `ON CONFLICT ... DO UPDATE` upserts)
//!
//! # Usage
//!
//! ```ignore
//! use xmlbridge::sql::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::MySql;
//! let quoted = dialect.quote_identifier("quest");  // `quest`
//! ```

pub mod helpers;
mod mysql;
mod sqlite;

pub use mysql::MySql;
pub use sqlite::Sqlite;

use super::token::TokenStream;
use super::types::DataType;

/// SQL dialect trait - defines how SQL constructs are rendered.
pub trait SqlDialect: std::fmt::Debug {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (table, column).
    ///
    /// - MySQL: `` `identifier` ``
    /// - SQLite: `"identifier"`
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal with `''` escaping.
    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Emit `LIMIT n OFFSET m`.
    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_standard(limit, offset)
    }

    // =========================================================================
    // DDL
    // =========================================================================

    /// Render a column type.
    fn emit_data_type(&self, dt: &DataType) -> String;

    /// Whether columns accept an inline `COMMENT '...'`.
    fn supports_column_comments(&self) -> bool {
        false
    }

    /// Trailing table options after the closing parenthesis, if any.
    fn table_options(&self, _comment: Option<&str>) -> Option<String> {
        None
    }

    /// Whether secondary indexes can be declared inside CREATE TABLE (`KEY name (col)`).
    fn supports_inline_index(&self) -> bool {
        false
    }

    /// Whether `CREATE INDEX IF NOT EXISTS` is accepted.
    fn supports_index_if_not_exists(&self) -> bool {
        true
    }

    // =========================================================================
    // DML
    // =========================================================================

    /// Clause appended to an INSERT so that a row with an existing key
    /// replaces the stored values of `columns`.
    fn emit_upsert(&self, key: &str, columns: &[String]) -> TokenStream;
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    MySql,
    Sqlite,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::MySql => &MySql,
            Dialect::Sqlite => &Sqlite,
        }
    }
}

impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        self.dialect().emit_limit_offset(limit, offset)
    }

    fn emit_data_type(&self, dt: &DataType) -> String {
        self.dialect().emit_data_type(dt)
    }

    fn supports_column_comments(&self) -> bool {
        self.dialect().supports_column_comments()
    }

    fn table_options(&self, comment: Option<&str>) -> Option<String> {
        self.dialect().table_options(comment)
    }

    fn supports_inline_index(&self) -> bool {
        self.dialect().supports_inline_index()
    }

    fn supports_index_if_not_exists(&self) -> bool {
        self.dialect().supports_index_if_not_exists()
    }

    fn emit_upsert(&self, key: &str, columns: &[String]) -> TokenStream {
        self.dialect().emit_upsert(key, columns)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" => Ok(Dialect::MySql),
            "sqlite" => Ok(Dialect::Sqlite),
            other => Err(format!("unknown dialect '{}' (expected mysql or sqlite)", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_display() {
        assert_eq!(Dialect::MySql.to_string(), "mysql");
        assert_eq!(Dialect::Sqlite.to_string(), "sqlite");
        assert_eq!("MySQL".parse::<Dialect>().unwrap(), Dialect::MySql);
        assert!("oracle".parse::<Dialect>().is_err());
    }

    #[test]
    fn test_quote_identifier_escaping() {
        assert_eq!(Dialect::MySql.quote_identifier("weird`name"), "`weird``name`");
        assert_eq!(
            Dialect::Sqlite.quote_identifier("weird\"name"),
            "\"weird\"\"name\""
        );
    }

    #[test]
    fn test_data_types() {
        assert_eq!(Dialect::MySql.emit_data_type(&DataType::Varchar(32)), "VARCHAR(32)");
        assert_eq!(Dialect::MySql.emit_data_type(&DataType::Text), "TEXT");
        assert_eq!(Dialect::Sqlite.emit_data_type(&DataType::Int32), "INTEGER");
    }

    #[test]
    fn test_upsert_clause() {
        let cols = vec!["name".to_string()];
        assert_eq!(
            Dialect::MySql.emit_upsert("id", &cols).serialize(Dialect::MySql),
            "ON DUPLICATE KEY UPDATE `name` = VALUES(`name`)"
        );
        assert_eq!(
            Dialect::Sqlite.emit_upsert("id", &cols).serialize(Dialect::Sqlite),
            "ON CONFLICT (\"id\") DO UPDATE SET \"name\" = excluded.\"name\""
        );
    }
}
