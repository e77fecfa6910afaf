//! SQL generation module.
//!
//! A small type-safe SQL builder that renders the statements needed to store
//! XML-derived tables in two dialects:
//!
//! - [`ddl`] - CREATE TABLE, DROP TABLE, CREATE INDEX, ALTER TABLE ADD COLUMN
//! - [`dml`] - parameterized INSERT (with upsert), DELETE, SELECT
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - MySQL and SQLite dialect implementations

pub mod ddl;
pub mod dialect;
pub mod dml;
pub mod token;
pub mod types;

#[cfg(test)]
pub mod test_utils;

pub use dialect::{Dialect, SqlDialect};
pub use token::{Token, TokenStream};

pub use ddl::{AddColumn, ColumnDef, CreateIndex, CreateTable, DataType, DdlStatement, DropTable};
pub use dml::{CountOrphans, Delete, Insert, Select};
