//! SQLite SQL dialect.
//!
//! Used for the bundled local store:
//! - Double-quote identifier quoting
//! - No column comments or table options
//! - `ON CONFLICT (key) DO UPDATE SET ...` for upserts (3.24+)

use super::helpers;
use super::SqlDialect;
use crate::sql::token::TokenStream;
use crate::sql::types::DataType;

/// SQLite SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn emit_data_type(&self, dt: &DataType) -> String {
        helpers::emit_data_type_sqlite(dt)
    }

    fn emit_upsert(&self, key: &str, columns: &[String]) -> TokenStream {
        helpers::emit_upsert_on_conflict(key, columns)
    }
}
