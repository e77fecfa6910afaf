//! MySQL SQL dialect.
//!
//! MySQL differences from ANSI:
//! - Backtick identifier quoting (`` `name` ``)
//! - Inline `COMMENT '...'` on columns and tables
//! - Table options: `ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 ROW_FORMAT=DYNAMIC`
//! - Secondary indexes declared inside CREATE TABLE (`KEY name (col)`)
//! - ON DUPLICATE KEY UPDATE for upserts
//! - No `CREATE INDEX IF NOT EXISTS`

use super::helpers;
use super::SqlDialect;
use crate::sql::token::TokenStream;
use crate::sql::types::DataType;

/// Fixed storage options for generated tables.
pub const TABLE_OPTIONS: &str = "ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 ROW_FORMAT=DYNAMIC";

/// MySQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct MySql;

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn emit_data_type(&self, dt: &DataType) -> String {
        helpers::emit_data_type_mysql(dt)
    }

    fn supports_column_comments(&self) -> bool {
        true
    }

    fn table_options(&self, comment: Option<&str>) -> Option<String> {
        Some(match comment {
            Some(comment) => format!(
                "{} COMMENT={}",
                TABLE_OPTIONS,
                helpers::quote_string_single(comment)
            ),
            None => TABLE_OPTIONS.to_string(),
        })
    }

    fn supports_inline_index(&self) -> bool {
        true
    }

    fn supports_index_if_not_exists(&self) -> bool {
        false
    }

    fn emit_upsert(&self, key: &str, columns: &[String]) -> TokenStream {
        helpers::emit_upsert_mysql(key, columns)
    }
}
