//! Shared helper functions for SQL dialect implementations.

use super::super::token::{Token, TokenStream};
use super::super::types::DataType;

// =============================================================================
// Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI style).
/// Used by: SQLite
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: MySQL
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Quote string with single quotes (standard SQL).
pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

// =============================================================================
// Pagination
// =============================================================================

/// Emit LIMIT ... OFFSET ... (standard SQL).
pub fn emit_limit_offset_standard(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    if let Some(lim) = limit {
        ts.push(Token::Limit)
            .space()
            .push(Token::LitInt(lim as i64));
    }

    if let Some(off) = offset {
        if limit.is_some() {
            ts.space();
        }
        ts.push(Token::Offset)
            .space()
            .push(Token::LitInt(off as i64));
    }

    ts
}

// =============================================================================
// Data Types
// =============================================================================

pub fn emit_data_type_mysql(dt: &DataType) -> String {
    match dt {
        DataType::Int32 => "INT".into(),
        DataType::Varchar(n) => format!("VARCHAR({})", n),
        DataType::Text => "TEXT".into(),
    }
}

/// SQLite keeps declared VARCHAR lengths for readability; they are not enforced.
pub fn emit_data_type_sqlite(dt: &DataType) -> String {
    match dt {
        DataType::Int32 => "INTEGER".into(),
        DataType::Varchar(n) => format!("VARCHAR({})", n),
        DataType::Text => "TEXT".into(),
    }
}

// =============================================================================
// Upserts
// =============================================================================

/// `ON DUPLICATE KEY UPDATE a = VALUES(a), ...`
pub fn emit_upsert_mysql(key: &str, columns: &[String]) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::On)
        .space()
        .push(Token::Duplicate)
        .space()
        .push(Token::Key)
        .space()
        .push(Token::Update)
        .space();

    if columns.is_empty() {
        ts.ident(key).space().push(Token::Eq).space().ident(key);
        return ts;
    }

    for (i, col) in columns.iter().enumerate() {
        if i > 0 {
            ts.comma().space();
        }
        ts.ident(col.as_str())
            .space()
            .push(Token::Eq)
            .space()
            .push(Token::Values)
            .lparen()
            .ident(col.as_str())
            .rparen();
    }
    ts
}

/// `ON CONFLICT (key) DO UPDATE SET a = excluded.a, ...`
pub fn emit_upsert_on_conflict(key: &str, columns: &[String]) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::On)
        .space()
        .push(Token::Conflict)
        .space()
        .lparen()
        .ident(key)
        .rparen()
        .space()
        .push(Token::Do)
        .space();

    if columns.is_empty() {
        ts.push(Token::Raw("NOTHING".into()));
        return ts;
    }

    ts.push(Token::Update).space().push(Token::Set).space();
    for (i, col) in columns.iter().enumerate() {
        if i > 0 {
            ts.comma().space();
        }
        ts.ident(col.as_str())
            .space()
            .push(Token::Eq)
            .space()
            .push(Token::Raw("excluded".into()))
            .push(Token::Dot)
            .ident(col.as_str());
    }
    ts
}
