//! SQL Tokens - the atomic units of SQL output.
//!
//! Tokens are dialect-agnostic representations that serialize
//! to dialect-specific strings.

use super::dialect::{Dialect, SqlDialect};

/// SQL Token - every element the statement builders emit.
///
/// Adding a new variant here will cause compile errors everywhere
/// it needs to be handled (exhaustive matching).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    // === Query Keywords ===
    Select,
    From,
    Where,
    And,
    Not,
    In,
    Is,
    As,
    On,
    Left,
    Join,
    OrderBy,
    Limit,
    Offset,
    Null,
    Count,

    // === DDL Keywords ===
    Create,
    Drop,
    Table,
    Index,
    Primary,
    Key,
    Default,
    If,
    Exists,
    Comment,
    Alter,
    Add,
    Column,

    // === DML Keywords ===
    Insert,
    Into,
    Values,
    Update,
    Set,
    Delete,
    Conflict,
    Do,
    Duplicate,

    // === Punctuation ===
    Comma,
    Dot,
    Star,
    LParen,
    RParen,
    Eq,

    // === Whitespace / Formatting ===
    Space,
    Newline,
    Indent(usize),

    // === Dynamic Content ===
    /// Identifier (table or column)
    Ident(String),
    /// Integer literal
    LitInt(i64),
    /// String literal
    LitString(String),
    /// Bound parameter (`?`)
    Placeholder,

    // === Escape Hatch ===
    /// Raw SQL passed directly to output without escaping.
    ///
    /// Only for trusted, static fragments such as type names and table
    /// options. Values always go through `LitString` or `Placeholder`.
    Raw(String),
}

impl Token {
    /// Serialize this token to a string for the given dialect.
    pub fn serialize(&self, dialect: Dialect) -> String {
        match self {
            Token::Select => "SELECT".into(),
            Token::From => "FROM".into(),
            Token::Where => "WHERE".into(),
            Token::And => "AND".into(),
            Token::Not => "NOT".into(),
            Token::In => "IN".into(),
            Token::Is => "IS".into(),
            Token::As => "AS".into(),
            Token::On => "ON".into(),
            Token::Left => "LEFT".into(),
            Token::Join => "JOIN".into(),
            Token::OrderBy => "ORDER BY".into(),
            Token::Limit => "LIMIT".into(),
            Token::Offset => "OFFSET".into(),
            Token::Null => "NULL".into(),
            Token::Count => "COUNT".into(),

            Token::Create => "CREATE".into(),
            Token::Drop => "DROP".into(),
            Token::Table => "TABLE".into(),
            Token::Index => "INDEX".into(),
            Token::Primary => "PRIMARY".into(),
            Token::Key => "KEY".into(),
            Token::Default => "DEFAULT".into(),
            Token::If => "IF".into(),
            Token::Exists => "EXISTS".into(),
            Token::Comment => "COMMENT".into(),
            Token::Alter => "ALTER".into(),
            Token::Add => "ADD".into(),
            Token::Column => "COLUMN".into(),

            Token::Insert => "INSERT".into(),
            Token::Into => "INTO".into(),
            Token::Values => "VALUES".into(),
            Token::Update => "UPDATE".into(),
            Token::Set => "SET".into(),
            Token::Delete => "DELETE".into(),
            Token::Conflict => "CONFLICT".into(),
            Token::Do => "DO".into(),
            Token::Duplicate => "DUPLICATE".into(),

            Token::Comma => ",".into(),
            Token::Dot => ".".into(),
            Token::Star => "*".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Eq => "=".into(),

            Token::Space => " ".into(),
            Token::Newline => "\n".into(),
            Token::Indent(n) => "  ".repeat(*n),

            Token::Ident(name) => dialect.quote_identifier(name),
            Token::LitInt(n) => n.to_string(),
            Token::LitString(s) => dialect.quote_string(s),
            Token::Placeholder => "?".into(),

            Token::Raw(s) => s.clone(),
        }
    }
}

/// A stream of tokens that can be serialized to SQL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    /// Create an empty token stream.
    pub fn new() -> Self {
        Self { tokens: vec![] }
    }

    /// Push a single token.
    pub fn push(&mut self, token: Token) -> &mut Self {
        self.tokens.push(token);
        self
    }

    /// Extend with multiple tokens.
    pub fn extend(&mut self, tokens: impl IntoIterator<Item = Token>) -> &mut Self {
        self.tokens.extend(tokens);
        self
    }

    /// Append another token stream.
    pub fn append(&mut self, other: &TokenStream) -> &mut Self {
        self.tokens.extend(other.tokens.iter().cloned());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Serialize all tokens to a SQL string.
    pub fn serialize(&self, dialect: Dialect) -> String {
        self.tokens.iter().map(|t| t.serialize(dialect)).collect()
    }

    // Convenience methods for common tokens
    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }
    pub fn newline(&mut self) -> &mut Self {
        self.push(Token::Newline)
    }
    pub fn indent(&mut self, n: usize) -> &mut Self {
        self.push(Token::Indent(n))
    }
    pub fn comma(&mut self) -> &mut Self {
        self.push(Token::Comma)
    }
    pub fn lparen(&mut self) -> &mut Self {
        self.push(Token::LParen)
    }
    pub fn rparen(&mut self) -> &mut Self {
        self.push(Token::RParen)
    }
    pub fn ident(&mut self, name: impl Into<String>) -> &mut Self {
        self.push(Token::Ident(name.into()))
    }

    /// Comma-separated identifiers: `a, b, c`.
    pub fn ident_list<S: AsRef<str>>(&mut self, names: &[S]) -> &mut Self {
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                self.comma().space();
            }
            self.ident(name.as_ref());
        }
        self
    }

    /// Comma-separated placeholders: `?, ?, ?`.
    pub fn placeholders(&mut self, count: usize) -> &mut Self {
        for i in 0..count {
            if i > 0 {
                self.comma().space();
            }
            self.push(Token::Placeholder);
        }
        self
    }
}
