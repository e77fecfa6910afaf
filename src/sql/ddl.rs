//! DDL (Data Definition Language) support.
//!
//! Types and builders for the statements the schema layer needs:
//! CREATE TABLE, DROP TABLE, CREATE INDEX and ALTER TABLE ADD COLUMN.
//!
//! # Examples
//!
//! ```ignore
//! use xmlbridge::sql::{ColumnDef, CreateTable, DataType, Dialect};
//!
//! let table = CreateTable::new("quest")
//!     .column(ColumnDef::new("id", DataType::Varchar(255)).not_null())
//!     .column(ColumnDef::new("name", DataType::Varchar(32)).comment("quest/name"))
//!     .primary_key("id");
//!
//! println!("{}", table.to_sql(Dialect::MySql));
//! ```

use super::dialect::{Dialect, SqlDialect};
use super::token::{Token, TokenStream};

pub use super::types::DataType;

/// DDL statement types.
#[derive(Debug, Clone)]
pub enum DdlStatement {
    CreateTable(CreateTable),
    DropTable(DropTable),
    CreateIndex(CreateIndex),
    AddColumn(AddColumn),
}

impl DdlStatement {
    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        match self {
            DdlStatement::CreateTable(ct) => ct.to_tokens(dialect),
            DdlStatement::DropTable(dt) => dt.to_tokens(dialect),
            DdlStatement::CreateIndex(ci) => ci.to_tokens(dialect),
            DdlStatement::AddColumn(ac) => ac.to_tokens(dialect),
        }
    }
}

// ============================================================================
// CREATE TABLE
// ============================================================================

/// CREATE TABLE statement, rendered one column per line.
#[derive(Debug, Clone)]
#[must_use = "DDL statements have no effect until converted to SQL with to_sql()"]
pub struct CreateTable {
    pub if_not_exists: bool,
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Option<String>,
    /// Secondary indexes `(name, column)`, rendered inline where supported.
    pub indexes: Vec<(String, String)>,
    pub comment: Option<String>,
}

impl CreateTable {
    /// Create a new CREATE TABLE statement.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            if_not_exists: false,
            name: name.into(),
            columns: Vec::new(),
            primary_key: None,
            indexes: Vec::new(),
            comment: None,
        }
    }

    /// Add IF NOT EXISTS clause.
    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    /// Add a column.
    pub fn column(mut self, col: ColumnDef) -> Self {
        self.columns.push(col);
        self
    }

    /// Add multiple columns.
    pub fn columns(mut self, cols: impl IntoIterator<Item = ColumnDef>) -> Self {
        self.columns.extend(cols);
        self
    }

    /// Set the primary key column.
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }

    /// Declare a secondary index.
    pub fn index(mut self, name: impl Into<String>, column: impl Into<String>) -> Self {
        self.indexes.push((name.into(), column.into()));
        self
    }

    /// Set the table comment.
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Indexes that must be created by separate statements for this dialect.
    pub fn separate_indexes(&self, dialect: Dialect) -> Vec<CreateIndex> {
        if dialect.supports_inline_index() {
            return Vec::new();
        }
        self.indexes
            .iter()
            .map(|(name, column)| {
                let index = CreateIndex::new(name.as_str(), self.name.as_str()).column(column.as_str());
                if self.if_not_exists {
                    index.if_not_exists()
                } else {
                    index
                }
            })
            .collect()
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Create).space().push(Token::Table);

        if self.if_not_exists {
            ts.space()
                .push(Token::If)
                .space()
                .push(Token::Not)
                .space()
                .push(Token::Exists);
        }

        ts.space().ident(self.name.as_str()).space().lparen();

        let mut entries: Vec<TokenStream> =
            self.columns.iter().map(|c| c.to_tokens(dialect)).collect();

        if let Some(ref pk) = self.primary_key {
            let mut entry = TokenStream::new();
            entry
                .push(Token::Primary)
                .space()
                .push(Token::Key)
                .space()
                .lparen()
                .ident(pk.as_str())
                .rparen();
            entries.push(entry);
        }

        if dialect.supports_inline_index() {
            for (name, column) in &self.indexes {
                let mut entry = TokenStream::new();
                entry
                    .push(Token::Key)
                    .space()
                    .ident(name.as_str())
                    .space()
                    .lparen()
                    .ident(column.as_str())
                    .rparen();
                entries.push(entry);
            }
        }

        for (i, entry) in entries.iter().enumerate() {
            if i > 0 {
                ts.comma();
            }
            ts.newline().indent(1).append(entry);
        }
        ts.newline().rparen();

        if let Some(options) = dialect.table_options(self.comment.as_deref()) {
            ts.space().push(Token::Raw(options));
        }

        ts
    }
}

// ============================================================================
// Column Definition
// ============================================================================

/// Column definition for CREATE TABLE.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: Option<bool>,
    pub default: Option<Token>,
    pub comment: Option<String>,
}

impl ColumnDef {
    /// Create a new column definition.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: None,
            default: None,
            comment: None,
        }
    }

    /// Mark column as NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = Some(false);
        self
    }

    /// Set an integer default value.
    pub fn default_int(mut self, value: i64) -> Self {
        self.default = Some(Token::LitInt(value));
        self
    }

    /// Set the column comment (ignored by dialects without comments).
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.ident(self.name.as_str())
            .space()
            .push(Token::Raw(dialect.emit_data_type(&self.data_type)));

        if self.nullable == Some(false) {
            ts.space().push(Token::Not).space().push(Token::Null);
        }

        if let Some(ref default) = self.default {
            ts.space().push(Token::Default).space().push(default.clone());
        }

        if let Some(ref comment) = self.comment {
            if dialect.supports_column_comments() {
                ts.space()
                    .push(Token::Comment)
                    .space()
                    .push(Token::LitString(comment.clone()));
            }
        }

        ts
    }
}

// ============================================================================
// DROP TABLE
// ============================================================================

/// DROP TABLE statement.
#[derive(Debug, Clone)]
#[must_use = "DDL statements have no effect until converted to SQL with to_sql()"]
pub struct DropTable {
    pub if_exists: bool,
    pub name: String,
}

impl DropTable {
    /// Create a new DROP TABLE statement.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            if_exists: false,
            name: name.into(),
        }
    }

    /// Add IF EXISTS clause.
    pub fn if_exists(mut self) -> Self {
        self.if_exists = true;
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, _dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Drop).space().push(Token::Table);

        if self.if_exists {
            ts.space().push(Token::If).space().push(Token::Exists);
        }

        ts.space().ident(self.name.as_str());
        ts
    }
}

// ============================================================================
// CREATE INDEX
// ============================================================================

/// CREATE INDEX statement.
#[derive(Debug, Clone)]
#[must_use = "DDL statements have no effect until converted to SQL with to_sql()"]
pub struct CreateIndex {
    pub if_not_exists: bool,
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
}

impl CreateIndex {
    /// Create a new CREATE INDEX statement.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            if_not_exists: false,
            name: name.into(),
            table: table.into(),
            columns: Vec::new(),
        }
    }

    /// Add IF NOT EXISTS clause (dialect-specific).
    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    /// Add an indexed column.
    pub fn column(mut self, col: impl Into<String>) -> Self {
        self.columns.push(col.into());
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Create).space().push(Token::Index);

        if self.if_not_exists && dialect.supports_index_if_not_exists() {
            ts.space()
                .push(Token::If)
                .space()
                .push(Token::Not)
                .space()
                .push(Token::Exists);
        }

        ts.space()
            .ident(self.name.as_str())
            .space()
            .push(Token::On)
            .space()
            .ident(self.table.as_str())
            .space()
            .lparen()
            .ident_list(&self.columns)
            .rparen();

        ts
    }
}

// ============================================================================
// ALTER TABLE ADD COLUMN
// ============================================================================

/// `ALTER TABLE t ADD COLUMN c type`, used when a stored table predates
/// columns appended by a later inference run.
#[derive(Debug, Clone)]
#[must_use = "DDL statements have no effect until converted to SQL with to_sql()"]
pub struct AddColumn {
    pub table: String,
    pub column: ColumnDef,
}

impl AddColumn {
    pub fn new(table: impl Into<String>, column: ColumnDef) -> Self {
        Self {
            table: table.into(),
            column,
        }
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Alter)
            .space()
            .push(Token::Table)
            .space()
            .ident(self.table.as_str())
            .space()
            .push(Token::Add)
            .space()
            .push(Token::Column)
            .space()
            .append(&self.column.to_tokens(dialect));
        ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::test_utils::validate_sql;

    fn sample_table() -> CreateTable {
        CreateTable::new("quest__reward__data")
            .column(ColumnDef::new("__id", DataType::Varchar(255)).not_null())
            .column(ColumnDef::new("__parent_id", DataType::Varchar(255)).not_null())
            .column(
                ColumnDef::new("__order_index", DataType::Int32)
                    .not_null()
                    .default_int(0),
            )
            .column(ColumnDef::new("item", DataType::Varchar(32)).comment("quest/reward/data/item"))
            .primary_key("__id")
            .index("ix_parent", "__parent_id")
            .comment("quest/reward/data")
    }

    #[test]
    fn test_create_table_mysql() {
        insta::assert_snapshot!(sample_table().to_sql(Dialect::MySql), @r"
        CREATE TABLE `quest__reward__data` (
          `__id` VARCHAR(255) NOT NULL,
          `__parent_id` VARCHAR(255) NOT NULL,
          `__order_index` INT NOT NULL DEFAULT 0,
          `item` VARCHAR(32) COMMENT 'quest/reward/data/item',
          PRIMARY KEY (`__id`),
          KEY `ix_parent` (`__parent_id`)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 ROW_FORMAT=DYNAMIC COMMENT='quest/reward/data'
        ");
    }

    #[test]
    fn test_create_table_sqlite() {
        let table = sample_table().if_not_exists();
        let sql = table.to_sql(Dialect::Sqlite);
        assert!(!sql.contains("COMMENT"));
        assert!(!sql.contains("KEY \"ix_parent\""));
        validate_sql(&sql, Dialect::Sqlite).unwrap();

        let indexes = table.separate_indexes(Dialect::Sqlite);
        assert_eq!(indexes.len(), 1);
        let index_sql = indexes[0].to_sql(Dialect::Sqlite);
        assert_eq!(
            index_sql,
            "CREATE INDEX IF NOT EXISTS \"ix_parent\" ON \"quest__reward__data\" (\"__parent_id\")"
        );
        validate_sql(&index_sql, Dialect::Sqlite).unwrap();
        assert!(table.separate_indexes(Dialect::MySql).is_empty());
    }

    #[test]
    fn test_drop_table() {
        let sql = DropTable::new("quest").if_exists().to_sql(Dialect::MySql);
        assert_eq!(sql, "DROP TABLE IF EXISTS `quest`");
        validate_sql(&sql, Dialect::MySql).unwrap();
    }

    #[test]
    fn test_add_column() {
        let sql = AddColumn::new("quest", ColumnDef::new("reward__item", DataType::Text))
            .to_sql(Dialect::Sqlite);
        assert_eq!(sql, "ALTER TABLE \"quest\" ADD COLUMN \"reward__item\" TEXT");
        validate_sql(&sql, Dialect::Sqlite).unwrap();
    }
}
