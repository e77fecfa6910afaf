//! DDL emission for inferred tables.
//!
//! Every table is emitted as `DROP TABLE IF EXISTS` followed by
//! `CREATE TABLE`, parents before children. Column comments carry the
//! absolute XML path of the value; the table comment is the table's path.

use super::{
    ColumnMapping, KeySource, TableConf, TableForest, KEY_COLUMN, KEY_LENGTH, ORDER_INDEX,
    PARENT_ID, ROOT_ID, ROW_ID, SYNTHETIC_KEY, TYPE_DESC, TYPE_DESC_LENGTH,
};
use crate::sql::{ColumnDef, CreateTable, DataType, Dialect, DropTable, SqlDialect};

/// CREATE TABLE for one table, system columns first.
pub fn create_table(table: &TableConf, dialect: Dialect) -> CreateTable {
    let xml_path = table.xml_path.as_str();
    let mut create = CreateTable::new(table.table_name.as_str()).comment(xml_path);

    if table.is_root_table {
        let key_comment = match table.key_source {
            KeySource::Element => format!("{}/{}", xml_path, KEY_COLUMN),
            KeySource::Attribute => format!("{}/@{}", xml_path, KEY_COLUMN),
            KeySource::Synthetic => format!("{}#position", xml_path),
        };
        create = create
            .column(
                ColumnDef::new(KEY_COLUMN, DataType::Varchar(KEY_LENGTH))
                    .not_null()
                    .comment(key_comment),
            )
            .column(
                ColumnDef::new(TYPE_DESC, DataType::Varchar(TYPE_DESC_LENGTH))
                    .comment("record element tag"),
            )
            .column(order_index_column())
            .column(synthetic_key_column())
            .primary_key(KEY_COLUMN);
    } else {
        let parent = table.parent_table.as_deref().unwrap_or_default();
        create = create
            .column(
                ColumnDef::new(ROW_ID, DataType::Varchar(KEY_LENGTH))
                    .not_null()
                    .comment("parent id#order index"),
            )
            .column(
                ColumnDef::new(PARENT_ID, DataType::Varchar(KEY_LENGTH))
                    .not_null()
                    .comment(parent),
            )
            .column(
                ColumnDef::new(ROOT_ID, DataType::Varchar(KEY_LENGTH))
                    .not_null()
                    .comment("owning root record"),
            )
            .column(order_index_column())
            .primary_key(ROW_ID)
            .index(index_name(table, "parent", dialect), PARENT_ID)
            .index(index_name(table, "root", dialect), ROOT_ID);
    }

    create.columns(table.stored_columns().map(|c| column_def(table, c)))
}

/// Column definition for a data column. Data columns stay nullable: the same
/// table later receives records from files that were not part of inference.
pub fn column_def(table: &TableConf, column: &ColumnMapping) -> ColumnDef {
    let comment = if column.path == "." {
        table.xml_path.clone()
    } else {
        format!("{}/{}", table.xml_path, column.path)
    };
    ColumnDef::new(column.name.as_str(), column.column_type.to_data_type()).comment(comment)
}

pub fn drop_table(table: &TableConf) -> DropTable {
    DropTable::new(table.table_name.as_str()).if_exists()
}

/// Statements for one table: DROP, CREATE, then any separate indexes.
pub fn table_ddl(table: &TableConf, dialect: Dialect) -> Vec<String> {
    let create = create_table(table, dialect);
    let mut statements = vec![drop_table(table).to_sql(dialect), create.to_sql(dialect)];
    statements.extend(
        create
            .separate_indexes(dialect)
            .iter()
            .map(|index| index.to_sql(dialect)),
    );
    statements
}

/// A complete DDL script for the forest, parents before children.
pub fn schema_ddl(forest: &TableForest, dialect: Dialect) -> String {
    let mut script = String::new();
    for table in forest.tables_in_order() {
        for statement in table_ddl(table, dialect) {
            script.push_str(&statement);
            script.push_str(";\n");
        }
        script.push('\n');
    }
    script
}

fn order_index_column() -> ColumnDef {
    ColumnDef::new(ORDER_INDEX, DataType::Int32)
        .not_null()
        .default_int(0)
        .comment("position among siblings")
}

/// 1 when the record had no key of its own. Added to older root tables on
/// import.
pub fn synthetic_key_column() -> ColumnDef {
    ColumnDef::new(SYNTHETIC_KEY, DataType::Int32)
        .not_null()
        .default_int(0)
        .comment("generated key")
}

/// MySQL index names are scoped to the table; SQLite's are global.
fn index_name(table: &TableConf, suffix: &str, dialect: Dialect) -> String {
    if dialect.supports_inline_index() {
        format!("ix_{}", suffix)
    } else {
        format!("ix_{}_{}", table.table_name, suffix)
    }
}
