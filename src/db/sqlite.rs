//! Bundled SQLite backend.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};

use super::{Database, DbError, DbResult, Row, RowBatch, Session, KEY_CHUNK};
use crate::schema::{
    column_def, create_table, synthetic_key_column, TableConf, TableForest, ORDER_INDEX,
    PARENT_ID, ROOT_ID, SYNTHETIC_KEY, TYPE_DESC,
};
use crate::sql::{AddColumn, CountOrphans, Delete, Dialect, Insert, Select};

const DIALECT: Dialect = Dialect::Sqlite;

/// File-backed SQLite database. Every session opens its own connection.
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteDatabase {
    /// Open or create the database at `path` and switch it to WAL mode.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        info!(path = %path.display(), journal_mode = %mode, "Opened SQLite database");
        Ok(Self {
            path,
            busy_timeout: Duration::from_secs(30),
        })
    }

    /// How long a session waits on a locked database before failing.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a concrete session, for callers that need the SQLite type.
    pub fn connect(&self) -> DbResult<SqliteSession> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(SqliteSession { conn })
    }
}

impl Database for SqliteDatabase {
    fn dialect(&self) -> Dialect {
        DIALECT
    }

    fn session(&self) -> DbResult<Box<dyn Session>> {
        Ok(Box::new(self.connect()?))
    }
}

/// One SQLite connection.
pub struct SqliteSession {
    conn: Connection,
}

impl SqliteSession {
    fn existing_columns(&self, table: &str) -> DbResult<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?)")?;
        let names = stmt
            .query_map(params![table], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(names)
    }
}

impl Session for SqliteSession {
    fn execute_ddl(&mut self, sql: &str) -> DbResult<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn ensure_table(&mut self, table: &TableConf) -> DbResult<()> {
        let existing = self.existing_columns(&table.table_name)?;
        if existing.is_empty() {
            let create = create_table(table, DIALECT).if_not_exists();
            self.conn.execute_batch(&create.to_sql(DIALECT))?;
            for index in create.separate_indexes(DIALECT) {
                self.conn.execute_batch(&index.to_sql(DIALECT))?;
            }
            debug!(table = %table.table_name, "Created table");
            return Ok(());
        }

        if table.is_root_table && !existing.contains(SYNTHETIC_KEY) {
            let sql =
                AddColumn::new(table.table_name.as_str(), synthetic_key_column()).to_sql(DIALECT);
            self.conn.execute_batch(&sql)?;
            info!(table = %table.table_name, column = SYNTHETIC_KEY, "Added column");
        }
        for column in table.stored_columns() {
            if !existing.contains(&column.name) {
                let sql = AddColumn::new(table.table_name.as_str(), column_def(table, column))
                    .to_sql(DIALECT);
                self.conn.execute_batch(&sql)?;
                info!(table = %table.table_name, column = %column.name, "Added column");
            }
        }
        Ok(())
    }

    fn table_exists(&mut self, table: &str) -> DbResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?",
                params![table],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn write_batch(&mut self, forest: &TableForest, batch: &RowBatch) -> DbResult<usize> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        for table in forest.descendants(&batch.root_table) {
            for chunk in batch.root_keys.chunks(KEY_CHUNK) {
                let sql = Delete::from(table.table_name.as_str())
                    .filter_in(ROOT_ID, chunk.len())
                    .to_sql(DIALECT);
                tx.prepare_cached(&sql)?.execute(params_from_iter(chunk.iter()))?;
            }
        }

        let mut written = 0;
        for table_rows in &batch.tables {
            let table = forest
                .get(&table_rows.table)
                .ok_or_else(|| DbError::UnknownTable(table_rows.table.clone()))?;
            let columns = table.physical_column_names();
            let sql = Insert::into(table.table_name.as_str())
                .columns(columns.iter().copied())
                .upsert(table.key_column())
                .to_sql(DIALECT);
            let mut stmt = tx.prepare_cached(&sql)?;
            for row in &table_rows.rows {
                stmt.execute(params_from_iter(row_values(table, &columns, row)))?;
                written += 1;
            }
        }

        tx.commit()?;
        debug!(sequence = batch.sequence, root_table = %batch.root_table, rows = written, "Committed batch");
        Ok(written)
    }

    fn fetch_page(&mut self, table: &TableConf, offset: u64, limit: u64) -> DbResult<Vec<Row>> {
        let columns = table.physical_column_names();
        let sql = Select::from(table.table_name.as_str())
            .columns(columns.iter().copied())
            .order_by([ORDER_INDEX, table.key_column()])
            .limit(limit)
            .offset(offset)
            .to_sql(DIALECT);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map([], |row| read_row(table, &columns, row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn fetch_children(&mut self, table: &TableConf, parent_keys: &[String]) -> DbResult<Vec<Row>> {
        let columns = table.physical_column_names();
        let mut out = Vec::new();
        for chunk in parent_keys.chunks(KEY_CHUNK) {
            let sql = Select::from(table.table_name.as_str())
                .columns(columns.iter().copied())
                .filter_in(PARENT_ID, chunk.len())
                .order_by([PARENT_ID, ORDER_INDEX])
                .to_sql(DIALECT);
            let mut stmt = self.conn.prepare_cached(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(chunk.iter()), |row| {
                    read_row(table, &columns, row)
                })?
                .collect::<Result<Vec<_>, _>>()?;
            out.extend(rows);
        }
        Ok(out)
    }

    fn count(&mut self, table: &str) -> DbResult<u64> {
        let sql = Select::count(table).to_sql(DIALECT);
        let n: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(n as u64)
    }

    fn count_orphans(&mut self, child: &TableConf, parent: &TableConf) -> DbResult<u64> {
        let sql = CountOrphans::new(
            child.table_name.as_str(),
            PARENT_ID,
            parent.table_name.as_str(),
            parent.key_column(),
        )
        .to_sql(DIALECT);
        let n: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

/// Parameter values for `row` in physical column order.
fn row_values(table: &TableConf, columns: &[&str], row: &Row) -> Vec<Value> {
    let text = |v: Option<&String>| v.map_or(Value::Null, |s| Value::Text(s.clone()));
    columns
        .iter()
        .map(|&column| match column {
            c if c == table.key_column() => Value::Text(row.key.clone()),
            ORDER_INDEX => Value::Integer(row.order_index),
            TYPE_DESC => text(row.type_desc.as_ref()),
            SYNTHETIC_KEY => Value::Integer(i64::from(row.synthetic_key)),
            PARENT_ID => text(row.parent_key.as_ref()),
            ROOT_ID => text(row.root_key.as_ref()),
            c => text(row.values.get(c)),
        })
        .collect()
}

fn read_row(table: &TableConf, columns: &[&str], sql_row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    let mut row = Row::default();
    for (i, &column) in columns.iter().enumerate() {
        match column {
            ORDER_INDEX => row.order_index = sql_row.get(i)?,
            c if c == table.key_column() => row.key = sql_row.get(i)?,
            TYPE_DESC => row.type_desc = sql_row.get(i)?,
            SYNTHETIC_KEY => row.synthetic_key = sql_row.get::<_, i64>(i)? != 0,
            PARENT_ID => row.parent_key = sql_row.get(i)?,
            ROOT_ID => row.root_key = sql_row.get(i)?,
            c => {
                if let Some(value) = sql_row.get::<_, Option<String>>(i)? {
                    row.values.insert(c.to_string(), value);
                }
            }
        }
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TableRows;
    use crate::schema::{ColumnMapping, ColumnSource, ColumnType, KeySource, KEY_COLUMN};

    fn column(name: &str, path: &str) -> ColumnMapping {
        ColumnMapping {
            name: name.into(),
            path: path.into(),
            source: ColumnSource::Element,
            column_type: ColumnType::Varchar(32),
            max_length: 8,
            nullable: true,
        }
    }

    fn forest() -> TableForest {
        let root = TableConf {
            table_name: "quest".into(),
            xml_path: "quest".into(),
            parent_table: None,
            is_root_table: true,
            collection_path: None,
            position: 0,
            key_source: KeySource::Element,
            record_tag: "quest".into(),
            columns: vec![column(KEY_COLUMN, "id"), column("name", "name")],
        };
        let data = TableConf {
            table_name: "quest__reward__data".into(),
            xml_path: "quest/reward/data".into(),
            parent_table: Some("quest".into()),
            is_root_table: false,
            collection_path: Some("reward/data".into()),
            position: 2,
            key_source: KeySource::Synthetic,
            record_tag: "data".into(),
            columns: vec![column("item", "item")],
        };
        TableForest::build(vec![root, data]).unwrap()
    }

    fn batch(name: &str, items: &[&str]) -> RowBatch {
        let mut root = Row::new("q1", 0);
        root.type_desc = Some("quest".into());
        root.set("name", name);
        let children = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let mut row = Row::new(format!("q1#{}", i), i as i64);
                row.parent_key = Some("q1".into());
                row.root_key = Some("q1".into());
                row.set("item", *item);
                row
            })
            .collect();
        RowBatch {
            sequence: 0,
            root_table: "quest".into(),
            root_keys: vec!["q1".into()],
            tables: vec![
                TableRows {
                    table: "quest".into(),
                    rows: vec![root],
                },
                TableRows {
                    table: "quest__reward__data".into(),
                    rows: children,
                },
            ],
        }
    }

    fn open() -> (tempfile::TempDir, SqliteDatabase) {
        let dir = tempfile::tempdir().unwrap();
        let db = SqliteDatabase::open(dir.path().join("store.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn test_write_and_read_back() {
        let (_dir, db) = open();
        let forest = forest();
        let mut session = db.connect().unwrap();
        for table in forest.tables_in_order() {
            session.ensure_table(table).unwrap();
        }
        assert!(session.table_exists("quest").unwrap());
        assert!(!session.table_exists("missing").unwrap());

        assert_eq!(session.write_batch(&forest, &batch("Rats", &["a", "b", "c"])).unwrap(), 4);

        let roots = session.fetch_page(forest.get("quest").unwrap(), 0, 10).unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].key, "q1");
        assert_eq!(roots[0].get("name"), Some("Rats"));
        assert_eq!(roots[0].type_desc.as_deref(), Some("quest"));

        let data = forest.get("quest__reward__data").unwrap();
        let children = session.fetch_children(data, &["q1".to_string()]).unwrap();
        let items: Vec<_> = children.iter().map(|r| r.get("item").unwrap()).collect();
        assert_eq!(items, vec!["a", "b", "c"]);
        assert_eq!(children[2].order_index, 2);
    }

    #[test]
    fn test_rewrite_replaces_children() {
        let (_dir, db) = open();
        let forest = forest();
        let mut session = db.connect().unwrap();
        for table in forest.tables_in_order() {
            session.ensure_table(table).unwrap();
        }
        session.write_batch(&forest, &batch("Rats", &["a", "b", "c"])).unwrap();
        session.write_batch(&forest, &batch("Wolves", &["d"])).unwrap();

        assert_eq!(session.count("quest").unwrap(), 1);
        assert_eq!(session.count("quest__reward__data").unwrap(), 1);
        let roots = session.fetch_page(forest.get("quest").unwrap(), 0, 10).unwrap();
        assert_eq!(roots[0].get("name"), Some("Wolves"));
    }

    #[test]
    fn test_ensure_table_adds_columns() {
        let (_dir, db) = open();
        let mut forest_tables = forest().to_tables();
        let mut session = db.connect().unwrap();
        session.ensure_table(&forest_tables[0]).unwrap();

        forest_tables[0].columns.push(column("level", "level"));
        session.ensure_table(&forest_tables[0]).unwrap();
        assert!(session.existing_columns("quest").unwrap().contains("level"));
    }

    #[test]
    fn test_count_orphans() {
        let (_dir, db) = open();
        let forest = forest();
        let mut session = db.connect().unwrap();
        for table in forest.tables_in_order() {
            session.ensure_table(table).unwrap();
        }
        let mut stray = batch("Rats", &["a"]);
        stray.tables.remove(0);
        stray.root_keys.clear();
        session.write_batch(&forest, &stray).unwrap();

        let orphans = session
            .count_orphans(
                forest.get("quest__reward__data").unwrap(),
                forest.get("quest").unwrap(),
            )
            .unwrap();
        assert_eq!(orphans, 1);
    }
}
