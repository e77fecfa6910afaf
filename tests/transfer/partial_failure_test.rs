//! A batch that keeps failing is reported; every other batch commits.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use xmlbridge::db::{
    Database, DbError, DbResult, Row, RowBatch, Session, SqliteDatabase, SqliteSession,
};
use xmlbridge::schema::{SchemaInferenceEngine, TableConf, TableForest};
use xmlbridge::sql::Dialect;
use xmlbridge::transfer::{TransferSettings, XmlToDbImporter};
use xmlbridge::xml::XmlElement;

/// Fails every write of one batch sequence with a transient error.
struct FlakyDatabase {
    inner: SqliteDatabase,
    failing: FailingBatch,
    attempts: Arc<Mutex<HashMap<usize, u32>>>,
}

#[derive(Clone, Copy)]
enum FailingBatch {
    Always(usize),
    /// Fails the given number of attempts, then succeeds.
    Times(usize, u32),
}

struct FlakySession {
    inner: SqliteSession,
    failing: FailingBatch,
    attempts: Arc<Mutex<HashMap<usize, u32>>>,
}

impl Database for FlakyDatabase {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    fn session(&self) -> DbResult<Box<dyn Session>> {
        Ok(Box::new(FlakySession {
            inner: self.inner.connect()?,
            failing: self.failing,
            attempts: self.attempts.clone(),
        }))
    }
}

impl Session for FlakySession {
    fn execute_ddl(&mut self, sql: &str) -> DbResult<()> {
        self.inner.execute_ddl(sql)
    }

    fn ensure_table(&mut self, table: &TableConf) -> DbResult<()> {
        self.inner.ensure_table(table)
    }

    fn table_exists(&mut self, table: &str) -> DbResult<bool> {
        self.inner.table_exists(table)
    }

    fn write_batch(&mut self, forest: &TableForest, batch: &RowBatch) -> DbResult<usize> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(batch.sequence).or_default();
            *n += 1;
            *n
        };
        let fail = match self.failing {
            FailingBatch::Always(seq) => seq == batch.sequence,
            FailingBatch::Times(seq, times) => seq == batch.sequence && attempt <= times,
        };
        if fail {
            return Err(DbError::Unavailable("connection reset".to_string()));
        }
        self.inner.write_batch(forest, batch)
    }

    fn fetch_page(&mut self, table: &TableConf, offset: u64, limit: u64) -> DbResult<Vec<Row>> {
        self.inner.fetch_page(table, offset, limit)
    }

    fn fetch_children(&mut self, table: &TableConf, parent_keys: &[String]) -> DbResult<Vec<Row>> {
        self.inner.fetch_children(table, parent_keys)
    }

    fn count(&mut self, table: &str) -> DbResult<u64> {
        self.inner.count(table)
    }

    fn count_orphans(&mut self, child: &TableConf, parent: &TableConf) -> DbResult<u64> {
        self.inner.count_orphans(child, parent)
    }
}

/// Ten records, each with two collection rows.
fn document() -> XmlElement {
    let mut root = XmlElement::new("item");
    for i in 0..10 {
        root = root.with_child(
            XmlElement::new("item")
                .with_child(XmlElement::leaf("id", format!("i{}", i)))
                .with_child(XmlElement::leaf("tag", "a"))
                .with_child(XmlElement::leaf("tag", "b")),
        );
    }
    root
}

fn setup(dir: &Path, failing: FailingBatch) -> (FlakyDatabase, TableForest) {
    let report = SchemaInferenceEngine::default().infer_documents(&[document()]);
    let forest = TableForest::build(report.tables).unwrap();
    let db = FlakyDatabase {
        inner: SqliteDatabase::open(dir.join("store.db")).unwrap(),
        failing,
        attempts: Arc::new(Mutex::new(HashMap::new())),
    };
    (db, forest)
}

fn settings() -> TransferSettings {
    TransferSettings {
        batch_size: 1,
        workers: 4,
        max_attempts: 3,
        retry_delay_ms: 1,
        ..Default::default()
    }
}

#[test]
fn test_one_failed_batch_out_of_ten() {
    let dir = tempfile::tempdir().unwrap();
    let (db, forest) = setup(dir.path(), FailingBatch::Always(4));

    let importer = XmlToDbImporter::new(&db, &forest, settings());
    importer.prepare().unwrap();
    let result = importer
        .import_document(Path::new("item.xml"), &document())
        .unwrap();

    assert_eq!(result.batches_committed, 9);
    assert_eq!(result.batches_failed, 1);
    assert_eq!(result.rows_written, 27);
    assert_eq!(result.rows_failed, 3);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].batch, Some(4));
    assert_eq!(db.attempts.lock().unwrap()[&4], 3);
    assert_eq!(db.attempts.lock().unwrap()[&0], 1);

    let mut session = db.inner.connect().unwrap();
    assert_eq!(session.count("item").unwrap(), 9);
    assert_eq!(session.count("item__tag").unwrap(), 18);
    let page = session.fetch_page(forest.get("item").unwrap(), 0, 100).unwrap();
    let keys: Vec<&str> = page.iter().map(|r| r.key.as_str()).collect();
    assert!(!keys.contains(&"i4"));
    assert!(keys.contains(&"i3") && keys.contains(&"i5"));
}

#[test]
fn test_transient_failure_recovers_within_bound() {
    let dir = tempfile::tempdir().unwrap();
    let (db, forest) = setup(dir.path(), FailingBatch::Times(7, 2));

    let importer = XmlToDbImporter::new(&db, &forest, settings());
    importer.prepare().unwrap();
    let result = importer
        .import_document(Path::new("item.xml"), &document())
        .unwrap();

    assert!(result.is_clean());
    assert_eq!(result.batches_committed, 10);
    assert_eq!(db.attempts.lock().unwrap()[&7], 3);
    assert_eq!(db.inner.connect().unwrap().count("item").unwrap(), 10);
}
