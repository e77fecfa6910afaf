//! XML -> database -> XML through the bundled SQLite store.

use std::fs;
use std::path::Path;

use xmlbridge::db::{Database, SqliteDatabase};
use xmlbridge::schema::{SchemaInferenceEngine, TableForest};
use xmlbridge::transfer::{DbToXmlExporter, TransferSettings, XmlToDbImporter};
use xmlbridge::xml::{read_document, write_document, SourceEncoding, XmlElement};

const REWARD_TABLE: &str = "quest__fighter_selectable_reward__data";

fn quest_document() -> XmlElement {
    let mut root = XmlElement::new("quest");
    for i in 1..=5 {
        let mut record = XmlElement::new("quest")
            .with_child(XmlElement::leaf("id", format!("q{}", i)))
            .with_child(XmlElement::leaf("name", format!("Quest {}", i)))
            .with_child(XmlElement::new("condition").with_attr("type", "level").with_text(format!("{}", i * 5)));
        if i == 3 {
            let mut rewards = XmlElement::new("fighter_selectable_reward");
            for (item, count) in [("sword_01", "1"), ("potion_hp", "5"), ("gold", "300")] {
                rewards = rewards.with_child(
                    XmlElement::new("data")
                        .with_child(XmlElement::leaf("item", item))
                        .with_child(XmlElement::leaf("count", count)),
                );
            }
            record = record.with_child(rewards);
        }
        record = record.with_child(XmlElement::leaf("desc", format!("Do task {}", i)));
        root = root.with_child(record);
    }
    root
}

fn settings() -> TransferSettings {
    TransferSettings {
        batch_size: 2,
        page_size: 2,
        workers: 3,
        retry_delay_ms: 1,
        ..Default::default()
    }
}

fn setup(dir: &Path, encoding: SourceEncoding) -> (SqliteDatabase, TableForest, std::path::PathBuf) {
    let source = dir.join("quest.xml");
    fs::write(&source, write_document(&quest_document(), encoding)).unwrap();
    let report = SchemaInferenceEngine::default().run(std::slice::from_ref(&source), encoding, &[]);
    assert!(report.skipped.is_empty());
    let forest = TableForest::build(report.tables).unwrap();
    let db = SqliteDatabase::open(dir.join("store.db")).unwrap();
    (db, forest, source)
}

#[test]
fn test_quest_scenario_import() {
    let dir = tempfile::tempdir().unwrap();
    let (db, forest, source) = setup(dir.path(), SourceEncoding::Utf8);

    let importer = XmlToDbImporter::new(&db, &forest, settings());
    let result = importer.import_files(&[source], SourceEncoding::Utf8).unwrap();
    assert!(result.is_clean(), "{:?}", result.errors);
    assert_eq!(result.rows_written, 8);
    assert_eq!(result.batches_committed, 3);

    let mut session = db.session().unwrap();
    assert_eq!(session.count("quest").unwrap(), 5);
    assert_eq!(session.count(REWARD_TABLE).unwrap(), 3);

    let rewards = session
        .fetch_children(forest.get(REWARD_TABLE).unwrap(), &["q3".to_string()])
        .unwrap();
    let orders: Vec<i64> = rewards.iter().map(|r| r.order_index).collect();
    assert_eq!(orders, vec![0, 1, 2]);
    let items: Vec<&str> = rewards.iter().map(|r| r.get("item").unwrap()).collect();
    assert_eq!(items, vec!["sword_01", "potion_hp", "gold"]);
    for row in &rewards {
        assert_eq!(row.parent_key.as_deref(), Some("q3"));
        assert_eq!(row.root_key.as_deref(), Some("q3"));
    }
}

#[test]
fn test_export_regenerates_document() {
    let dir = tempfile::tempdir().unwrap();
    let (db, forest, source) = setup(dir.path(), SourceEncoding::Utf8);
    XmlToDbImporter::new(&db, &forest, settings())
        .import_files(&[source], SourceEncoding::Utf8)
        .unwrap();

    let out = dir.path().join("out");
    let result = DbToXmlExporter::new(&db, &forest, settings())
        .export_all(&out, SourceEncoding::Utf8)
        .unwrap();
    assert_eq!(result.tables, vec!["quest".to_string()]);
    assert_eq!(result.records_written, 5);
    assert_eq!(result.orphans_skipped, 0);

    let exported = read_document(&out.join("quest.xml"), SourceEncoding::Utf8).unwrap();
    assert_eq!(exported, quest_document());

    let third = &exported.children[2];
    let data: Vec<&str> = third
        .child("fighter_selectable_reward")
        .unwrap()
        .children_named("data")
        .map(|d| d.child("item").unwrap().text_or_empty())
        .collect();
    assert_eq!(data, vec!["sword_01", "potion_hp", "gold"]);
}

#[test]
fn test_world_dataset_round_trip_in_utf16() {
    let dir = tempfile::tempdir().unwrap();
    let (db, forest, source) = setup(dir.path(), SourceEncoding::Utf16Le);
    XmlToDbImporter::new(&db, &forest, settings())
        .import_files(&[source], SourceEncoding::Utf16Le)
        .unwrap();

    let out = dir.path().join("out");
    DbToXmlExporter::new(&db, &forest, settings())
        .export_all(&out, SourceEncoding::Utf16Le)
        .unwrap();
    let bytes = fs::read(out.join("quest.xml")).unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xFE]);
    let exported = read_document(&out.join("quest.xml"), SourceEncoding::Utf16Le).unwrap();
    assert_eq!(exported, quest_document());
}

#[test]
fn test_reimport_then_export_has_no_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let (db, forest, source) = setup(dir.path(), SourceEncoding::Utf8);
    let importer = XmlToDbImporter::new(&db, &forest, settings());
    importer.import_files(std::slice::from_ref(&source), SourceEncoding::Utf8).unwrap();
    importer.import_files(&[source], SourceEncoding::Utf8).unwrap();

    let mut session = db.session().unwrap();
    assert_eq!(session.count("quest").unwrap(), 5);
    assert_eq!(session.count(REWARD_TABLE).unwrap(), 3);
    drop(session);

    let out = dir.path().join("out");
    DbToXmlExporter::new(&db, &forest, settings())
        .export_all(&out, SourceEncoding::Utf8)
        .unwrap();
    assert_eq!(
        read_document(&out.join("quest.xml"), SourceEncoding::Utf8).unwrap(),
        quest_document()
    );
}

/// Write `documents` as files, infer their schema, import them in order and
/// export the `quest` table again.
fn import_then_export(dir: &Path, documents: &[(&str, XmlElement)]) -> XmlElement {
    let mut files = Vec::new();
    for (name, document) in documents {
        let path = dir.join(name);
        fs::write(&path, write_document(document, SourceEncoding::Utf8)).unwrap();
        files.push(path);
    }
    let report = SchemaInferenceEngine::default().run(&files, SourceEncoding::Utf8, &[]);
    let forest = TableForest::build(report.tables).unwrap();
    let db = SqliteDatabase::open(dir.join("store.db")).unwrap();

    let result = XmlToDbImporter::new(&db, &forest, settings())
        .import_files(&files, SourceEncoding::Utf8)
        .unwrap();
    assert!(result.is_clean(), "{:?}", result.errors);

    let out = dir.join("out");
    DbToXmlExporter::new(&db, &forest, settings())
        .export_all(&out, SourceEncoding::Utf8)
        .unwrap();
    read_document(&out.join("quest.xml"), SourceEncoding::Utf8).unwrap()
}

fn quests(ids: &[&str]) -> XmlElement {
    ids.iter().fold(XmlElement::new("quest"), |root, id| {
        root.with_child(
            XmlElement::new("quest")
                .with_child(XmlElement::leaf("id", *id))
                .with_child(XmlElement::leaf("name", format!("Quest {}", id))),
        )
    })
}

#[test]
fn test_export_keeps_file_order_across_files() {
    let dir = tempfile::tempdir().unwrap();
    let exported = import_then_export(
        dir.path(),
        &[
            ("a.xml", quests(&["a1", "a2", "a3"])),
            ("b.xml", quests(&["b1", "b2"])),
        ],
    );
    let ids: Vec<&str> = exported
        .children
        .iter()
        .map(|q| q.child("id").unwrap().text_or_empty())
        .collect();
    assert_eq!(ids, vec!["a1", "a2", "a3", "b1", "b2"]);
}

#[test]
fn test_record_without_id_exports_without_id() {
    let dir = tempfile::tempdir().unwrap();
    let source = XmlElement::new("quest")
        .with_child(
            XmlElement::new("quest")
                .with_child(XmlElement::leaf("id", "x"))
                .with_child(XmlElement::leaf("n", "a")),
        )
        .with_child(XmlElement::new("quest").with_child(XmlElement::leaf("n", "y")));
    let exported = import_then_export(dir.path(), &[("quests.xml", source.clone())]);

    assert!(exported.children[1].child("id").is_none());
    assert_eq!(exported, source);
}
