//! Schema inference over files on disk: skipping, persistence and re-runs.

use std::fs;
use std::path::{Path, PathBuf};

use xmlbridge::schema::{
    load_schema, save_schema, schema_ddl, ColumnType, KeySource, SchemaInferenceEngine, TableForest,
};
use xmlbridge::sql::Dialect;
use xmlbridge::xml::{write_document, SourceEncoding, XmlElement};

fn quest(id: &str, name: &str, rewards: &[&str]) -> XmlElement {
    let mut record = XmlElement::new("quest")
        .with_child(XmlElement::leaf("id", id))
        .with_child(XmlElement::leaf("name", name));
    if !rewards.is_empty() {
        let mut block = XmlElement::new("fighter_selectable_reward");
        for item in rewards {
            block = block.with_child(XmlElement::new("data").with_child(XmlElement::leaf("item", *item)));
        }
        record = record.with_child(block);
    }
    record
}

fn write(dir: &Path, file: &str, root: &XmlElement, encoding: SourceEncoding) -> PathBuf {
    let path = dir.join(file);
    fs::write(&path, write_document(root, encoding)).unwrap();
    path
}

#[test]
fn test_run_skips_malformed_files() {
    let dir = tempfile::tempdir().unwrap();
    let doc = XmlElement::new("quest")
        .with_child(quest("q1", "Rats", &["sword", "shield", "helm"]))
        .with_child(quest("q2", "Wolves", &[]));
    let good = write(dir.path(), "quest.xml", &doc, SourceEncoding::Utf8);
    let bad = dir.path().join("broken.xml");
    fs::write(&bad, "<quest><quest><id>1</id></quest>").unwrap();

    let report = SchemaInferenceEngine::default().run(&[good, bad.clone()], SourceEncoding::Utf8, &[]);

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].path, bad);
    let names: Vec<&str> = report.tables.iter().map(|t| t.table_name.as_str()).collect();
    assert_eq!(names, vec!["quest", "quest__fighter_selectable_reward__data"]);
    assert_eq!(report.tables[0].key_source, KeySource::Element);
}

#[test]
fn test_utf16_dataset_files() {
    let dir = tempfile::tempdir().unwrap();
    let doc = XmlElement::new("world").with_child(
        XmlElement::new("world")
            .with_attr("id", "w1")
            .with_child(XmlElement::leaf("name", "Ægir's Reach")),
    );
    let path = write(dir.path(), "world.xml", &doc, SourceEncoding::Utf16Le);

    let report = SchemaInferenceEngine::default().run(&[path.clone()], SourceEncoding::Utf16Le, &[]);
    assert!(report.skipped.is_empty());
    assert_eq!(report.tables[0].key_source, KeySource::Attribute);

    // Declared UTF-8 but the file carries a UTF-16 BOM.
    let report = SchemaInferenceEngine::default().run(&[path], SourceEncoding::Utf8, &[]);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.tables.is_empty());
}

#[test]
fn test_persisted_schema_is_source_of_truth() {
    let dir = tempfile::tempdir().unwrap();
    let schema_path = dir.path().join("schema.json");
    let engine = SchemaInferenceEngine::default();

    let long_name = "A".repeat(40);
    let first = write(
        dir.path(),
        "a.xml",
        &XmlElement::new("quest").with_child(quest("q1", &long_name, &["x", "y"])),
        SourceEncoding::Utf8,
    );
    let report = engine.run(&[first], SourceEncoding::Utf8, &load_schema(&schema_path).unwrap());
    save_schema(&schema_path, &report.tables).unwrap();
    assert_eq!(
        report.tables[0].column("name").unwrap().column_type,
        ColumnType::Varchar(48)
    );

    // Same input again: identical schema.
    let again = engine.run(
        &[dir.path().join("a.xml")],
        SourceEncoding::Utf8,
        &load_schema(&schema_path).unwrap(),
    );
    assert_eq!(again.tables, report.tables);
    assert!(again.widened.is_empty());

    // Shorter values never narrow; a new column is appended.
    let second = write(
        dir.path(),
        "b.xml",
        &XmlElement::new("quest").with_child(
            quest("q2", "B", &["z", "w"]).with_child(XmlElement::leaf("level", "3")),
        ),
        SourceEncoding::Utf8,
    );
    let merged = engine.run(&[second], SourceEncoding::Utf8, &load_schema(&schema_path).unwrap());
    let root = &merged.tables[0];
    assert_eq!(root.column("name").unwrap().column_type, ColumnType::Varchar(48));
    let columns: Vec<&str> = root.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(columns, vec!["id", "name", "level"]);
}

#[test]
fn test_ddl_from_inferred_schema() {
    let doc = XmlElement::new("quest").with_child(quest("q1", "Rats", &["a", "b", "c"]));
    let report = SchemaInferenceEngine::default().infer_documents(&[doc]);
    let forest = TableForest::build(report.tables).unwrap();

    let ddl = schema_ddl(&forest, Dialect::MySql);
    assert!(ddl.contains("DROP TABLE IF EXISTS `quest`"));
    assert!(ddl.contains("CREATE TABLE `quest__fighter_selectable_reward__data`"));
    assert!(ddl.contains("`__order_index` INT NOT NULL DEFAULT 0"));
    assert!(ddl.contains("`__type_desc__` VARCHAR(64)"));
    assert!(ddl.contains("COMMENT 'quest/fighter_selectable_reward/data/item'"));
    assert!(ddl.contains("ENGINE=InnoDB"));
    assert!(ddl.find("`quest`").unwrap() < ddl.find("`quest__fighter_selectable_reward__data`").unwrap());
}
