//! Relationship discovery over collected columns and over a corpus on disk.

use std::fs;

use xmlbridge::analysis::{AnalysisConfig, ColumnCollector, RelationshipAnalyzer, RelationshipReport};
use xmlbridge::xml::{write_document, SourceEncoding, XmlElement};

fn column(file: &str, path: &str, name: &str, values: impl IntoIterator<Item = String>) -> ColumnCollector {
    let config = AnalysisConfig::default();
    let mut column = ColumnCollector::new(file, path, name);
    for value in values {
        column.observe(&value, &config);
    }
    column
}

fn item_ids(range: std::ops::Range<usize>) -> impl Iterator<Item = String> {
    range.map(|i| format!("item_{:06}", i))
}

#[test]
fn test_reference_into_large_key_column() {
    let source = column("quest.xml", "quest/quest/item_id", "item_id", item_ids(0..1000));
    let target = column("item.xml", "item/item/item_id", "item_id", item_ids(0..50_000));

    let report = RelationshipAnalyzer::new(AnalysisConfig::default())
        .analyze_columns(vec![source, target])
        .unwrap();

    assert_eq!(report.relationship_count, 1);
    let rel = &report.relationships[0];
    assert_eq!(rel.source_file, "quest.xml");
    assert_eq!(rel.target_file, "item.xml");
    assert_eq!(rel.match_count, 1000);
    assert!((rel.source_coverage - 1.0).abs() < 1e-9);
    assert!((rel.target_coverage - 0.02).abs() < 1e-9);
    assert!(rel.confidence > 0.6);
    assert!((rel.confidence - 0.9471).abs() < 1e-6);
    assert_eq!(rel.sample_values.len(), 5);
}

#[test]
fn test_single_shared_value_is_not_a_relationship() {
    let source = column(
        "quest.xml",
        "quest/quest/item_id",
        "item_id",
        (0..20).map(|i| if i == 0 { "item_000000".to_string() } else { format!("other_{}", i) }),
    );
    let target = column("item.xml", "item/item/item_id", "item_id", item_ids(0..100));

    let report = RelationshipAnalyzer::new(AnalysisConfig::default())
        .analyze_columns(vec![source, target])
        .unwrap();
    assert!(report.relationships.is_empty());
}

#[test]
fn test_overflowed_column_excluded() {
    let huge = column("log.xml", "log/log/item_id", "item_id", item_ids(0..200_000));
    assert!(huge.overflow);
    let target = column("item.xml", "item/item/item_id", "item_id", item_ids(0..1000));
    let source = column("quest.xml", "quest/quest/item_id", "item_id", item_ids(0..500));

    let report = RelationshipAnalyzer::new(AnalysisConfig::default())
        .analyze_columns(vec![huge, target, source])
        .unwrap();

    assert_eq!(report.overflowed_columns, 1);
    assert!(report
        .relationships
        .iter()
        .all(|r| r.source_file != "log.xml" && r.target_file != "log.xml"));
    assert!(report
        .relationships
        .iter()
        .any(|r| r.source_file == "quest.xml" && r.target_file == "item.xml"));
}

#[test]
fn test_analyze_corpus_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("db")).unwrap();

    let mut items = XmlElement::new("item");
    for i in 0..40 {
        items = items.with_child(
            XmlElement::new("item")
                .with_child(XmlElement::leaf("id", format!("i{}", i)))
                .with_child(XmlElement::leaf("grade", "3")),
        );
    }
    fs::write(
        dir.path().join("db/item.xml"),
        write_document(&items, SourceEncoding::Utf16Le),
    )
    .unwrap();

    let mut quests = XmlElement::new("quest");
    for i in 0..15 {
        quests = quests.with_child(
            XmlElement::new("quest")
                .with_child(XmlElement::leaf("id", format!("q{}", i)))
                .with_child(XmlElement::leaf("item_id", format!("i{}", i))),
        );
    }
    fs::write(
        dir.path().join("quest.xml"),
        write_document(&quests, SourceEncoding::Utf8),
    )
    .unwrap();
    fs::write(dir.path().join("notes.txt"), "not xml").unwrap();

    let report = RelationshipAnalyzer::new(AnalysisConfig::default())
        .analyze(&[dir.path().to_path_buf()])
        .unwrap();

    assert_eq!(report.files_scanned, 2);
    assert_eq!(report.skipped_files, 0);
    assert_eq!(report.relationship_count, 1);
    let rel = &report.relationships[0];
    assert_eq!(rel.source_file, "quest.xml");
    assert_eq!(rel.source_path, "quest/quest/item_id");
    assert_eq!(rel.target_file, "db/item.xml");
    assert_eq!(rel.target_column, "id");
    assert_eq!(rel.match_count, 15);

    let out = dir.path().join("reports/relationships.json");
    report.write(&out).unwrap();
    let loaded = RelationshipReport::load(&out).unwrap();
    assert_eq!(loaded.relationship_count, 1);
    assert_eq!(loaded.relationships[0].target_path, "item/item/id");
    assert_eq!(loaded.relationships[0].sample_values, rel.sample_values);
    assert_eq!(loaded.config, AnalysisConfig::default());
}
