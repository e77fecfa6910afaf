//! Forest construction from inferred and externally supplied tables.

use xmlbridge::schema::{
    load_schema, save_schema, ColumnMapping, ColumnSource, ColumnType, KeySource, SchemaError,
    SchemaInferenceEngine, TableConf, TableForest,
};
use xmlbridge::xml::parse_document;

fn inferred() -> Vec<TableConf> {
    let doc = parse_document(
        r#"<quest>
            <quest><id>q1</id>
                <step><text>go</text><hint>a</hint><hint>b</hint></step>
                <step><text>come back</text></step>
                <reward><data><item>sword</item></data><data><item>helm</item></data></reward>
            </quest>
        </quest>"#,
    )
    .unwrap();
    SchemaInferenceEngine::default().infer_documents(&[doc]).tables
}

fn table(name: &str, parent: Option<&str>) -> TableConf {
    TableConf {
        table_name: name.to_string(),
        xml_path: name.replace("__", "/"),
        parent_table: parent.map(str::to_string),
        is_root_table: parent.is_none(),
        collection_path: parent.map(|_| "data".to_string()),
        position: 0,
        key_source: KeySource::Synthetic,
        record_tag: "data".to_string(),
        columns: vec![ColumnMapping {
            name: "value".to_string(),
            path: "value".to_string(),
            source: ColumnSource::Element,
            column_type: ColumnType::Varchar(16),
            max_length: 3,
            nullable: true,
        }],
    }
}

#[test]
fn test_inferred_hierarchy() {
    let forest = TableForest::build(inferred()).unwrap();

    let order: Vec<&str> = forest
        .tables_in_order()
        .iter()
        .map(|t| t.table_name.as_str())
        .collect();
    assert_eq!(
        order,
        vec!["quest", "quest__step", "quest__step__hint", "quest__reward__data"]
    );

    let children: Vec<&str> = forest
        .children("quest")
        .iter()
        .map(|t| t.table_name.as_str())
        .collect();
    assert_eq!(children, vec!["quest__step", "quest__reward__data"]);
    assert_eq!(forest.parent("quest__step__hint").unwrap().table_name, "quest__step");
    assert_eq!(forest.root_of("quest__step__hint").unwrap().table_name, "quest");
    assert_eq!(forest.descendants("quest").len(), 3);
    assert_eq!(forest.orphans().count(), 0);
}

#[test]
fn test_forest_from_persisted_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema.json");
    save_schema(&path, &inferred()).unwrap();

    let forest = TableForest::build(load_schema(&path).unwrap()).unwrap();
    assert_eq!(forest.len(), 4);
    assert_eq!(forest.to_tables(), TableForest::build(inferred()).unwrap().to_tables());
}

#[test]
fn test_external_config_with_missing_parent() {
    let tables = vec![
        table("item", None),
        table("item__data", Some("item")),
        table("shop__data", Some("shop")),
        table("shop__data__data", Some("shop__data")),
    ];
    let forest = TableForest::build(tables).unwrap();

    let orphans: Vec<&str> = forest.orphans().map(|t| t.table_name.as_str()).collect();
    assert_eq!(orphans, vec!["shop__data"]);
    // Orphan subtrees still take part in traversal, after the rooted trees.
    let order: Vec<&str> = forest
        .tables_in_order()
        .iter()
        .map(|t| t.table_name.as_str())
        .collect();
    assert_eq!(order, vec!["item", "item__data", "shop__data", "shop__data__data"]);
    assert!(forest.root_of("shop__data__data").is_none());
}

#[test]
fn test_duplicate_names_rejected() {
    let err = TableForest::build(vec![table("item", None), table("item", None)]).unwrap_err();
    assert!(matches!(err, SchemaError::DuplicateTable(name) if name == "item"));
}
