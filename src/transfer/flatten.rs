//! Record element -> rows.

use std::collections::BTreeMap;

use tracing::warn;

use crate::db::Row;
use crate::schema::{ColumnMapping, KeySource, TableConf, TableForest, KEY_COLUMN};
use crate::xml::XmlElement;

/// Every row produced by one root record, grouped by table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordRows {
    pub key: String,
    pub tables: BTreeMap<String, Vec<Row>>,
}

impl RecordRows {
    fn push(&mut self, table: &TableConf, row: Row) {
        self.tables
            .entry(table.table_name.clone())
            .or_default()
            .push(row);
    }

    pub fn row_count(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }
}

/// Primary key of a root record.
///
/// Falls back to `<file stem>#<position>` when the record has no key of its
/// own or its table uses synthetic keys.
pub fn record_key(table: &TableConf, record: &XmlElement, stem: &str, position: usize) -> String {
    if table.key_source == KeySource::Synthetic {
        return synthetic_key(stem, position);
    }
    match declared_key(table, record) {
        Some(key) => key.to_string(),
        None => {
            warn!(table = %table.table_name, position, "Record has no id, using a synthetic key");
            synthetic_key(stem, position)
        }
    }
}

/// The non-blank key the record carries itself, if its table reads one.
fn declared_key<'a>(table: &TableConf, record: &'a XmlElement) -> Option<&'a str> {
    let declared = match table.key_source {
        KeySource::Element => record.child(KEY_COLUMN).map(XmlElement::text_or_empty),
        KeySource::Attribute => record.attr(KEY_COLUMN),
        KeySource::Synthetic => None,
    };
    declared.map(str::trim).filter(|k| !k.is_empty())
}

fn synthetic_key(stem: &str, position: usize) -> String {
    format!("{}#{}", stem, position)
}

/// Flatten one root record and its collections into rows.
pub fn flatten_record(
    forest: &TableForest,
    table: &TableConf,
    record: &XmlElement,
    key: String,
    order_index: i64,
) -> RecordRows {
    let mut out = RecordRows {
        key: key.clone(),
        tables: BTreeMap::new(),
    };
    let mut row = Row::new(key.clone(), order_index);
    row.type_desc = Some(record.name.clone());
    row.synthetic_key = declared_key(table, record).is_none();
    fill_values(table, record, &mut row);
    out.push(table, row);

    flatten_collections(forest, table, record, &key, &key, &mut out);
    out
}

fn flatten_collections(
    forest: &TableForest,
    table: &TableConf,
    element: &XmlElement,
    parent_key: &str,
    root_key: &str,
    out: &mut RecordRows,
) {
    for child in forest.children(&table.table_name) {
        let Some(path) = child.collection_path.as_deref() else {
            continue;
        };
        let segments: Vec<&str> = path.split('/').collect();
        let Some((tag, container_path)) = segments.split_last() else {
            continue;
        };
        let Some(container) = element.descend(container_path) else {
            continue;
        };

        for (i, item) in container.children_named(tag).enumerate() {
            let key = format!("{}#{}", parent_key, i);
            let mut row = Row::new(key.clone(), i as i64);
            row.parent_key = Some(parent_key.to_string());
            row.root_key = Some(root_key.to_string());
            fill_values(child, item, &mut row);
            out.push(child, row);

            flatten_collections(forest, child, item, &key, root_key, out);
        }
    }
}

fn fill_values(table: &TableConf, element: &XmlElement, row: &mut Row) {
    for column in table.stored_columns() {
        if let Some(value) = column_value(element, column) {
            row.set(column.name.as_str(), value);
        }
    }
}

/// Value of `column` inside `element`: `None` when the element or attribute
/// is absent, `""` for a present element without text.
fn column_value(element: &XmlElement, column: &ColumnMapping) -> Option<String> {
    let (segments, attribute) = column.location();
    let target = element.descend(&segments)?;
    match attribute {
        Some(attr) => target.attr(attr).map(str::to_string),
        None => Some(target.text_or_empty().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaInferenceEngine;
    use crate::xml::parse_document;

    const QUESTS: &str = r#"<quest>
        <quest><id>q1</id><name>Rats</name>
            <reward kind="gold"><data>a</data><data>b</data><data>c</data></reward>
        </quest>
        <quest><id>q2</id></quest>
    </quest>"#;

    fn forest_for(doc: &XmlElement) -> TableForest {
        let report = SchemaInferenceEngine::default().infer_documents(std::slice::from_ref(doc));
        TableForest::build(report.tables).unwrap()
    }

    #[test]
    fn test_flatten_with_collection() {
        let doc = parse_document(QUESTS).unwrap();
        let forest = forest_for(&doc);
        let table = forest.root("quest").unwrap();
        let record = &doc.children[0];
        let key = record_key(table, record, "quests", 0);
        assert_eq!(key, "q1");

        let rows = flatten_record(&forest, table, record, key, 0);
        let root = &rows.tables["quest"][0];
        assert_eq!(root.get("name"), Some("Rats"));
        assert_eq!(root.get("reward___attr_kind"), Some("gold"));
        assert_eq!(root.type_desc.as_deref(), Some("quest"));
        assert!(!root.synthetic_key);

        let data = &rows.tables["quest__reward__data"];
        assert_eq!(data.len(), 3);
        assert_eq!(data[1].key, "q1#1");
        assert_eq!(data[1].parent_key.as_deref(), Some("q1"));
        assert_eq!(data[1].root_key.as_deref(), Some("q1"));
        assert_eq!(data[1].order_index, 1);
        assert_eq!(data[2].get("__text__"), Some("c"));
        assert_eq!(rows.row_count(), 4);
    }

    #[test]
    fn test_absent_values_are_null() {
        let doc = parse_document(QUESTS).unwrap();
        let forest = forest_for(&doc);
        let table = forest.root("quest").unwrap();
        let rows = flatten_record(&forest, table, &doc.children[1], "q2".into(), 1);
        assert_eq!(rows.tables["quest"][0].get("name"), None);
        assert!(!rows.tables.contains_key("quest__reward__data"));
    }

    #[test]
    fn test_synthetic_keys() {
        let doc = parse_document("<npc><npc><name>a</name></npc><npc><name>b</name></npc></npc>")
            .unwrap();
        let forest = forest_for(&doc);
        let table = forest.root("npc").unwrap();
        assert_eq!(table.key_source, KeySource::Synthetic);
        assert_eq!(record_key(table, &doc.children[1], "npcs", 1), "npcs#1");
    }

    #[test]
    fn test_attribute_keys() {
        let doc = parse_document(r#"<item><item id="7" n="x"/><item id="8" n="y"/></item>"#).unwrap();
        let forest = forest_for(&doc);
        let table = forest.root("item").unwrap();
        assert_eq!(record_key(table, &doc.children[0], "items", 0), "7");
        let rows = flatten_record(&forest, table, &doc.children[0], "7".into(), 0);
        assert_eq!(rows.tables["item"][0].get("_attr_id"), Some("7"));
    }
}
