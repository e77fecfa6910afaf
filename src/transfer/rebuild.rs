//! Rows -> record element.
//!
//! Columns are placed back at their paths (`_attr_` columns become
//! attributes) and collection rows become repeated children in
//! `__order_index` order. A collection is emitted after the parent columns
//! that preceded it in the source document.

use std::collections::HashMap;

use tracing::warn;

use crate::db::Row;
use crate::schema::{ColumnMapping, KeySource, TableConf, TableForest, KEY_COLUMN};
use crate::xml::XmlElement;

/// Fetched collection rows, grouped by table and parent key.
#[derive(Debug, Clone, Default)]
pub struct ChildRows {
    by_table: HashMap<String, HashMap<String, Vec<Row>>>,
}

impl ChildRows {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add rows of one table. Rows without a parent key are dropped.
    pub fn insert(&mut self, table: &str, rows: Vec<Row>) {
        let groups = self.by_table.entry(table.to_string()).or_default();
        for row in rows {
            match row.parent_key.clone() {
                Some(parent) => groups.entry(parent).or_default().push(row),
                None => warn!(table, key = %row.key, "Collection row without parent id"),
            }
        }
        for rows in groups.values_mut() {
            rows.sort_by_key(|r| r.order_index);
        }
    }

    /// Rows of `table` under `parent`, in order.
    pub fn get(&self, table: &str, parent: &str) -> &[Row] {
        self.by_table
            .get(table)
            .and_then(|groups| groups.get(parent))
            .map_or(&[], Vec::as_slice)
    }

    /// Keys of every stored row of `table`.
    pub fn keys(&self, table: &str) -> Vec<String> {
        self.by_table
            .get(table)
            .map(|groups| {
                groups
                    .values()
                    .flat_map(|rows| rows.iter().map(|r| r.key.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Rebuild the element for `row` of `table`, including its collections.
pub fn rebuild_record(
    forest: &TableForest,
    table: &TableConf,
    row: &Row,
    children: &ChildRows,
) -> XmlElement {
    let name = row
        .type_desc
        .clone()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| table.record_tag.clone());
    let mut element = XmlElement::new(name);
    let collections = forest.children(&table.table_name);
    let last = table.columns.len();

    for idx in 0..=last {
        for collection in collections.iter().filter(|c| {
            c.position == idx || (idx == last && c.position > last)
        }) {
            append_collection(forest, collection, &mut element, &row.key, children);
        }

        let Some(column) = table.columns.get(idx) else {
            break;
        };
        let value = if table.is_root_table && column.name == KEY_COLUMN {
            (table.key_source == KeySource::Element && !row.synthetic_key).then(|| row.key.clone())
        } else {
            row.get(&column.name).map(str::to_string)
        };
        if let Some(value) = value {
            place(&mut element, column, value);
        }
    }
    element
}

fn append_collection(
    forest: &TableForest,
    table: &TableConf,
    element: &mut XmlElement,
    parent_key: &str,
    children: &ChildRows,
) {
    let rows = children.get(&table.table_name, parent_key);
    if rows.is_empty() {
        return;
    }
    let path = table.collection_path.as_deref().unwrap_or(&table.record_tag);
    let segments: Vec<&str> = path.split('/').collect();
    let container = ensure_path(element, &segments[..segments.len() - 1]);
    for row in rows {
        container
            .children
            .push(rebuild_record(forest, table, row, children));
    }
}

fn place(element: &mut XmlElement, column: &ColumnMapping, value: String) {
    let (segments, attribute) = column.location();
    let target = ensure_path(element, &segments);
    match attribute {
        Some(attr) => target.set_attr(attr, value),
        None => target.text = (!value.is_empty()).then_some(value),
    }
}

/// The descendant at `segments`, creating missing elements at the end.
fn ensure_path<'a>(element: &'a mut XmlElement, segments: &[&str]) -> &'a mut XmlElement {
    let Some((first, rest)) = segments.split_first() else {
        return element;
    };
    let idx = match element.children.iter().position(|c| c.name == *first) {
        Some(idx) => idx,
        None => {
            element.children.push(XmlElement::new(*first));
            element.children.len() - 1
        }
    };
    ensure_path(&mut element.children[idx], rest)
}
