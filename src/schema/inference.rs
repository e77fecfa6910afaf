//! Schema inference: path statistics to relational tables.
//!
//! ```text
//! ValueStatsCollector ──► infer() ──► TableConf set ──► merge(previous) ──► InferenceReport
//!        ▲                                                   │
//!   XML corpus (malformed files skipped)          widened / conflicts logged
//! ```
//!
//! One root table per document element name. Every element that repeats
//! under its parent becomes an auxiliary table; non-repeated nested elements
//! are flattened into their owner's columns.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::stats::{PathNode, RootStats, ValueStatsCollector};
use super::{
    attr_segment, join_name, ColumnMapping, ColumnSource, ColumnType, KeySource, TableConf,
    KEY_COLUMN, KEY_LENGTH, SEPARATOR, TEXT_COLUMN,
};
use crate::xml::{read_document, SourceEncoding, XmlElement};

/// Inference tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferenceConfig {
    /// Longest VARCHAR before a column becomes TEXT.
    pub varchar_threshold: u16,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            varchar_threshold: 255,
        }
    }
}

/// A document that could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedDocument {
    pub path: PathBuf,
    pub reason: String,
}

/// A table or column that was not merged because its shape changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaConflict {
    pub table: String,
    pub message: String,
}

/// A column whose type grew during a merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WidenedColumn {
    pub table: String,
    pub column: String,
    pub from: ColumnType,
    pub to: ColumnType,
}

/// Outcome of an inference run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InferenceReport {
    pub tables: Vec<TableConf>,
    pub skipped: Vec<SkippedDocument>,
    pub conflicts: Vec<SchemaConflict>,
    pub widened: Vec<WidenedColumn>,
}

/// Converts collected path statistics into `TableConf`s.
#[derive(Debug, Clone, Default)]
pub struct SchemaInferenceEngine {
    config: InferenceConfig,
}

impl SchemaInferenceEngine {
    pub fn new(config: InferenceConfig) -> Self {
        Self { config }
    }

    /// Read `files`, infer their schema and merge it into `previous`.
    ///
    /// Files are parsed in parallel; files that fail to decode or parse are
    /// skipped and reported.
    pub fn run(
        &self,
        files: &[PathBuf],
        encoding: SourceEncoding,
        previous: &[TableConf],
    ) -> InferenceReport {
        let parsed: Vec<(&PathBuf, _)> = files
            .par_iter()
            .map(|path| (path, read_document(path, encoding)))
            .collect();

        let mut collector = ValueStatsCollector::new();
        let mut skipped = Vec::new();
        for (path, result) in parsed {
            match result {
                Ok(document) => collector.observe_document(&document),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Skipping malformed document");
                    skipped.push(SkippedDocument {
                        path: path.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        let mut report = self.infer_and_merge(&collector, previous);
        report.skipped = skipped;
        info!(
            tables = report.tables.len(),
            skipped = report.skipped.len(),
            conflicts = report.conflicts.len(),
            widened = report.widened.len(),
            "Schema inference finished"
        );
        report
    }

    /// Infer from already parsed documents.
    pub fn infer_documents(&self, documents: &[XmlElement]) -> InferenceReport {
        let mut collector = ValueStatsCollector::new();
        for document in documents {
            collector.observe_document(document);
        }
        self.infer_and_merge(&collector, &[])
    }

    fn infer_and_merge(
        &self,
        collector: &ValueStatsCollector,
        previous: &[TableConf],
    ) -> InferenceReport {
        let (inferred, mut conflicts) = self.infer(collector);
        let mut report = self.merge(previous, inferred);
        conflicts.append(&mut report.conflicts);
        report.conflicts = conflicts;
        report
    }

    /// Build tables for every root in the collector.
    ///
    /// Returns the tables in pre-order (each root followed by its
    /// collections) and any duplicate-name conflicts.
    pub fn infer(&self, collector: &ValueStatsCollector) -> (Vec<TableConf>, Vec<SchemaConflict>) {
        let mut tables = Vec::new();
        for (root_name, stats) in collector.roots() {
            self.build_root(root_name, stats, &mut tables);
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut unique = Vec::with_capacity(tables.len());
        let mut conflicts = Vec::new();
        for table in tables {
            if seen.insert(table.table_name.clone()) {
                unique.push(table);
            } else {
                warn!(table = %table.table_name, path = %table.xml_path, "Duplicate table name");
                conflicts.push(SchemaConflict {
                    table: table.table_name.clone(),
                    message: format!(
                        "table name produced twice; kept the first definition, dropped {}",
                        table.xml_path
                    ),
                });
            }
        }
        (unique, conflicts)
    }

    fn build_root(&self, root_name: &str, stats: &RootStats, out: &mut Vec<TableConf>) {
        let records = &stats.records;
        let key_source = key_source_of(records);
        let record_tag = stats.primary_tag().unwrap_or(root_name).to_string();
        debug!(table = root_name, ?key_source, records = records.occurrences, "Inferring root table");

        self.build_table(
            TableSpec {
                table_name: root_name.to_string(),
                xml_path: root_name.to_string(),
                parent_table: None,
                collection_path: None,
                position: 0,
                key_source,
                record_tag,
            },
            records,
            out,
        );
    }

    fn build_table(&self, spec: TableSpec, node: &PathNode, out: &mut Vec<TableConf>) {
        let is_root = spec.parent_table.is_none();
        let mut builder = ColumnBuilder::new(is_root, node.occurrences);

        if node.has_text || (!node.has_children && node.attributes.is_empty()) {
            builder.push(
                TEXT_COLUMN.to_string(),
                ".".to_string(),
                ColumnSource::Text,
                self.text_type(node.max_text_len, false),
                node.max_text_len,
                !node.has_text || node.occurrences == 0,
            );
        }
        self.push_attributes(&mut builder, &[], node);

        let mut collections = Vec::new();
        self.walk(&mut builder, &[], node, &mut collections);

        let own_index = out.len();
        out.push(TableConf {
            table_name: spec.table_name.clone(),
            xml_path: spec.xml_path.clone(),
            parent_table: spec.parent_table,
            is_root_table: is_root,
            collection_path: spec.collection_path,
            position: spec.position,
            key_source: spec.key_source,
            record_tag: spec.record_tag,
            columns: builder.columns,
        });
        debug!(table = %out[own_index].table_name, columns = out[own_index].columns.len(), "Inferred table");

        for (segments, position, child) in collections {
            let relative = segments.join("/");
            self.build_table(
                TableSpec {
                    table_name: format!("{}{}{}", spec.table_name, SEPARATOR, join_name(&segments)),
                    xml_path: format!("{}/{}", spec.xml_path, relative),
                    parent_table: Some(spec.table_name.clone()),
                    collection_path: Some(relative),
                    position,
                    key_source: KeySource::Synthetic,
                    record_tag: child.name.clone(),
                },
                child,
                out,
            );
        }
    }

    /// Pre-order walk over non-repeated descendants, emitting columns and
    /// collecting repeated children as collections.
    fn walk<'a>(
        &self,
        builder: &mut ColumnBuilder,
        prefix: &[String],
        node: &'a PathNode,
        collections: &mut Vec<(Vec<String>, usize, &'a PathNode)>,
    ) {
        for child in &node.children {
            let mut segments = prefix.to_vec();
            segments.push(child.name.clone());

            if child.is_repeated() {
                collections.push((segments, builder.columns.len(), child));
                continue;
            }

            let is_key = prefix.is_empty() && child.name == KEY_COLUMN;
            if child.has_text || (!child.has_children && (child.attributes.is_empty() || is_key)) {
                builder.push(
                    join_name(&segments),
                    segments.join("/"),
                    ColumnSource::Element,
                    self.text_type(child.max_text_len, is_key),
                    child.max_text_len,
                    builder.optional(child.occurrences) || !child.has_text,
                );
            }
            self.push_attributes(builder, &segments, child);

            if child.has_children {
                self.walk(builder, &segments, child, collections);
            }
        }
    }

    fn push_attributes(&self, builder: &mut ColumnBuilder, prefix: &[String], node: &PathNode) {
        for (attr, stats) in &node.attributes {
            let mut name_segments = prefix.to_vec();
            name_segments.push(attr_segment(attr));
            let path = if prefix.is_empty() {
                format!("@{}", attr)
            } else {
                format!("{}/@{}", prefix.join("/"), attr)
            };
            let is_key = prefix.is_empty() && attr == KEY_COLUMN;
            builder.push(
                join_name(&name_segments),
                path,
                ColumnSource::Attribute,
                self.text_type(stats.max_len, is_key),
                stats.max_len,
                builder.optional(stats.occurrences),
            );
        }
    }

    fn text_type(&self, max_len: usize, is_key: bool) -> ColumnType {
        if is_key {
            ColumnType::Varchar(KEY_LENGTH)
        } else {
            ColumnType::from_max_len(max_len, self.config.varchar_threshold)
        }
    }

    /// Merge freshly inferred tables into a previously persisted schema.
    ///
    /// The previous schema wins on shape: its columns, key sources and
    /// positions are kept, types only ever widen, and new columns and tables
    /// are appended. Shape changes are reported as conflicts.
    pub fn merge(&self, previous: &[TableConf], inferred: Vec<TableConf>) -> InferenceReport {
        let mut report = InferenceReport::default();
        if previous.is_empty() {
            report.tables = inferred;
            return report;
        }

        let mut merged: Vec<TableConf> = previous.to_vec();
        let index: HashMap<String, usize> = merged
            .iter()
            .enumerate()
            .map(|(i, t)| (t.table_name.clone(), i))
            .collect();

        // Collection paths per parent in either schema, for shape checks.
        let prev_collections = collection_paths(previous);
        let new_collections = collection_paths(&inferred);
        let mut rejected: HashSet<String> = HashSet::new();

        for table in inferred {
            if let Some(parent) = &table.parent_table {
                if rejected.contains(parent) {
                    rejected.insert(table.table_name.clone());
                    continue;
                }
            }

            match index.get(&table.table_name) {
                Some(&i) => {
                    if merged[i].xml_path != table.xml_path {
                        warn!(table = %table.table_name, "Table name reused for a different path");
                        report.conflicts.push(SchemaConflict {
                            table: table.table_name.clone(),
                            message: format!(
                                "existing table maps {}, new data maps {}",
                                merged[i].xml_path, table.xml_path
                            ),
                        });
                        rejected.insert(table.table_name.clone());
                        continue;
                    }
                    let now_repeated = new_collections
                        .get(table.table_name.as_str())
                        .cloned()
                        .unwrap_or_default();
                    let was_repeated = prev_collections
                        .get(table.table_name.as_str())
                        .cloned()
                        .unwrap_or_default();
                    merge_columns(&mut merged[i], table, &now_repeated, &was_repeated, &mut report);
                }
                None => {
                    if let (Some(parent), Some(path)) = (&table.parent_table, &table.collection_path) {
                        if let Some(&pi) = index.get(parent) {
                            if merged[pi].column_by_path(path).is_some() {
                                warn!(table = %table.table_name, path = %path, "Collection was previously a column");
                                report.conflicts.push(SchemaConflict {
                                    table: table.table_name.clone(),
                                    message: format!(
                                        "{} repeats in the new data but is a column of {}",
                                        path, parent
                                    ),
                                });
                                rejected.insert(table.table_name.clone());
                                continue;
                            }
                        }
                    }
                    info!(table = %table.table_name, "New table");
                    merged.push(table);
                }
            }
        }

        report.tables = merged;
        report
    }
}

struct TableSpec {
    table_name: String,
    xml_path: String,
    parent_table: Option<String>,
    collection_path: Option<String>,
    position: usize,
    key_source: KeySource,
    record_tag: String,
}

/// Accumulates columns with unique names.
struct ColumnBuilder {
    columns: Vec<ColumnMapping>,
    used: HashSet<String>,
    records: u64,
}

impl ColumnBuilder {
    fn new(is_root: bool, records: u64) -> Self {
        let reserved: &[&str] = if is_root {
            &[super::TYPE_DESC, super::ORDER_INDEX, super::SYNTHETIC_KEY]
        } else {
            &[super::ROW_ID, super::PARENT_ID, super::ROOT_ID, super::ORDER_INDEX]
        };
        Self {
            columns: Vec::new(),
            used: reserved.iter().map(|s| s.to_string()).collect(),
            records,
        }
    }

    fn optional(&self, occurrences: u64) -> bool {
        occurrences < self.records
    }

    fn push(
        &mut self,
        name: String,
        path: String,
        source: ColumnSource,
        column_type: ColumnType,
        max_length: usize,
        nullable: bool,
    ) {
        let mut unique = name.clone();
        let mut suffix = 2;
        while !self.used.insert(unique.clone()) {
            unique = format!("{}_{}", name, suffix);
            suffix += 1;
        }
        if unique != name {
            warn!(column = %name, renamed = %unique, path = %path, "Column name collision");
        }
        self.columns.push(ColumnMapping {
            name: unique,
            path,
            source,
            column_type,
            max_length,
            nullable,
        });
    }
}

fn key_source_of(records: &PathNode) -> KeySource {
    match records.child(KEY_COLUMN) {
        Some(id) if !id.is_repeated() && !id.has_children => KeySource::Element,
        _ if records.attribute(KEY_COLUMN).is_some() => KeySource::Attribute,
        _ => KeySource::Synthetic,
    }
}

fn collection_paths(tables: &[TableConf]) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for table in tables {
        if let (Some(parent), Some(path)) = (&table.parent_table, &table.collection_path) {
            map.entry(parent.clone()).or_default().push(path.clone());
        }
    }
    map
}

fn merge_columns(
    existing: &mut TableConf,
    inferred: TableConf,
    now_repeated: &[String],
    was_repeated: &[String],
    report: &mut InferenceReport,
) {
    for column in &mut existing.columns {
        let Some(fresh) = inferred.column(&column.name) else {
            if now_repeated.contains(&column.path) {
                report.conflicts.push(SchemaConflict {
                    table: existing.table_name.clone(),
                    message: format!(
                        "{} was a column and now repeats; keeping the column",
                        column.path
                    ),
                });
            }
            continue;
        };
        let widened = column.column_type.widen(fresh.column_type);
        if widened != column.column_type {
            info!(
                table = %existing.table_name,
                column = %column.name,
                from = ?column.column_type,
                to = ?widened,
                "Widened column"
            );
            report.widened.push(WidenedColumn {
                table: existing.table_name.clone(),
                column: column.name.clone(),
                from: column.column_type,
                to: widened,
            });
            column.column_type = widened;
        }
        column.max_length = column.max_length.max(fresh.max_length);
        column.nullable |= fresh.nullable;
    }

    for fresh in inferred.columns {
        if existing.column(&fresh.name).is_some() {
            continue;
        }
        if was_repeated.contains(&fresh.path) {
            warn!(table = %existing.table_name, path = %fresh.path, "Column was previously a collection");
            report.conflicts.push(SchemaConflict {
                table: existing.table_name.clone(),
                message: format!(
                    "{} no longer repeats; keeping the collection table",
                    fresh.path
                ),
            });
            continue;
        }
        info!(table = %existing.table_name, column = %fresh.name, "New column");
        existing.columns.push(fresh);
    }
}
