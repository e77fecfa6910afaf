//! DbToXmlExporter.
//!
//! ```text
//!  page 0 ──► worker ──► shard page-000000.xml ─┐
//!  page 1 ──► worker ──► shard page-000001.xml ─┼─► merge in page order ──► <root>.xml
//!  page N ──► worker ──► shard page-00000N.xml ─┘
//! ```
//!
//! Shards are UTF-8 fragments in a private temporary directory; the merge
//! step writes the BOM, declaration and document element in the target
//! encoding.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::rebuild::{rebuild_record, ChildRows};
use super::{TransferResult, TransferSettings};
use crate::cache::TtlCache;
use crate::db::{Database, DbError, DbResult, Session};
use crate::schema::{TableConf, TableForest};
use crate::xml::{declaration, write_element, SourceEncoding};

/// Summary of an export run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportResult {
    /// Root tables exported, one file each.
    pub tables: Vec<String>,
    pub records_written: usize,
    /// Collection rows whose parent row is missing.
    pub orphans_skipped: u64,
}

impl ExportResult {
    pub fn merge(&mut self, other: ExportResult) {
        self.tables.extend(other.tables);
        self.records_written += other.records_written;
        self.orphans_skipped += other.orphans_skipped;
    }
}

struct Shard {
    path: PathBuf,
    records: usize,
}

/// Writes root tables and their collections back to XML.
pub struct DbToXmlExporter<'a> {
    db: &'a dyn Database,
    forest: &'a TableForest,
    settings: TransferSettings,
    /// Table existence, shared by all workers of a run.
    existing: TtlCache<String, bool>,
}

impl<'a> DbToXmlExporter<'a> {
    pub fn new(db: &'a dyn Database, forest: &'a TableForest, settings: TransferSettings) -> Self {
        Self {
            db,
            forest,
            settings,
            existing: TtlCache::new(Some(Duration::from_secs(60))),
        }
    }

    /// Export every root table to `<dir>/<table>.xml`.
    pub fn export_all(&self, dir: &Path, encoding: SourceEncoding) -> TransferResult<ExportResult> {
        fs::create_dir_all(dir)?;
        let mut total = ExportResult::default();
        for table in self.forest.roots() {
            let destination = dir.join(format!("{}.xml", table.table_name));
            total.merge(self.export_table(table, &destination, encoding)?);
        }
        info!(
            dir = %dir.display(),
            tables = total.tables.len(),
            records = total.records_written,
            orphans = total.orphans_skipped,
            "Export finished"
        );
        Ok(total)
    }

    /// Export one root table to `destination`.
    pub fn export_table(
        &self,
        table: &TableConf,
        destination: &Path,
        encoding: SourceEncoding,
    ) -> TransferResult<ExportResult> {
        let mut session = self.db.session()?;
        let exists = self.table_exists(session.as_mut(), &table.table_name)?;
        let total = if exists { session.count(&table.table_name)? } else { 0 };
        let orphans_skipped = self.count_orphans(session.as_mut(), table)?;
        drop(session);

        let page_size = self.settings.page_size.max(1);
        let pages = total.div_ceil(page_size);
        let parent = destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        fs::create_dir_all(parent)?;
        let shard_dir = tempfile::Builder::new()
            .prefix(".xmlbridge-export-")
            .tempdir_in(parent)?;
        debug!(table = %table.table_name, total, pages, shards = %shard_dir.path().display(), "Exporting");

        let pool = self.settings.pool()?;
        let shards: Vec<TransferResult<Shard>> = pool.install(|| {
            (0..pages)
                .into_par_iter()
                .map(|page| self.write_shard(table, page, page_size, shard_dir.path()))
                .collect()
        });
        let shards = shards.into_iter().collect::<TransferResult<Vec<_>>>()?;

        let records_written = self.merge(table, &shards, destination, encoding)?;
        info!(
            table = %table.table_name,
            path = %destination.display(),
            records = records_written,
            orphans = orphans_skipped,
            "Exported table"
        );
        Ok(ExportResult {
            tables: vec![table.table_name.clone()],
            records_written,
            orphans_skipped,
        })
    }

    fn table_exists(&self, session: &mut dyn Session, table: &str) -> DbResult<bool> {
        if let Some(exists) = self.existing.get(&table.to_string()) {
            return Ok(exists);
        }
        let exists = session.table_exists(table)?;
        self.existing.insert(table.to_string(), exists);
        Ok(exists)
    }

    fn count_orphans(&self, session: &mut dyn Session, root: &TableConf) -> DbResult<u64> {
        let mut orphans = 0;
        for child in self.forest.descendants(&root.table_name) {
            let Some(parent) = self.forest.parent(&child.table_name) else {
                continue;
            };
            if !self.table_exists(session, &child.table_name)?
                || !self.table_exists(session, &parent.table_name)?
            {
                continue;
            }
            let n = session.count_orphans(child, parent)?;
            if n > 0 {
                warn!(table = %child.table_name, parent = %parent.table_name, rows = n, "Skipping rows with unknown parent");
            }
            orphans += n;
        }
        Ok(orphans)
    }

    fn write_shard(
        &self,
        table: &TableConf,
        page: u64,
        page_size: u64,
        dir: &Path,
    ) -> TransferResult<Shard> {
        let (text, records) = self.settings.retry_policy().run(
            "export page",
            |_| self.render_page(table, page, page_size),
            DbError::is_transient,
        )?;
        let path = dir.join(format!("page-{:06}.xml", page));
        fs::write(&path, text)?;
        Ok(Shard { path, records })
    }

    /// Rendered records of one page and their count.
    fn render_page(&self, table: &TableConf, page: u64, page_size: u64) -> DbResult<(String, usize)> {
        let mut session = self.db.session()?;
        let rows = session.fetch_page(table, page * page_size, page_size)?;

        let mut children = ChildRows::new();
        for child in self.forest.descendants(&table.table_name) {
            if !self.table_exists(session.as_mut(), &child.table_name)? {
                continue;
            }
            let parent_keys = match child.parent_table.as_deref() {
                Some(parent) if parent == table.table_name => {
                    rows.iter().map(|r| r.key.clone()).collect()
                }
                Some(parent) => children.keys(parent),
                None => continue,
            };
            if parent_keys.is_empty() {
                continue;
            }
            let fetched = session.fetch_children(child, &parent_keys)?;
            children.insert(&child.table_name, fetched);
        }

        let mut text = String::new();
        for row in &rows {
            let element = rebuild_record(self.forest, table, row, &children);
            write_element(&mut text, &element, 1);
        }
        debug!(table = %table.table_name, page, records = rows.len(), "Rendered page");
        Ok((text, rows.len()))
    }

    /// Concatenate shards in page order into the destination document.
    fn merge(
        &self,
        table: &TableConf,
        shards: &[Shard],
        destination: &Path,
        encoding: SourceEncoding,
    ) -> TransferResult<usize> {
        let mut out = BufWriter::new(File::create(destination)?);
        out.write_all(encoding.bom())?;
        out.write_all(&encoding.encode_body(&declaration(encoding)))?;

        let root = &table.table_name;
        let records: usize = shards.iter().map(|s| s.records).sum();
        if records == 0 {
            out.write_all(&encoding.encode_body(&format!("<{}/>\n", root)))?;
        } else {
            out.write_all(&encoding.encode_body(&format!("<{}>\n", root)))?;
            for shard in shards {
                let fragment = fs::read_to_string(&shard.path)?;
                out.write_all(&encoding.encode_body(&fragment))?;
            }
            out.write_all(&encoding.encode_body(&format!("</{}>\n", root)))?;
        }
        out.flush()?;
        Ok(records)
    }
}
