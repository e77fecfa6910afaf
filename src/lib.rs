//! # xmlbridge
//!
//! Converts between hierarchical game-configuration XML and a relational
//! database, and mines latent relationships across an XML corpus.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  XML corpus (per dataset)                │
//! └─────────────────────────────────────────────────────────┘
//!            │                                  │
//!            ▼ [schema::stats]                  ▼ [analysis]
//! ┌──────────────────────────┐     ┌──────────────────────────┐
//! │  Path statistics tree    │     │  Column collectors,      │
//! └──────────────────────────┘     │  value index, scoring    │
//!            │                     └──────────────────────────┘
//!            ▼ [schema::inference]              │
//! ┌──────────────────────────┐                  ▼
//! │  TableConf set + forest  │──► DDL   RelationshipReport (JSON)
//! └──────────────────────────┘
//!            │
//!            ▼ [transfer]
//! ┌─────────────────────────────────────────────────────────┐
//! │   import: XML ─► rows ─► db    export: db ─► shards ─► XML │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod analysis;
pub mod cache;
pub mod config;
pub mod db;
pub mod retry;
pub mod rewrite;
pub mod schema;
pub mod sql;
pub mod transfer;
pub mod xml;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::analysis::{
        AnalysisConfig, CancellationToken, RelationshipAnalyzer, RelationshipReport,
    };
    pub use crate::config::{ConfigSource, Settings};
    pub use crate::db::{Database, Row, Session, SqliteDatabase};
    pub use crate::schema::{
        ColumnMapping, ColumnType, SchemaInferenceEngine, TableConf, TableForest,
        ValueStatsCollector,
    };
    pub use crate::sql::Dialect;
    pub use crate::transfer::{DbToXmlExporter, TransferSettings, XmlToDbImporter};
    pub use crate::xml::{SourceEncoding, XmlElement};
}

pub use schema::{TableConf, TableForest};
pub use xml::{SourceEncoding, XmlElement};
