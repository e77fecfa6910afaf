//! xmlbridge CLI - XML <-> relational conversion and relationship discovery
//!
//! Usage:
//!   xmlbridge infer <dataset>
//!   xmlbridge ddl [--dialect mysql|sqlite] [--out <file>]
//!   xmlbridge import <dataset>
//!   xmlbridge export <dataset> --out <dir>
//!   xmlbridge analyze <dir>... --out <report.json>
//!   xmlbridge rewrite <file> --out <file> [--dataset <name>]
//!   xmlbridge config <key>...
//!
//! Examples:
//!   xmlbridge infer quest
//!   xmlbridge ddl --dialect mysql --out schema.sql
//!   xmlbridge export world --out build/world
//!   RUST_LOG=debug xmlbridge analyze data/quest data/item --out relationships.json

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xmlbridge::analysis::{AnalysisError, RelationshipAnalyzer};
use xmlbridge::cache::{CacheError, ResponseStore};
use xmlbridge::config::{ConfigSource, Settings, SettingsError};
use xmlbridge::db::{DbError, SqliteDatabase};
use xmlbridge::rewrite::{AiAssistant, ResponseCache, RewriteError, RuleChain, RuleSpec, ServiceRegistry};
use xmlbridge::schema::{
    load_schema, save_schema, schema_ddl, SchemaError, SchemaInferenceEngine, TableForest,
};
use xmlbridge::sql::Dialect;
use xmlbridge::transfer::{DbToXmlExporter, TransferError, XmlToDbImporter};
use xmlbridge::xml::{read_document, write_document, SourceEncoding, XmlError};

/// Failure entries printed after a summary.
const MAX_LISTED_ERRORS: usize = 20;

#[derive(Parser)]
#[command(name = "xmlbridge")]
#[command(about = "xmlbridge - XML <-> relational conversion for game configuration data")]
#[command(version)]
struct Cli {
    /// Config file (defaults to XMLBRIDGE_CONFIG, ./xmlbridge.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Infer the relational schema of a dataset and save it
    Infer {
        /// Dataset name from [datasets.<name>]
        dataset: String,
    },

    /// Print DDL for the saved schema
    Ddl {
        /// SQL dialect to generate
        #[arg(short, long, default_value = "mysql")]
        dialect: DialectArg,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Import a dataset's XML files into the database
    Import {
        dataset: String,
    },

    /// Export root tables back to XML files
    Export {
        /// Dataset whose encoding the files are written in
        dataset: String,

        /// Output directory
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Discover relationships between columns across XML files
    Analyze {
        /// Base directories to scan
        #[arg(required = true)]
        dirs: Vec<PathBuf>,

        /// Report file (JSON)
        #[arg(short, long, default_value = "relationships.json")]
        out: PathBuf,

        /// Override analysis.min_confidence
        #[arg(long)]
        min_confidence: Option<f64>,
    },

    /// Apply the configured [[ai.rules]] to an XML file
    Rewrite {
        input: PathBuf,

        #[arg(short, long)]
        out: PathBuf,

        /// Dataset whose encoding is used for reading and writing
        #[arg(short, long)]
        dataset: Option<String>,
    },

    /// Print configuration values by dotted key
    Config {
        #[arg(required = true)]
        keys: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DialectArg {
    Mysql,
    Sqlite,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Mysql => Dialect::MySql,
            DialectArg::Sqlite => Dialect::Sqlite,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("No schema at {0}; run `xmlbridge infer` first")]
    NoSchema(PathBuf),
}

type CliResult = Result<(), CliError>;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    };
    let settings = match settings {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Infer { dataset } => cmd_infer(&settings, &dataset),
        Commands::Ddl { dialect, out } => cmd_ddl(&settings, dialect.into(), out.as_deref()),
        Commands::Import { dataset } => cmd_import(&settings, &dataset),
        Commands::Export { dataset, out } => cmd_export(&settings, &dataset, &out),
        Commands::Analyze {
            dirs,
            out,
            min_confidence,
        } => cmd_analyze(&settings, &dirs, &out, min_confidence),
        Commands::Rewrite {
            input,
            out,
            dataset,
        } => cmd_rewrite(&settings, &input, &out, dataset.as_deref()),
        Commands::Config { keys } => cmd_config(&settings, &keys),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_forest(settings: &Settings) -> Result<TableForest, CliError> {
    let path = settings.schema.resolved_path()?;
    let tables = load_schema(&path)?;
    if tables.is_empty() {
        return Err(CliError::NoSchema(path));
    }
    let forest = TableForest::build(tables)?;
    for orphan in forest.orphans() {
        eprintln!(
            "warning: table {} declares missing parent {}",
            orphan.table_name,
            orphan.parent_table.as_deref().unwrap_or("?")
        );
    }
    Ok(forest)
}

fn open_database(settings: &Settings) -> Result<SqliteDatabase, CliError> {
    let path = settings.database.resolved_path()?;
    Ok(SqliteDatabase::open(path)?.with_busy_timeout(settings.database.busy_timeout()))
}

fn cmd_infer(settings: &Settings, dataset: &str) -> CliResult {
    let files = settings.dataset_files(dataset)?;
    let encoding = settings.dataset_encoding(dataset)?;
    let schema_path = settings.schema.resolved_path()?;
    let previous = load_schema(&schema_path)?;

    let engine = SchemaInferenceEngine::new(settings.schema.inference_config());
    let report = engine.run(&files, encoding, &previous);
    save_schema(&schema_path, &report.tables)?;

    println!("Inferred {} tables from {} files", report.tables.len(), files.len());
    println!("Schema: {}", schema_path.display());
    for widened in &report.widened {
        println!(
            "  widened {}.{}: {:?} -> {:?}",
            widened.table, widened.column, widened.from, widened.to
        );
    }
    for conflict in &report.conflicts {
        println!("  conflict in {}: {}", conflict.table, conflict.message);
    }
    for skipped in &report.skipped {
        println!("  skipped {}: {}", skipped.path.display(), skipped.reason);
    }
    Ok(())
}

fn cmd_ddl(settings: &Settings, dialect: Dialect, out: Option<&Path>) -> CliResult {
    let forest = load_forest(settings)?;
    let ddl = schema_ddl(&forest, dialect);
    match out {
        Some(path) => {
            fs::write(path, &ddl)?;
            println!("Wrote DDL for {} tables to {}", forest.len(), path.display());
        }
        None => print!("{}", ddl),
    }
    Ok(())
}

fn cmd_import(settings: &Settings, dataset: &str) -> CliResult {
    let forest = load_forest(settings)?;
    let files = settings.dataset_files(dataset)?;
    let encoding = settings.dataset_encoding(dataset)?;
    let db = open_database(settings)?;

    let importer = XmlToDbImporter::new(&db, &forest, settings.transfer.clone());
    let result = importer.import_files(&files, encoding)?;

    println!("Imported {} files into {}", files.len(), db.path().display());
    println!("  rows written:      {}", result.rows_written);
    println!("  rows failed:       {}", result.rows_failed);
    println!("  batches committed: {}", result.batches_committed);
    println!("  batches failed:    {}", result.batches_failed);
    for failure in result.errors.iter().take(MAX_LISTED_ERRORS) {
        println!("  error in {}: {}", failure.file.display(), failure.message);
    }
    if result.errors.len() > MAX_LISTED_ERRORS {
        println!("  ... {} more", result.errors.len() - MAX_LISTED_ERRORS);
    }
    Ok(())
}

fn cmd_export(settings: &Settings, dataset: &str, out: &Path) -> CliResult {
    let forest = load_forest(settings)?;
    let encoding = settings.dataset_encoding(dataset)?;
    let db = open_database(settings)?;

    let exporter = DbToXmlExporter::new(&db, &forest, settings.transfer.clone());
    let result = exporter.export_all(out, encoding)?;

    println!("Exported {} tables to {} ({})", result.tables.len(), out.display(), encoding.label());
    println!("  records written: {}", result.records_written);
    println!("  orphans skipped: {}", result.orphans_skipped);
    Ok(())
}

fn cmd_analyze(settings: &Settings, dirs: &[PathBuf], out: &Path, min_confidence: Option<f64>) -> CliResult {
    let mut config = settings.analysis.clone();
    if let Some(threshold) = min_confidence {
        config.min_confidence = threshold.clamp(0.0, 1.0);
    }

    let analyzer = RelationshipAnalyzer::new(config).with_progress(|p| {
        debug!(done = p.files_done, total = p.files_total, file = %p.current.display(), "Scanned");
    });
    let report = analyzer.analyze(dirs)?;
    report.write(out)?;

    println!(
        "Scanned {} files ({} skipped), {} columns, {} keys",
        report.files_scanned, report.skipped_files, report.columns_collected, report.key_columns
    );
    println!("Found {} relationships -> {}", report.relationship_count, out.display());
    for rel in report.relationships.iter().take(MAX_LISTED_ERRORS) {
        println!(
            "  {:.2}  {}:{} -> {}:{}",
            rel.confidence, rel.source_file, rel.source_path, rel.target_file, rel.target_path
        );
    }
    Ok(())
}

fn cmd_rewrite(settings: &Settings, input: &Path, out: &Path, dataset: Option<&str>) -> CliResult {
    let encoding = match dataset {
        Some(name) => settings.dataset_encoding(name)?,
        None => SourceEncoding::sniff(&fs::read(input)?),
    };

    let mut chain = RuleChain::from_specs(&settings.ai.rules)?;
    let needs_assistant = settings
        .ai
        .rules
        .iter()
        .any(|r| matches!(r, RuleSpec::Assistant { .. }));
    if needs_assistant {
        let service = ServiceRegistry::default().create(&settings.ai)?;
        let cache = if settings.ai.persist_cache {
            let store = ResponseStore::open(&ResponseStore::default_path()?)?;
            ResponseCache::persistent(store, settings.ai.cache_ttl())
        } else {
            ResponseCache::in_memory(settings.ai.cache_ttl())
        };
        let assistant = AiAssistant::new(service, Arc::new(cache), settings.ai.retry_policy());
        chain = chain.with_assistant(Arc::new(assistant));
    }

    let mut document = read_document(input, encoding)?;
    let mut changed = 0;
    for record in &mut document.children {
        changed += chain.apply_element(record)?;
    }
    fs::write(out, write_document(&document, encoding))?;

    info!(rules = chain.len(), changed, "Rewrite finished");
    println!("Rewrote {} values with {} rules -> {}", changed, chain.len(), out.display());
    Ok(())
}

fn cmd_config(settings: &Settings, keys: &[String]) -> CliResult {
    for key in keys {
        match settings.get(key) {
            Some(value) => println!("{} = {}", key, value),
            None => println!("{} is not set", key),
        }
    }
    Ok(())
}
