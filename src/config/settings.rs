//! TOML-based configuration for xmlbridge.
//!
//! Supports a config file (xmlbridge.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [database]
//! path = "${XMLBRIDGE_HOME}/data.db"
//!
//! [schema]
//! path = "schema.json"
//! varchar_threshold = 255
//!
//! [datasets.quest]
//! directories = ["data/quest", "data/quest_event"]
//!
//! [datasets.world]
//! directories = "data/world,data/world_extra"   # comma list works too
//! encoding = "utf-16"
//!
//! [transfer]
//! batch_size = 500
//! workers = 10
//!
//! [analysis]
//! min_source_coverage = 0.6
//!
//! [ai]
//! model = "echo"
//! api_key = "${AI_API_KEY}"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analysis::AnalysisConfig;
use crate::retry::RetryPolicy;
use crate::rewrite::RuleSpec;
use crate::schema::InferenceConfig;
use crate::transfer::TransferSettings;
use crate::xml::SourceEncoding;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize settings: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("Dataset {0} has no directories")]
    NoDirectories(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type SettingsResult<T> = Result<T, SettingsError>;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,

    pub schema: SchemaSettings,

    /// Named XML source datasets.
    pub datasets: BTreeMap<String, DatasetSettings>,

    pub transfer: TransferSettings,

    pub analysis: AnalysisConfig,

    pub ai: AiSettings,
}

/// Bundled SQLite store.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Database file (supports ${ENV_VAR} expansion).
    pub path: String,

    pub busy_timeout_ms: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "xmlbridge.db".to_string(),
            busy_timeout_ms: 30_000,
        }
    }
}

impl DatabaseSettings {
    pub fn resolved_path(&self) -> SettingsResult<PathBuf> {
        Ok(PathBuf::from(expand_env_vars(&self.path)?))
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Persisted schema and inference tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchemaSettings {
    /// Schema file (JSON), the source of truth once written.
    pub path: String,

    /// Longest VARCHAR before a column becomes TEXT.
    pub varchar_threshold: u16,
}

impl Default for SchemaSettings {
    fn default() -> Self {
        Self {
            path: "schema.json".to_string(),
            varchar_threshold: 255,
        }
    }
}

impl SchemaSettings {
    pub fn resolved_path(&self) -> SettingsResult<PathBuf> {
        Ok(PathBuf::from(expand_env_vars(&self.path)?))
    }

    pub fn inference_config(&self) -> InferenceConfig {
        InferenceConfig {
            varchar_threshold: self.varchar_threshold,
        }
    }
}

/// Directories given either as a TOML list or as one comma-separated string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DirectoryList {
    List(Vec<String>),
    Joined(String),
}

impl Default for DirectoryList {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl DirectoryList {
    pub fn entries(&self) -> Vec<String> {
        match self {
            Self::List(items) => items
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Self::Joined(joined) => split_list(joined),
        }
    }
}

/// One XML source dataset.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DatasetSettings {
    pub directories: DirectoryList,

    /// Declared encoding; `world` defaults to UTF-16, everything else to UTF-8.
    pub encoding: Option<String>,

    /// Extension of the dataset's files, without the dot.
    pub extension: Option<String>,
}

impl DatasetSettings {
    /// Directories with environment variables expanded.
    pub fn resolved_directories(&self) -> SettingsResult<Vec<PathBuf>> {
        self.directories
            .entries()
            .iter()
            .map(|d| expand_env_vars(d).map(PathBuf::from))
            .collect()
    }

    pub fn source_encoding(&self, name: &str) -> SettingsResult<SourceEncoding> {
        SourceEncoding::for_dataset(name, self.encoding.as_deref())
            .map_err(|e| SettingsError::InvalidConfig(format!("dataset {}: {}", name, e)))
    }

    pub fn extension(&self) -> &str {
        self.extension.as_deref().unwrap_or("xml")
    }
}

/// Text service used by assistant rewrite rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AiSettings {
    /// Registered model name.
    pub model: String,

    /// API key (supports ${ENV_VAR} expansion).
    pub api_key: Option<String>,

    pub endpoint: Option<String>,

    /// Cached responses expire after this many seconds; unset keeps them.
    pub cache_ttl_secs: Option<u64>,

    /// Keep responses in the on-disk response store.
    pub persist_cache: bool,

    pub max_attempts: u32,

    pub retry_delay_ms: u64,

    pub rules: Vec<RuleSpec>,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            model: "echo".to_string(),
            api_key: None,
            endpoint: None,
            cache_ttl_secs: None,
            persist_cache: false,
            max_attempts: 3,
            retry_delay_ms: 1000,
            rules: Vec::new(),
        }
    }
}

impl AiSettings {
    /// API key with environment variables expanded; `None` when unset.
    pub fn resolved_api_key(&self) -> SettingsResult<Option<String>> {
        self.api_key.as_deref().map(expand_env_vars).transpose()
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.retry_delay_ms))
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> SettingsResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> SettingsResult<Self> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `XMLBRIDGE_CONFIG`
    /// 2. `./xmlbridge.toml`
    /// 3. `~/.config/xmlbridge/config.toml`
    pub fn load() -> SettingsResult<Self> {
        if let Ok(path) = env::var("XMLBRIDGE_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("xmlbridge.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("xmlbridge").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    fn validate(&self) -> SettingsResult<()> {
        if self.transfer.batch_size == 0 || self.transfer.page_size == 0 {
            return Err(SettingsError::InvalidConfig(
                "transfer.batch_size and transfer.page_size must be positive".to_string(),
            ));
        }
        if self.transfer.workers == 0 {
            return Err(SettingsError::InvalidConfig(
                "transfer.workers must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Get a dataset by name.
    pub fn dataset(&self, name: &str) -> SettingsResult<&DatasetSettings> {
        self.datasets
            .get(name)
            .ok_or_else(|| SettingsError::DatasetNotFound(name.to_string()))
    }

    /// Resolved source directories of a dataset; at least one.
    pub fn dataset_dirs(&self, name: &str) -> SettingsResult<Vec<PathBuf>> {
        let dirs = self.dataset(name)?.resolved_directories()?;
        if dirs.is_empty() {
            return Err(SettingsError::NoDirectories(name.to_string()));
        }
        Ok(dirs)
    }

    /// Declared encoding of a dataset; unknown datasets use the name default.
    pub fn dataset_encoding(&self, name: &str) -> SettingsResult<SourceEncoding> {
        match self.datasets.get(name) {
            Some(dataset) => dataset.source_encoding(name),
            None => DatasetSettings::default().source_encoding(name),
        }
    }

    /// Every file with the dataset's extension under its directories, sorted.
    pub fn dataset_files(&self, name: &str) -> SettingsResult<Vec<PathBuf>> {
        let extension = self.dataset(name)?.extension().to_string();
        let mut files = Vec::new();
        for dir in self.dataset_dirs(name)? {
            let pattern = format!(
                "{}/**/*.{}",
                glob::Pattern::escape(&dir.to_string_lossy()),
                extension
            );
            let paths = glob::glob(&pattern)
                .map_err(|e| SettingsError::InvalidConfig(format!("{}: {}", pattern, e)))?;
            files.extend(paths.filter_map(Result::ok).filter(|p| p.is_file()));
        }
        files.sort();
        files.dedup();
        Ok(files)
    }
}

/// Split a comma-separated list, dropping blank entries.
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> SettingsResult<String> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }
        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            // $VAR ends at the first non-alphanumeric/underscore
            while let Some(&ch) = chars.peek() {
                if !(ch.is_alphanumeric() || ch == '_') {
                    break;
                }
                var_name.push(ch);
                chars.next();
            }
            if var_name.is_empty() {
                result.push('$');
                continue;
            }
        }
        let value = env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
