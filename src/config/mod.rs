//! Configuration module for xmlbridge.
//!
//! Handles the TOML settings file, environment variables, and flat key lookup.

mod settings;
mod source;

pub use settings::{
    expand_env_vars, split_list, AiSettings, DatabaseSettings, DatasetSettings, DirectoryList,
    SchemaSettings, Settings, SettingsError, SettingsResult,
};
pub use source::{ConfigSource, PropertiesSource};
