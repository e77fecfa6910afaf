//! Flat dotted-key configuration lookup.
//!
//! Collaborators that only need a few values read them through
//! [`ConfigSource`] instead of the typed [`Settings`] tree:
//!
//! ```text
//! get("transfer.batch_size")           -> Some("500")
//! get_list("datasets.quest.directories") -> ["data/quest", "data/event"]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::settings::{split_list, Settings, SettingsResult};

pub trait ConfigSource {
    /// Value at a dotted key; lists come back comma-joined.
    fn get(&self, key: &str) -> Option<String>;

    /// Comma-separated values at `key`; empty when unset.
    fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key).map(|v| split_list(&v)).unwrap_or_default()
    }
}

impl ConfigSource for Settings {
    fn get(&self, key: &str) -> Option<String> {
        let tree = toml::Value::try_from(self).ok()?;
        let mut node = &tree;
        for part in key.split('.') {
            node = node.as_table()?.get(part)?;
        }
        scalar_text(node)
    }
}

fn scalar_text(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        toml::Value::Array(items) => Some(
            items
                .iter()
                .filter_map(scalar_text)
                .collect::<Vec<_>>()
                .join(","),
        ),
        toml::Value::Table(_) => None,
    }
}

/// `key=value` properties, one per line. `#` and `!` start comments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertiesSource {
    values: BTreeMap<String, String>,
}

impl PropertiesSource {
    pub fn parse(text: &str) -> Self {
        let values = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
            .filter_map(|line| {
                let (key, value) = line.split_once('=').or_else(|| line.split_once(':'))?;
                Some((key.trim().to_string(), value.trim().to_string()))
            })
            .collect();
        Self { values }
    }

    pub fn from_file(path: &Path) -> SettingsResult<Self> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl ConfigSource for PropertiesSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_lookup() {
        let settings = Settings::parse(
            "[datasets.quest]\ndirectories = [\"a\", \"b\"]\n[transfer]\nbatch_size = 50\n",
        )
        .unwrap();
        assert_eq!(settings.get("transfer.batch_size").as_deref(), Some("50"));
        assert_eq!(settings.get("analysis.min_source_coverage").as_deref(), Some("0.6"));
        assert_eq!(settings.get_list("datasets.quest.directories"), vec!["a", "b"]);
        assert_eq!(settings.get("transfer"), None);
        assert_eq!(settings.get("ai.api_key"), None);
        assert!(settings.get_list("datasets.none.directories").is_empty());
    }

    #[test]
    fn test_properties() {
        let props = PropertiesSource::parse(
            "# comment\nxml.dirs = data/a, data/b\n! other comment\nai.model: echo\nbroken line\n",
        );
        assert_eq!(props.get_list("xml.dirs"), vec!["data/a", "data/b"]);
        assert_eq!(props.get("ai.model").as_deref(), Some("echo"));
        assert_eq!(props.get("broken line"), None);
    }
}
