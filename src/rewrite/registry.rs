//! Model name to text service constructors.

use std::collections::BTreeMap;

use super::{RewriteError, RewriteResult, ServiceError, TextService};
use crate::config::AiSettings;

/// Builds a service from the `[ai]` settings.
pub type ServiceConstructor = fn(&AiSettings) -> RewriteResult<Box<dyn TextService>>;

/// Registry of known models.
///
/// Network clients live outside this crate and are registered by the
/// embedding application; only the offline `echo` model is built in.
#[derive(Clone)]
pub struct ServiceRegistry {
    constructors: BTreeMap<String, ServiceConstructor>,
}

impl ServiceRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, model: impl Into<String>, constructor: ServiceConstructor) {
        self.constructors.insert(model.into(), constructor);
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Construct the service for `settings.model`.
    pub fn create(&self, settings: &AiSettings) -> RewriteResult<Box<dyn TextService>> {
        let constructor = self
            .constructors
            .get(&settings.model)
            .ok_or_else(|| RewriteError::UnknownModel(settings.model.clone()))?;
        constructor(settings)
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("echo", echo);
        registry
    }
}

fn echo(_settings: &AiSettings) -> RewriteResult<Box<dyn TextService>> {
    Ok(Box::new(EchoService))
}

/// Returns the prompt unchanged. Useful for dry runs of assistant rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoService;

impl TextService for EchoService {
    fn chat(&self, prompt: &str) -> Result<String, ServiceError> {
        Ok(prompt.to_string())
    }
}

/// The configured API key, or a configuration error naming the model.
pub fn require_api_key(settings: &AiSettings) -> RewriteResult<String> {
    settings
        .api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| RewriteError::MissingApiKey(settings.model.clone()))
}
