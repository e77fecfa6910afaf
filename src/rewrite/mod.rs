//! Field rewriting for theming and translation passes.
//!
//! ```text
//!  XmlElement ──► RuleChain ──► Rule::{Mapping, Regex, TextStyle, Assistant}
//!                                                        │
//!                                    ResponseCache ◄── AiAssistant ──► dyn TextService
//! ```
//!
//! The text service is an external collaborator reached through
//! [`TextService::chat`]. Concrete clients are plugged in through the
//! [`ServiceRegistry`] by model name.

mod assistant;
mod cache;
mod registry;
mod rules;

pub use assistant::AiAssistant;
pub use cache::ResponseCache;
pub use registry::{require_api_key, EchoService, ServiceConstructor, ServiceRegistry};
pub use rules::{FieldMatcher, Rule, RuleChain, RuleSpec, TextStyle};

use crate::cache::CacheError;

/// Failure reported by a text service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication failed: {0}")]
    Auth(String),
}

impl ServiceError {
    /// Transport failures are worth retrying; auth failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Missing API key for model {0}")]
    MissingApiKey(String),

    #[error("Invalid field pattern {pattern}: {message}")]
    Pattern { pattern: String, message: String },

    #[error("Invalid regex: {0}")]
    Regex(#[from] regex::Error),

    #[error("Rule {0} needs an assistant but none is configured")]
    NoAssistant(String),

    #[error("Text service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

pub type RewriteResult<T> = Result<T, RewriteError>;

/// A chat-style text service: one prompt in, one text out.
///
/// An empty response is a valid answer meaning "leave the text unchanged".
pub trait TextService: Send + Sync {
    fn chat(&self, prompt: &str) -> Result<String, ServiceError>;
}
