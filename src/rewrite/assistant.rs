//! Cached, retrying access to a text service.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{ResponseCache, RewriteResult, ServiceError, TextService};
use crate::retry::RetryPolicy;

pub struct AiAssistant {
    service: Box<dyn TextService>,
    cache: Arc<ResponseCache>,
    retry: RetryPolicy,
}

impl AiAssistant {
    pub fn new(service: Box<dyn TextService>, cache: Arc<ResponseCache>, retry: RetryPolicy) -> Self {
        Self {
            service,
            cache,
            retry,
        }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Response for `prompt`, from the cache when possible.
    ///
    /// Transport failures are retried with linear backoff. When the attempts
    /// run out the prompt is cached as an empty response and `""` is
    /// returned, so later runs do not try it again. Auth failures are
    /// returned as errors and not cached.
    pub fn rewrite(&self, prompt: &str) -> RewriteResult<String> {
        if let Some(hit) = self.cache.get(prompt)? {
            debug!(prompt_len = prompt.len(), "Response cache hit");
            return Ok(hit);
        }

        let outcome = self.retry.run(
            "text service",
            |_| self.service.chat(prompt),
            ServiceError::is_retryable,
        );
        let response = match outcome {
            Ok(response) => response,
            Err(err @ ServiceError::Auth(_)) => return Err(err.into()),
            Err(err) => {
                warn!(
                    attempts = self.retry.max_attempts(),
                    error = %err,
                    "Text service gave up, caching empty response"
                );
                String::new()
            }
        };
        self.cache.put(prompt, &response)?;
        Ok(response)
    }
}
