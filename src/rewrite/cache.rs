//! Prompt-addressed response cache.

use std::sync::Mutex;
use std::time::Duration;

use tracing::warn;

use super::RewriteResult;
use crate::cache::{hash_text, ResponseStore, TtlCache};

/// In-memory TTL layer over an optional persistent store.
///
/// Keys are the SHA-256 of the exact prompt text. Shared by reference
/// between assistants and worker threads.
pub struct ResponseCache {
    memory: TtlCache<String, String>,
    store: Option<Mutex<ResponseStore>>,
}

impl ResponseCache {
    pub fn in_memory(ttl: Option<Duration>) -> Self {
        Self {
            memory: TtlCache::new(ttl),
            store: None,
        }
    }

    pub fn persistent(store: ResponseStore, ttl: Option<Duration>) -> Self {
        Self {
            memory: TtlCache::new(ttl),
            store: Some(Mutex::new(store)),
        }
    }

    pub fn get(&self, prompt: &str) -> RewriteResult<Option<String>> {
        let key = hash_text(prompt);
        if let Some(hit) = self.memory.get(&key) {
            return Ok(Some(hit));
        }
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let stored: Option<String> = match store.lock() {
            Ok(store) => store.get(&key, self.memory.ttl())?,
            Err(_) => {
                warn!("Response store lock poisoned, skipping lookup");
                None
            }
        };
        if let Some(value) = &stored {
            self.memory.insert(key, value.clone());
        }
        Ok(stored)
    }

    pub fn put(&self, prompt: &str, response: &str) -> RewriteResult<()> {
        let key = hash_text(prompt);
        if let Some(store) = &self.store {
            match store.lock() {
                Ok(store) => store.set(&key, &response)?,
                Err(_) => warn!("Response store lock poisoned, keeping response in memory only"),
            }
        }
        self.memory.insert(key, response.to_string());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_round_trip() {
        let cache = ResponseCache::in_memory(None);
        assert_eq!(cache.get("p").unwrap(), None);
        cache.put("p", "").unwrap();
        assert_eq!(cache.get("p").unwrap(), Some(String::new()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_persistent_store_survives_new_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("responses.db");
        {
            let cache = ResponseCache::persistent(ResponseStore::open(&path).unwrap(), None);
            cache.put("translate: sword", "espada").unwrap();
        }
        let cache = ResponseCache::persistent(ResponseStore::open(&path).unwrap(), None);
        assert!(cache.is_empty());
        assert_eq!(cache.get("translate: sword").unwrap().as_deref(), Some("espada"));
        assert_eq!(cache.len(), 1);
    }
}
