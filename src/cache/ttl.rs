//! Concurrent in-memory cache with time-based validity.

use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Thread-safe map whose entries expire after a fixed time-to-live.
///
/// Entries are checked lazily on read; `purge_expired` drops stale entries
/// eagerly. With no TTL entries never expire.
#[derive(Debug)]
pub struct TtlCache<K: Eq + Hash, V> {
    entries: DashMap<K, (V, Instant)>,
    ttl: Option<Duration>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    fn is_fresh(&self, inserted: Instant) -> bool {
        self.ttl.map_or(true, |ttl| inserted.elapsed() < ttl)
    }

    /// A clone of the value, if present and not expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let fresh = {
            let entry = self.entries.get(key)?;
            let (value, inserted) = entry.value();
            self.is_fresh(*inserted).then(|| value.clone())
        };
        if fresh.is_none() {
            self.entries.remove(key);
        }
        fresh
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(key, (value, Instant::now()));
    }

    /// Value for `key`, computing and storing it when missing or expired.
    pub fn get_or_insert_with(&self, key: K, make: impl FnOnce() -> V) -> V
    where
        K: Clone,
    {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = make();
        self.insert(key, value.clone());
        value
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, (value, _))| value)
    }

    /// Drop expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        if let Some(ttl) = self.ttl {
            self.entries.retain(|_, (_, inserted)| inserted.elapsed() < ttl);
        }
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
