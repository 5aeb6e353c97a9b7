use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use serde_json::Value;
use tokio::time::Instant;

use crate::types::CacheKey;

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// Concurrent key-value store with per-entry expiry.
///
/// Entries are replaced wholesale on write and dropped lazily when a read
/// finds them expired. When an insert would push the store past `capacity`,
/// expired entries are purged first, then the entry closest to expiry is
/// evicted.
#[derive(Clone)]
pub struct CacheStore {
    entries: Arc<DashMap<CacheKey, CacheEntry>>,
    capacity: usize,
}

impl CacheStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            capacity,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let entry = self.entries.get(key)?;
        if Instant::now() >= entry.expires_at {
            drop(entry);
            self.entries
                .remove_if(key, |_, e| Instant::now() >= e.expires_at);
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn set(&self, key: CacheKey, value: Value, ttl: Duration) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.make_room();
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn make_room(&self) {
        let now = Instant::now();
        self.entries.retain(|_, e| now < e.expires_at);

        while self.entries.len() >= self.capacity {
            let victim = self
                .entries
                .iter()
                .min_by_key(|e| e.value().expires_at)
                .map(|e| e.key().clone());
            match victim {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}
