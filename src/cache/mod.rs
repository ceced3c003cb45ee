//! Time-boxed, tag-invalidated cache in front of read queries.
//!
//! The cache is advisory. Backend failures are logged and the value is
//! recomputed, so an outage costs latency but never availability.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Tag carried by every entry derived from article listings.
pub const ARTICLES_TAG: &str = "articles";

/// `MemoryCache` drops expired entries once every this many writes.
const SWEEP_EVERY: usize = 64;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("cache value could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: Value,
    pub expires_at: Instant,
    /// Tags together with the tag generation the value was computed under.
    pub tags: Vec<(String, u64)>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Remove every entry carrying a tag that matches `pattern`.
    async fn delete_tagged(&self, pattern: &str) -> Result<usize, CacheError>;
}

/// Process-local backend.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
    writes: AtomicUsize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every expired entry. Returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let now = Instant::now();
        let entry = self.entries.get(key).map(|e| e.clone());
        match entry {
            Some(entry) if entry.is_expired(now) => {
                self.entries.remove_if(key, |_, e| e.is_expired(now));
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            let swept = self.sweep_expired();
            if swept > 0 {
                debug!(swept, "expired cache entries dropped");
            }
        }
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn delete_tagged(&self, pattern: &str) -> Result<usize, CacheError> {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.tags.iter().any(|(tag, _)| glob_match(pattern, tag)));
        Ok(before.saturating_sub(self.entries.len()))
    }
}

/// `*` matches any run of characters, everything else matches itself.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let Some((head, rest)) = pattern.split_once('*') else {
        return pattern == text;
    };
    let Some(mut remaining) = text.strip_prefix(head) else {
        return false;
    };

    let mut parts: Vec<&str> = rest.split('*').collect();
    let tail = parts.pop().unwrap_or_default();
    for part in parts {
        match remaining.find(part) {
            Some(idx) => remaining = &remaining[idx + part.len()..],
            None => return false,
        }
    }
    remaining.len() >= tail.len() && remaining.ends_with(tail)
}

/// Cache front-end shared by the query surface.
///
/// Each tag has a generation counter. Invalidation bumps the counter before
/// deleting entries, and a value is only served or written back while the
/// generations it was computed under are still current. A write-back that
/// races an invalidation is therefore never visible.
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    generations: Arc<DashMap<String, u64>>,
}

impl Cache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            generations: Arc::new(DashMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCache::new()))
    }

    fn snapshot(&self, tags: &[&str]) -> Vec<(String, u64)> {
        tags.iter()
            .map(|tag| {
                let generation = *self.generations.entry((*tag).to_string()).or_insert(0);
                ((*tag).to_string(), generation)
            })
            .collect()
    }

    fn is_current(&self, tags: &[(String, u64)]) -> bool {
        tags.iter().all(|(tag, generation)| {
            self.generations
                .get(tag)
                .is_some_and(|current| *current == *generation)
        })
    }

    /// Cached value for `key`, or the result of `compute` stored for `ttl`.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        tags: &[&str],
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.backend.get(key).await {
            Ok(Some(entry)) if self.is_current(&entry.tags) => {
                match serde_json::from_value::<T>(entry.value) {
                    Ok(value) => {
                        debug!(key, "cache hit");
                        return Ok(value);
                    }
                    Err(err) => warn!(key, error = %err, "dropping undecodable cache entry"),
                }
            }
            Ok(_) => debug!(key, "cache miss"),
            Err(err) => warn!(key, error = %err, "cache read failed, recomputing"),
        }

        let snapshot = self.snapshot(tags);
        let value = compute().await?;

        if self.is_current(&snapshot) {
            self.write_back(key, ttl, &value, snapshot).await;
        } else {
            debug!(key, "skipping write-back, invalidated during compute");
        }

        Ok(value)
    }

    async fn write_back<T: Serialize>(
        &self,
        key: &str,
        ttl: Duration,
        value: &T,
        tags: Vec<(String, u64)>,
    ) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %err, "cache value not serializable");
                return;
            }
        };

        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
            tags: tags.clone(),
        };
        if let Err(err) = self.backend.set(key, entry).await {
            warn!(key, error = %err, "cache write failed");
            return;
        }

        // An invalidation may have landed between the check and the set.
        if !self.is_current(&tags)
            && let Err(err) = self.backend.delete(key).await
        {
            warn!(key, error = %err, "failed to drop stale cache entry");
        }
    }

    /// Drop every entry with a tag matching `tag_pattern`. Returns the number
    /// of backend entries removed.
    pub async fn invalidate(&self, tag_pattern: &str) -> usize {
        for mut generation in self.generations.iter_mut() {
            if glob_match(tag_pattern, generation.key()) {
                *generation.value_mut() += 1;
            }
        }

        match self.backend.delete_tagged(tag_pattern).await {
            Ok(removed) => {
                debug!(tag_pattern, removed, "cache invalidated");
                removed
            }
            Err(err) => {
                // Bumped generations already hide the stale entries.
                warn!(tag_pattern, error = %err, "cache invalidation failed at backend");
                0
            }
        }
    }

    pub async fn remove(&self, key: &str) {
        if let Err(err) = self.backend.delete(key).await {
            warn!(key, error = %err, "cache delete failed");
        }
    }
}
