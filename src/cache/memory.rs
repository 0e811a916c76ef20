// src/cache/memory.rs
//! In-process store for local runs without Redis and for tests.
//!
//! Backed by moka; each entry expires after the TTL it was written with and
//! expired entries are evicted by moka's housekeeping, read or not.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;

use crate::cache::CacheStore;
use crate::error::PipelineResult;

/// Upper bound on cached pages; least-valued entries go first past this.
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

#[derive(Debug, Clone)]
struct Entry {
    body: String,
    ttl: Option<Duration>,
}

/// Expiry taken from the entry itself; a rewrite restarts the clock.
struct EntryTtl;

impl Expiry<String, Entry> for EntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

pub struct MemoryStore {
    cache: Cache<String, Entry>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(EntryTtl)
            .build();
        Self { cache }
    }

    /// Live keys, sorted; expired entries are skipped.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.cache.iter().map(|(k, _)| k.as_ref().clone()).collect();
        keys.sort();
        keys
    }

    /// Entries held after pending evictions are applied.
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> PipelineResult<Option<String>> {
        Ok(self.cache.get(key).await.map(|e| e.body))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> PipelineResult<()> {
        let entry = Entry {
            body: value.to_string(),
            ttl: (!ttl.is_zero()).then_some(ttl),
        };
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> PipelineResult<bool> {
        Ok(self.cache.remove(key).await.is_some())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let s = MemoryStore::new();
        assert_eq!(s.get("k").await.unwrap(), None);
        s.set_ex("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(s.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(s.delete("k").await.unwrap());
        assert!(!s.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn entries_expire() {
        let s = MemoryStore::new();
        s.set_ex("k", "v", Duration::from_millis(20)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(s.get("k").await.unwrap(), None);
        assert!(s.keys().is_empty());
    }

    #[tokio::test]
    async fn rewrite_restarts_ttl() {
        let s = MemoryStore::new();
        s.set_ex("k", "old", Duration::from_millis(30)).await.unwrap();
        s.set_ex("k", "new", Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(s.get("k").await.unwrap().as_deref(), Some("new"));
    }

    // moka's timer wheel works in ~1 s buckets, so wait past one.
    #[tokio::test]
    async fn expired_entries_are_evicted_without_being_read() {
        let s = MemoryStore::new();
        for i in 0..1000 {
            s.set_ex(&format!("page_{i}"), "x", Duration::from_millis(1))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        s.set_ex("fresh", "x", Duration::from_secs(60)).await.unwrap();

        assert_eq!(s.entry_count().await, 1);
        assert_eq!(s.keys(), vec!["fresh".to_string()]);
    }
}
