// src/cache/mod.rs
//! Cache gateway: turns a boolean recommendation into a store action.
//!
//! One policy for every operation: the normalized page key, a fixed TTL and a
//! store-wide eviction policy applied when the store is opened.

pub mod content;
pub mod memory;
pub mod redis_store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use serde::Serialize;
use tracing::instrument;

use crate::config::CacheConfig;
use crate::error::PipelineResult;
use crate::page::PageId;
use crate::retry::{with_retry, RetryPolicy};

pub use content::{ContentSource, StaticContentSource, WikipediaSource};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Key-value store with per-key expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> PipelineResult<Option<String>>;
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> PipelineResult<()>;
    /// Returns whether a key was removed.
    async fn delete(&self, key: &str) -> PipelineResult<bool>;
    fn name(&self) -> &'static str;
}

/// What the gateway did for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheAction {
    /// Already cached; nothing written.
    Hit,
    /// Fetched from the content source and stored.
    Stored,
    /// Key deleted (or already absent).
    Invalidated,
}

impl CacheAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheAction::Hit => "hit",
            CacheAction::Stored => "stored",
            CacheAction::Invalidated => "invalidated",
        }
    }
}

pub struct CacheGateway {
    store: Arc<dyn CacheStore>,
    content: Arc<dyn ContentSource>,
    ttl: Duration,
    retry: RetryPolicy,
}

impl CacheGateway {
    pub fn new(
        store: Arc<dyn CacheStore>,
        content: Arc<dyn ContentSource>,
        ttl: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            content,
            ttl,
            retry,
        }
    }

    /// Open the configured backend. For Redis the eviction policy is applied here, once.
    pub async fn from_config(cfg: &CacheConfig, retry: RetryPolicy) -> anyhow::Result<Self> {
        let store: Arc<dyn CacheStore> = match cfg.backend.as_str() {
            "memory" => Arc::new(MemoryStore::new()),
            "redis" => {
                let store =
                    RedisStore::connect(&cfg.redis_url, Duration::from_millis(cfg.op_timeout_ms))
                        .await?;
                store.apply_eviction_policy(&cfg.eviction_policy).await;
                Arc::new(store)
            }
            other => anyhow::bail!("Unsupported cache backend: {other}"),
        };
        let content = Arc::new(WikipediaSource::from_config(cfg)?);
        Ok(Self::new(
            store,
            content,
            Duration::from_secs(cfg.ttl_secs),
            retry,
        ))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn should_cache(&self, recommendation: bool, page_name: &str) -> PipelineResult<CacheAction> {
        let page = PageId::parse(page_name);
        if recommendation {
            self.ensure(&page).await
        } else {
            self.invalidate(&page).await
        }
    }

    #[instrument(skip(self, page), fields(key = %page.key, store = self.store.name()))]
    pub async fn ensure(&self, page: &PageId) -> PipelineResult<CacheAction> {
        let key = page.key.as_str();
        let cached = with_retry(&self.retry, "cache_get", || self.store.get(key)).await?;
        if cached.is_some() {
            counter!("cache_hits_total").increment(1);
            tracing::info!("cache hit");
            return Ok(CacheAction::Hit);
        }
        counter!("cache_misses_total").increment(1);

        let body = with_retry(&self.retry, "content_fetch", || self.content.fetch(page)).await?;
        with_retry(&self.retry, "cache_set", || {
            self.store.set_ex(key, &body, self.ttl)
        })
        .await?;
        tracing::info!(bytes = body.len(), ttl_secs = self.ttl.as_secs(), "page cached");
        Ok(CacheAction::Stored)
    }

    /// Deleting an absent key is fine.
    #[instrument(skip(self, page), fields(key = %page.key, store = self.store.name()))]
    pub async fn invalidate(&self, page: &PageId) -> PipelineResult<CacheAction> {
        let key = page.key.as_str();
        let removed = with_retry(&self.retry, "cache_delete", || self.store.delete(key)).await?;
        counter!("cache_invalidations_total").increment(1);
        tracing::info!(removed, "cache invalidated");
        Ok(CacheAction::Invalidated)
    }
}
