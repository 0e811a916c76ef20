// src/config/mod.rs
//! Application configuration: `config/app.toml` plus environment overrides.

pub mod llm;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use llm::LlmConfig;

pub const DEFAULT_APP_CONFIG_PATH: &str = "config/app.toml";
pub const ENV_APP_CONFIG_PATH: &str = "APP_CONFIG_PATH";

/// Hard cap on news items handed to the refiner.
pub const MAX_NEWS_RESULTS: usize = 30;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub news: NewsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub path: PathBuf,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("training/data/cleaned_data.csv"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub base_url: String,
    pub language: String,
    pub country: String,
    pub max_results: usize,
    pub window_days: i64,
    pub timeout_secs: u64,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://news.google.com/rss/search".to_string(),
            language: "en".to_string(),
            country: "CA".to_string(),
            max_results: MAX_NEWS_RESULTS,
            window_days: 7,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// "redis" | "memory"
    pub backend: String,
    pub redis_url: String,
    pub ttl_secs: u64,
    /// Applied once with `CONFIG SET maxmemory-policy`; empty disables it.
    pub eviction_policy: String,
    pub op_timeout_ms: u64,
    /// `{locale}` is substituted; `{key}` must end the template and is percent-encoded.
    pub content_url_template: String,
    pub content_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: "redis".to_string(),
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            ttl_secs: 2 * 3600,
            eviction_policy: "allkeys-lru".to_string(),
            op_timeout_ms: 2_000,
            content_url_template: "https://{locale}.wikipedia.org/wiki/{key}".to_string(),
            content_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 200,
            max_delay_ms: 2_000,
        }
    }
}

impl AppConfig {
    /// Load using `$APP_CONFIG_PATH`, falling back to `config/app.toml`.
    /// A missing file yields defaults; a malformed one is an error.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(ENV_APP_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_APP_CONFIG_PATH));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let mut cfg = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("reading app config from {}", path.display()))?;
            Self::from_toml_str(&content)
                .with_context(|| format!("parsing app config at {}", path.display()))?
        } else {
            tracing::info!(path = %path.display(), "no app config file, using defaults");
            Self::default()
        };
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(p) = std::env::var("DATASET_PATH") {
            self.dataset.path = PathBuf::from(p);
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            self.cache.redis_url = url;
        }
        if let Ok(backend) = std::env::var("CACHE_BACKEND") {
            self.cache.backend = backend.trim().to_lowercase();
        }
        self.llm.resolve()
    }

    fn sanitize(&mut self) {
        let news_default = NewsConfig::default();
        if self.news.max_results == 0 || self.news.max_results > MAX_NEWS_RESULTS {
            self.news.max_results = MAX_NEWS_RESULTS;
        }
        if self.news.window_days < 0 {
            self.news.window_days = news_default.window_days;
        }
        if self.news.timeout_secs == 0 {
            self.news.timeout_secs = news_default.timeout_secs;
        }

        let cache_default = CacheConfig::default();
        self.cache.backend = self.cache.backend.trim().to_lowercase();
        if self.cache.ttl_secs == 0 {
            self.cache.ttl_secs = cache_default.ttl_secs;
        }
        if self.cache.op_timeout_ms == 0 {
            self.cache.op_timeout_ms = cache_default.op_timeout_ms;
        }
        if self.cache.content_timeout_secs == 0 {
            self.cache.content_timeout_secs = cache_default.content_timeout_secs;
        }

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            // keep a valid interval
            std::mem::swap(&mut self.retry.max_delay_ms, &mut self.retry.base_delay_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg = AppConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.news.max_results, 30);
        assert_eq!(cfg.news.country, "CA");
        assert_eq!(cfg.cache.ttl_secs, 7200);
        assert_eq!(cfg.cache.eviction_policy, "allkeys-lru");
        assert_eq!(cfg.llm.model, "gemini-1.5-flash");
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let toml = r#"
            [news]
            max_results = 500
            window_days = -3

            [cache]
            ttl_secs = 0
            backend = " Memory "

            [retry]
            base_delay_ms = 900
            max_delay_ms = 100
        "#;
        let cfg = AppConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.news.max_results, 30);
        assert_eq!(cfg.news.window_days, 7);
        assert_eq!(cfg.cache.ttl_secs, 7200);
        assert_eq!(cfg.cache.backend, "memory");
        assert_eq!(cfg.retry.base_delay_ms, 100);
        assert_eq!(cfg.retry.max_delay_ms, 900);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(AppConfig::from_toml_str("[news\nmax_results = ").is_err());
    }

    #[serial_test::serial]
    #[test]
    fn missing_file_uses_defaults_and_env_overrides() {
        let tmp = tempfile::tempdir().unwrap();
        env::set_var("LLM_TEST_MODE", "mock");
        env::set_var("REDIS_URL", "redis://cache.internal:6380/1");
        env::set_var("DATASET_PATH", "/data/views.csv");

        let cfg = AppConfig::load_from(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.cache.redis_url, "redis://cache.internal:6380/1");
        assert_eq!(cfg.dataset.path, PathBuf::from("/data/views.csv"));

        env::remove_var("LLM_TEST_MODE");
        env::remove_var("REDIS_URL");
        env::remove_var("DATASET_PATH");
    }

    #[serial_test::serial]
    #[test]
    fn gemini_without_key_fails_to_resolve() {
        env::remove_var("LLM_TEST_MODE");
        env::remove_var("GEMINI_API_KEY");
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("app.toml");
        fs::write(&path, "[llm]\nprovider = \"Gemini\"\napi_key = \"env\"\n").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }
}
