// src/cache/content.rs
//! Page content sources: what gets stored when a page is cached.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use metrics::counter;
use reqwest::Url;

use crate::config::CacheConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::page::PageId;

#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch(&self, page: &PageId) -> PipelineResult<String>;
    fn name(&self) -> &'static str;
}

/// Fetches the rendered article for the page's wiki edition.
pub struct WikipediaSource {
    client: reqwest::Client,
    url_template: String,
}

impl WikipediaSource {
    pub fn from_config(cfg: &CacheConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pageview-cache-advisor/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.content_timeout_secs))
            .build()
            .context("building content http client")?;
        if !cfg.content_url_template.ends_with(KEY_SLOT) {
            anyhow::bail!(
                "content_url_template must end with {KEY_SLOT}: {}",
                cfg.content_url_template
            );
        }
        Ok(Self {
            client,
            url_template: cfg.content_url_template.clone(),
        })
    }

    pub fn url_for(&self, page: &PageId) -> PipelineResult<Url> {
        content_url(&self.url_template, page)
    }
}

const KEY_SLOT: &str = "{key}";

/// Article URL for `page`. `{locale}` is substituted as-is; the key becomes the
/// final path segment, percent-encoded, so `#`, `?` and `%` stay in the title.
pub fn content_url(template: &str, page: &PageId) -> PipelineResult<Url> {
    let base = template.replace("{locale}", &page.locale);
    let prefix = base.strip_suffix(KEY_SLOT).ok_or_else(|| {
        PipelineError::upstream("content", format!("url template '{template}' does not end with {KEY_SLOT}"))
    })?;
    let mut url = Url::parse(prefix)
        .map_err(|e| PipelineError::upstream("content", format!("bad content url '{prefix}': {e}")))?;
    url.path_segments_mut()
        .map_err(|_| PipelineError::upstream("content", format!("content url '{prefix}' cannot take a path")))?
        .pop_if_empty()
        .push(&page.key);
    Ok(url)
}

#[async_trait]
impl ContentSource for WikipediaSource {
    async fn fetch(&self, page: &PageId) -> PipelineResult<String> {
        let url = self.url_for(page)?;
        tracing::debug!(%url, "fetching page content");
        let resp = self.client.get(url.clone()).send().await.map_err(|e| {
            counter!("content_fetch_errors_total").increment(1);
            PipelineError::upstream("content", format!("GET {url}: {e}"))
        })?;
        let status = resp.status();
        if !status.is_success() {
            counter!("content_fetch_errors_total").increment(1);
            return Err(PipelineError::upstream(
                "content",
                format!("GET {url} returned {status}"),
            ));
        }
        resp.text()
            .await
            .map_err(|e| PipelineError::upstream("content", format!("reading {url}: {e}")))
    }

    fn name(&self) -> &'static str {
        "wikipedia"
    }
}

/// Serves content from a fixed map keyed by normalized key. Unknown pages are
/// an upstream failure, like a 404 from the real source.
#[derive(Debug, Clone, Default)]
pub struct StaticContentSource {
    pages: HashMap<String, String>,
    fallback: Option<String>,
}

impl StaticContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same body for every page.
    pub fn always(body: impl Into<String>) -> Self {
        Self {
            pages: HashMap::new(),
            fallback: Some(body.into()),
        }
    }

    pub fn with_page(mut self, key: impl Into<String>, body: impl Into<String>) -> Self {
        self.pages.insert(key.into(), body.into());
        self
    }
}

#[async_trait]
impl ContentSource for StaticContentSource {
    async fn fetch(&self, page: &PageId) -> PipelineResult<String> {
        self.pages
            .get(&page.key)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| PipelineError::upstream("content", format!("no content for {}", page.key)))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "https://{locale}.wikipedia.org/wiki/{key}";

    #[test]
    fn url_uses_locale_and_normalized_key() {
        let url = content_url(TEMPLATE, &PageId::parse("Star_Wars_de")).unwrap();
        assert_eq!(url.as_str(), "https://de.wikipedia.org/wiki/Star_Wars");
    }

    #[test]
    fn reserved_characters_in_titles_are_encoded() {
        let url = content_url(TEMPLATE, &PageId::parse("C#_en")).unwrap();
        assert_eq!(url.as_str(), "https://en.wikipedia.org/wiki/C%23");
        assert_eq!(url.fragment(), None);

        let url = content_url(TEMPLATE, &PageId::parse("Who?_en")).unwrap();
        assert_eq!(url.path(), "/wiki/Who%3F");
        assert_eq!(url.query(), None);

        let url = content_url(TEMPLATE, &PageId::parse("AC/DC_en")).unwrap();
        assert_eq!(url.path(), "/wiki/AC%2FDC");
    }

    #[test]
    fn template_must_end_with_key() {
        let err = content_url("https://{locale}.wikipedia.org/{key}/view", &PageId::parse("X_en")).unwrap_err();
        assert_eq!(err.kind(), "upstream");

        let cfg = CacheConfig {
            content_url_template: "https://{locale}.wikipedia.org/wiki/".into(),
            ..CacheConfig::default()
        };
        assert!(WikipediaSource::from_config(&cfg).is_err());
    }

    #[tokio::test]
    async fn static_source_misses_are_upstream_errors() {
        let src = StaticContentSource::new().with_page("Star_Wars", "<html/>");
        assert_eq!(src.fetch(&PageId::parse("Star_Wars_en")).await.unwrap(), "<html/>");
        let err = src.fetch(&PageId::parse("Dune_en")).await.unwrap_err();
        assert_eq!(err.kind(), "upstream");
    }
}
