// src/news/mod.rs
//! News context for a page: topic derivation, query window and item cleanup.

pub mod google_rss;
pub mod types;

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use tracing::instrument;

use crate::config::{NewsConfig, MAX_NEWS_RESULTS};
use crate::error::PipelineResult;
use crate::page::derive_topic;
use crate::retry::{with_retry, RetryPolicy};

pub use google_rss::GoogleNewsRss;
pub use types::{NewsItem, NewsProvider, NewsQuery};

/// Length cap for titles and summaries handed to the prompt.
const MAX_FIELD_CHARS: usize = 500;

/// Normalize text: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (entity-decoded &nbsp; included)
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"[\s\u{00A0}]+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > MAX_FIELD_CHARS {
        out = out.chars().take(MAX_FIELD_CHARS).collect();
    }
    out
}

/// Inclusive window ending on `prediction_date`.
pub fn query_window(prediction_date: NaiveDate, window_days: i64) -> (NaiveDate, NaiveDate) {
    (prediction_date - Duration::days(window_days), prediction_date)
}

pub struct NewsRetriever {
    provider: Arc<dyn NewsProvider>,
    cfg: NewsConfig,
    retry: RetryPolicy,
}

impl NewsRetriever {
    pub fn new(provider: Arc<dyn NewsProvider>, cfg: NewsConfig, retry: RetryPolicy) -> Self {
        Self { provider, cfg, retry }
    }

    pub fn build_query(&self, page_name: &str, prediction_date: NaiveDate) -> NewsQuery {
        let (start, end) = query_window(prediction_date, self.cfg.window_days);
        NewsQuery {
            topic: derive_topic(page_name),
            start,
            end,
            language: self.cfg.language.clone(),
            country: self.cfg.country.clone(),
            max_results: self.cfg.max_results.clamp(1, MAX_NEWS_RESULTS),
        }
    }

    /// Recent news for the page; an empty result is not an error.
    #[instrument(skip(self), fields(provider = self.provider.name()))]
    pub async fn search(
        &self,
        page_name: &str,
        prediction_date: NaiveDate,
    ) -> PipelineResult<Vec<NewsItem>> {
        let query = self.build_query(page_name, prediction_date);
        if query.topic.is_empty() {
            tracing::warn!("empty news topic, skipping search");
            return Ok(Vec::new());
        }

        let t0 = std::time::Instant::now();
        let raw = with_retry(&self.retry, "news_search", || self.provider.search(&query)).await?;
        histogram!("news_search_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        let items = clean_items(raw, query.max_results);
        counter!("news_items_total").increment(items.len() as u64);
        tracing::info!(topic = %query.topic, items = items.len(), "news fetched");
        Ok(items)
    }
}

/// Normalize fields, drop items without a title, cap the count.
pub fn clean_items(raw: Vec<NewsItem>, max_results: usize) -> Vec<NewsItem> {
    raw.into_iter()
        .filter_map(|it| {
            let title = normalize_text(&it.title);
            if title.is_empty() {
                return None;
            }
            Some(NewsItem {
                title,
                publisher: normalize_text(&it.publisher),
                summary: normalize_text(&it.summary),
            })
        })
        .take(max_results)
        .collect()
}
