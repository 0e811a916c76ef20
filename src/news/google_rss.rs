// src/news/google_rss.rs
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use metrics::counter;
use quick_xml::de::from_str;
use reqwest::Url;
use serde::Deserialize;

use crate::config::NewsConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::news::types::{NewsItem, NewsProvider, NewsQuery};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    description: Option<String>,
    source: Option<Source>,
}

#[derive(Debug, Deserialize)]
struct Source {
    #[serde(rename = "$text")]
    name: Option<String>,
}

/// Google News RSS search.
pub struct GoogleNewsRss {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { base_url: String, client: reqwest::Client },
}

impl GoogleNewsRss {
    /// Parse a stored RSS document instead of calling out (tests, offline runs).
    pub fn from_fixture_str(s: &str) -> Self {
        Self {
            mode: Mode::Fixture(s.to_string()),
        }
    }

    pub fn from_config(cfg: &NewsConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pageview-cache-advisor/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("building news http client")?;
        Ok(Self {
            mode: Mode::Http {
                base_url: cfg.base_url.clone(),
                client,
            },
        })
    }

    fn parse_items_from_str(s: &str, max_results: usize) -> PipelineResult<Vec<NewsItem>> {
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean)
            .map_err(|e| PipelineError::upstream("news", format!("parsing rss: {e}")))?;

        let out = rss
            .channel
            .item
            .into_iter()
            .take(max_results)
            .map(|it| {
                let publisher = it
                    .source
                    .and_then(|s| s.name)
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                let title = strip_publisher_suffix(it.title.as_deref().unwrap_or_default(), &publisher);
                NewsItem {
                    title,
                    publisher,
                    summary: it.description.unwrap_or_default(),
                }
            })
            .collect();
        Ok(out)
    }
}

/// Search URL for `query`; `before:` is exclusive so the end day is bumped.
pub fn build_search_url(base_url: &str, query: &NewsQuery) -> PipelineResult<Url> {
    let q = format!(
        "{} after:{} before:{}",
        query.topic,
        query.start.format("%Y-%m-%d"),
        (query.end + chrono::Duration::days(1)).format("%Y-%m-%d")
    );
    let lang = query.language.to_lowercase();
    let country = query.country.to_uppercase();
    Url::parse_with_params(
        base_url,
        &[
            ("q", q),
            ("hl", format!("{lang}-{country}")),
            ("gl", country.clone()),
            ("ceid", format!("{country}:{lang}")),
        ],
    )
    .map_err(|e| PipelineError::upstream("news", format!("bad news url '{base_url}': {e}")))
}

#[async_trait]
impl NewsProvider for GoogleNewsRss {
    async fn search(&self, query: &NewsQuery) -> PipelineResult<Vec<NewsItem>> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_items_from_str(s, query.max_results),
            Mode::Http { base_url, client } => {
                let url = build_search_url(base_url, query)?;
                let resp = client.get(url).send().await.map_err(|e| {
                    counter!("news_provider_errors_total").increment(1);
                    PipelineError::upstream("news", e.to_string())
                })?;
                let status = resp.status();
                if !status.is_success() {
                    counter!("news_provider_errors_total").increment(1);
                    return Err(PipelineError::upstream("news", format!("status {status}")));
                }
                let body = resp
                    .text()
                    .await
                    .map_err(|e| PipelineError::upstream("news", e.to_string()))?;
                Self::parse_items_from_str(&body, query.max_results)
            }
        }
    }

    fn name(&self) -> &'static str {
        "google-news-rss"
    }
}

/// Headlines arrive as `Headline - Publisher`; drop the redundant tail.
fn strip_publisher_suffix(title: &str, publisher: &str) -> String {
    let title = title.trim();
    if publisher.is_empty() {
        return title.to_string();
    }
    title
        .strip_suffix(publisher)
        .and_then(|t| t.trim_end().strip_suffix('-'))
        .map(|t| t.trim_end().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| title.to_string())
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn query() -> NewsQuery {
        NewsQuery {
            topic: "in film".into(),
            start: NaiveDate::from_ymd_opt(2015, 12, 24).unwrap(),
            end: NaiveDate::from_ymd_opt(2015, 12, 31).unwrap(),
            language: "en".into(),
            country: "ca".into(),
            max_results: 30,
        }
    }

    #[test]
    fn search_url_encodes_window_and_locale() {
        let url = build_search_url("https://news.google.com/rss/search", &query()).unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("q".into(), "in film after:2015-12-24 before:2016-01-01".into())));
        assert!(pairs.contains(&("hl".into(), "en-CA".into())));
        assert!(pairs.contains(&("gl".into(), "CA".into())));
        assert!(pairs.contains(&("ceid".into(), "CA:en".into())));
    }

    #[test]
    fn publisher_suffix_is_stripped_from_title() {
        assert_eq!(
            strip_publisher_suffix("Oscars 2015 recap - Variety", "Variety"),
            "Oscars 2015 recap"
        );
        assert_eq!(strip_publisher_suffix("Variety", "Variety"), "Variety");
        assert_eq!(strip_publisher_suffix("No tail here", "Deadline"), "No tail here");
    }

    #[tokio::test]
    async fn empty_channel_yields_no_items() {
        let xml = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>x</title></channel></rss>"#;
        let p = GoogleNewsRss::from_fixture_str(xml);
        assert!(p.search(&query()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn garbage_body_is_upstream_error() {
        let p = GoogleNewsRss::from_fixture_str("<html>not rss");
        assert!(matches!(
            p.search(&query()).await,
            Err(PipelineError::Upstream { .. })
        ));
    }
}
