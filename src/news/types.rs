// src/news/types.rs
use chrono::NaiveDate;

use crate::error::PipelineResult;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct NewsItem {
    pub title: String,
    pub publisher: String,
    pub summary: String,
}

/// What to search for, already derived from the page identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsQuery {
    pub topic: String,
    pub start: NaiveDate, // inclusive
    pub end: NaiveDate,   // inclusive
    pub language: String,
    pub country: String,
    pub max_results: usize,
}

#[async_trait::async_trait]
pub trait NewsProvider: Send + Sync {
    async fn search(&self, query: &NewsQuery) -> PipelineResult<Vec<NewsItem>>;
    fn name(&self) -> &'static str;
}
