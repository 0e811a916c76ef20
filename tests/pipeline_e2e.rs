// tests/pipeline_e2e.rs
//
// Full pipeline with the real ARIMA forecaster, the RSS parser fed from a stored
// Google News response, the mock LLM replaying the prompt's worked example, and
// the in-memory cache store.

use std::sync::Arc;
use std::time::Duration;

use pageview_cache_advisor::cache::{CacheAction, CacheGateway, MemoryStore, StaticContentSource};
use pageview_cache_advisor::config::{LlmConfig, NewsConfig};
use pageview_cache_advisor::forecast::{Forecaster, HistoricalDataset};
use pageview_cache_advisor::news::{GoogleNewsRss, NewsRetriever};
use pageview_cache_advisor::refine::{build_provider, PromptTemplate, Refiner};
use pageview_cache_advisor::retry::RetryPolicy;
use pageview_cache_advisor::{Pipeline, PipelineError, PredictionRequest};

const DATASET: &str = include_str!("fixtures/cleaned_data.csv");
const RSS: &str = include_str!("fixtures/google_news_rss.xml");

fn build(store: Arc<MemoryStore>) -> Pipeline {
    let dataset = Arc::new(HistoricalDataset::from_reader(DATASET.as_bytes()).expect("fixture csv"));
    let news = NewsRetriever::new(
        Arc::new(GoogleNewsRss::from_fixture_str(RSS)),
        NewsConfig::default(),
        RetryPolicy::none(),
    );
    let template = PromptTemplate::builtin().expect("builtin prompt");
    let llm_cfg = LlmConfig {
        provider: "mock".into(),
        ..LlmConfig::default()
    };
    let provider = build_provider(&llm_cfg, &template).expect("mock provider");
    let refiner = Refiner::new(provider, Arc::new(template), RetryPolicy::none());
    let cache = CacheGateway::new(
        store,
        Arc::new(StaticContentSource::always("<html>article</html>")),
        Duration::from_secs(7200),
        RetryPolicy::none(),
    );
    Pipeline::new(
        Arc::new(Forecaster::arima(dataset)),
        Arc::new(news),
        Arc::new(refiner),
        Arc::new(cache),
    )
}

#[tokio::test]
async fn film_page_end_to_end() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = build(store.clone());

    let outcome = pipeline
        .run(&PredictionRequest::new("2015_in_film_en", "2015-12-31"))
        .await
        .expect("pipeline should succeed");

    let p = &outcome.prediction;
    assert_eq!(p.page_name, "2015_in_film_en");
    assert!(p.initial_predicted_views.is_finite() && p.initial_predicted_views >= 0.0);
    assert!(p.refined_predicted_views >= 0.0);
    assert!(p.cache_recommendation);
    assert!(!p.reasoning.is_empty());

    assert_eq!(outcome.cache_action, CacheAction::Stored);
    assert_eq!(store.keys(), vec!["in_film".to_string()]);
}

#[tokio::test]
async fn short_history_still_forecasts() {
    let pipeline = build(Arc::new(MemoryStore::new()));
    let outcome = pipeline
        .run(&PredictionRequest::new("Tiny_Page_fr", "2016-01-02"))
        .await
        .expect("short series falls back to a simple model");
    assert!(outcome.prediction.initial_predicted_views >= 0.0);
}

#[tokio::test]
async fn page_without_any_values_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = build(store.clone());
    let err = pipeline
        .run(&PredictionRequest::new("Empty_Page_en", "2015-12-31"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)), "got {err:?}");
    assert!(store.keys().is_empty());
}

#[tokio::test]
async fn validation_happens_before_anything_else() {
    let pipeline = build(Arc::new(MemoryStore::new()));
    let req = PredictionRequest {
        page_name: Some("2015_in_film_en".into()),
        prediction_date: Some("2015/12/31".into()),
    };
    let err = pipeline.run(&req).await.unwrap_err();
    assert_eq!(err.kind(), "validation");
    assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
}
