// src/pipeline.rs
//! Request orchestration: validate → forecast → news → refine → cache.
//!
//! Stages run strictly in order. A failure at any stage stops the request, so
//! nothing before the cache step can leave a cache mutation behind.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::NaiveDate;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::cache::{CacheAction, CacheGateway};
use crate::config::AppConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::forecast::{dataset::HistoricalDataset, Forecaster};
use crate::news::{GoogleNewsRss, NewsRetriever};
use crate::refine::{build_provider, PromptTemplate, RefinedPrediction, Refiner};
use crate::retry::RetryPolicy;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Request as received; every field may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionRequest {
    #[serde(default)]
    pub page_name: Option<String>,
    #[serde(default)]
    pub prediction_date: Option<String>,
}

impl PredictionRequest {
    pub fn new(page_name: impl Into<String>, prediction_date: impl Into<String>) -> Self {
        Self {
            page_name: Some(page_name.into()),
            prediction_date: Some(prediction_date.into()),
        }
    }

    pub fn validate(&self) -> PipelineResult<ValidRequest> {
        let page_name = self
            .page_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PipelineError::Validation("page_name is required".into()))?;
        let raw_date = self
            .prediction_date
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PipelineError::Validation("prediction_date is required".into()))?;
        let prediction_date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT).map_err(|_| {
            PipelineError::Validation(format!(
                "prediction_date '{raw_date}' is not a YYYY-MM-DD date"
            ))
        })?;
        Ok(ValidRequest {
            page_name: page_name.to_string(),
            prediction_date,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRequest {
    pub page_name: String,
    pub prediction_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub prediction: RefinedPrediction,
    pub cache_action: CacheAction,
}

pub struct Pipeline {
    forecaster: Arc<Forecaster>,
    news: Arc<NewsRetriever>,
    refiner: Arc<Refiner>,
    cache: Arc<CacheGateway>,
}

impl Pipeline {
    pub fn new(
        forecaster: Arc<Forecaster>,
        news: Arc<NewsRetriever>,
        refiner: Arc<Refiner>,
        cache: Arc<CacheGateway>,
    ) -> Self {
        Self {
            forecaster,
            news,
            refiner,
            cache,
        }
    }

    /// Wire production collaborators from config.
    pub async fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let retry = RetryPolicy::from(&cfg.retry);

        let dataset = HistoricalDataset::load(&cfg.dataset.path)
            .with_context(|| format!("loading dataset {}", cfg.dataset.path.display()))?;
        let forecaster = Forecaster::arima(Arc::new(dataset));

        let rss = GoogleNewsRss::from_config(&cfg.news)?;
        let news = NewsRetriever::new(Arc::new(rss), cfg.news.clone(), retry);

        let template = PromptTemplate::load(cfg.llm.prompt_path.as_deref().map(std::path::Path::new))?;
        let provider = build_provider(&cfg.llm, &template)?;
        tracing::info!(provider = provider.name(), model = %cfg.llm.model, "llm provider ready");
        let refiner = Refiner::new(provider, Arc::new(template), retry);

        let cache = CacheGateway::from_config(&cfg.cache, retry).await?;

        Ok(Self::new(
            Arc::new(forecaster),
            Arc::new(news),
            Arc::new(refiner),
            Arc::new(cache),
        ))
    }

    #[instrument(skip(self, request), fields(page = request.page_name.as_deref().unwrap_or("")))]
    pub async fn run(&self, request: &PredictionRequest) -> PipelineResult<PipelineOutcome> {
        counter!("pipeline_requests_total").increment(1);
        let t0 = Instant::now();
        let result = self.run_stages(request).await;
        histogram!("pipeline_stage_ms", "stage" => "total").record(ms_since(t0));

        match &result {
            Ok(outcome) => tracing::info!(
                refined = outcome.prediction.refined_predicted_views,
                cache_action = outcome.cache_action.as_str(),
                "prediction complete"
            ),
            Err(e) => {
                counter!("pipeline_errors_total", "kind" => e.kind()).increment(1);
                if matches!(e, PipelineError::Validation(_)) {
                    tracing::warn!(error = %e, "request rejected");
                } else {
                    tracing::error!(kind = e.kind(), error = %e, "pipeline failed");
                }
            }
        }
        result
    }

    async fn run_stages(&self, request: &PredictionRequest) -> PipelineResult<PipelineOutcome> {
        let req = request.validate()?;

        let t = Instant::now();
        let forecaster = Arc::clone(&self.forecaster);
        let page = req.page_name.clone();
        let date = req.prediction_date;
        let initial = tokio::task::spawn_blocking(move || forecaster.predict(&page, date))
            .await
            .map_err(|e| PipelineError::Model(format!("forecast task failed: {e}")))??;
        histogram!("pipeline_stage_ms", "stage" => "forecast").record(ms_since(t));

        let t = Instant::now();
        let news = self.news.search(&req.page_name, req.prediction_date).await?;
        histogram!("pipeline_stage_ms", "stage" => "news").record(ms_since(t));

        let t = Instant::now();
        let prediction = self.refiner.refine(&req.page_name, initial, &news).await?;
        histogram!("pipeline_stage_ms", "stage" => "refine").record(ms_since(t));

        let t = Instant::now();
        let cache_action = self
            .cache
            .should_cache(prediction.cache_recommendation, &req.page_name)
            .await?;
        histogram!("pipeline_stage_ms", "stage" => "cache").record(ms_since(t));

        Ok(PipelineOutcome {
            prediction,
            cache_action,
        })
    }
}

fn ms_since(t: Instant) -> f64 {
    t.elapsed().as_secs_f64() * 1_000.0
}
