// src/refine/mod.rs
//! Predictor refiner: forecast + news → LLM → strict JSON verdict.

pub mod llm;
pub mod prompt;

use std::sync::Arc;

use metrics::histogram;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{PipelineError, PipelineResult};
use crate::news::NewsItem;
use crate::retry::{with_retry, RetryPolicy};

pub use llm::{build_provider, DynLlmProvider, GeminiProvider, LlmProvider, MockProvider};
pub use prompt::{ChatTurn, PromptTemplate, Role};

/// Final refined prediction, returned to the caller as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinedPrediction {
    pub page_name: String,
    pub initial_predicted_views: f64,
    pub refined_predicted_views: f64,
    pub cache_recommendation: bool,
    pub reasoning: Vec<String>,
}

/// Shape the model must produce. `cache_recommendation` has no default:
/// an answer without it is rejected rather than read as `false`.
#[derive(Debug, Deserialize)]
struct ModelVerdict {
    #[serde(default)]
    initial_predicted_views: Option<f64>,
    #[serde(default, alias = "arima_score")]
    arima_prediction_score: Option<f64>,
    refined_predicted_views: f64,
    cache_recommendation: bool,
    reasoning: Vec<String>,
}

/// Slice from the first `{` to the last `}` (inclusive).
pub fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse and validate the model's answer for `page_name`.
pub fn parse_refinement(
    text: &str,
    page_name: &str,
    initial_estimate: f64,
) -> PipelineResult<RefinedPrediction> {
    let block = extract_json_block(text)
        .ok_or_else(|| PipelineError::RefinementParse("no JSON object in model response".into()))?;
    let verdict: ModelVerdict = serde_json::from_str(block)
        .map_err(|e| PipelineError::RefinementParse(e.to_string()))?;

    if !verdict.refined_predicted_views.is_finite() {
        return Err(PipelineError::RefinementParse(
            "refined_predicted_views is not a finite number".into(),
        ));
    }
    let reasoning: Vec<String> = verdict
        .reasoning
        .into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();
    if reasoning.is_empty() {
        return Err(PipelineError::RefinementParse("reasoning is empty".into()));
    }

    let mut refined = verdict.refined_predicted_views;
    if refined < 0.0 {
        tracing::warn!(refined, "model proposed negative views, clamping to zero");
        refined = 0.0;
    }
    if let Some(echo) = verdict
        .initial_predicted_views
        .or(verdict.arima_prediction_score)
    {
        if (echo - initial_estimate).abs() > 1.0 {
            tracing::debug!(echo, initial_estimate, "model echoed a different initial estimate");
        }
    }

    Ok(RefinedPrediction {
        page_name: page_name.to_string(),
        initial_predicted_views: initial_estimate,
        refined_predicted_views: refined,
        cache_recommendation: verdict.cache_recommendation,
        reasoning,
    })
}

pub struct Refiner {
    provider: DynLlmProvider,
    template: Arc<PromptTemplate>,
    retry: RetryPolicy,
}

impl Refiner {
    pub fn new(provider: DynLlmProvider, template: Arc<PromptTemplate>, retry: RetryPolicy) -> Self {
        Self {
            provider,
            template,
            retry,
        }
    }

    #[instrument(skip(self, news), fields(provider = self.provider.name(), news = news.len()))]
    pub async fn refine(
        &self,
        page_name: &str,
        initial_estimate: f64,
        news: &[NewsItem],
    ) -> PipelineResult<RefinedPrediction> {
        let conversation = self.template.conversation(initial_estimate, news);

        let t0 = std::time::Instant::now();
        let text = with_retry(&self.retry, "llm_complete", || {
            self.provider.complete(&conversation)
        })
        .await?;
        histogram!("llm_roundtrip_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        let refined = parse_refinement(&text, page_name, initial_estimate).inspect_err(|e| {
            tracing::error!(error = %e, "refinement response rejected");
        })?;
        tracing::info!(
            refined = refined.refined_predicted_views,
            cache = refined.cache_recommendation,
            "refinement parsed"
        );
        Ok(refined)
    }
}
