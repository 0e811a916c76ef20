// src/lib.rs
// Public library surface for the service binary, the CLI and integration tests.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod forecast;
pub mod news;
pub mod page;
pub mod pipeline;
pub mod refine;
pub mod retry;
pub mod telemetry;

pub use crate::api::{router, AppState};
pub use crate::error::{PipelineError, PipelineResult};
pub use crate::pipeline::{Pipeline, PipelineOutcome, PredictionRequest};

use axum::Router;

use crate::config::AppConfig;

/// Load config, wire every collaborator and return the full HTTP app
/// (`/predict`, `/health`, `/metrics`).
pub async fn app() -> anyhow::Result<Router> {
    let cfg = AppConfig::load()?;
    let metrics = telemetry::Metrics::init(cfg.cache.ttl_secs)?;
    let pipeline = Pipeline::from_config(&cfg).await?;
    tracing::info!(
        dataset = %cfg.dataset.path.display(),
        cache = %cfg.cache.backend,
        llm = %cfg.llm.provider,
        "pipeline ready"
    );
    Ok(router(AppState::new(pipeline)).merge(metrics.router()))
}
