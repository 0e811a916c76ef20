// src/telemetry.rs
//! Tracing subscriber and Prometheus recorder setup.

use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder (first call only) and publish the cache TTL.
    pub fn init(cache_ttl_secs: u64) -> anyhow::Result<Self> {
        let handle = HANDLE
            .get_or_try_init(|| {
                let handle = PrometheusBuilder::new()
                    .install_recorder()
                    .context("prometheus: install recorder")?;
                describe();
                Ok::<_, anyhow::Error>(handle)
            })?
            .clone();

        gauge!("cache_ttl_seconds").set(cache_ttl_secs as f64);
        Ok(Self { handle })
    }

    /// `/metrics` in the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe() {
    describe_counter!("pipeline_requests_total", "Prediction requests received");
    describe_counter!("pipeline_errors_total", "Failed requests by error kind");
    describe_histogram!(
        "pipeline_stage_ms",
        Unit::Milliseconds,
        "Latency per pipeline stage"
    );
    describe_counter!("cache_hits_total", "Recommended pages already cached");
    describe_counter!("cache_misses_total", "Recommended pages fetched and stored");
    describe_counter!("cache_invalidations_total", "Cache deletes issued");
    describe_counter!("news_items_total", "News items handed to the refiner");
    describe_counter!("llm_calls_total", "Calls made to the LLM provider");
    describe_counter!("pipeline_retries_total", "Retries of transient failures");
    describe_histogram!("forecast_fit_ms", Unit::Milliseconds, "ARIMA fit and forecast time");
    describe_histogram!("news_search_ms", Unit::Milliseconds, "News search round trip");
    describe_histogram!("llm_roundtrip_ms", Unit::Milliseconds, "LLM completion round trip");
    describe_counter!("news_provider_errors_total", "Failed news provider requests");
    describe_counter!("content_fetch_errors_total", "Failed page content fetches");
    describe_gauge!("cache_ttl_seconds", Unit::Seconds, "TTL applied to cached pages");
}

const DEFAULT_FILTER: &str = "pageview_cache_advisor=info,warn";

/// Install the global subscriber on stderr; stdout is left to program output.
/// `RUST_LOG` picks levels, `LOG_FORMAT=json` switches to JSON lines. Safe to
/// call more than once.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init()
    };
    if res.is_ok() {
        tracing::debug!(json, "tracing initialized");
    }
}
