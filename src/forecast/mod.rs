// src/forecast/mod.rs
//! Point forecast of page views for a future date.
//!
//! The dataset is loaded once and shared; the model is re-fit on every request
//! against the page's history up to (excluding) the prediction date.

pub mod arima;
pub mod dataset;
pub mod optimize;

use std::sync::Arc;

use chrono::NaiveDate;
use metrics::histogram;
use tracing::instrument;

use crate::error::{PipelineError, PipelineResult};

pub use arima::Arima;
pub use dataset::{HistoricalDataset, TimeSeriesPoint};

/// Rolling window used to fill missing view counts.
pub const FILL_WINDOW: usize = 30;

/// A time-series model that can be fitted and extrapolated in one go.
pub trait SeriesModel: Send + Sync {
    /// Fit on `series` (oldest first) and return the next `steps` values.
    fn fit_forecast(&self, series: &[f64], steps: usize) -> PipelineResult<Vec<f64>>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastResult {
    pub point_estimate: f64,
    pub steps: usize,
    pub last_observed: NaiveDate,
}

pub struct Forecaster {
    dataset: Arc<HistoricalDataset>,
    model: Arc<dyn SeriesModel>,
}

impl Forecaster {
    pub fn new(dataset: Arc<HistoricalDataset>, model: Arc<dyn SeriesModel>) -> Self {
        Self { dataset, model }
    }

    /// Forecaster using the stock ARIMA(2,1,2).
    pub fn arima(dataset: Arc<HistoricalDataset>) -> Self {
        Self::new(dataset, Arc::new(Arima::default()))
    }

    pub fn predict(&self, page_name: &str, prediction_date: NaiveDate) -> PipelineResult<f64> {
        self.forecast(page_name, prediction_date)
            .map(|r| r.point_estimate)
    }

    #[instrument(skip(self), fields(model = self.model.name()))]
    pub fn forecast(
        &self,
        page_name: &str,
        prediction_date: NaiveDate,
    ) -> PipelineResult<ForecastResult> {
        let last = self
            .dataset
            .last_date(page_name)
            .ok_or_else(|| PipelineError::NotFound(page_name.to_string()))?;
        if prediction_date <= last {
            return Err(PipelineError::InvalidDate {
                requested: prediction_date,
                last,
            });
        }

        let points = self.dataset.points_before(page_name, prediction_date);
        let filled = fill_missing(&points);
        let Some((last_observed, _)) = filled.last().copied() else {
            // history exists but every cell is empty
            return Err(PipelineError::NotFound(page_name.to_string()));
        };

        let steps = forecast_steps(last_observed, prediction_date)?;
        let series: Vec<f64> = filled.iter().map(|(_, v)| *v).collect();

        let t0 = std::time::Instant::now();
        let path = self.model.fit_forecast(&series, steps)?;
        histogram!("forecast_fit_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        let raw = path
            .last()
            .copied()
            .ok_or_else(|| PipelineError::Model("model returned an empty forecast".into()))?;
        let point_estimate = clamp_views(raw);

        tracing::info!(
            observations = series.len(),
            steps,
            raw,
            point_estimate,
            "forecast computed"
        );
        Ok(ForecastResult {
            point_estimate,
            steps,
            last_observed,
        })
    }
}

/// Views cannot be negative; non-finite output is treated as zero.
pub fn clamp_views(v: f64) -> f64 {
    if v.is_finite() {
        v.max(0.0)
    } else {
        0.0
    }
}

/// Whole days between the last observation and the prediction date.
pub fn forecast_steps(last_observed: NaiveDate, prediction_date: NaiveDate) -> PipelineResult<usize> {
    let days = (prediction_date - last_observed).num_days();
    if days <= 0 {
        return Err(PipelineError::InvalidDate {
            requested: prediction_date,
            last: last_observed,
        });
    }
    Ok(days as usize)
}

/// Fill gaps with the trailing mean of up to `FILL_WINDOW` observed values
/// (minimum one). Leading gaps are dropped; a gap with no observation inside
/// the window repeats the previous filled value.
pub fn fill_missing(points: &[TimeSeriesPoint]) -> Vec<(NaiveDate, f64)> {
    let mut out: Vec<(NaiveDate, f64)> = Vec::with_capacity(points.len());
    for (i, pt) in points.iter().enumerate() {
        let value = match pt.views {
            Some(v) => Some(v),
            None => {
                let start = (i + 1).saturating_sub(FILL_WINDOW);
                let observed: Vec<f64> = points[start..=i].iter().filter_map(|p| p.views).collect();
                if observed.is_empty() {
                    out.last().map(|&(_, v)| v)
                } else {
                    Some(observed.iter().sum::<f64>() / observed.len() as f64)
                }
            }
        };
        if let Some(v) = value {
            out.push((pt.date, v));
        }
    }
    out
}
