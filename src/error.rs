//! Request-path error taxonomy.
//!
//! Every stage of the pipeline returns `PipelineError`; the orchestrator logs it
//! once and the entry points turn it into a status code / message.

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or malformed request fields.
    #[error("validation failed: {0}")]
    Validation(String),

    /// No historical series for the page.
    #[error("no data found for page '{0}'")]
    NotFound(String),

    /// Prediction date is not after the available history.
    #[error("prediction date {requested} must be after the last historical date {last}")]
    InvalidDate {
        requested: chrono::NaiveDate,
        last: chrono::NaiveDate,
    },

    /// News, LLM or content provider unreachable / non-2xx.
    #[error("{service} request failed: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },

    /// Model output did not contain the expected JSON object.
    #[error("could not parse refinement response: {0}")]
    RefinementParse(String),

    /// Cache store unreachable or command failed.
    #[error("cache store error: {0}")]
    Cache(String),

    /// Historical dataset unreadable or malformed.
    #[error("historical dataset error: {0}")]
    Dataset(String),

    /// Numerical failure while fitting or forecasting.
    #[error("forecast model error: {0}")]
    Model(String),
}

impl PipelineError {
    pub fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            message: message.into(),
        }
    }

    /// Stable identifier used in JSON error bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::InvalidDate { .. } => "invalid_date",
            Self::Upstream { .. } => "upstream",
            Self::RefinementParse(_) => "refinement_parse",
            Self::Cache(_) => "cache",
            Self::Dataset(_) => "dataset",
            Self::Model(_) => "model",
        }
    }

    /// Network failures that may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Upstream { .. } | Self::Cache(_))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<redis::RedisError> for PipelineError {
    fn from(e: redis::RedisError) -> Self {
        Self::Cache(e.to_string())
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
