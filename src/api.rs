// src/api.rs
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::error::PipelineError;
use crate::pipeline::{Pipeline, PredictionRequest};

pub const CACHE_ACTION_HEADER: HeaderName = HeaderName::from_static("x-cache-action");

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/predict", post(predict))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn predict(
    State(state): State<AppState>,
    body: Result<Json<PredictionRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(b) => b,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "malformed request body");
            return PipelineError::Validation(format!("malformed request body: {}", rejection.body_text()))
                .into_response();
        }
    };

    match state.pipeline.run(&request).await {
        Ok(outcome) => {
            let action = HeaderValue::from_static(outcome.cache_action.as_str());
            (
                StatusCode::OK,
                [(CACHE_ACTION_HEADER, action)],
                Json(json!({ "response": outcome.prediction })),
            )
                .into_response()
        }
        Err(e) => e.into_response(),
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.to_string(), "kind": self.kind() });
        (self.status(), Json(body)).into_response()
    }
}
