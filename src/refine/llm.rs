//! LLM provider abstraction: Gemini over REST plus a fixed-response mock.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::refine::prompt::{ChatTurn, PromptTemplate, Role};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Low-level provider: sends a conversation, returns the raw response text.
pub trait LlmProvider: Send + Sync {
    fn complete<'a>(
        &'a self,
        conversation: &'a [ChatTurn],
    ) -> Pin<Box<dyn Future<Output = PipelineResult<String>> + Send + 'a>>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynLlmProvider = Arc<dyn LlmProvider>;

/// Factory: build a provider according to config.
///
/// * `provider = "mock"` (or `LLM_TEST_MODE=mock`) replays the template's worked example.
/// * `provider = "gemini"` calls the hosted model.
pub fn build_provider(cfg: &LlmConfig, template: &PromptTemplate) -> anyhow::Result<DynLlmProvider> {
    match cfg.provider.as_str() {
        "mock" => {
            let fixed = template
                .seed_answer()
                .context("mock provider needs a seed model turn to replay")?;
            Ok(Arc::new(MockProvider::new(fixed)))
        }
        "gemini" => Ok(Arc::new(GeminiProvider::new(cfg)?)),
        other => anyhow::bail!("Unsupported LLM provider: {other}"),
    }
}

/// Gemini `generateContent`. Requires an API key.
pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    generation: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

impl GeminiProvider {
    pub fn new(cfg: &LlmConfig) -> anyhow::Result<Self> {
        if cfg.api_key.is_empty() {
            anyhow::bail!("Gemini provider needs an API key (GEMINI_API_KEY)");
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("pageview-cache-advisor/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("building llm http client")?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            base_url: GEMINI_API_BASE.to_string(),
            generation: GenerationConfig {
                temperature: cfg.temperature,
                top_p: cfg.top_p,
                top_k: cfg.top_k,
                max_output_tokens: cfg.max_output_tokens,
                response_mime_type: "text/plain",
            },
        })
    }

    /// Point the client at a different API root (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}
#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: &'a GenerationConfig,
}
#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}
#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}
#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}
#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Model => "model",
    }
}

impl LlmProvider for GeminiProvider {
    fn complete<'a>(
        &'a self,
        conversation: &'a [ChatTurn],
    ) -> Pin<Box<dyn Future<Output = PipelineResult<String>> + Send + 'a>> {
        Box::pin(async move {
            let req = GenerateRequest {
                contents: conversation
                    .iter()
                    .map(|t| Content {
                        role: role_name(t.role),
                        parts: vec![Part { text: &t.text }],
                    })
                    .collect(),
                generation_config: &self.generation,
            };

            let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
            counter!("llm_calls_total", "provider" => "gemini").increment(1);
            let resp = self
                .http
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&req)
                .send()
                .await
                .map_err(|e| PipelineError::upstream("llm", e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                let snippet: String = body.chars().take(200).collect();
                return Err(PipelineError::upstream(
                    "llm",
                    format!("status {status}: {snippet}"),
                ));
            }

            let body: GenerateResponse = resp
                .json()
                .await
                .map_err(|e| PipelineError::upstream("llm", format!("decoding response: {e}")))?;
            let text: String = body
                .candidates
                .into_iter()
                .next()
                .and_then(|c| c.content)
                .map(|c| c.parts.into_iter().map(|p| p.text).collect())
                .unwrap_or_default();
            if text.trim().is_empty() {
                return Err(PipelineError::upstream("llm", "empty completion"));
            }
            Ok(text)
        })
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

/// Returns the same text for every conversation; used for tests/local runs.
#[derive(Clone)]
pub struct MockProvider {
    pub fixed: String,
}

impl MockProvider {
    pub fn new(fixed: impl Into<String>) -> Self {
        Self {
            fixed: fixed.into(),
        }
    }
}

impl LlmProvider for MockProvider {
    fn complete<'a>(
        &'a self,
        _conversation: &'a [ChatTurn],
    ) -> Pin<Box<dyn Future<Output = PipelineResult<String>> + Send + 'a>> {
        let out = self.fixed.clone();
        Box::pin(async move {
            counter!("llm_calls_total", "provider" => "mock").increment(1);
            Ok(out)
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
