//! Chat-completion client.
//!
//! [`CompletionBackend`] is the seam between the session and the remote
//! model. [`OpenRouterClient`] implements it against any OpenAI-compatible
//! `chat/completions` endpoint (OpenRouter by default).
//!
//! Failures are typed ([`CompletionError`]); turning a failure into the
//! user-visible [`FALLBACK_REPLY`] is the caller's decision, made through
//! [`render_reply`].
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry with exponential backoff
//! - Network errors (including timeouts) → retry
//! - Every other status (including 201, 204, ...) and malformed bodies →
//!   fail immediately
//! - Backoff: `retry_backoff_ms × 2^(attempt-1)`, exponent capped at 5

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::CompletionConfig;

/// Reply shown to the user when the completion call fails for any reason.
pub const FALLBACK_REPLY: &str = "Error getting response from the API.";

#[derive(Debug, Error)]
pub enum CompletionError {
    /// The request never produced an HTTP response (DNS, connect, timeout).
    #[error("completion request failed: {0}")]
    Network(String),
    /// The endpoint answered with a status other than 200.
    #[error("completion API error {status}: {body}")]
    Api { status: u16, body: String },
    /// A 200 response whose body lacks `choices[0].message.content`.
    #[error("malformed completion response: {0}")]
    Malformed(String),
}

impl CompletionError {
    /// Short machine-readable kind, used in logs and the HTTP API.
    pub fn kind(&self) -> &'static str {
        match self {
            CompletionError::Network(_) => "network",
            CompletionError::Api { .. } => "api",
            CompletionError::Malformed(_) => "malformed",
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            CompletionError::Network(_) => true,
            CompletionError::Api { status, .. } => *status == 429 || *status >= 500,
            CompletionError::Malformed(_) => false,
        }
    }
}

/// Something that turns a prompt into an answer.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// Render a completion result as chat text, substituting [`FALLBACK_REPLY`]
/// for any failure.
pub fn render_reply(result: Result<String, CompletionError>) -> String {
    match result {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(kind = e.kind(), error = %e, "completion failed, using fallback reply");
            FALLBACK_REPLY.to_string()
        }
    }
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [RequestMessage<'a>; 1],
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// HTTP client for OpenAI-compatible chat-completion endpoints.
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    referer: Option<String>,
    title: Option<String>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl OpenRouterClient {
    /// Build a client with an explicit per-request timeout.
    pub fn new(config: &CompletionConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: api_key.into(),
            model: config.model.clone(),
            referer: config.referer.clone(),
            title: config.title.clone(),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send_once(&self, prompt: &str) -> Result<String, CompletionError> {
        let body = CompletionRequest {
            model: &self.model,
            messages: [RequestMessage {
                role: "user",
                content: prompt,
            }],
        };

        let mut req = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(referer) = &self.referer {
            req = req.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.title {
            req = req.header("X-Title", title);
        }

        let response = req
            .send()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;

        if status != reqwest::StatusCode::OK {
            return Err(CompletionError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        parse_completion(&text)
    }
}

#[async_trait]
impl CompletionBackend for OpenRouterClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let mut attempt = 0u32;
        loop {
            match self.send_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.retry_backoff * (1u32 << (attempt - 1).min(5));
                    tracing::warn!(attempt, ?delay, error = %e, "retrying completion request");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Extract `choices[0].message.content` from a response body.
pub fn parse_completion(body: &str) -> Result<String, CompletionError> {
    let parsed: CompletionResponse =
        serde_json::from_str(body).map_err(|e| CompletionError::Malformed(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| CompletionError::Malformed("missing choices[0].message.content".into()))
}
