//! TOML configuration with documented defaults.
//!
//! Every section and key is optional; an absent file yields
//! [`Config::default`]. The completion API key is read from the
//! `OPENROUTER_API_KEY` environment variable when the file does not set one.
//!
//! ```toml
//! [completion]
//! api_url = "https://openrouter.ai/api/v1/chat/completions"
//! model = "deepseek/deepseek-r1-distill-qwen-32b:free"
//! timeout_secs = 60
//! max_retries = 2
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [retrieval]
//! k = 3
//!
//! [embedding]
//! provider = "hash"
//! batch_size = 64
//! max_retries = 5
//! retry_backoff_ms = 1000
//!
//! [server]
//! bind = "127.0.0.1:8501"
//! max_body_mb = 64
//! ```

use anyhow::{bail, Context, Result};
use pdfchat_core::chunk::{ChunkParams, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use pdfchat_core::embedding::DEFAULT_HASH_DIMS;
use pdfchat_core::retrieve::DEFAULT_TOP_K;
use serde::Deserialize;
use std::path::Path;

/// Environment variable consulted for the completion API key.
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub completion: CompletionConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CompletionConfig {
    pub api_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Sent as `HTTP-Referer` for OpenRouter attribution.
    pub referer: Option<String>,
    /// Sent as `X-Title` for OpenRouter attribution.
    pub title: Option<String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_url: "https://openrouter.ai/api/v1/chat/completions".to_string(),
            model: "deepseek/deepseek-r1-distill-qwen-32b:free".to_string(),
            api_key: None,
            timeout_secs: 60,
            max_retries: 2,
            retry_backoff_ms: 1000,
            referer: Some("http://localhost:8501".to_string()),
            title: Some("Chat with PDFs".to_string()),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkParams {
        ChunkParams {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: DEFAULT_TOP_K }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `hash`, `openai`, or `local`.
    pub provider: String,
    pub model: Option<String>,
    pub dims: Option<usize>,
    /// Base URL for the `openai` provider (e.g. `https://api.openai.com/v1`).
    pub url: Option<String>,
    pub batch_size: usize,
    pub max_retries: u32,
    /// Base delay before the first retry; doubles on each further attempt.
    pub retry_backoff_ms: u64,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hash".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            retry_backoff_ms: 1000,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn hash_dims(&self) -> usize {
        self.dims.unwrap_or(DEFAULT_HASH_DIMS)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Largest accepted request body, in MiB (uploads are base64 JSON).
    pub max_body_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8501".to_string(),
            max_body_mb: 64,
        }
    }
}

impl Config {
    /// Resolve the API key: file value first, then the environment.
    pub fn api_key(&self) -> Option<String> {
        self.completion
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking
            .params()
            .validate()
            .context("invalid [chunking] section")?;

        if self.retrieval.k == 0 {
            bail!("retrieval.k must be >= 1");
        }

        if self.completion.api_url.trim().is_empty() {
            bail!("completion.api_url must not be empty");
        }
        if self.completion.model.trim().is_empty() {
            bail!("completion.model must not be empty");
        }
        if self.completion.timeout_secs == 0 {
            bail!("completion.timeout_secs must be > 0");
        }

        if self.server.max_body_mb == 0 {
            bail!("server.max_body_mb must be > 0");
        }

        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        match self.embedding.provider.as_str() {
            "hash" => {
                if self.embedding.dims == Some(0) {
                    bail!("embedding.dims must be > 0");
                }
            }
            "openai" => {
                if self.embedding.model.is_none() {
                    bail!("embedding.model must be specified when provider is 'openai'");
                }
            }
            "local" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be hash, openai, or local.",
                other
            ),
        }

        Ok(())
    }
}

/// Load configuration from `path`, or defaults when `path` is `None`.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            parse_config(&content)?
        }
        None => Config::default(),
    };
    config.validate()?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_values() {
        let c = Config::default();
        assert_eq!(c.chunking.chunk_size, 1000);
        assert_eq!(c.chunking.chunk_overlap, 200);
        assert_eq!(c.retrieval.k, 3);
        assert_eq!(
            c.completion.api_url,
            "https://openrouter.ai/api/v1/chat/completions"
        );
        assert_eq!(c.embedding.provider, "hash");
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let c = parse_config("[retrieval]\nk = 5\n\n[completion]\nmodel = \"m\"\n").unwrap();
        assert_eq!(c.retrieval.k, 5);
        assert_eq!(c.completion.model, "m");
        assert_eq!(c.chunking.chunk_size, 1000);
        assert_eq!(c.completion.max_retries, 2);
    }

    #[test]
    fn test_rejects_overlap_not_below_size() {
        let c = parse_config("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let c = parse_config("[embedding]\nprovider = \"magic\"\n").unwrap();
        let err = c.validate().unwrap_err().to_string();
        assert!(err.contains("Unknown embedding provider"));
    }

    #[test]
    fn test_openai_provider_requires_model() {
        let c = parse_config("[embedding]\nprovider = \"openai\"\n").unwrap();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_embedding_backoff_is_configurable() {
        assert_eq!(Config::default().embedding.retry_backoff_ms, 1000);
        let c = parse_config("[embedding]\nretry_backoff_ms = 5\n").unwrap();
        assert_eq!(c.embedding.retry_backoff_ms, 5);
        assert_eq!(c.embedding.max_retries, 5);
    }

    #[test]
    fn test_api_key_from_file_wins() {
        let c = parse_config("[completion]\napi_key = \"sk-file\"\n").unwrap();
        assert_eq!(c.api_key().as_deref(), Some("sk-file"));
    }

    #[test]
    fn test_load_missing_file_errors() {
        let err = load_config(Some(Path::new("/nonexistent/pdfchat.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
