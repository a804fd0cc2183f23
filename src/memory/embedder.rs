//! Embedding provider backed by the Ollama HTTP API.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::warn;

use super::EmbeddingProvider;
use crate::config::EmbedderConfig;
use crate::utils::truncate_chars;

pub struct OllamaEmbedder {
    client: Client,
    api_base: String,
    model: String,
    max_text_chars: usize,
}

impl OllamaEmbedder {
    pub fn new(config: EmbedderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build embedding HTTP client")?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model,
            max_text_chars: config.max_text_chars,
        })
    }

    /// Pull the vector out of an `/api/embed` response.
    ///
    /// Current servers answer `{"embeddings": [[...]]}`; older ones answer
    /// `{"embedding": [...]}`.
    fn parse_response(data: &Value) -> Result<Vec<f32>> {
        let vector = data["embeddings"]
            .get(0)
            .or_else(|| data.get("embedding"))
            .and_then(Value::as_array)
            .context("No embedding in provider response")?;

        let embedding: Vec<f32> = vector
            .iter()
            .map(|x| x.as_f64().map(|f| f as f32))
            .collect::<Option<_>>()
            .context("Non-numeric embedding component")?;

        if embedding.is_empty() {
            bail!("Provider returned an empty embedding");
        }
        Ok(embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let input = truncate_chars(text, self.max_text_chars);
        let resp = self
            .client
            .post(format!("{}/embed", self.api_base))
            .json(&json!({ "model": self.model, "input": input }))
            .send()
            .await?
            .error_for_status()?;

        let data: Value = resp.json().await?;
        Self::parse_response(&data)
    }
}

/// Call `provider` and absorb any failure.
///
/// The text is cut to `max_chars` first. Failures (including timeouts and
/// empty vectors) are logged once and reported as `None`.
pub async fn embed_or_none(
    provider: &dyn EmbeddingProvider,
    text: &str,
    max_chars: usize,
) -> Option<Vec<f32>> {
    let input = truncate_chars(text, max_chars);
    match provider.embed(input).await {
        Ok(embedding) if !embedding.is_empty() => Some(embedding),
        Ok(_) => {
            warn!("Embedding provider {} returned an empty vector", provider.model_name());
            None
        }
        Err(e) => {
            warn!("Embedding provider {} failed: {:#}", provider.model_name(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_current_format() {
        let data = json!({ "model": "m", "embeddings": [[0.5, -1.0, 2.0]] });
        assert_eq!(OllamaEmbedder::parse_response(&data).unwrap(), vec![0.5, -1.0, 2.0]);
    }

    #[test]
    fn test_parse_legacy_format() {
        let data = json!({ "embedding": [1.0, 2.0] });
        assert_eq!(OllamaEmbedder::parse_response(&data).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_parse_rejects_empty_and_missing() {
        assert!(OllamaEmbedder::parse_response(&json!({ "embeddings": [] })).is_err());
        assert!(OllamaEmbedder::parse_response(&json!({ "embedding": [] })).is_err());
        assert!(OllamaEmbedder::parse_response(&json!({ "error": "model not found" })).is_err());
    }

    struct Failing;

    #[async_trait]
    impl EmbeddingProvider for Failing {
        fn model_name(&self) -> &str {
            "failing"
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn test_embed_or_none_absorbs_failure() {
        assert!(embed_or_none(&Failing, "hello", 100).await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_an_error() {
        let embedder = OllamaEmbedder::new(EmbedderConfig {
            api_base: "http://127.0.0.1:9/api".to_string(),
            timeout: std::time::Duration::from_millis(200),
            ..EmbedderConfig::default()
        })
        .unwrap();
        assert!(embed_or_none(&embedder, "hello", 100).await.is_none());
    }
}
