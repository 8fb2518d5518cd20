//! HTTP Embedder
//!
//! Embeds text through an OpenAI-compatible `/embeddings` endpoint.

use crate::config::EmbeddingConfig;
use crate::embedding::{validate_inputs, Embedding, EmbeddingProvider};
use crate::error::{RagError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Embedding client using an OpenAI-compatible API
pub struct HttpEmbedder {
    api_key: String,
    base_url: String,
    model: String, // e.g., "text-embedding-3-small"
    dimension: usize,
    max_tokens: usize,
    client: reqwest::Client,
}

impl HttpEmbedder {
    /// Requests that take longer than `config.timeout_secs` fail with a provider error.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Provider(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dimension: config.dimension,
            max_tokens: config.max_tokens,
            client,
        })
    }

    fn parse_response(
        &self,
        response_json: &serde_json::Value,
        expected: usize,
    ) -> Result<Vec<Embedding>> {
        let data = response_json
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| RagError::Provider("No embedding data in response".to_string()))?;

        if data.len() != expected {
            return Err(RagError::Provider(format!(
                "Expected {} embeddings, got {}",
                expected,
                data.len()
            )));
        }

        // The API may reorder items; `index` restores input order
        let mut indexed: Vec<(usize, Embedding)> = Vec::with_capacity(data.len());
        for (pos, item) in data.iter().enumerate() {
            let index = item
                .get("index")
                .and_then(|i| i.as_u64())
                .map(|i| i as usize)
                .unwrap_or(pos);

            let embedding: Embedding = item
                .get("embedding")
                .and_then(|e| e.as_array())
                .ok_or_else(|| RagError::Provider("No embedding vector in response".to_string()))?
                .iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect();

            if embedding.len() != self.dimension {
                return Err(RagError::DimensionMismatch {
                    expected: self.dimension,
                    got: embedding.len(),
                });
            }
            indexed.push((index, embedding));
        }
        indexed.sort_by_key(|(index, _)| *index);

        Ok(indexed.into_iter().map(|(_, e)| e).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        validate_inputs(texts, self.max_tokens)?;
        debug!("Embedding {} texts with {}", texts.len(), self.model);

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
            "dimensions": self.dimension,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Provider(format!("Embedding API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagError::Provider(format!(
                "Embedding API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response.json().await.map_err(|e| {
            RagError::Provider(format!("Failed to parse embedding response: {}", e))
        })?;

        self.parse_response(&response_json, texts.len())
    }
}
