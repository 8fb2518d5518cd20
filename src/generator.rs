//! Answer Generation
//!
//! Grounded answer generation through the Gemini REST API. With the dummy API key the
//! client answers offline by echoing the retrieved context.

use crate::config::GenerationConfig;
use crate::error::{RagError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

pub const DUMMY_API_KEY: &str = "dummy-api-key";
pub const UNKNOWN_ANSWER: &str = "I don't know";
pub const SYSTEM_PROMPT: &str = "You are a factual assistant answering only from context.";

#[async_trait]
pub trait Generator: Send + Sync {
    /// Answer `query` using only `context`.
    async fn generate(&self, context: &str, query: &str) -> Result<String>;
}

/// Prompt that pins the model to the retrieved context.
pub fn grounded_prompt(context: &str, query: &str) -> String {
    format!(
        r#"{}

Answer ONLY using the context below.
If the answer is not present, say exactly:
"{}"

Context:
{}

Question:
{}
"#,
        SYSTEM_PROMPT, UNKNOWN_ANSWER, context, query
    )
}

pub struct GeminiGenerator {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Provider(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            client,
        })
    }

    fn extract_text(response_json: &serde_json::Value) -> Result<String> {
        let parts = response_json["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| RagError::Provider("No content in generation response".to_string()))?;

        let text: String = parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(RagError::Provider("Empty generation response".to_string()));
        }
        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, context: &str, query: &str) -> Result<String> {
        // Offline mode: the context itself is the most faithful answer available
        if self.api_key == DUMMY_API_KEY {
            let answer = context.trim();
            return Ok(if answer.is_empty() {
                UNKNOWN_ANSWER.to_string()
            } else {
                answer.to_string()
            });
        }

        debug!("Generating answer with {}", self.model);
        let body = serde_json::json!({
            "contents": [
                {"role": "user", "parts": [{"text": grounded_prompt(context, query)}]}
            ],
            "generationConfig": {"temperature": 0.1}
        });

        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Provider(format!("Generation API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagError::Provider(format!(
                "Generation API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response.json().await.map_err(|e| {
            RagError::Provider(format!("Failed to parse generation response: {}", e))
        })?;

        Self::extract_text(&response_json)
    }
}
