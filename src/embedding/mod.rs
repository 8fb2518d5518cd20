//! Embedding Providers
//!
//! Maps text to fixed-dimension vectors. Providers are constructed explicitly and
//! shared as `Arc<dyn EmbeddingProvider>`, so tests can swap in a stub.

pub mod hashing;
pub mod http;

pub use hashing::HashingEmbedder;
pub use http::HttpEmbedder;

use crate::config::{EmbedderKind, EmbeddingConfig};
use crate::error::{RagError, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

/// Vector embedding (simple f32 vector)
pub type Embedding = Vec<f32>;

lazy_static! {
    static ref TOKEN_RE: Regex = Regex::new(r"[[:alnum:]]+").unwrap();
}

/// Lower-cased word tokens, shared by the providers and the overlap scorer.
pub fn tokenize(text: &str) -> Vec<String> {
    TOKEN_RE
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name for logs (e.g., "hashing", "openai")
    fn name(&self) -> &str;

    /// Output dimension, identical for every vector this provider returns.
    fn dimension(&self) -> usize;

    /// Longest input, in word tokens, the provider accepts.
    fn max_tokens(&self) -> usize;

    /// Embed a batch; the output has one vector per input, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Embed a single string.
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Provider(format!("{} returned no vector", self.name())))
    }
}

/// Shared input validation: non-empty batch, no blank strings, no overlong strings.
pub fn validate_inputs(texts: &[String], max_tokens: usize) -> Result<()> {
    if texts.is_empty() {
        return Err(RagError::Provider("Cannot embed an empty batch".to_string()));
    }
    for (i, text) in texts.iter().enumerate() {
        if text.trim().is_empty() {
            return Err(RagError::Provider(format!("Input {} is empty", i)));
        }
        let tokens = TOKEN_RE.find_iter(text).count();
        if tokens > max_tokens {
            return Err(RagError::Provider(format!(
                "Input {} has {} tokens, exceeding the maximum of {}",
                i, tokens, max_tokens
            )));
        }
    }
    Ok(())
}

/// Build the provider named by the configuration.
pub fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    if config.dimension == 0 {
        return Err(RagError::Configuration(
            "Embedding dimension must be positive".to_string(),
        ));
    }
    let provider: Arc<dyn EmbeddingProvider> = match config.kind {
        EmbedderKind::Hashing => {
            Arc::new(HashingEmbedder::new(config.dimension, config.max_tokens))
        }
        EmbedderKind::OpenAi => Arc::new(HttpEmbedder::new(config)?),
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        assert_eq!(tokenize("What is EMI?"), vec!["what", "is", "emi"]);
        assert!(tokenize("  ?! ").is_empty());
    }

    #[test]
    fn test_validate_inputs() {
        assert!(validate_inputs(&[], 10).is_err());
        assert!(validate_inputs(&["  ".to_string()], 10).is_err());
        assert!(validate_inputs(&["one two three".to_string()], 2).is_err());
        assert!(validate_inputs(&["one two".to_string()], 2).is_ok());
    }
}
