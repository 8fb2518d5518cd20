//! Hashing Embedder
//!
//! Offline, deterministic text embeddings built from hashed word and character-trigram
//! features. Questions sharing words or spelling land close together in L2 space.

use crate::embedding::{tokenize, validate_inputs, Embedding, EmbeddingProvider};
use crate::error::Result;
use async_trait::async_trait;

/// Word features count more than trigram features.
const WORD_WEIGHT: f32 = 2.0;
const TRIGRAM_WEIGHT: f32 = 1.0;

pub struct HashingEmbedder {
    dimension: usize,
    max_tokens: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize, max_tokens: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            max_tokens,
        }
    }

    /// Embed one string without validation.
    pub fn embed_text(&self, text: &str) -> Embedding {
        let mut embedding = vec![0.0f32; self.dimension];

        for token in tokenize(text) {
            let idx = (fnv1a(token.as_bytes()) % self.dimension as u64) as usize;
            embedding[idx] += WORD_WEIGHT;

            // Padded so short words still yield a trigram
            let padded: Vec<char> = format!(" {} ", token).chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                let idx = (fnv1a(trigram.as_bytes()) % self.dimension as u64) as usize;
                embedding[idx] += TRIGRAM_WEIGHT;
            }
        }

        // Normalize to unit vector
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for e in &mut embedding {
                *e /= norm;
            }
        }

        embedding
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        // Same shape as all-MiniLM-L6-v2
        Self::new(384, 256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        validate_inputs(texts, self.max_tokens)?;
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in bytes {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}
