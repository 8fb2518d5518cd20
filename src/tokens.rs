//! Token Accounting
//!
//! BPE token counts (`cl100k_base`) for the one-time ingestion cost and for every
//! answered query.

use crate::corpus::Corpus;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use tiktoken_rs::CoreBPE;

lazy_static! {
    static ref CL100K: CoreBPE =
        tiktoken_rs::cl100k_base().expect("cl100k_base ranks are bundled with tiktoken-rs");
}

pub fn count_tokens(text: &str) -> usize {
    CL100K.encode_ordinary(text).len()
}

/// Embedding-side cost of a corpus, paid once when its indexes are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionStats {
    /// Corpus rows
    pub docs: usize,
    /// Chunks of at most `chunk_tokens` tokens each
    pub chunks: usize,
    pub total_chunk_tokens: usize,
}

impl IngestionStats {
    /// Each row (question and answer) is split into chunks of at most `chunk_tokens`
    /// tokens. A row always yields at least one chunk.
    pub fn from_corpus(corpus: &Corpus, chunk_tokens: usize) -> Self {
        let chunk_tokens = chunk_tokens.max(1);
        let mut stats = Self {
            docs: corpus.len(),
            chunks: 0,
            total_chunk_tokens: 0,
        };

        for row in corpus.rows() {
            let tokens = count_tokens(&row.question) + count_tokens(&row.answer);
            stats.chunks += tokens.div_ceil(chunk_tokens).max(1);
            stats.total_chunk_tokens += tokens;
        }
        stats
    }
}

/// Tokens spent on one query, split by prompt section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub system_tokens: usize,
    pub question_tokens: usize,
    pub retrieved_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

impl TokenUsage {
    pub fn for_query(system_prompt: &str, question: &str, context: &str, output: &str) -> Self {
        let system_tokens = count_tokens(system_prompt);
        let question_tokens = count_tokens(question);
        let retrieved_tokens = count_tokens(context);
        let output_tokens = count_tokens(output);

        Self {
            system_tokens,
            question_tokens,
            retrieved_tokens,
            output_tokens,
            total_tokens: system_tokens + question_tokens + retrieved_tokens + output_tokens,
        }
    }
}
