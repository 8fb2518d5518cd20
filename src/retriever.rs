//! Retriever
//!
//! Embeds a query and maps the index's nearest neighbors back to corpus rows.

use crate::config::SearchParams;
use crate::corpus::{Corpus, CorpusRow};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::{BuiltIndex, NearestNeighbors};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// A retrieved row and its embedding distance to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedRow {
    pub row: CorpusRow,
    pub distance: f32,
}

/// Retrieved rows, nearest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub rows: Vec<RetrievedRow>,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn positions(&self) -> Vec<usize> {
        self.rows.iter().map(|r| r.row.id).collect()
    }

    pub fn answers(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|r| r.row.answer.as_str())
    }
}

pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder }
    }

    /// Top-`top_k` rows for `query`. `top_k` above the corpus size is clamped.
    pub async fn retrieve(
        &self,
        query: &str,
        index: &BuiltIndex,
        corpus: &Corpus,
        top_k: usize,
        params: &SearchParams,
    ) -> Result<RetrievalResult> {
        if top_k == 0 {
            return Err(RagError::Configuration("top_k must be at least 1".to_string()));
        }
        index.check_corpus(corpus)?;

        let k = top_k.min(corpus.len());
        let query_vector = self.embedder.embed(query).await?;
        let neighbors = index.index.search(&query_vector, k, params)?;

        let rows = neighbors
            .into_iter()
            .map(|n| {
                corpus
                    .get(n.id)
                    .map(|row| RetrievedRow {
                        row: row.clone(),
                        distance: n.distance,
                    })
                    .ok_or(RagError::DataMismatch {
                        index_rows: index.index.len(),
                        corpus_rows: corpus.len(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "Retrieved {} rows from {} index for '{}'",
            rows.len(),
            index.index.kind(),
            query
        );

        Ok(RetrievalResult { rows })
    }
}
