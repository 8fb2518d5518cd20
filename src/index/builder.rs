//! Index Builder
//!
//! Embeds every corpus question and builds the requested topology, recording which
//! corpus snapshot the index belongs to.

use crate::config::IndexTopology;
use crate::corpus::Corpus;
use crate::embedding::{Embedding, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::index::{NearestNeighbors, VectorIndex};
use chrono::{DateTime, Utc};
use std::time::Instant;
use tracing::info;

/// An index plus the corpus snapshot it was built from.
#[derive(Debug, Clone)]
pub struct BuiltIndex {
    pub index: VectorIndex,
    pub topology: IndexTopology,
    pub corpus_rows: usize,
    pub corpus_fingerprint: u64,
    pub built_at: DateTime<Utc>,
}

impl BuiltIndex {
    pub fn embeddings(&self) -> &[Embedding] {
        self.index.embeddings()
    }

    /// Fail when `corpus` is not the snapshot this index was built from.
    pub fn check_corpus(&self, corpus: &Corpus) -> Result<()> {
        if self.index.len() != corpus.len()
            || self.corpus_rows != corpus.len()
            || self.corpus_fingerprint != corpus.fingerprint()
        {
            return Err(RagError::DataMismatch {
                index_rows: self.index.len(),
                corpus_rows: corpus.len(),
            });
        }
        Ok(())
    }
}

/// Embed the corpus questions and build `topology` over them.
pub async fn build_index(
    corpus: &Corpus,
    embedder: &dyn EmbeddingProvider,
    topology: IndexTopology,
) -> Result<BuiltIndex> {
    if corpus.is_empty() {
        return Err(RagError::Configuration(
            "Cannot build an index over an empty corpus".to_string(),
        ));
    }

    let started = Instant::now();
    let embeddings = embedder.embed_batch(&corpus.questions()).await?;
    if embeddings.len() != corpus.len() {
        return Err(RagError::Provider(format!(
            "{} returned {} embeddings for {} rows",
            embedder.name(),
            embeddings.len(),
            corpus.len()
        )));
    }

    let index = VectorIndex::build(embeddings, topology)?;
    info!(
        "Built {} index over {} rows (dim {}) in {:.2?}",
        topology,
        index.len(),
        index.dimension(),
        started.elapsed()
    );

    Ok(BuiltIndex {
        index,
        topology,
        corpus_rows: corpus.len(),
        corpus_fingerprint: corpus.fingerprint(),
        built_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;

    fn loan_corpus() -> Corpus {
        Corpus::from_pairs([
            ("What is APR?", "Annual Percentage Rate"),
            ("What is EMI?", "Equated Monthly Installment"),
            ("What is a grace period?", "A period after due date with no penalty"),
            ("Can I prepay my loan?", "Yes, prepayment is allowed after six EMIs"),
            ("What is a credit score?", "A number summarising your credit history"),
            ("What is collateral?", "An asset pledged as security for a loan"),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_build_records_corpus_snapshot() {
        let corpus = loan_corpus();
        let embedder = HashingEmbedder::default();
        let built = build_index(&corpus, &embedder, IndexTopology::Flat).await.unwrap();

        assert_eq!(built.corpus_rows, 6);
        assert_eq!(built.embeddings().len(), 6);
        assert!(built.check_corpus(&corpus).is_ok());
    }

    #[tokio::test]
    async fn test_ivf_on_six_rows_reduces_nlist() {
        let corpus = loan_corpus();
        let embedder = HashingEmbedder::default();
        let built = build_index(&corpus, &embedder, IndexTopology::Ivf { nlist: 10 })
            .await
            .unwrap();

        match &built.index {
            VectorIndex::Ivf(ivf) => assert_eq!(ivf.nlist(), 3),
            other => panic!("expected ivf index, got {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_stale_index_is_detected() {
        let mut corpus = loan_corpus();
        let embedder = HashingEmbedder::default();
        let built = build_index(&corpus, &embedder, IndexTopology::hnsw()).await.unwrap();

        corpus.append("What is a cosigner?", "A person who shares loan liability").unwrap();
        let err = built.check_corpus(&corpus).unwrap_err();
        assert!(matches!(err, RagError::DataMismatch { index_rows: 6, corpus_rows: 7 }));
    }

    #[tokio::test]
    async fn test_empty_corpus_fails() {
        let embedder = HashingEmbedder::default();
        let err = build_index(&Corpus::default(), &embedder, IndexTopology::Flat)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }
}
