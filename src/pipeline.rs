//! RAG Pipeline
//!
//! Retrieve → rerank → generate → self-correct, with latency, hallucination risk and
//! recall diagnostics for every query.

use crate::cache::IndexCache;
use crate::config::{IndexTopology, SearchParams, DEFAULT_TOP_K};
use crate::correction::{hallucination_risk, RiskLevel, SelfCorrector};
use crate::corpus::{Corpus, CorpusRow};
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::generator::{Generator, SYSTEM_PROMPT};
use crate::index::BuiltIndex;
use crate::qa_log::{QaLogEntry, QaLogSink};
use crate::reranker::{RerankedCandidate, Reranker};
use crate::retriever::Retriever;
use crate::tokens::{IngestionStats, TokenUsage};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Per-query options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub topology: IndexTopology,
    pub search: SearchParams,
    pub top_k: usize,
    /// Expected answer for recall; defaults to the answer of an exactly matching question
    pub ground_truth: Option<String>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            topology: IndexTopology::Flat,
            search: SearchParams::default(),
            top_k: DEFAULT_TOP_K,
            ground_truth: None,
        }
    }
}

/// Recall of the ground-truth answer before and after reranking (0 or 1 each).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecallMetrics {
    /// Over all K retrieved candidates
    pub recall_before: u8,
    /// Over the single top context after reranking
    pub recall_after: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub query: String,
    pub final_answer: String,
    pub corrected: bool,
    pub faithfulness: f64,
    pub hallucination_risk: RiskLevel,
    pub latency_secs: f64,
    pub recall: Option<RecallMetrics>,
    pub topology: IndexTopology,
    /// Context text handed to the generator
    pub context: String,
    pub candidates: Vec<RerankedCandidate>,
    pub usage: TokenUsage,
}

/// 1 if the trimmed ground truth equals any candidate answer, else 0.
pub fn recall_at_k<'a>(answers: impl IntoIterator<Item = &'a str>, ground_truth: &str) -> u8 {
    let expected = ground_truth.trim();
    answers.into_iter().any(|a| a == expected) as u8
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct RagPipeline {
    corpus: Corpus,
    embedder: Arc<dyn EmbeddingProvider>,
    retriever: Retriever,
    reranker: Reranker,
    generator: Arc<dyn Generator>,
    corrector: Arc<dyn SelfCorrector>,
    log_sink: Option<Arc<dyn QaLogSink>>,
    cache: IndexCache,
}

impl RagPipeline {
    pub fn new(
        corpus: Corpus,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn Generator>,
        corrector: Arc<dyn SelfCorrector>,
    ) -> Self {
        Self {
            corpus,
            retriever: Retriever::new(Arc::clone(&embedder)),
            embedder,
            reranker: Reranker::default(),
            generator,
            corrector,
            log_sink: None,
            cache: IndexCache::new(),
        }
    }

    pub fn with_reranker(mut self, reranker: Reranker) -> Self {
        self.reranker = reranker;
        self
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn QaLogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn cache(&self) -> &IndexCache {
        &self.cache
    }

    /// One-time embedding cost of the current corpus, chunked at the embedder's input limit.
    pub fn ingestion_stats(&self) -> IngestionStats {
        IngestionStats::from_corpus(&self.corpus, self.embedder.max_tokens())
    }

    /// Add a row. Cached indexes are rebuilt on their next use.
    pub fn append_row(&mut self, question: &str, answer: &str) -> Result<usize> {
        self.corpus.append(question, answer)
    }

    /// Build (or reuse) the index for `topology` ahead of the first query.
    pub async fn prepare(&mut self, topology: IndexTopology) -> Result<Arc<BuiltIndex>> {
        self.cache
            .get_or_build(topology, &self.corpus, self.embedder.as_ref())
            .await
    }

    /// Answer one query end to end.
    pub async fn answer(&mut self, query: &str, options: &QueryOptions) -> Result<PipelineOutput> {
        // Index builds are a one-time cost outside the query latency. The cache rebuilds
        // any index whose corpus snapshot is out of date.
        let index = self.prepare(options.topology).await?;

        let started = Instant::now();

        let retrieved = self
            .retriever
            .retrieve(query, &index, &self.corpus, options.top_k, &options.search)
            .await?;
        let candidates = self.reranker.rerank(query, &retrieved);
        let top_context: Vec<CorpusRow> =
            candidates.iter().take(1).map(|c| c.row.clone()).collect();
        let context = top_context.iter().map(|r| r.answer.as_str()).join("\n");

        let draft = self.generator.generate(&context, query).await?;
        let correction = self.corrector.self_correct(&draft, &top_context);

        let latency_secs = round2(started.elapsed().as_secs_f64());
        let faithfulness = correction.faithfulness.clamp(0.0, 1.0);
        let risk = hallucination_risk(faithfulness);
        let usage = TokenUsage::for_query(SYSTEM_PROMPT, query, &context, &correction.final_answer);

        let ground_truth = options
            .ground_truth
            .clone()
            .or_else(|| self.corpus.ground_truth_for(query).map(str::to_string));
        let recall = ground_truth.map(|gt| RecallMetrics {
            recall_before: recall_at_k(retrieved.answers(), &gt),
            recall_after: recall_at_k(top_context.iter().map(|r| r.answer.as_str()), &gt),
        });

        info!(
            "Answered '{}' via {} in {:.2}s (faithfulness {:.2}, risk {}, corrected {})",
            query, options.topology, latency_secs, faithfulness, risk, correction.corrected
        );

        if let Some(sink) = &self.log_sink {
            let entry = QaLogEntry::new(
                query,
                &correction.final_answer,
                faithfulness,
                risk,
                correction.corrected,
            );
            if let Err(e) = sink.persist(&entry) {
                warn!("Failed to persist QA log entry: {}", e);
            }
        }

        Ok(PipelineOutput {
            query: query.to_string(),
            final_answer: correction.final_answer,
            corrected: correction.corrected,
            faithfulness: round2(faithfulness),
            hallucination_risk: risk,
            latency_secs,
            recall,
            topology: options.topology,
            context,
            candidates,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recall_at_k() {
        let answers = ["Annual Percentage Rate", "Equated Monthly Installment"];
        assert_eq!(recall_at_k(answers, "  Equated Monthly Installment "), 1);
        assert_eq!(recall_at_k(answers, "Equated Monthly"), 0);
        assert_eq!(recall_at_k(Vec::<&str>::new(), "anything"), 0);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(0.12345), 0.12);
        assert_eq!(round2(1.005_1), 1.01);
        assert_eq!(round2(0.0), 0.0);
    }
}
