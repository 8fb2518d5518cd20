use async_trait::async_trait;
use faq_rag::config::{IndexTopology, SearchParams};
use faq_rag::correction::{Correction, OverlapSelfCorrector, RiskLevel, SelfCorrector};
use faq_rag::corpus::{Corpus, CorpusRow};
use faq_rag::embedding::HashingEmbedder;
use faq_rag::generator::{Generator, UNKNOWN_ANSWER};
use faq_rag::qa_log::{CsvQaLog, QaLogEntry, QaLogSink};
use faq_rag::{QueryOptions, RagError, RagPipeline, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Answers with the retrieved context, like the offline generator.
struct EchoGenerator;

#[async_trait]
impl Generator for EchoGenerator {
    async fn generate(&self, context: &str, _query: &str) -> Result<String> {
        if context.trim().is_empty() {
            return Ok(UNKNOWN_ANSWER.to_string());
        }
        Ok(context.trim().to_string())
    }
}

/// Always answers the same made-up text.
struct FixedGenerator(&'static str);

#[async_trait]
impl Generator for FixedGenerator {
    async fn generate(&self, _context: &str, _query: &str) -> Result<String> {
        Ok(self.0.to_string())
    }
}

struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(&self, _context: &str, _query: &str) -> Result<String> {
        Err(RagError::Provider("quota exceeded".to_string()))
    }
}

/// Accepts every answer and reports a fixed score.
struct TrustingCorrector(f64);

impl SelfCorrector for TrustingCorrector {
    fn self_correct(&self, answer: &str, _context: &[CorpusRow]) -> Correction {
        Correction {
            final_answer: answer.to_string(),
            corrected: false,
            faithfulness: self.0,
        }
    }
}

#[derive(Default)]
struct MemorySink {
    entries: Mutex<Vec<QaLogEntry>>,
}

impl QaLogSink for MemorySink {
    fn persist(&self, entry: &QaLogEntry) -> Result<()> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

struct BrokenSink;

impl QaLogSink for BrokenSink {
    fn persist(&self, _entry: &QaLogEntry) -> Result<()> {
        Err(RagError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only filesystem",
        )))
    }
}

fn loan_corpus() -> Corpus {
    Corpus::from_pairs([
        ("What is APR?", "Annual Percentage Rate"),
        ("What is EMI?", "Equated Monthly Installment"),
        ("What is a grace period?", "A period after due date with no penalty"),
    ])
    .unwrap()
}

fn faq_file() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data").join("loan_faq.csv")
}

fn pipeline(corpus: Corpus, generator: Arc<dyn Generator>) -> RagPipeline {
    RagPipeline::new(
        corpus,
        Arc::new(HashingEmbedder::default()),
        generator,
        Arc::new(OverlapSelfCorrector::default()),
    )
}

#[tokio::test]
async fn test_explain_emi_end_to_end() {
    let sink = Arc::new(MemorySink::default());
    let mut rag = pipeline(loan_corpus(), Arc::new(EchoGenerator)).with_log_sink(sink.clone());

    let options = QueryOptions {
        ground_truth: Some("Equated Monthly Installment".to_string()),
        ..QueryOptions::default()
    };
    let output = rag.answer("Explain EMI", &options).await.unwrap();

    assert_eq!(output.candidates.len(), 3);
    assert_eq!(output.candidates[0].row.question, "What is EMI?");
    assert_eq!(output.context, "Equated Monthly Installment");
    assert_eq!(output.final_answer, "Equated Monthly Installment");
    assert!(!output.corrected);
    assert_eq!(output.faithfulness, 1.0);
    assert_eq!(output.hallucination_risk, RiskLevel::Low);
    assert!(output.latency_secs >= 0.0);

    let recall = output.recall.unwrap();
    assert_eq!(recall.recall_before, 1);
    assert_eq!(recall.recall_after, 1);

    // Rerank scores come out in descending order
    let scores: Vec<f64> = output.candidates.iter().map(|c| c.rerank_score).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));

    assert_eq!(output.usage.system_tokens, 10);
    assert_eq!(output.usage.question_tokens, 4);
    assert_eq!(output.usage.retrieved_tokens, 5);
    assert_eq!(output.usage.output_tokens, 5);
    assert_eq!(output.usage.total_tokens, 24);

    let logged = sink.entries.lock().unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].question, "Explain EMI");
    assert_eq!(logged[0].hallucination_risk, RiskLevel::Low);
}

#[tokio::test]
async fn test_top_k_is_clamped_to_corpus_size() {
    let mut rag = pipeline(loan_corpus(), Arc::new(EchoGenerator));
    let options = QueryOptions {
        top_k: 10,
        ..QueryOptions::default()
    };

    let output = rag.answer("What is APR?", &options).await.unwrap();
    assert_eq!(output.candidates.len(), 3);
}

#[tokio::test]
async fn test_zero_top_k_is_rejected() {
    let mut rag = pipeline(loan_corpus(), Arc::new(EchoGenerator));
    let options = QueryOptions {
        top_k: 0,
        ..QueryOptions::default()
    };

    let err = rag.answer("What is APR?", &options).await.unwrap_err();
    assert!(matches!(err, RagError::Configuration(_)));
}

#[tokio::test]
async fn test_unsupported_answer_is_corrected() {
    let mut rag = pipeline(
        loan_corpus(),
        Arc::new(FixedGenerator("It is a yearly tax on savings accounts")),
    );

    let output = rag.answer("Explain EMI", &QueryOptions::default()).await.unwrap();
    assert!(output.corrected);
    assert_eq!(output.final_answer, "Equated Monthly Installment");
    assert_eq!(output.hallucination_risk, RiskLevel::Low);
}

#[tokio::test]
async fn test_risk_label_follows_faithfulness() {
    let cases = [(0.95, RiskLevel::Low), (0.6, RiskLevel::Medium), (0.1, RiskLevel::High)];
    for (score, expected) in cases {
        let mut rag = RagPipeline::new(
            loan_corpus(),
            Arc::new(HashingEmbedder::default()),
            Arc::new(EchoGenerator),
            Arc::new(TrustingCorrector(score)),
        );
        let output = rag.answer("Explain EMI", &QueryOptions::default()).await.unwrap();
        assert_eq!(output.hallucination_risk, expected);
    }
}

#[tokio::test]
async fn test_log_failure_does_not_fail_query() {
    let mut rag =
        pipeline(loan_corpus(), Arc::new(EchoGenerator)).with_log_sink(Arc::new(BrokenSink));
    let output = rag.answer("Explain EMI", &QueryOptions::default()).await;
    assert!(output.is_ok());
}

#[tokio::test]
async fn test_generation_failure_propagates() {
    let sink = Arc::new(MemorySink::default());
    let mut rag = pipeline(loan_corpus(), Arc::new(FailingGenerator)).with_log_sink(sink.clone());

    let err = rag.answer("Explain EMI", &QueryOptions::default()).await.unwrap_err();
    assert!(matches!(err, RagError::Provider(_)));
    assert!(sink.entries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_recall_needs_ground_truth() {
    let mut rag = pipeline(loan_corpus(), Arc::new(EchoGenerator));

    let paraphrase = rag.answer("Explain EMI", &QueryOptions::default()).await.unwrap();
    assert!(paraphrase.recall.is_none());

    // An exact corpus question carries its own answer as ground truth
    let exact = rag.answer("What is APR?", &QueryOptions::default()).await.unwrap();
    let recall = exact.recall.unwrap();
    assert_eq!(recall.recall_before, 1);
    assert_eq!(recall.recall_after, 1);
}

#[tokio::test]
async fn test_padded_corpus_question_still_has_recall() {
    let mut rag = pipeline(loan_corpus(), Arc::new(EchoGenerator));

    let output = rag.answer("  What is APR? ", &QueryOptions::default()).await.unwrap();
    let recall = output.recall.unwrap();
    assert_eq!(recall.recall_before, 1);
    assert_eq!(recall.recall_after, 1);
}

#[tokio::test]
async fn test_usage_counts_corrected_answer() {
    let mut rag = pipeline(
        loan_corpus(),
        Arc::new(FixedGenerator("It is a yearly tax on savings accounts")),
    );

    let output = rag.answer("Explain EMI", &QueryOptions::default()).await.unwrap();
    // The replaced answer, not the draft, is what the user receives
    assert_eq!(output.usage.output_tokens, 5);
    assert_eq!(
        output.usage.total_tokens,
        output.usage.system_tokens
            + output.usage.question_tokens
            + output.usage.retrieved_tokens
            + output.usage.output_tokens
    );
}

#[tokio::test]
async fn test_ingestion_stats_follow_corpus() {
    let mut rag = pipeline(loan_corpus(), Arc::new(EchoGenerator));

    let stats = rag.ingestion_stats();
    assert_eq!(stats.docs, 3);
    assert_eq!(stats.chunks, 3);
    assert_eq!(stats.total_chunk_tokens, 31);

    rag.append_row("What is collateral?", "An asset pledged as security against a loan")
        .unwrap();
    let stats = rag.ingestion_stats();
    assert_eq!(stats.docs, 4);
    assert_eq!(stats.total_chunk_tokens, 31 + 4 + 8);
}

#[tokio::test]
async fn test_index_is_built_once_per_topology() {
    let mut rag = pipeline(loan_corpus(), Arc::new(EchoGenerator));
    let options = QueryOptions::default();

    rag.answer("Explain EMI", &options).await.unwrap();
    rag.answer("What is APR?", &options).await.unwrap();
    assert_eq!(rag.cache().build_count(), 1);

    let hnsw = QueryOptions {
        topology: IndexTopology::hnsw(),
        ..QueryOptions::default()
    };
    rag.answer("Explain EMI", &hnsw).await.unwrap();
    rag.answer("Explain EMI", &options).await.unwrap();
    assert_eq!(rag.cache().build_count(), 2);
    assert_eq!(rag.cache().len(), 2);
}

#[tokio::test]
async fn test_search_tuning_reuses_index() {
    let mut rag = pipeline(loan_corpus(), Arc::new(EchoGenerator));

    for (ef_search, nprobe) in [(10, 1), (50, 3), (200, 10)] {
        let options = QueryOptions {
            topology: IndexTopology::ivf(),
            search: SearchParams::new(ef_search, nprobe).unwrap(),
            ..QueryOptions::default()
        };
        rag.answer("Explain EMI", &options).await.unwrap();
    }
    assert_eq!(rag.cache().build_count(), 1);
}

#[tokio::test]
async fn test_appended_row_is_retrievable() {
    let mut rag = pipeline(loan_corpus(), Arc::new(EchoGenerator));
    rag.answer("Explain EMI", &QueryOptions::default()).await.unwrap();

    rag.append_row("What is collateral?", "An asset pledged as security against a loan")
        .unwrap();
    let output = rag.answer("What is collateral?", &QueryOptions::default()).await.unwrap();

    assert_eq!(rag.cache().build_count(), 2);
    assert_eq!(output.candidates.len(), 3);
    assert_eq!(output.candidates[0].row.question, "What is collateral?");
    assert_eq!(output.final_answer, "An asset pledged as security against a loan");
}

#[tokio::test]
async fn test_every_topology_answers_from_faq_file() {
    let corpus = Corpus::load_csv(faq_file()).unwrap();
    assert_eq!(corpus.len(), 16);
    let mut rag = pipeline(corpus, Arc::new(EchoGenerator));

    for topology in [IndexTopology::Flat, IndexTopology::hnsw(), IndexTopology::ivf()] {
        let options = QueryOptions {
            topology,
            ..QueryOptions::default()
        };
        let output = rag.answer("What is APR?", &options).await.unwrap();
        assert_eq!(output.topology, topology);
        assert_eq!(output.candidates.len(), 3);
        assert!(!output.final_answer.is_empty());
    }

    for topology in [IndexTopology::Flat, IndexTopology::hnsw()] {
        let options = QueryOptions {
            topology,
            ..QueryOptions::default()
        };
        let output = rag.answer("What is APR?", &options).await.unwrap();
        assert_eq!(output.final_answer, "Annual Percentage Rate");
        assert_eq!(output.recall.unwrap().recall_after, 1);
    }
}

#[tokio::test]
async fn test_csv_log_round_trip_through_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(CsvQaLog::new(dir.path().join("qa_logs.csv")));
    let mut rag = pipeline(loan_corpus(), Arc::new(EchoGenerator)).with_log_sink(log.clone());

    rag.answer("Explain EMI", &QueryOptions::default()).await.unwrap();
    rag.answer("What is APR?", &QueryOptions::default()).await.unwrap();

    let entries = log.read_entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].answer, "Equated Monthly Installment");
    assert_eq!(entries[1].question, "What is APR?");
    assert_ne!(entries[0].query_id, entries[1].query_id);
}
