use faq_rag::config::{IndexTopology, RagConfig, SearchParams};
use faq_rag::correction::OverlapSelfCorrector;
use faq_rag::corpus::Corpus;
use faq_rag::embedding;
use faq_rag::generator::GeminiGenerator;
use faq_rag::pipeline::{PipelineOutput, QueryOptions, RagPipeline};
use faq_rag::qa_log::CsvQaLog;
use faq_rag::reranker::{LexicalMetric, Reranker};
use faq_rag::tokens::IngestionStats;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "faq-rag")]
#[command(about = "Grounded question answering over a FAQ corpus with hallucination control")]
#[command(version)]
struct Args {
    /// CSV corpus with question and answer columns (or set RAG_CORPUS_PATH)
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,

    /// Vector index type: flat, hnsw or ivf (or set RAG_INDEX_TYPE)
    #[arg(long, global = true)]
    index: Option<String>,

    /// HNSW search breadth, 10-200
    #[arg(long, global = true)]
    ef_search: Option<usize>,

    /// IVF lists probed per query, 1-10
    #[arg(long, global = true)]
    nprobe: Option<usize>,

    /// Candidates retrieved before reranking
    #[arg(long, global = true)]
    top_k: Option<usize>,

    /// Rerank metric: gestalt, levenshtein, jaro-winkler or dice
    #[arg(long, global = true, default_value = "gestalt")]
    rerank_metric: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single question
    Ask {
        /// The question in natural language
        question: String,

        /// Expected answer, used for recall instead of an exact corpus match
        #[arg(long)]
        ground_truth: Option<String>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ask questions interactively; `:index <type>` switches the index
    Chat,
    /// Show the question/answer log
    Logs,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = resolve_config(&args)?;

    match args.command {
        Commands::Ask { ref question, ref ground_truth, json } => {
            let mut pipeline = build_pipeline(&config, &args.rerank_metric)?;
            let options = QueryOptions {
                topology: config.topology,
                search: config.search,
                top_k: config.top_k,
                ground_truth: ground_truth.clone(),
            };
            let output = pipeline.answer(question, &options).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_ingestion(&pipeline.ingestion_stats());
                print_output(&output);
            }
            Ok(())
        }
        Commands::Chat => run_chat(&config, &args.rerank_metric).await,
        Commands::Logs => show_logs(&config),
    }
}

/// Environment first, then CLI flags on top.
fn resolve_config(args: &Args) -> Result<RagConfig> {
    let mut config = RagConfig::from_env().context("Invalid environment configuration")?;

    if let Some(ref corpus) = args.corpus {
        config.corpus_path = corpus.clone();
    }
    if let Some(ref index) = args.index {
        config.topology = index.parse()?;
    }
    config.search = SearchParams::new(
        args.ef_search.unwrap_or(config.search.ef_search),
        args.nprobe.unwrap_or(config.search.nprobe),
    )?;
    if let Some(top_k) = args.top_k {
        config.top_k = top_k;
    }

    Ok(config)
}

fn build_pipeline(config: &RagConfig, rerank_metric: &str) -> Result<RagPipeline> {
    let corpus = Corpus::load_csv(&config.corpus_path)?;
    let embedder = embedding::from_config(&config.embedding)?;
    let generator = Arc::new(GeminiGenerator::new(&config.generation)?);
    let metric: LexicalMetric = rerank_metric.parse()?;

    info!(
        "Pipeline ready: {} rows, {} embedder, {} index",
        corpus.len(),
        embedder.name(),
        config.topology
    );

    Ok(
        RagPipeline::new(corpus, embedder, generator, Arc::new(OverlapSelfCorrector::default()))
            .with_reranker(Reranker::new(metric))
            .with_log_sink(Arc::new(CsvQaLog::new(config.log_path.clone()))),
    )
}

async fn run_chat(config: &RagConfig, rerank_metric: &str) -> Result<()> {
    let mut pipeline = build_pipeline(config, rerank_metric)?;
    let mut options = QueryOptions {
        topology: config.topology,
        search: config.search,
        top_k: config.top_k,
        ground_truth: None,
    };
    pipeline.prepare(options.topology).await?;

    println!("\n{}", "=".repeat(80));
    println!(" FAQ RAG - {} index over {} rows", options.topology, pipeline.corpus().len());
    println!(" Commands: :index <flat|hnsw|ivf>, :ef <10-200>, :nprobe <1-10>, :quit");
    println!("{}", "=".repeat(80));
    print_ingestion(&pipeline.ingestion_stats());

    let stdin = io::stdin();
    loop {
        print!("\n> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix(':') {
            let mut parts = command.split_whitespace();
            let result = match (parts.next(), parts.next()) {
                (Some("quit"), _) | (Some("q"), _) => break,
                (Some("index"), Some(kind)) => match kind.parse::<IndexTopology>() {
                    Ok(topology) => {
                        options.topology = topology;
                        pipeline.prepare(topology).await.map(|_| ())
                    }
                    Err(e) => Err(e),
                },
                (Some("ef"), Some(value)) => parse_number(value)
                    .and_then(|ef| SearchParams::new(ef, options.search.nprobe))
                    .map(|params| options.search = params),
                (Some("nprobe"), Some(value)) => parse_number(value)
                    .and_then(|nprobe| SearchParams::new(options.search.ef_search, nprobe))
                    .map(|params| options.search = params),
                _ => Err(faq_rag::RagError::Configuration(format!("Unknown command: {}", line))),
            };
            match result {
                Ok(()) => println!(
                    " index={} ef_search={} nprobe={}",
                    options.topology, options.search.ef_search, options.search.nprobe
                ),
                Err(e) => println!(" Error: {}", e),
            }
            continue;
        }

        match pipeline.answer(line, &options).await {
            Ok(output) => print_output(&output),
            Err(e) => println!(" Error: {}", e),
        }
    }

    Ok(())
}

fn parse_number(value: &str) -> faq_rag::Result<usize> {
    value
        .parse()
        .map_err(|_| faq_rag::RagError::Configuration(format!("Not a number: {}", value)))
}

fn print_ingestion(stats: &IngestionStats) {
    println!("\n INGESTION TOKENS (one-time cost)");
    println!("{}", "-".repeat(80));
    println!("   Documents (rows):   {}", stats.docs);
    println!("   Chunks created:     {}", stats.chunks);
    println!("   Total chunk tokens: {}", stats.total_chunk_tokens);
}

fn print_output(output: &PipelineOutput) {
    println!("\n{}", "=".repeat(80));
    println!(" MODEL ANSWER");
    println!("{}", "=".repeat(80));
    println!("\n{}", output.final_answer);

    println!("\n EVALUATION METRICS");
    println!("{}", "-".repeat(80));
    println!("   Faithfulness:       {:.2}", output.faithfulness);
    println!("   Hallucination Risk: {}", output.hallucination_risk);
    println!("   Corrected:          {}", output.corrected);
    println!("   Latency (seconds):  {:.2}", output.latency_secs);
    if let Some(recall) = output.recall {
        println!("   Recall@{} (before rerank): {}", output.candidates.len(), recall.recall_before);
        println!("   Recall@1 (after rerank):  {}", recall.recall_after);
    }

    println!("\n TOKEN USAGE (per query)");
    println!("{}", "-".repeat(80));
    println!(
        "   System {} | Question {} | Retrieved {} | Output {} | Total {}",
        output.usage.system_tokens,
        output.usage.question_tokens,
        output.usage.retrieved_tokens,
        output.usage.output_tokens,
        output.usage.total_tokens
    );

    println!("\n RETRIEVED CONTEXT ({} index)", output.topology);
    println!("{}", "-".repeat(80));
    for candidate in &output.candidates {
        println!("   Q: {}", candidate.row.question);
        println!("   A: {}", candidate.row.answer);
        println!(
            "      rerank {:.2} | distance {:.4}",
            candidate.rerank_score, candidate.distance
        );
    }
}

fn show_logs(config: &RagConfig) -> Result<()> {
    let log = CsvQaLog::new(config.log_path.clone());
    let entries = log.read_entries()?;
    if entries.is_empty() {
        println!("No logs found yet at {}", log.path().display());
        return Ok(());
    }

    println!("{}", "=".repeat(80));
    println!(" QUESTION ANSWER LOGS ({})", entries.len());
    println!("{}", "=".repeat(80));
    for entry in entries {
        println!(
            "{} | {} | faithfulness {:.2} | risk {} | corrected {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.question,
            entry.faithfulness,
            entry.hallucination_risk,
            entry.corrected
        );
        println!("   {}", entry.answer);
    }
    Ok(())
}
