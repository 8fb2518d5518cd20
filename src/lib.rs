//! Retrieval-augmented question answering over a small FAQ corpus.
//!
//! Builds a flat, HNSW or IVF vector index over the corpus questions, retrieves the
//! nearest rows for a query, reranks them lexically and grounds a generated answer in the
//! best match.

pub mod cache;
pub mod config;
pub mod corpus;
pub mod correction;
pub mod embedding;
pub mod error;
pub mod generator;
pub mod index;
pub mod pipeline;
pub mod qa_log;
pub mod reranker;
pub mod retriever;
pub mod tokens;

pub use config::{IndexTopology, RagConfig, SearchParams};
pub use corpus::{Corpus, CorpusRow};
pub use error::{RagError, Result};
pub use pipeline::{PipelineOutput, QueryOptions, RagPipeline};
