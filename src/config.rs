//! Runtime configuration
//!
//! Topology selection, per-query search tunables and provider settings. Values come from
//! the environment (after `.env` is loaded) and can be overridden by CLI flags.

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_HNSW_M: usize = 32;
pub const DEFAULT_EF_CONSTRUCTION: usize = 200;
pub const DEFAULT_NLIST: usize = 10;
pub const DEFAULT_EF_SEARCH: usize = 50;
pub const DEFAULT_NPROBE: usize = 3;

pub const EF_SEARCH_RANGE: (usize, usize) = (10, 200);
pub const NPROBE_RANGE: (usize, usize) = (1, 10);

/// Vector index topology together with its build-time parameters.
///
/// This is the key of the index cache: two values compare equal exactly when the
/// indexes they describe would be built identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IndexTopology {
    /// Exact brute-force search.
    Flat,
    /// Navigable small-world graph.
    Hnsw { m: usize, ef_construction: usize },
    /// Inverted lists over a k-means coarse quantizer.
    Ivf { nlist: usize },
}

impl IndexTopology {
    pub fn hnsw() -> Self {
        IndexTopology::Hnsw {
            m: DEFAULT_HNSW_M,
            ef_construction: DEFAULT_EF_CONSTRUCTION,
        }
    }

    pub fn ivf() -> Self {
        IndexTopology::Ivf { nlist: DEFAULT_NLIST }
    }

    pub fn name(&self) -> &'static str {
        match self {
            IndexTopology::Flat => "flat",
            IndexTopology::Hnsw { .. } => "hnsw",
            IndexTopology::Ivf { .. } => "ivf",
        }
    }

    /// Reject build parameters no index can be built with.
    pub fn validate(&self) -> Result<()> {
        match *self {
            IndexTopology::Flat => Ok(()),
            IndexTopology::Hnsw { m, ef_construction } => {
                if m < 2 {
                    return Err(RagError::Configuration(format!(
                        "hnsw m must be at least 2, got {}",
                        m
                    )));
                }
                if ef_construction == 0 {
                    return Err(RagError::Configuration(
                        "hnsw ef_construction must be positive".to_string(),
                    ));
                }
                Ok(())
            }
            IndexTopology::Ivf { nlist } => {
                if nlist == 0 {
                    return Err(RagError::Configuration(
                        "ivf nlist must be positive".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

impl Default for IndexTopology {
    fn default() -> Self {
        IndexTopology::Flat
    }
}

impl fmt::Display for IndexTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parses the selectors `flat`, `hnsw` and `ivf` with default build parameters.
/// Anything else is a configuration error, never a silent fallback to `flat`.
impl FromStr for IndexTopology {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "flat" => Ok(IndexTopology::Flat),
            "hnsw" => Ok(IndexTopology::hnsw()),
            "ivf" => Ok(IndexTopology::ivf()),
            other => Err(RagError::Configuration(format!(
                "Unrecognized index type '{}' (expected flat, hnsw or ivf)",
                other
            ))),
        }
    }
}

/// Query-time tunables. Passed with every search instead of living on the index,
/// so tuning between queries never touches shared index state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    /// HNSW search breadth.
    pub ef_search: usize,
    /// IVF inverted lists probed per query.
    pub nprobe: usize,
}

impl SearchParams {
    pub fn new(ef_search: usize, nprobe: usize) -> Result<Self> {
        let (ef_min, ef_max) = EF_SEARCH_RANGE;
        if !(ef_min..=ef_max).contains(&ef_search) {
            return Err(RagError::Configuration(format!(
                "ef_search must be within {}..={}, got {}",
                ef_min, ef_max, ef_search
            )));
        }
        let (np_min, np_max) = NPROBE_RANGE;
        if !(np_min..=np_max).contains(&nprobe) {
            return Err(RagError::Configuration(format!(
                "nprobe must be within {}..={}, got {}",
                np_min, np_max, nprobe
            )));
        }
        Ok(Self { ef_search, nprobe })
    }
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            ef_search: DEFAULT_EF_SEARCH,
            nprobe: DEFAULT_NPROBE,
        }
    }
}

/// Which embedding backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// Offline hashed n-gram features.
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint.
    OpenAi,
}

impl FromStr for EmbedderKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "hashing" => Ok(EmbedderKind::Hashing),
            "openai" => Ok(EmbedderKind::OpenAi),
            other => Err(RagError::Configuration(format!(
                "Unrecognized embedder '{}' (expected hashing or openai)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub kind: EmbedderKind,
    pub dimension: usize,
    pub max_tokens: usize,
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

/// Everything the binary needs to assemble a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub corpus_path: PathBuf,
    pub topology: IndexTopology,
    pub search: SearchParams,
    pub top_k: usize,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub log_path: PathBuf,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            corpus_path: PathBuf::from("data/loan_faq.csv"),
            topology: IndexTopology::Flat,
            search: SearchParams::default(),
            top_k: DEFAULT_TOP_K,
            embedding: EmbeddingConfig {
                kind: EmbedderKind::Hashing,
                dimension: 384,
                max_tokens: 256,
                model: "text-embedding-3-small".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: "dummy-api-key".to_string(),
                timeout_secs: 30,
            },
            generation: GenerationConfig {
                api_key: "dummy-api-key".to_string(),
                model: "gemini-2.5-flash-lite".to_string(),
                base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                timeout_secs: 30,
            },
            log_path: PathBuf::from("logs/qa_logs.csv"),
        }
    }
}

impl RagConfig {
    /// Build from process environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Split out so tests need no process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("RAG_CORPUS_PATH") {
            config.corpus_path = PathBuf::from(path);
        }
        if let Some(index_type) = lookup("RAG_INDEX_TYPE") {
            config.topology = index_type.parse()?;
        }

        let ef_search = parse_usize(&lookup, "RAG_EF_SEARCH")?.unwrap_or(config.search.ef_search);
        let nprobe = parse_usize(&lookup, "RAG_NPROBE")?.unwrap_or(config.search.nprobe);
        config.search = SearchParams::new(ef_search, nprobe)?;

        if let Some(top_k) = parse_usize(&lookup, "RAG_TOP_K")? {
            if top_k == 0 {
                return Err(RagError::Configuration("RAG_TOP_K must be at least 1".to_string()));
            }
            config.top_k = top_k;
        }

        if let Some(kind) = lookup("RAG_EMBEDDER") {
            config.embedding.kind = kind.parse()?;
        }
        if let Some(dim) = parse_usize(&lookup, "RAG_EMBEDDING_DIM")? {
            config.embedding.dimension = dim;
        }
        if let Some(model) = lookup("RAG_EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            config.embedding.base_url = url;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            config.embedding.api_key = key;
        }

        if let Some(key) = lookup("GEMINI_API_KEY") {
            config.generation.api_key = key;
        }
        if let Some(model) = lookup("RAG_GENERATION_MODEL") {
            config.generation.model = model;
        }
        if let Some(timeout) = parse_usize(&lookup, "RAG_REQUEST_TIMEOUT_SECS")? {
            config.embedding.timeout_secs = timeout as u64;
            config.generation.timeout_secs = timeout as u64;
        }

        if let Some(path) = lookup("RAG_LOG_PATH") {
            config.log_path = PathBuf::from(path);
        }

        Ok(config)
    }
}

fn parse_usize<F>(lookup: &F, key: &str) -> Result<Option<usize>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<usize>().map(Some).map_err(|_| {
            RagError::Configuration(format!(
                "{} must be a non-negative integer, got '{}'",
                key, raw
            ))
        }),
    }
}
