//! Index Cache
//!
//! Memoization table of built indexes keyed by topology and build parameters. Entries
//! stay valid only for the corpus snapshot they were built from: a new corpus fingerprint
//! clears the whole table.

use crate::config::IndexTopology;
use crate::corpus::Corpus;
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::index::{build_index, BuiltIndex};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct CachedIndex {
    pub index: Arc<BuiltIndex>,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct IndexCache {
    entries: HashMap<IndexTopology, CachedIndex>,
    corpus_fingerprint: Option<u64>,
    builds: usize,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse the index for `topology`, or build it if absent or built for another corpus.
    pub async fn get_or_build(
        &mut self,
        topology: IndexTopology,
        corpus: &Corpus,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Arc<BuiltIndex>> {
        let fingerprint = corpus.fingerprint();
        if self.corpus_fingerprint != Some(fingerprint) {
            if !self.entries.is_empty() {
                info!("Corpus changed, dropping {} cached indexes", self.entries.len());
            }
            self.entries.clear();
            self.corpus_fingerprint = Some(fingerprint);
        }

        if let Some(cached) = self.entries.get(&topology) {
            debug!("Reusing {} index built at {}", topology, cached.built_at);
            return Ok(Arc::clone(&cached.index));
        }

        let built = Arc::new(build_index(corpus, embedder, topology).await?);
        self.builds += 1;
        self.entries.insert(
            topology,
            CachedIndex {
                index: Arc::clone(&built),
                built_at: built.built_at,
            },
        );
        Ok(built)
    }

    pub fn get(&self, topology: &IndexTopology) -> Option<&CachedIndex> {
        self.entries.get(topology)
    }

    /// Drop every entry. The next lookup rebuilds.
    pub fn invalidate(&mut self) {
        self.entries.clear();
        self.corpus_fingerprint = None;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total builds performed over the cache's lifetime.
    pub fn build_count(&self) -> usize {
        self.builds
    }
}
