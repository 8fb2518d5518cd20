//! Vector Indexes
//!
//! Three topologies behind one search capability:
//!
//! ```text
//!            NearestNeighbors::search(query, k, params)
//!                          │
//!        ┌─────────────────┼─────────────────┐
//!   FlatIndex          HnswIndex          IvfIndex
//!   exact scan     small-world graph   k-means inverted lists
//! ```
//!
//! Distances are squared L2. Results are `(row position, distance)` pairs, nearest first.

pub mod builder;
pub mod distance;
pub mod flat;
pub mod hnsw;
pub mod ivf;

pub use builder::{build_index, BuiltIndex};
pub use distance::Neighbor;
pub use flat::FlatIndex;
pub use hnsw::HnswIndex;
pub use ivf::IvfIndex;

use crate::config::{IndexTopology, SearchParams};
use crate::embedding::Embedding;
use crate::error::{RagError, Result};

/// Uniform k-nearest-neighbor search over row positions.
pub trait NearestNeighbors {
    /// Up to `k` nearest rows to `query`, ascending by distance.
    fn search(&self, query: &[f32], k: usize, params: &SearchParams) -> Result<Vec<Neighbor>>;

    /// Number of indexed vectors.
    fn len(&self) -> usize;

    fn dimension(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn check_query_dimension(expected: usize, query: &[f32]) -> Result<()> {
    if query.len() != expected {
        return Err(RagError::DimensionMismatch {
            expected,
            got: query.len(),
        });
    }
    Ok(())
}

/// A built index of one of the three topologies.
#[derive(Debug, Clone)]
pub enum VectorIndex {
    Flat(FlatIndex),
    Hnsw(HnswIndex),
    Ivf(IvfIndex),
}

impl VectorIndex {
    /// Build `topology` over an embedding matrix. Rows must be non-empty and share one dimension.
    pub fn build(embeddings: Vec<Embedding>, topology: IndexTopology) -> Result<Self> {
        topology.validate()?;

        let dimension = match embeddings.first() {
            Some(first) if !first.is_empty() => first.len(),
            _ => {
                return Err(RagError::Configuration(
                    "Cannot build an index from an empty embedding matrix".to_string(),
                ))
            }
        };
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                got: bad.len(),
            });
        }

        let index = match topology {
            IndexTopology::Flat => VectorIndex::Flat(FlatIndex::new(embeddings, dimension)),
            IndexTopology::Hnsw { m, ef_construction } => {
                VectorIndex::Hnsw(HnswIndex::build(embeddings, dimension, m, ef_construction))
            }
            IndexTopology::Ivf { nlist } => {
                VectorIndex::Ivf(IvfIndex::build(embeddings, dimension, nlist)?)
            }
        };
        Ok(index)
    }

    /// The embedding matrix the index was built from, in row order.
    pub fn embeddings(&self) -> &[Embedding] {
        match self {
            VectorIndex::Flat(index) => index.vectors(),
            VectorIndex::Hnsw(index) => index.vectors(),
            VectorIndex::Ivf(index) => index.vectors(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            VectorIndex::Flat(_) => "flat",
            VectorIndex::Hnsw(_) => "hnsw",
            VectorIndex::Ivf(_) => "ivf",
        }
    }
}

impl NearestNeighbors for VectorIndex {
    fn search(&self, query: &[f32], k: usize, params: &SearchParams) -> Result<Vec<Neighbor>> {
        match self {
            VectorIndex::Flat(index) => index.search(query, k, params),
            VectorIndex::Hnsw(index) => index.search(query, k, params),
            VectorIndex::Ivf(index) => index.search(query, k, params),
        }
    }

    fn len(&self) -> usize {
        match self {
            VectorIndex::Flat(index) => index.len(),
            VectorIndex::Hnsw(index) => index.len(),
            VectorIndex::Ivf(index) => index.len(),
        }
    }

    fn dimension(&self) -> usize {
        match self {
            VectorIndex::Flat(index) => index.dimension(),
            VectorIndex::Hnsw(index) => index.dimension(),
            VectorIndex::Ivf(index) => index.dimension(),
        }
    }
}
