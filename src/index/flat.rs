//! Exact brute-force index.

use crate::config::SearchParams;
use crate::embedding::Embedding;
use crate::error::Result;
use crate::index::distance::{l2_squared, Neighbor};
use crate::index::{check_query_dimension, NearestNeighbors};

#[derive(Debug, Clone)]
pub struct FlatIndex {
    vectors: Vec<Embedding>,
    dimension: usize,
}

impl FlatIndex {
    pub fn new(vectors: Vec<Embedding>, dimension: usize) -> Self {
        Self { vectors, dimension }
    }

    pub fn vectors(&self) -> &[Embedding] {
        &self.vectors
    }
}

impl NearestNeighbors for FlatIndex {
    fn search(&self, query: &[f32], k: usize, _params: &SearchParams) -> Result<Vec<Neighbor>> {
        check_query_dimension(self.dimension, query)?;

        let mut hits: Vec<Neighbor> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(id, v)| Neighbor::new(id, l2_squared(query, v)))
            .collect();
        hits.sort();
        hits.truncate(k);
        Ok(hits)
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
