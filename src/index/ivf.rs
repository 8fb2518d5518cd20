//! Inverted-file index with a k-means coarse quantizer.
//!
//! Training fits `nlist` centroids over the embedding matrix; each vector is then filed
//! under its nearest centroid. A query scans only the `nprobe` closest lists.

use crate::config::SearchParams;
use crate::embedding::Embedding;
use crate::error::{RagError, Result};
use crate::index::distance::{l2_squared, Neighbor};
use crate::index::{check_query_dimension, NearestNeighbors};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

const KMEANS_SEED: u64 = 42;
const KMEANS_MAX_ITERATIONS: usize = 25;

/// Number of lists actually trained for `n` vectors.
///
/// Small corpora cannot fill `nlist` clusters with two or more vectors each, so the
/// count drops to `max(1, n / 2)`.
pub fn effective_nlist(n: usize, requested: usize) -> usize {
    requested.min((n / 2).max(1))
}

#[derive(Debug, Clone)]
pub struct IvfIndex {
    vectors: Vec<Embedding>,
    dimension: usize,
    centroids: Vec<Embedding>,
    /// lists[c] holds the rows whose nearest centroid is c
    lists: Vec<Vec<usize>>,
}

impl IvfIndex {
    /// Train the quantizer and fill the inverted lists.
    pub fn build(vectors: Vec<Embedding>, dimension: usize, nlist: usize) -> Result<Self> {
        if vectors.is_empty() {
            return Err(RagError::Configuration(
                "Cannot train an IVF index without vectors".to_string(),
            ));
        }

        let nlist_eff = effective_nlist(vectors.len(), nlist);
        if nlist_eff != nlist {
            debug!(
                "Reducing ivf nlist from {} to {} for {} vectors",
                nlist,
                nlist_eff,
                vectors.len()
            );
        }

        let centroids = train_kmeans(&vectors, nlist_eff);
        let mut lists = vec![Vec::new(); centroids.len()];
        for (id, v) in vectors.iter().enumerate() {
            lists[nearest_centroid(&centroids, v)].push(id);
        }

        Ok(Self {
            vectors,
            dimension,
            centroids,
            lists,
        })
    }

    pub fn vectors(&self) -> &[Embedding] {
        &self.vectors
    }

    pub fn nlist(&self) -> usize {
        self.centroids.len()
    }

    pub fn list_sizes(&self) -> Vec<usize> {
        self.lists.iter().map(|l| l.len()).collect()
    }

    /// Centroid ids ordered by distance to `query`.
    fn probe_order(&self, query: &[f32]) -> Vec<usize> {
        let mut scored: Vec<Neighbor> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(c, centroid)| Neighbor::new(c, l2_squared(query, centroid)))
            .collect();
        scored.sort();
        scored.into_iter().map(|n| n.id).collect()
    }
}

impl NearestNeighbors for IvfIndex {
    fn search(&self, query: &[f32], k: usize, params: &SearchParams) -> Result<Vec<Neighbor>> {
        check_query_dimension(self.dimension, query)?;

        let nprobe = params.nprobe.clamp(1, self.nlist());
        let mut hits: Vec<Neighbor> = self
            .probe_order(query)
            .into_iter()
            .take(nprobe)
            .flat_map(|c| self.lists[c].iter())
            .map(|&id| Neighbor::new(id, l2_squared(query, &self.vectors[id])))
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

fn nearest_centroid(centroids: &[Embedding], v: &[f32]) -> usize {
    centroids
        .iter()
        .enumerate()
        .map(|(c, centroid)| Neighbor::new(c, l2_squared(v, centroid)))
        .min()
        .map(|n| n.id)
        .unwrap_or(0)
}

/// Seeded k-means++ initialisation followed by Lloyd iterations.
fn train_kmeans(vectors: &[Embedding], k: usize) -> Vec<Embedding> {
    let mut rng = StdRng::seed_from_u64(KMEANS_SEED);
    let mut centroids: Vec<Embedding> = Vec::with_capacity(k);
    centroids.push(vectors[rng.gen_range(0..vectors.len())].clone());

    while centroids.len() < k {
        let weights: Vec<f32> = vectors
            .iter()
            .map(|v| {
                centroids
                    .iter()
                    .map(|c| l2_squared(v, c))
                    .fold(f32::INFINITY, f32::min)
            })
            .collect();
        let total: f32 = weights.iter().sum();

        let next = if total > 0.0 {
            let mut target = rng.gen_range(0.0..total);
            let mut chosen = vectors.len() - 1;
            for (i, w) in weights.iter().enumerate() {
                if target < *w {
                    chosen = i;
                    break;
                }
                target -= w;
            }
            chosen
        } else {
            // All points already coincide with a centroid
            rng.gen_range(0..vectors.len())
        };
        centroids.push(vectors[next].clone());
    }

    let dim = vectors[0].len();
    let mut assignments = vec![usize::MAX; vectors.len()];
    for iteration in 0..KMEANS_MAX_ITERATIONS {
        let mut changed = false;
        for (i, v) in vectors.iter().enumerate() {
            let c = nearest_centroid(&centroids, v);
            if assignments[i] != c {
                assignments[i] = c;
                changed = true;
            }
        }
        if !changed {
            debug!("k-means converged after {} iterations", iteration);
            break;
        }

        let mut sums = vec![vec![0.0f32; dim]; k];
        let mut counts = vec![0usize; k];
        for (v, &c) in vectors.iter().zip(&assignments) {
            counts[c] += 1;
            for (s, x) in sums[c].iter_mut().zip(v) {
                *s += x;
            }
        }
        // Empty clusters keep their previous centroid
        for c in 0..k {
            if counts[c] > 0 {
                let n = counts[c] as f32;
                centroids[c] = sums[c].iter().map(|s| s / n).collect();
            }
        }
    }

    centroids
}
