//! Hierarchical Navigable Small World graph index.
//!
//! Every node gets a random top level; upper layers are sparse express lanes and layer 0
//! links every node. Search descends greedily through the upper layers, then runs a
//! best-first beam of width `ef_search` on layer 0. Insertion reuses the same beam with
//! `ef_construction` to pick each new node's links.

use crate::config::SearchParams;
use crate::embedding::Embedding;
use crate::error::Result;
use crate::index::distance::{l2_squared, Neighbor};
use crate::index::{check_query_dimension, NearestNeighbors};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

const LEVEL_SEED: u64 = 42;
const MAX_LEVEL: usize = 16;

#[derive(Debug, Clone)]
pub struct HnswIndex {
    vectors: Vec<Embedding>,
    dimension: usize,
    /// Links per node on upper layers
    m: usize,
    /// Links per node on layer 0
    m0: usize,
    ef_construction: usize,
    /// links[node][level]
    links: Vec<Vec<Vec<usize>>>,
    entry_point: Option<usize>,
    max_level: usize,
}

impl HnswIndex {
    /// Build the graph by inserting every vector in row order.
    pub fn build(
        vectors: Vec<Embedding>,
        dimension: usize,
        m: usize,
        ef_construction: usize,
    ) -> Self {
        let mut index = Self {
            vectors,
            dimension,
            m,
            m0: m * 2,
            ef_construction,
            links: Vec::new(),
            entry_point: None,
            max_level: 0,
        };

        let level_mult = 1.0 / (m as f64).ln();
        let mut rng = StdRng::seed_from_u64(LEVEL_SEED);
        for node in 0..index.vectors.len() {
            let uniform: f64 = rng.gen_range(f64::EPSILON..1.0);
            let level = ((-uniform.ln() * level_mult) as usize).min(MAX_LEVEL);
            index.insert(node, level);
        }

        index
    }

    pub fn vectors(&self) -> &[Embedding] {
        &self.vectors
    }

    pub fn max_level(&self) -> usize {
        self.max_level
    }

    /// Links of `node` on `level`; empty when the node does not reach that level.
    pub fn links(&self, node: usize, level: usize) -> &[usize] {
        self.links
            .get(node)
            .and_then(|levels| levels.get(level))
            .map(|l| l.as_slice())
            .unwrap_or(&[])
    }

    fn max_links(&self, level: usize) -> usize {
        if level == 0 {
            self.m0
        } else {
            self.m
        }
    }

    fn insert(&mut self, node: usize, level: usize) {
        self.links.push(vec![Vec::new(); level + 1]);

        let entry = match self.entry_point {
            Some(e) => e,
            None => {
                self.entry_point = Some(node);
                self.max_level = level;
                return;
            }
        };

        let query = self.vectors[node].clone();

        // Greedy descent through layers above the node's own top level
        let mut entry_points = vec![entry];
        for lev in ((level + 1)..=self.max_level).rev() {
            if let Some(closest) = self.search_layer(&query, &entry_points, 1, lev).first() {
                entry_points = vec![closest.id];
            }
        }

        for lev in (0..=level.min(self.max_level)).rev() {
            let found = self.search_layer(&query, &entry_points, self.ef_construction, lev);
            let max_links = self.max_links(lev);

            let selected: Vec<usize> = found.iter().take(max_links).map(|n| n.id).collect();
            self.links[node][lev] = selected.clone();

            for nb in selected {
                self.links[nb][lev].push(node);
                if self.links[nb][lev].len() > max_links {
                    self.prune(nb, lev, max_links);
                }
            }

            entry_points = found.iter().map(|n| n.id).collect();
        }

        if level > self.max_level {
            self.max_level = level;
            self.entry_point = Some(node);
        }
    }

    /// Keep only the `max_links` closest links of `node` on `level`.
    fn prune(&mut self, node: usize, level: usize, max_links: usize) {
        let base = &self.vectors[node];
        let mut scored: Vec<Neighbor> = self.links[node][level]
            .iter()
            .map(|&nb| Neighbor::new(nb, l2_squared(base, &self.vectors[nb])))
            .collect();
        scored.sort();
        scored.truncate(max_links);
        self.links[node][level] = scored.into_iter().map(|n| n.id).collect();
    }

    /// Best-first beam search on one layer. Returns up to `ef` hits, nearest first.
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[usize],
        ef: usize,
        level: usize,
    ) -> Vec<Neighbor> {
        let mut visited = vec![false; self.vectors.len()];
        let mut candidates: BinaryHeap<Reverse<Neighbor>> = BinaryHeap::new();
        let mut results: BinaryHeap<Neighbor> = BinaryHeap::new();

        for &ep in entry_points {
            if visited[ep] {
                continue;
            }
            visited[ep] = true;
            let hit = Neighbor::new(ep, l2_squared(query, &self.vectors[ep]));
            candidates.push(Reverse(hit));
            results.push(hit);
            if results.len() > ef {
                results.pop();
            }
        }

        while let Some(Reverse(current)) = candidates.pop() {
            if let Some(worst) = results.peek() {
                if current.distance > worst.distance && results.len() >= ef {
                    break;
                }
            }

            for &nb in self.links(current.id, level) {
                if visited[nb] {
                    continue;
                }
                visited[nb] = true;

                let hit = Neighbor::new(nb, l2_squared(query, &self.vectors[nb]));
                let admit = results.len() < ef
                    || results.peek().map_or(true, |worst| hit < *worst);
                if admit {
                    candidates.push(Reverse(hit));
                    results.push(hit);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        results.into_sorted_vec()
    }
}

impl NearestNeighbors for HnswIndex {
    fn search(&self, query: &[f32], k: usize, params: &SearchParams) -> Result<Vec<Neighbor>> {
        check_query_dimension(self.dimension, query)?;

        let entry = match self.entry_point {
            Some(e) => e,
            None => return Ok(Vec::new()),
        };

        let mut current = entry;
        for lev in (1..=self.max_level).rev() {
            if let Some(closest) = self.search_layer(query, &[current], 1, lev).first() {
                current = closest.id;
            }
        }

        let ef = params.ef_search.max(k);
        let mut hits = self.search_layer(query, &[current], ef, 0);
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
