//! Lexical Reranker
//!
//! Reorders retrieved rows by how closely the raw query text matches each candidate's
//! question. Embedding similarity finds topically related rows; this pass prefers the
//! ones phrased like the query.

use crate::corpus::CorpusRow;
use crate::retriever::RetrievalResult;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strsim::{jaro_winkler, normalized_levenshtein, sorensen_dice};

/// String similarity used for reranking. Every metric maps into [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LexicalMetric {
    /// Ratcliff/Obershelp: 2·M / (|a| + |b|) over recursively matched blocks
    #[default]
    Gestalt,
    NormalizedLevenshtein,
    JaroWinkler,
    SorensenDice,
}

impl LexicalMetric {
    pub fn score(&self, a: &str, b: &str) -> f64 {
        match self {
            LexicalMetric::Gestalt => gestalt_ratio(a, b),
            LexicalMetric::NormalizedLevenshtein => normalized_levenshtein(a, b),
            LexicalMetric::JaroWinkler => jaro_winkler(a, b),
            LexicalMetric::SorensenDice => sorensen_dice(a, b),
        }
    }
}

impl FromStr for LexicalMetric {
    type Err = crate::error::RagError;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "gestalt" => Ok(LexicalMetric::Gestalt),
            "levenshtein" | "normalized_levenshtein" => Ok(LexicalMetric::NormalizedLevenshtein),
            "jaro_winkler" => Ok(LexicalMetric::JaroWinkler),
            "sorensen_dice" | "dice" => Ok(LexicalMetric::SorensenDice),
            other => Err(crate::error::RagError::Configuration(format!(
                "Unrecognized rerank metric '{}'",
                other
            ))),
        }
    }
}

/// A candidate row with its rerank score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankedCandidate {
    pub row: CorpusRow,
    /// Embedding distance from retrieval
    pub distance: f32,
    pub rerank_score: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Reranker {
    metric: LexicalMetric,
}

impl Reranker {
    pub fn new(metric: LexicalMetric) -> Self {
        Self { metric }
    }

    pub fn metric(&self) -> LexicalMetric {
        self.metric
    }

    /// Score every candidate against `query` and sort descending by score.
    /// Equal scores keep their retrieval order.
    pub fn rerank(&self, query: &str, candidates: &RetrievalResult) -> Vec<RerankedCandidate> {
        let query = query.to_lowercase();

        let mut reranked: Vec<RerankedCandidate> = candidates
            .rows
            .iter()
            .map(|r| RerankedCandidate {
                row: r.row.clone(),
                distance: r.distance,
                rerank_score: self.metric.score(&query, &r.row.question.to_lowercase()),
            })
            .collect();

        // sort_by is stable
        reranked.sort_by(|a, b| b.rerank_score.total_cmp(&a.rerank_score));
        reranked
    }
}

/// Gestalt pattern-matching ratio over characters.
///
/// Finds the longest common block, recurses on the pieces left and right of it and
/// sums the matched lengths. Two empty strings are identical (1.0).
pub fn gestalt_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matched_chars(&a, &b) as f64 / total as f64
}

fn matched_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, size) = longest_match(a, b, alo, ahi, blo, bhi);
        if size == 0 {
            continue;
        }
        matched += size;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            pending.push((i + size, ahi, j + size, bhi));
        }
    }

    matched
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]`.
/// Ties resolve to the block starting earliest in `a`, then earliest in `b`.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
    // run[j] = length of the common run ending at a[i-1], b[j-1]
    let mut prev = vec![0usize; bhi - blo + 1];
    let mut curr = vec![0usize; bhi - blo + 1];

    for i in alo..ahi {
        for j in blo..bhi {
            let col = j - blo + 1;
            curr[col] = if a[i] == b[j] { prev[col - 1] + 1 } else { 0 };
            if curr[col] > best_size {
                best_size = curr[col];
                best_i = i + 1 - best_size;
                best_j = j + 1 - best_size;
            }
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    (best_i, best_j, best_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retriever::RetrievedRow;

    fn candidates(questions: &[&str]) -> RetrievalResult {
        RetrievalResult {
            rows: questions
                .iter()
                .enumerate()
                .map(|(id, q)| RetrievedRow {
                    row: CorpusRow {
                        id,
                        question: q.to_string(),
                        answer: format!("answer {}", id),
                    },
                    distance: id as f32,
                })
                .collect(),
        }
    }

    #[test]
    fn test_gestalt_known_values() {
        // 2 * 6 matched / 23 chars
        assert!((gestalt_ratio("explain emi", "what is emi?") - 12.0 / 23.0).abs() < 1e-9);
        assert!((gestalt_ratio("abcd", "bcde") - 0.75).abs() < 1e-9);
        assert_eq!(gestalt_ratio("", ""), 1.0);
        assert_eq!(gestalt_ratio("abc", ""), 0.0);
        assert_eq!(gestalt_ratio("abc", "xyz"), 0.0);
    }

    #[test]
    fn test_identical_question_scores_one() {
        let reranked = Reranker::default().rerank("WHAT IS EMI?", &candidates(&["What is EMI?"]));
        assert_eq!(reranked[0].rerank_score, 1.0);
    }

    #[test]
    fn test_rerank_can_invert_retrieval_order() {
        let reranked = Reranker::default().rerank(
            "Explain EMI",
            &candidates(&["What is APR?", "What is a grace period?", "What is EMI?"]),
        );
        let questions: Vec<&str> = reranked.iter().map(|c| c.row.question.as_str()).collect();
        assert_eq!(questions, vec!["What is EMI?", "What is a grace period?", "What is APR?"]);
        assert!(reranked.windows(2).all(|w| w[0].rerank_score >= w[1].rerank_score));
    }

    #[test]
    fn test_ties_keep_retrieval_order() {
        let reranked = Reranker::default().rerank("zzz", &candidates(&["aaa", "bbb", "ccc"]));
        let ids: Vec<usize> = reranked.iter().map(|c| c.row.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_rerank_is_repeatable() {
        let input = candidates(&["What is APR?", "What is EMI?", "What is a grace period?"]);
        let reranker = Reranker::default();
        assert_eq!(reranker.rerank("emi?", &input), reranker.rerank("emi?", &input));
    }

    #[test]
    fn test_empty_candidates() {
        assert!(Reranker::default().rerank("anything", &RetrievalResult::default()).is_empty());
    }

    #[test]
    fn test_strsim_metrics_stay_in_range() {
        for metric in [
            LexicalMetric::NormalizedLevenshtein,
            LexicalMetric::JaroWinkler,
            LexicalMetric::SorensenDice,
        ] {
            let reranker = Reranker::new(metric);
            let pool = candidates(&["What is EMI?", "What is APR?"]);
            let reranked = reranker.rerank("what is emi?", &pool);
            assert_eq!(reranked[0].row.question, "What is EMI?");
            assert!((reranked[0].rerank_score - 1.0).abs() < 1e-9);
            assert!(reranked.iter().all(|c| (0.0..=1.0).contains(&c.rerank_score)));
        }
    }

    #[test]
    fn test_parse_metric() {
        assert_eq!("jaro-winkler".parse::<LexicalMetric>().unwrap(), LexicalMetric::JaroWinkler);
        assert!("cosine".parse::<LexicalMetric>().is_err());
    }
}
