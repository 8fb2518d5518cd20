//! Self-correction and hallucination risk
//!
//! Scores how much of a generated answer is supported by its context and replaces
//! unsupported answers with the grounded context.

use crate::corpus::CorpusRow;
use crate::embedding::tokenize;
use crate::generator::UNKNOWN_ANSWER;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Result of checking an answer against its context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub final_answer: String,
    pub corrected: bool,
    /// Share of the final answer supported by the context, in [0, 1]
    pub faithfulness: f64,
}

pub trait SelfCorrector: Send + Sync {
    fn self_correct(&self, answer: &str, context: &[CorpusRow]) -> Correction;
}

/// Faithfulness = fraction of answer word tokens that occur in the context answers.
/// Answers scoring under `threshold` are replaced by the context itself.
#[derive(Debug, Clone, Copy)]
pub struct OverlapSelfCorrector {
    pub threshold: f64,
}

impl Default for OverlapSelfCorrector {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

impl OverlapSelfCorrector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn faithfulness(answer: &str, context: &[CorpusRow]) -> f64 {
        let supported: HashSet<String> = context
            .iter()
            .flat_map(|row| tokenize(&row.answer))
            .collect();

        let tokens = tokenize(answer);
        if tokens.is_empty() {
            return 0.0;
        }
        let hits = tokens.iter().filter(|t| supported.contains(*t)).count();
        hits as f64 / tokens.len() as f64
    }
}

impl SelfCorrector for OverlapSelfCorrector {
    fn self_correct(&self, answer: &str, context: &[CorpusRow]) -> Correction {
        let answer = answer.trim();

        // Abstaining is always faithful
        if answer.eq_ignore_ascii_case(UNKNOWN_ANSWER) {
            return Correction {
                final_answer: UNKNOWN_ANSWER.to_string(),
                corrected: false,
                faithfulness: 1.0,
            };
        }

        let score = Self::faithfulness(answer, context);
        if score >= self.threshold {
            return Correction {
                final_answer: answer.to_string(),
                corrected: false,
                faithfulness: score,
            };
        }

        let grounded = context
            .iter()
            .map(|row| row.answer.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        if grounded.is_empty() {
            Correction {
                final_answer: UNKNOWN_ANSWER.to_string(),
                corrected: true,
                faithfulness: 1.0,
            }
        } else {
            Correction {
                faithfulness: Self::faithfulness(&grounded, context),
                final_answer: grounded,
                corrected: true,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        };
        f.write_str(label)
    }
}

/// Bucket a faithfulness score into a hallucination-risk label.
pub fn hallucination_risk(faithfulness: f64) -> RiskLevel {
    if faithfulness >= 0.8 {
        RiskLevel::Low
    } else if faithfulness >= 0.5 {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}
