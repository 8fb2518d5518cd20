//! FAQ Corpus
//!
//! Question/answer rows loaded from a two-column CSV file. Row positions are the
//! identifiers every vector index refers back to, so rows are never removed or edited.

use crate::error::{RagError, Result};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::info;

const REQUIRED_COLUMNS: [&str; 2] = ["question", "answer"];

/// One question/answer pair with its stable row position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusRow {
    pub id: usize,
    pub question: String,
    pub answer: String,
}

/// Append-only question/answer corpus.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    rows: Vec<CorpusRow>,
}

impl Corpus {
    /// Build a corpus from in-memory pairs. Blank fields are rejected.
    pub fn from_pairs<Q, A>(pairs: impl IntoIterator<Item = (Q, A)>) -> Result<Self>
    where
        Q: Into<String>,
        A: Into<String>,
    {
        let mut corpus = Self::default();
        for (question, answer) in pairs {
            corpus.append(question, answer)?;
        }
        Ok(corpus)
    }

    /// Load a corpus from a CSV file with exactly the `question` and `answer` columns.
    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            RagError::Configuration(format!("Cannot open corpus {}: {}", path.display(), e))
        })?;
        let corpus = Self::from_reader(file)?;
        info!("Loaded {} corpus rows from {}", corpus.len(), path.display());
        Ok(corpus)
    }

    /// Parse CSV text from any reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()?
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();

        if headers.len() != REQUIRED_COLUMNS.len()
            || !REQUIRED_COLUMNS.iter().all(|c| headers.iter().any(|h| h == c))
        {
            return Err(RagError::Configuration(format!(
                "Corpus must have exactly the columns {:?}, found {:?}",
                REQUIRED_COLUMNS, headers
            )));
        }

        let question_idx = headers.iter().position(|h| h == "question").unwrap_or(0);
        let answer_idx = headers.iter().position(|h| h == "answer").unwrap_or(1);

        let mut corpus = Self::default();
        for (line, record) in rdr.records().enumerate() {
            let record = record.map_err(|e| {
                RagError::Configuration(format!("Malformed corpus record: {}", e))
            })?;
            let question = record.get(question_idx).unwrap_or("");
            let answer = record.get(answer_idx).unwrap_or("");
            corpus.append(question, answer).map_err(|e| {
                // +2: one for the header row, one for 1-based numbering
                RagError::Configuration(format!("Corpus line {}: {}", line + 2, e))
            })?;
        }

        Ok(corpus)
    }

    /// Append a row. Any index built before this call is stale afterwards.
    pub fn append(
        &mut self,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) -> Result<usize> {
        let question = question.into().trim().to_string();
        let answer = answer.into().trim().to_string();

        if question.is_empty() || answer.is_empty() {
            return Err(RagError::Configuration(
                "question and answer must both be non-empty".to_string(),
            ));
        }

        let id = self.rows.len();
        self.rows.push(CorpusRow { id, question, answer });
        Ok(id)
    }

    pub fn rows(&self) -> &[CorpusRow] {
        &self.rows
    }

    pub fn get(&self, id: usize) -> Option<&CorpusRow> {
        self.rows.get(id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Questions in row order, the text every index embeds.
    pub fn questions(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.question.clone()).collect()
    }

    /// Answer of the row whose question equals the trimmed `question` exactly.
    pub fn ground_truth_for(&self, question: &str) -> Option<&str> {
        let question = question.trim();
        self.rows
            .iter()
            .find(|r| r.question == question)
            .map(|r| r.answer.as_str())
    }

    /// FNV-1a digest over every row. Changes whenever a row is appended.
    pub fn fingerprint(&self) -> u64 {
        let mut hash: u64 = 0xcbf29ce484222325;
        for row in &self.rows {
            for byte in row
                .question
                .bytes()
                .chain(std::iter::once(0x1f))
                .chain(row.answer.bytes())
                .chain(std::iter::once(0x1e))
            {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }
        }
        hash
    }
}
