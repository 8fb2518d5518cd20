//! Question/Answer Log
//!
//! Append-only record of every answered question.

use crate::correction::RiskLevel;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaLogEntry {
    pub timestamp: DateTime<Utc>,
    pub query_id: String,
    pub question: String,
    pub answer: String,
    pub faithfulness: f64,
    pub hallucination_risk: RiskLevel,
    pub corrected: bool,
}

impl QaLogEntry {
    pub fn new(
        question: &str,
        answer: &str,
        faithfulness: f64,
        hallucination_risk: RiskLevel,
        corrected: bool,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            query_id: uuid::Uuid::new_v4().to_string(),
            question: question.to_string(),
            answer: answer.to_string(),
            faithfulness,
            hallucination_risk,
            corrected,
        }
    }
}

pub trait QaLogSink: Send + Sync {
    fn persist(&self, entry: &QaLogEntry) -> Result<()>;
}

/// CSV file sink. The header is written when the file is first created.
pub struct CsvQaLog {
    path: PathBuf,
}

impl CsvQaLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All persisted entries, oldest first. A missing file reads as empty.
    pub fn read_entries(&self) -> Result<Vec<QaLogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut rdr = csv::Reader::from_path(&self.path)?;
        let entries = rdr
            .deserialize::<QaLogEntry>()
            .collect::<std::result::Result<Vec<_>, csv::Error>>()?;
        Ok(entries)
    }
}

impl QaLogSink for CsvQaLog {
    fn persist(&self, entry: &QaLogEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let needs_header = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer.serialize(entry)?;
        writer.flush()?;

        debug!("Logged query {} to {}", entry.query_id, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let log = CsvQaLog::new(dir.path().join("logs").join("qa_logs.csv"));

        let first = QaLogEntry::new(
            "What is APR?",
            "Annual Percentage Rate",
            1.0,
            RiskLevel::Low,
            false,
        );
        let second = QaLogEntry::new(
            "Explain EMI",
            "Equated Monthly Installment",
            0.6,
            RiskLevel::Medium,
            true,
        );
        log.persist(&first).unwrap();
        log.persist(&second).unwrap();

        let entries = log.read_entries().unwrap();
        assert_eq!(entries, vec![first, second]);
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = CsvQaLog::new(dir.path().join("absent.csv"));
        assert!(log.read_entries().unwrap().is_empty());
    }
}
