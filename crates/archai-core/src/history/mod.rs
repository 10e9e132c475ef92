//! Change-history signals: commit records in, per-file metrics out.

pub mod collector;
pub mod git;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ArchaiResult;

/// One commit as supplied by a version-control access layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub timestamp: DateTime<Utc>,
    /// Paths relative to the analysis root.
    pub files: Vec<String>,
    pub message: String,
}

/// Supplier of ordered commit records. An `Err` means the log is
/// unavailable, which downstream is treated as insufficient history.
pub trait HistorySource: Send + Sync {
    fn commits(&self) -> ArchaiResult<Vec<CommitRecord>>;
}

/// Fixed in-memory log.
#[derive(Clone, Debug, Default)]
pub struct StaticHistory {
    records: Vec<CommitRecord>,
}

impl StaticHistory {
    pub fn new(records: Vec<CommitRecord>) -> Self {
        Self { records }
    }
}

impl HistorySource for StaticHistory {
    fn commits(&self) -> ArchaiResult<Vec<CommitRecord>> {
        Ok(self.records.clone())
    }
}
