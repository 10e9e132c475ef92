//! `git log` adapter for [`HistorySource`].

use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::DateTime;
use tracing::debug;

use crate::errors::{ArchaiError, ArchaiResult};
use crate::history::{CommitRecord, HistorySource};

const RECORD_SEPARATOR: char = '\u{1e}';
const FIELD_SEPARATOR: char = '\u{1f}';

/// Reads history by running `git log` in a working tree. Paths are reported
/// relative to `repo_path`, so it may point at a subdirectory of the
/// repository.
#[derive(Clone, Debug)]
pub struct GitLog {
    repo_path: PathBuf,
}

impl GitLog {
    pub fn new(repo_path: impl AsRef<Path>) -> Self {
        Self {
            repo_path: repo_path.as_ref().to_path_buf(),
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    fn run(&self, args: &[&str]) -> ArchaiResult<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .output()
            .map_err(|e| ArchaiError::HistoryUnavailable(format!("failed to run git: {e}")))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(ArchaiError::HistoryUnavailable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}

impl HistorySource for GitLog {
    fn commits(&self) -> ArchaiResult<Vec<CommitRecord>> {
        if !self.repo_path.is_dir() {
            return Err(ArchaiError::HistoryUnavailable(format!(
                "{} is not a directory",
                self.repo_path.display()
            )));
        }
        let raw = self.run(&[
            "log",
            "--no-merges",
            "--relative",
            "--name-only",
            "--format=%x1e%ct%x1f%s",
        ])?;
        Ok(parse_git_log(&raw))
    }
}

/// Parse `git log --name-only --format=%x1e%ct%x1f%s` output. Records with
/// an unreadable timestamp are skipped.
pub fn parse_git_log(raw: &str) -> Vec<CommitRecord> {
    let mut records = Vec::new();
    for chunk in raw.split(RECORD_SEPARATOR) {
        let mut lines = chunk.lines();
        let Some(header) = lines.next() else {
            continue;
        };
        if header.trim().is_empty() {
            continue;
        }
        let (seconds, subject) = header.split_once(FIELD_SEPARATOR).unwrap_or((header, ""));
        let Some(timestamp) = seconds
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|s| DateTime::from_timestamp(s, 0))
        else {
            debug!("Skipping git record with bad timestamp: {}", header);
            continue;
        };
        let files = lines
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| l.replace('\\', "/"))
            .collect();
        records.push(CommitRecord {
            timestamp,
            files,
            message: subject.to_string(),
        });
    }
    records
}
