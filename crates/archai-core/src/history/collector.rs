//! Per-file churn, defect history and sufficiency from commit records.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use tracing::{info, warn};

use crate::config::HistoryConfig;
use crate::history::{CommitRecord, HistorySource};
use crate::models::FileMetrics;

/// Metrics for every indexed file plus whether a log was read at all.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HistoryReport {
    pub available: bool,
    /// End of the churn window.
    pub as_of: Option<DateTime<Utc>>,
    pub records_in_window: usize,
    pub metrics: BTreeMap<String, FileMetrics>,
}

impl HistoryReport {
    /// Every path marked `insufficient_history`.
    pub fn unavailable<'a>(paths: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            available: false,
            as_of: None,
            records_in_window: 0,
            metrics: paths
                .into_iter()
                .map(|p| (p.to_string(), FileMetrics::unknown(p)))
                .collect(),
        }
    }
}

fn defect_matcher(keywords: &[String]) -> Option<Regex> {
    let alternatives: Vec<String> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(regex::escape)
        .collect();
    if alternatives.is_empty() {
        return None;
    }
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|"))).ok()
}

pub fn newest_commit(records: &[CommitRecord]) -> Option<DateTime<Utc>> {
    records.iter().map(|r| r.timestamp).max()
}

#[derive(Default)]
struct FileTally {
    churn: u32,
    last_modified: Option<DateTime<Utc>>,
    defect_history: bool,
    seen: bool,
}

/// Compute metrics for `paths` over the window ending at `as_of`.
///
/// With fewer than `min_records` commits inside the window every file is
/// `insufficient_history`; so is a file that appears nowhere in the log.
pub fn collect_metrics<'a>(
    records: &[CommitRecord],
    paths: impl IntoIterator<Item = &'a str>,
    config: &HistoryConfig,
    as_of: DateTime<Utc>,
) -> HistoryReport {
    let window_start = as_of - Duration::days(config.window_days.max(0));
    let matcher = defect_matcher(&config.defect_keywords);

    let mut tallies: HashMap<&str, FileTally> = HashMap::new();
    let mut records_in_window = 0usize;
    for record in records.iter().filter(|r| r.timestamp <= as_of) {
        let in_window = record.timestamp >= window_start;
        if in_window {
            records_in_window += 1;
        }
        let is_defect = in_window
            && matcher
                .as_ref()
                .is_some_and(|m| m.is_match(&record.message));
        for file in &record.files {
            let tally = tallies.entry(file.as_str()).or_default();
            tally.seen = true;
            tally.last_modified = tally.last_modified.max(Some(record.timestamp));
            if in_window {
                tally.churn += 1;
                tally.defect_history |= is_defect;
            }
        }
    }

    let sufficient = records_in_window >= config.min_records;
    let metrics = paths
        .into_iter()
        .map(|path| {
            let tally = tallies.remove(path).unwrap_or_default();
            let metrics = FileMetrics {
                path: path.to_string(),
                churn: tally.churn,
                last_modified: tally.last_modified,
                test_coverage: None,
                defect_history: tally.defect_history,
                insufficient_history: !sufficient || !tally.seen,
            };
            (path.to_string(), metrics)
        })
        .collect();

    HistoryReport {
        available: true,
        as_of: Some(as_of),
        records_in_window,
        metrics,
    }
}

/// Read `source` and compute metrics as of its newest commit. An unavailable
/// or empty log yields [`HistoryReport::unavailable`].
pub fn collect_from_source<'a>(
    source: &dyn HistorySource,
    paths: impl IntoIterator<Item = &'a str>,
    config: &HistoryConfig,
) -> HistoryReport {
    let records = match source.commits() {
        Ok(records) => records,
        Err(e) => {
            warn!("History unavailable: {e}");
            return HistoryReport::unavailable(paths);
        }
    };
    let Some(as_of) = newest_commit(&records) else {
        warn!("History unavailable: log is empty");
        return HistoryReport::unavailable(paths);
    };
    let report = collect_metrics(&records, paths, config, as_of);
    info!(
        "History: {} commits in the {}-day window ending {}",
        report.records_in_window, config.window_days, as_of
    );
    if report.records_in_window < config.min_records {
        warn!(
            "History window has {} commits, fewer than the {} required",
            report.records_in_window, config.min_records
        );
    }
    report
}
