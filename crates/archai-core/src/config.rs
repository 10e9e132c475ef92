//! Engine configuration.
//!
//! Every weight, threshold and capacity constant lives in [`EngineConfig`],
//! which is passed by reference into each component call. Nothing below the
//! adapter edge reads ambient state; `with_env_overrides` is meant to be
//! called once by the embedding application.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{ArchaiError, ArchaiResult};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub indexing: IndexingConfig,
    pub history: HistoryConfig,
    pub risk: RiskConfig,
    pub planning: PlanningConfig,
    pub scheduling: SchedulingConfig,
    pub simulation: SimulationConfig,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Worker threads for per-file parsing and edge resolution.
    pub workers: usize,
    /// Upper bound on entries kept by an `ExtractionCache`.
    pub cache_entries: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            cache_entries: 4096,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Churn window length, ending at the `as_of` instant.
    pub window_days: i64,
    /// Fewer commits than this inside the window marks every file as
    /// `insufficient_history`.
    pub min_records: usize,
    pub defect_keywords: Vec<String>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            window_days: 90,
            min_records: 5,
            defect_keywords: [
                "fix", "bug", "bugfix", "hotfix", "defect", "regression", "crash", "revert",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    pub structural: f64,
    pub historical: f64,
    pub quality: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            structural: 0.5,
            historical: 0.3,
            quality: 0.2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuralWeights {
    pub fan_in: f64,
    pub reach: f64,
    pub span: f64,
    /// Saturation scales: `sat(x, k) = 1 - exp(-x / k)`.
    pub fan_in_scale: f64,
    pub reach_scale: f64,
    pub span_scale: f64,
}

impl Default for StructuralWeights {
    fn default() -> Self {
        Self {
            fan_in: 0.5,
            reach: 0.3,
            span: 0.2,
            fan_in_scale: 4.0,
            reach_scale: 6.0,
            span_scale: 80.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoricalWeights {
    pub churn: f64,
    pub defects: f64,
    pub churn_scale: f64,
}

impl Default for HistoricalWeights {
    fn default() -> Self {
        Self {
            churn: 0.7,
            defects: 0.3,
            churn_scale: 8.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub untested: f64,
    pub undocumented: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            untested: 0.6,
            undocumented: 0.4,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    /// Raw scores at or above this are MEDIUM.
    pub medium: f64,
    /// Raw scores at or above this are HIGH.
    pub high: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            medium: 25.0,
            high: 60.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub default_depth: i64,
    pub weights: SignalWeights,
    pub structural: StructuralWeights,
    pub historical: HistoricalWeights,
    pub quality: QualityWeights,
    pub thresholds: RiskThresholds,
    /// Confidence multiplier lost when the traversal stopped at `max_depth`
    /// with callers still left to expand.
    pub truncation_penalty: f64,
    /// Confidence multiplier lost when the target name matched more than
    /// one declaration.
    pub ambiguity_penalty: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            default_depth: 3,
            weights: SignalWeights::default(),
            structural: StructuralWeights::default(),
            historical: HistoricalWeights::default(),
            quality: QualityWeights::default(),
            thresholds: RiskThresholds::default(),
            truncation_penalty: 0.35,
            ambiguity_penalty: 0.1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    pub max_findings: usize,
    pub assessment_depth: i64,
    pub base_effort_hours: f64,
    pub effort_per_affected: f64,
    pub effort_per_span_line: f64,
    pub untested_effort_hours: f64,
    pub max_ticket_hours: f64,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            max_findings: 12,
            assessment_depth: 3,
            base_effort_hours: 2.0,
            effort_per_affected: 0.5,
            effort_per_span_line: 0.025,
            untested_effort_hours: 2.0,
            max_ticket_hours: 24.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    pub hours_per_developer_day: f64,
    /// Share of total sprint capacity above which a plan is AT_RISK.
    pub at_risk_utilization: f64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            hours_per_developer_day: 5.0,
            at_risk_utilization: 0.85,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskFactors {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub unknown: f64,
}

impl Default for RiskFactors {
    fn default() -> Self {
        Self {
            low: 0.95,
            medium: 0.85,
            high: 0.70,
            unknown: 0.75,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Team velocity multiplier; above 1.0 the team burns effort faster
    /// than estimated.
    pub velocity: f64,
    pub effort_scale_hours: f64,
    pub risk_factors: RiskFactors,
    /// Share of a ticket's effort re-queued after an AT_RISK draw.
    pub rework_share: f64,
    /// Probability lost by a ticket left entirely unstarted at sprint end;
    /// partly done tickets lose it in proportion to the effort remaining.
    pub unfinished_discount: f64,
    pub beyond_sprint_factor: f64,
    pub bottleneck_threshold_share: f64,
    pub on_track_confidence: f64,
    pub at_risk_confidence: f64,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            velocity: 1.0,
            effort_scale_hours: 40.0,
            risk_factors: RiskFactors::default(),
            rework_share: 0.5,
            unfinished_discount: 0.5,
            beyond_sprint_factor: 0.25,
            bottleneck_threshold_share: 0.5,
            on_track_confidence: 0.75,
            at_risk_confidence: 0.40,
            seed: 42,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading and validation
// ---------------------------------------------------------------------------

fn env_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    lookup(key).and_then(|raw| raw.trim().parse::<T>().ok())
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> ArchaiResult<Self> {
        let config: EngineConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> ArchaiResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Apply `ARCHAI_*` environment overrides.
    pub fn with_env_overrides(self) -> ArchaiResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup. Unparseable values are
    /// ignored, matching how boolean toggles fall back to their defaults.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> ArchaiResult<Self> {
        if let Some(v) = env_number(&lookup, "ARCHAI_WORKERS") {
            self.indexing.workers = v;
        }
        if let Some(v) = env_number(&lookup, "ARCHAI_HISTORY_WINDOW_DAYS") {
            self.history.window_days = v;
        }
        if let Some(v) = env_number(&lookup, "ARCHAI_HISTORY_MIN_RECORDS") {
            self.history.min_records = v;
        }
        if let Some(v) = env_number(&lookup, "ARCHAI_HOURS_PER_DEVELOPER_DAY") {
            self.scheduling.hours_per_developer_day = v;
        }
        if let Some(v) = env_number(&lookup, "ARCHAI_VELOCITY") {
            self.simulation.velocity = v;
        }
        if let Some(v) = env_number(&lookup, "ARCHAI_SIMULATION_SEED") {
            self.simulation.seed = v;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> ArchaiResult<()> {
        let w = &self.risk.weights;
        if [w.structural, w.historical, w.quality]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
            || w.structural + w.historical + w.quality <= 0.0
        {
            return Err(ArchaiError::Config(
                "risk weights must be non-negative with a positive sum".to_string(),
            ));
        }
        let t = &self.risk.thresholds;
        if !(0.0..=100.0).contains(&t.medium) || !(0.0..=100.0).contains(&t.high) || t.medium > t.high
        {
            return Err(ArchaiError::Config(format!(
                "risk thresholds must satisfy 0 <= medium ({}) <= high ({}) <= 100",
                t.medium, t.high
            )));
        }
        if self.scheduling.hours_per_developer_day <= 0.0
            || !self.scheduling.hours_per_developer_day.is_finite()
        {
            return Err(ArchaiError::Config(
                "hours_per_developer_day must be positive".to_string(),
            ));
        }
        if self.simulation.velocity <= 0.0 || self.simulation.effort_scale_hours <= 0.0 {
            return Err(ArchaiError::Config(
                "velocity and effort_scale_hours must be positive".to_string(),
            ));
        }
        let sim = &self.simulation;
        let unit = 0.0..=1.0;
        if !unit.contains(&sim.rework_share) || !unit.contains(&sim.unfinished_discount) {
            return Err(ArchaiError::Config(
                "rework_share and unfinished_discount must lie in [0, 1]".to_string(),
            ));
        }
        if self.history.window_days <= 0 {
            return Err(ArchaiError::Config("window_days must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let cfg = EngineConfig::from_json_str(r#"{"scheduling": {"hours_per_developer_day": 6.0}}"#)
            .unwrap();
        assert_eq!(cfg.scheduling.hours_per_developer_day, 6.0);
        assert_eq!(cfg.risk.thresholds.high, 60.0);
        assert_eq!(cfg.simulation.seed, 42);
    }

    #[test]
    fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archai.json");
        std::fs::write(&path, r#"{"simulation": {"seed": 9, "velocity": 1.5}}"#).unwrap();
        let cfg = EngineConfig::from_path(&path).unwrap();
        assert_eq!(cfg.simulation.seed, 9);
        assert_eq!(cfg.simulation.velocity, 1.5);
        assert!(matches!(
            EngineConfig::from_path(&dir.path().join("missing.json")),
            Err(ArchaiError::Io(_))
        ));
    }

    #[test]
    fn test_rejects_out_of_range_shares() {
        let err = EngineConfig::from_json_str(r#"{"simulation": {"unfinished_discount": 1.5}}"#)
            .unwrap_err();
        assert!(matches!(err, ArchaiError::Config(_)));
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let err = EngineConfig::from_json_str(r#"{"risk": {"thresholds": {"medium": 70, "high": 60}}}"#)
            .unwrap_err();
        assert!(matches!(err, ArchaiError::Config(_)));
    }

    #[test]
    fn test_overrides_apply_and_ignore_garbage() {
        let cfg = EngineConfig::default()
            .with_overrides(|key| match key {
                "ARCHAI_SIMULATION_SEED" => Some("7".to_string()),
                "ARCHAI_WORKERS" => Some("not-a-number".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(cfg.simulation.seed, 7);
        assert_eq!(cfg.indexing.workers, 4);
    }

    #[test]
    fn test_override_validation_fails() {
        let result = EngineConfig::default().with_overrides(|key| {
            (key == "ARCHAI_HOURS_PER_DEVELOPER_DAY").then(|| "0".to_string())
        });
        assert!(result.is_err());
    }
}
