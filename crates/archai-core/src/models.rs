//! Shared typed models used across indexing, graph, risk, planning and
//! simulation layers, plus the request/response shapes of the public
//! operations.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::SchedulingConfig;
use crate::errors::{ArchaiError, ArchaiResult};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Stable symbol identifier: first 16 hex chars of a SHA-256 digest.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolId(pub String);

impl SymbolId {
    /// Derive an id from the parts that identify a declaration. The same
    /// parts always yield the same id.
    pub fn derive(parts: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        let digest = format!("{:x}", hasher.finalize());
        SymbolId(digest[..16].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Graph model
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Java,
    Typescript,
    Go,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Java => "java",
            Language::Typescript => "typescript",
            Language::Go => "go",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Module,
    Class,
    Function,
    Variable,
    /// Synthetic node standing in for the target of an unresolved reference.
    UnknownTarget,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Module => "module",
            SymbolKind::Class => "class",
            SymbolKind::Function => "function",
            SymbolKind::Variable => "variable",
            SymbolKind::UnknownTarget => "unknown_target",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SymbolNode {
    pub id: SymbolId,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub language: Language,
    /// Enclosing class for methods and fields.
    pub container: Option<String>,
    pub documented: bool,
}

impl SymbolNode {
    pub fn line_span(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    pub fn is_synthetic(&self) -> bool {
        self.kind == SymbolKind::UnknownTarget
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Calls,
    Imports,
    Inherits,
    Unresolved,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Resolved,
    UnresolvedDynamic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// Reflection, `eval`, computed member access.
    Dynamic,
    /// More than one declaration matched at the deciding resolution level.
    Ambiguous,
    /// A relative import naming a file that is not in the tree.
    MissingModule,
}

impl UnresolvedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnresolvedReason::Dynamic => "dynamic",
            UnresolvedReason::Ambiguous => "ambiguous",
            UnresolvedReason::MissingModule => "missing_module",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub source: SymbolId,
    pub target: SymbolId,
    pub kind: EdgeKind,
    pub resolution: Resolution,
    pub line: u32,
    /// Raw reference token, when one could be read at the call site.
    pub reference: Option<String>,
    pub reason: Option<UnresolvedReason>,
}

impl Edge {
    pub fn resolved(source: SymbolId, target: SymbolId, kind: EdgeKind, line: u32) -> Self {
        Self {
            source,
            target,
            kind,
            resolution: Resolution::Resolved,
            line,
            reference: None,
            reason: None,
        }
    }

    pub fn unresolved(
        source: SymbolId,
        target: SymbolId,
        line: u32,
        reference: Option<String>,
        reason: UnresolvedReason,
    ) -> Self {
        Self {
            source,
            target,
            kind: EdgeKind::Unresolved,
            resolution: Resolution::UnresolvedDynamic,
            line,
            reference,
            reason: Some(reason),
        }
    }

    pub fn is_unresolved(&self) -> bool {
        self.kind == EdgeKind::Unresolved
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FileStatus {
    Resolved,
    Unresolvable { reason: String },
}

impl FileStatus {
    pub fn is_resolved(&self) -> bool {
        matches!(self, FileStatus::Resolved)
    }
}

/// Per-file history and quality metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileMetrics {
    pub path: String,
    /// Commits touching the file inside the window.
    pub churn: u32,
    pub last_modified: Option<DateTime<Utc>>,
    pub test_coverage: Option<bool>,
    pub defect_history: bool,
    pub insufficient_history: bool,
}

impl FileMetrics {
    /// Metrics for a file nothing is known about.
    pub fn unknown(path: &str) -> Self {
        Self {
            path: path.to_string(),
            churn: 0,
            last_modified: None,
            test_coverage: None,
            defect_history: false,
            insufficient_history: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Risk model
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    #[default]
    Unknown,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Unknown => "UNKNOWN",
        }
    }

    /// Ordering key for "safety first" scheduling: higher runs earlier.
    /// UNKNOWN ranks with HIGH because missing evidence is never read as low
    /// risk.
    pub fn schedule_rank(&self) -> u8 {
        match self {
            RiskLevel::High | RiskLevel::Unknown => 3,
            RiskLevel::Medium => 2,
            RiskLevel::Low => 1,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AffectedComponent {
    pub name: String,
    pub depth: u32,
    pub file: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImpactAssessment {
    /// The target as requested.
    pub target: String,
    /// Id of the node the target resolved to.
    pub target_id: Option<SymbolId>,
    pub risk_score: f64,
    pub confidence_score: f64,
    pub risk_level: RiskLevel,
    pub affected_components: Vec<AffectedComponent>,
    pub primary_risk_factors: Vec<String>,
    pub recommendations: Vec<String>,
    pub insufficient_data: bool,
    pub rationale: String,
}

// ---------------------------------------------------------------------------
// Work items
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// Lower sorts first.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub title: String,
    pub description: String,
    pub effort_hours: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub priority: Priority,
    #[serde(default)]
    pub risk_flags: Vec<String>,
    #[serde(default)]
    pub risk_level: RiskLevel,
    pub effort_hours: f64,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Epic {
    pub name: String,
    pub description: String,
    pub tickets: Vec<Ticket>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SprintPlanConfig {
    pub team_size: u32,
    pub days: u32,
}

impl SprintPlanConfig {
    pub fn new(team_size: u32, days: u32) -> ArchaiResult<Self> {
        if team_size < 1 || days < 1 {
            return Err(ArchaiError::InvalidInput(format!(
                "team_size ({team_size}) and days ({days}) must both be at least 1"
            )));
        }
        Ok(Self { team_size, days })
    }

    pub fn daily_capacity_hours(&self, scheduling: &SchedulingConfig) -> f64 {
        self.team_size as f64 * scheduling.hours_per_developer_day
    }

    pub fn total_capacity_hours(&self, scheduling: &SchedulingConfig) -> f64 {
        self.daily_capacity_hours(scheduling) * self.days as f64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeasibilityStatus {
    Feasible,
    AtRisk,
    Infeasible,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SprintFeasibility {
    pub status: FeasibilityStatus,
    pub rationale: String,
    pub bottlenecks: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketState {
    Pending,
    Blocked,
    InProgress,
    Completed,
    AtRisk,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForecastStatus {
    OnTrack,
    AtRisk,
    OffTrack,
}

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

fn default_depth() -> i64 {
    3
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImpactRequest {
    pub path: String,
    pub target: String,
    #[serde(default = "default_depth")]
    pub depth: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub path: String,
    pub goal: String,
    pub team_size: u32,
    pub days: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulateRequest {
    pub path: String,
    pub goal: String,
    pub team_size: u32,
    pub days: u32,
    #[serde(default)]
    pub strict: bool,
}

impl SimulateRequest {
    pub fn plan_request(&self) -> PlanRequest {
        PlanRequest {
            path: self.path.clone(),
            goal: self.goal.clone(),
            team_size: self.team_size,
            days: self.days,
        }
    }
}

/// Work-breakdown plan ("WDP") returned by the plan operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WdpOutput {
    pub epics: Vec<Epic>,
    pub sprint_feasibility: SprintFeasibility,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskPrediction {
    pub ticket_id: String,
    pub probability: f64,
    pub risk_level: RiskLevel,
    pub rationale: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub task: String,
    pub action: String,
}

/// Sprint-readiness confidence ("SRC") returned by the simulate operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SrcOutput {
    pub sprint_goal: String,
    pub confidence_score: f64,
    pub status: ForecastStatus,
    pub task_predictions: Vec<TaskPrediction>,
    pub recommendations: Vec<Recommendation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_id_deterministic() {
        let a = SymbolId::derive(&["src/a.py", "a.run", "function", "3"]);
        let b = SymbolId::derive(&["src/a.py", "a.run", "function", "3"]);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 16);
    }

    #[test]
    fn test_symbol_id_separates_parts() {
        let a = SymbolId::derive(&["ab", "c"]);
        let b = SymbolId::derive(&["a", "bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_risk_level_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&RiskLevel::Unknown).unwrap(), "\"UNKNOWN\"");
        let level: RiskLevel = serde_json::from_str("\"HIGH\"").unwrap();
        assert_eq!(level, RiskLevel::High);
    }

    #[test]
    fn test_feasibility_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&FeasibilityStatus::AtRisk).unwrap(),
            "\"AT_RISK\""
        );
        assert_eq!(
            serde_json::to_string(&TicketState::InProgress).unwrap(),
            "\"IN_PROGRESS\""
        );
    }

    #[test]
    fn test_sprint_plan_config_capacity() {
        let plan = SprintPlanConfig::new(2, 5).unwrap();
        let scheduling = SchedulingConfig::default();
        assert_eq!(plan.daily_capacity_hours(&scheduling), 10.0);
        assert_eq!(plan.total_capacity_hours(&scheduling), 50.0);
        assert!(SprintPlanConfig::new(0, 5).is_err());
    }

    #[test]
    fn test_ticket_defaults_from_json() {
        let ticket: Ticket = serde_json::from_str(
            r#"{"ticket_id": "T-1", "title": "x", "priority": "High", "effort_hours": 3.0}"#,
        )
        .unwrap();
        assert_eq!(ticket.risk_level, RiskLevel::Unknown);
        assert!(ticket.dependencies.is_empty());
    }

    #[test]
    fn test_impact_request_default_depth() {
        let req: ImpactRequest =
            serde_json::from_str(r#"{"path": ".", "target": "PaymentService"}"#).unwrap();
        assert_eq!(req.depth, 3);
    }
}
