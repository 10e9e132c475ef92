//! Public operations: impact assessment, sprint planning and sprint
//! simulation over one analysed codebase.
//!
//! An [`AnalysisSession`] indexes a tree and reads its history once; the
//! frozen graph is then shared by every request made against it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::config::EngineConfig;
use crate::errors::{ArchaiError, ArchaiResult};
use crate::graph::builder::build_graph;
use crate::graph::Graph;
use crate::history::collector::collect_from_source;
use crate::history::git::GitLog;
use crate::history::HistorySource;
use crate::indexer::cache::ExtractionCache;
use crate::indexer::filesystem::{FileSource, FsFileSource};
use crate::indexer::pipeline::{index_files, CancellationToken, IndexStats};
use crate::models::{
    Epic, ImpactAssessment, ImpactRequest, PlanRequest, SimulateRequest, SprintPlanConfig,
    SrcOutput, TaskPrediction, WdpOutput,
};
use crate::planning::{build_schedule, plan_work, SprintSchedule, TemplateText, TextGenerator};
use crate::simulation::{recommendations, simulate, SimulationRun};

/// Epics plus the schedule built from them.
#[derive(Clone, Debug)]
pub struct SprintPlan {
    pub epics: Vec<Epic>,
    pub schedule: SprintSchedule,
}

impl SprintPlan {
    /// Wire shape. Schedule flags are folded into each ticket's
    /// `risk_flags`.
    pub fn to_output(&self) -> WdpOutput {
        let mut epics = self.epics.clone();
        for ticket in epics.iter_mut().flat_map(|e| e.tickets.iter_mut()) {
            for flag in self.schedule.flags_for(&ticket.ticket_id) {
                let flag = flag.as_str().to_string();
                if !ticket.risk_flags.contains(&flag) {
                    ticket.risk_flags.push(flag);
                }
            }
        }
        WdpOutput {
            epics,
            sprint_feasibility: self.schedule.feasibility.clone(),
        }
    }
}

pub fn src_output(goal: &str, run: &SimulationRun, config: &EngineConfig) -> SrcOutput {
    SrcOutput {
        sprint_goal: goal.to_string(),
        confidence_score: run.confidence_score,
        status: run.status,
        task_predictions: run
            .tickets
            .iter()
            .map(|t| TaskPrediction {
                ticket_id: t.ticket_id.clone(),
                probability: t.probability,
                risk_level: t.risk_level,
                rationale: t.rationale.clone(),
            })
            .collect(),
        recommendations: recommendations(run, &config.simulation),
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct AnalysisSession {
    root: Option<PathBuf>,
    config: EngineConfig,
    graph: Arc<Graph>,
    stats: IndexStats,
}

impl AnalysisSession {
    /// Index the tree at `path` and read its git history.
    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> ArchaiResult<Self> {
        Self::open_cached(path, config, None)
    }

    pub fn open_cached(
        path: impl AsRef<Path>,
        config: EngineConfig,
        cache: Option<&ExtractionCache>,
    ) -> ArchaiResult<Self> {
        let root = path.as_ref();
        if !root.is_dir() {
            return Err(ArchaiError::InvalidInput(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        let files = FsFileSource::new(root);
        let history = GitLog::new(root);
        let mut session = Self::open_with(&files, &history, config, cache)?;
        session.root = Some(root.to_path_buf());
        Ok(session)
    }

    /// Build a session from arbitrary file and history sources.
    pub fn open_with(
        files: &dyn FileSource,
        history: &dyn HistorySource,
        config: EngineConfig,
        cache: Option<&ExtractionCache>,
    ) -> ArchaiResult<Self> {
        config.validate()?;
        let index = index_files(files, &config.indexing, cache, &CancellationToken::new())?;
        let report = collect_from_source(
            history,
            index.statuses.keys().map(String::as_str),
            &config.history,
        );
        let graph = build_graph(&index, &report, config.indexing.workers)?;
        info!(
            "Session ready: {} files, {} nodes, {} edges, history {}",
            index.stats.files_indexed,
            graph.node_count(),
            graph.edge_count(),
            if report.available { "available" } else { "unavailable" }
        );
        Ok(Self {
            root: None,
            config,
            graph: Arc::new(graph),
            stats: index.stats,
        })
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn graph(&self) -> Arc<Graph> {
        Arc::clone(&self.graph)
    }

    pub fn index_stats(&self) -> IndexStats {
        self.stats
    }

    pub fn impact(&self, target: &str, depth: i64) -> ImpactAssessment {
        crate::risk::assess(&self.graph, target, depth, &self.config.risk)
    }

    pub fn plan(&self, goal: &str, team_size: u32, days: u32) -> ArchaiResult<SprintPlan> {
        self.plan_with(goal, team_size, days, &TemplateText)
    }

    pub fn plan_with(
        &self,
        goal: &str,
        team_size: u32,
        days: u32,
        text: &dyn TextGenerator,
    ) -> ArchaiResult<SprintPlan> {
        let sprint = SprintPlanConfig::new(team_size, days)?;
        let epics = plan_work(&self.graph, goal, &self.config, text);
        let schedule = build_schedule(&epics, &sprint, &self.config.scheduling)?;
        Ok(SprintPlan { epics, schedule })
    }

    pub fn simulate(&self, plan: &SprintPlan, strict: bool) -> ArchaiResult<SimulationRun> {
        simulate(&plan.epics, &plan.schedule, &self.config.simulation, strict)
    }
}

// ---------------------------------------------------------------------------
// Request-level operations
// ---------------------------------------------------------------------------

pub fn assess_impact(
    request: &ImpactRequest,
    config: &EngineConfig,
) -> ArchaiResult<ImpactAssessment> {
    let session = AnalysisSession::open(&request.path, config.clone())?;
    Ok(session.impact(&request.target, request.depth))
}

pub fn plan_sprint(request: &PlanRequest, config: &EngineConfig) -> ArchaiResult<WdpOutput> {
    SprintPlanConfig::new(request.team_size, request.days)?;
    let session = AnalysisSession::open(&request.path, config.clone())?;
    let plan = session.plan(&request.goal, request.team_size, request.days)?;
    Ok(plan.to_output())
}

pub fn simulate_sprint(
    request: &SimulateRequest,
    config: &EngineConfig,
) -> ArchaiResult<SrcOutput> {
    SprintPlanConfig::new(request.team_size, request.days)?;
    let session = AnalysisSession::open(&request.path, config.clone())?;
    let plan = session.plan(&request.goal, request.team_size, request.days)?;
    let run = session.simulate(&plan, request.strict)?;
    Ok(src_output(&request.goal, &run, session.config()))
}

pub fn assess_impact_json(raw: &str, config: &EngineConfig) -> ArchaiResult<String> {
    let request: ImpactRequest = serde_json::from_str(raw)?;
    Ok(serde_json::to_string(&assess_impact(&request, config)?)?)
}

pub fn plan_sprint_json(raw: &str, config: &EngineConfig) -> ArchaiResult<String> {
    let request: PlanRequest = serde_json::from_str(raw)?;
    Ok(serde_json::to_string(&plan_sprint(&request, config)?)?)
}

pub fn simulate_sprint_json(raw: &str, config: &EngineConfig) -> ArchaiResult<String> {
    let request: SimulateRequest = serde_json::from_str(raw)?;
    Ok(serde_json::to_string(&simulate_sprint(&request, config)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{CommitRecord, StaticHistory};
    use crate::indexer::filesystem::MemoryFileSource;
    use crate::models::RiskLevel;
    use chrono::{DateTime, Duration};
    use std::fs;

    const PAYMENTS: &str = "class PaymentService:\n    \"\"\"Charges cards.\"\"\"\n\n    def charge(self, amount):\n        return amount\n";
    const REFUNDS: &str = "from core.payments import PaymentService\n\n\nclass RefundService:\n    def refund(self, amount):\n        service = PaymentService()\n        return service.charge(-amount)\n";
    const ROUTES: &str = "from core.refunds import RefundService\n\n\ndef refund_route(amount):\n    return RefundService().refund(amount)\n";

    fn write_tree(root: &Path) {
        fs::create_dir_all(root.join("core")).unwrap();
        fs::create_dir_all(root.join("api")).unwrap();
        fs::write(root.join("core/payments.py"), PAYMENTS).unwrap();
        fs::write(root.join("core/refunds.py"), REFUNDS).unwrap();
        fs::write(root.join("api/routes.py"), ROUTES).unwrap();
    }

    fn memory_source() -> MemoryFileSource {
        MemoryFileSource::new()
            .with_file("core/payments.py", PAYMENTS)
            .with_file("core/refunds.py", REFUNDS)
            .with_file("api/routes.py", ROUTES)
    }

    fn history() -> StaticHistory {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let records = (0..12)
            .map(|i| CommitRecord {
                timestamp: now - Duration::days(i),
                files: vec![
                    "core/payments.py".to_string(),
                    "core/refunds.py".to_string(),
                    "api/routes.py".to_string(),
                ],
                message: format!("Change {i}"),
            })
            .collect();
        StaticHistory::new(records)
    }

    #[test]
    fn test_missing_path_is_invalid_input() {
        let err = AnalysisSession::open("/definitely/not/here", EngineConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, ArchaiError::InvalidInput(_)));
    }

    #[test]
    fn test_invalid_team_rejected_before_indexing() {
        let request = PlanRequest {
            path: "/definitely/not/here".to_string(),
            goal: "refunds".to_string(),
            team_size: 0,
            days: 5,
        };
        let err = plan_sprint(&request, &EngineConfig::default()).err().unwrap();
        assert!(matches!(err, ArchaiError::InvalidInput(_)));
    }

    #[test]
    fn test_tree_without_history_is_insufficient() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path());
        let raw = serde_json::json!({
            "path": dir.path().to_string_lossy(),
            "target": "PaymentService",
            "depth": 2
        })
        .to_string();
        let out = assess_impact_json(&raw, &EngineConfig::default()).unwrap();
        let assessment: ImpactAssessment = serde_json::from_str(&out).unwrap();
        assert!(assessment.target_id.is_some());
        assert_eq!(assessment.risk_level, RiskLevel::Unknown);
        assert!(assessment.insufficient_data);
    }

    #[test]
    fn test_plan_and_simulate_over_tree() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path());
        let request = SimulateRequest {
            path: dir.path().to_string_lossy().to_string(),
            goal: "Refund flow for PaymentService".to_string(),
            team_size: 2,
            days: 5,
            strict: false,
        };
        let config = EngineConfig::default();
        let plan = plan_sprint(&request.plan_request(), &config).unwrap();
        assert!(!plan.epics.is_empty());
        let first = simulate_sprint(&request, &config).unwrap();
        let second = simulate_sprint(&request, &config).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.sprint_goal, request.goal);
        assert!((0.0..=1.0).contains(&first.confidence_score));
        let planned: usize = plan.epics.iter().map(|e| e.tickets.len()).sum();
        assert_eq!(first.task_predictions.len(), planned);
    }

    #[test]
    fn test_session_over_memory_sources() {
        let session =
            AnalysisSession::open_with(&memory_source(), &history(), EngineConfig::default(), None)
                .unwrap();
        assert!(session.root().is_none());
        assert_eq!(session.index_stats().files_indexed, 3);
        let graph = session.graph();
        assert_eq!(graph.file_statuses().len(), 3);
        assert!(!graph.nodes_in_file("core/payments.py").is_empty());
        let assessment = session.impact("PaymentService", 3);
        assert!(assessment.target_id.is_some());
        let plan = session.plan("Refund flow for PaymentService", 1, 5).unwrap();
        let output = plan.to_output();
        assert_eq!(output.epics.len(), plan.epics.len());
        assert_eq!(output.sprint_feasibility, plan.schedule.feasibility);
        let run = session.simulate(&plan, true).unwrap();
        assert_eq!(run.days.len(), 5);
    }

    #[test]
    fn test_unparsed_caller_file_forces_unknown() {
        let source = MemoryFileSource::new()
            .with_file("core/payments.py", PAYMENTS)
            .with_file(
                "api/routes.py",
                "from core.payments import PaymentService\n\ndef charge_route(amount:\n    return PaymentService().charge(amount)\n",
            );
        let session =
            AnalysisSession::open_with(&source, &history(), EngineConfig::default(), None).unwrap();
        assert_eq!(session.index_stats().files_failed, 1);

        let assessment = session.impact("PaymentService", 3);
        assert!(assessment.target_id.is_some());
        assert!(assessment.affected_components.is_empty());
        assert_eq!(assessment.risk_level, RiskLevel::Unknown);
        assert!(assessment.insufficient_data);
        assert!(assessment.rationale.contains("api/routes.py"));
        assert!(assessment.confidence_score < 1.0);
    }
}
