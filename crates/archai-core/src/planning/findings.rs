//! Goal → findings → epics and tickets.
//!
//! A goal is matched lexically against symbol names; each matched symbol is
//! assessed and becomes one ticket. Numbers (effort, priority, dependencies)
//! come from the graph and the assessment only. Prose comes from a
//! [`TextGenerator`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::config::{EngineConfig, PlanningConfig};
use crate::graph::layers::{is_test_path, Layer};
use crate::graph::{Graph, TargetMatch};
use crate::models::{EdgeKind, Epic, ImpactAssessment, Priority, SymbolKind, Subtask, Ticket};
use crate::risk::assess_match;
use crate::risk::guards::{clamp_limit, truncate_query, MAX_FINDINGS};

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]+").unwrap());

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "into", "that", "this", "all", "any", "add", "new",
    "make", "use", "support", "improve", "refactor", "update", "change", "fix", "our", "its",
];

/// Matches below this strength are ignored.
const MIN_MATCH_SCORE: f64 = 0.5;

// ---------------------------------------------------------------------------
// Lexical matching
// ---------------------------------------------------------------------------

fn tokens(value: &str) -> HashSet<String> {
    TOKEN_RE
        .find_iter(value)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Exact name → 1.0, name substring → 0.9, qualified-name substring → 0.8,
/// otherwise the share of query tokens found in the symbol's tokens.
pub fn lexical_score(query: &str, name: &str, qualified_name: &str) -> f64 {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return 0.0;
    }
    let n = name.to_lowercase();
    let qn = qualified_name.to_lowercase();
    if q == n || q == qn {
        return 1.0;
    }
    if n.contains(&q) {
        return 0.9;
    }
    if qn.contains(&q) {
        return 0.8;
    }
    let query_tokens = tokens(query);
    if query_tokens.is_empty() {
        return 0.0;
    }
    let target_tokens = tokens(&format!("{name} {qualified_name}"));
    if target_tokens.is_empty() {
        return 0.0;
    }
    let overlap = query_tokens.intersection(&target_tokens).count();
    overlap as f64 / query_tokens.len().max(1) as f64
}

/// Content words of a goal, in order of first appearance.
pub fn goal_terms(goal: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    TOKEN_RE
        .find_iter(goal)
        .map(|m| m.as_str())
        .filter(|t| t.len() >= 3 && !STOPWORDS.contains(&t.to_lowercase().as_str()))
        .filter(|t| seen.insert(t.to_lowercase()))
        .map(str::to_string)
        .collect()
}

fn is_candidate(graph: &Graph, index: usize) -> bool {
    let node = graph.node(index);
    matches!(node.kind, SymbolKind::Class | SymbolKind::Function) && !is_test_path(&node.file_path)
}

/// Best matching classes and functions for `goal`, strongest first; ties go
/// to more callers, then PageRank, then id.
pub fn match_goal(graph: &Graph, goal: &str, limit: usize) -> Vec<(usize, f64)> {
    let terms = goal_terms(goal);
    let mut scored: Vec<(usize, f64)> = (0..graph.node_count())
        .filter(|&i| is_candidate(graph, i))
        .filter_map(|i| {
            let node = graph.node(i);
            let whole = lexical_score(goal, &node.name, &node.qualified_name);
            let best = terms
                .iter()
                .map(|t| lexical_score(t, &node.name, &node.qualified_name))
                .fold(whole, f64::max);
            (best >= MIN_MATCH_SCORE).then_some((i, best))
        })
        .collect();
    scored.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| graph.fan_in(b.0).cmp(&graph.fan_in(a.0)))
            .then_with(|| graph.pagerank(b.0).total_cmp(&graph.pagerank(a.0)))
            .then_with(|| graph.node(a.0).id.cmp(&graph.node(b.0).id))
    });
    scored.truncate(limit);
    scored
}

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

/// One symbol the goal touches, with its assessment.
#[derive(Clone, Debug, PartialEq)]
pub struct Finding {
    pub node: usize,
    pub symbol: String,
    pub name: String,
    pub file: String,
    pub layer: Layer,
    /// Lexical match strength; zero for hotspot fallbacks.
    pub match_score: f64,
    pub from_hotspots: bool,
    pub line_span: u32,
    pub untested: bool,
    pub assessment: ImpactAssessment,
}

pub fn collect_findings(graph: &Graph, goal: &str, config: &EngineConfig) -> Vec<Finding> {
    let limit = clamp_limit(config.planning.max_findings as i64, MAX_FINDINGS) as usize;
    let mut matches = match_goal(graph, goal, limit);
    let from_hotspots = matches.is_empty();
    if from_hotspots {
        debug!("Goal {:?} matched no symbols; falling back to hotspots", goal);
        matches = graph
            .hotspots(graph.node_count())
            .into_iter()
            .filter(|&i| is_candidate(graph, i))
            .take(limit)
            .map(|i| (i, 0.0))
            .collect();
    }

    matches
        .into_iter()
        .map(|(index, match_score)| {
            let node = graph.node(index);
            let assessment = assess_match(
                graph,
                &node.qualified_name,
                TargetMatch {
                    index,
                    ambiguous: false,
                },
                config.planning.assessment_depth,
                &config.risk,
            );
            Finding {
                node: index,
                symbol: node.qualified_name.clone(),
                name: node.name.clone(),
                file: node.file_path.clone(),
                layer: graph.architecture().layer_of(&node.file_path),
                match_score,
                from_hotspots,
                line_span: node.line_span(),
                untested: graph.metrics_for(&node.file_path).test_coverage != Some(true),
                assessment,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Text generation
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubtaskKind {
    CharacterizationTests,
    Implementation,
    CallerUpdates,
    EvidenceGathering,
}

impl SubtaskKind {
    pub fn title(&self) -> &'static str {
        match self {
            SubtaskKind::CharacterizationTests => "Characterization tests",
            SubtaskKind::Implementation => "Implementation",
            SubtaskKind::CallerUpdates => "Caller updates",
            SubtaskKind::EvidenceGathering => "Evidence gathering",
        }
    }

    /// Relative share of the ticket's effort.
    fn weight(&self) -> f64 {
        match self {
            SubtaskKind::CharacterizationTests => 0.25,
            SubtaskKind::Implementation => 0.45,
            SubtaskKind::CallerUpdates => 0.2,
            SubtaskKind::EvidenceGathering => 0.1,
        }
    }
}

/// What the text collaborator is asked to write.
#[derive(Clone, Copy, Debug)]
pub enum TextRequest<'a> {
    EpicName {
        layer: Layer,
        goal: &'a str,
    },
    EpicDescription {
        layer: Layer,
        goal: &'a str,
        findings: &'a [&'a Finding],
    },
    TicketTitle {
        goal: &'a str,
        finding: &'a Finding,
    },
    TicketDescription {
        goal: &'a str,
        finding: &'a Finding,
    },
    SubtaskDescription {
        kind: SubtaskKind,
        finding: &'a Finding,
    },
}

/// Structured findings in, plain text out. Implementations must not
/// influence any number in the plan.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, request: &TextRequest<'_>) -> String;
}

/// Deterministic templates.
#[derive(Clone, Copy, Debug, Default)]
pub struct TemplateText;

impl TextGenerator for TemplateText {
    fn generate(&self, request: &TextRequest<'_>) -> String {
        match *request {
            TextRequest::EpicName { layer, .. } => format!("{} changes", layer.as_str()),
            TextRequest::EpicDescription {
                layer,
                goal,
                findings,
            } => {
                let names: Vec<&str> = findings.iter().map(|f| f.name.as_str()).collect();
                format!(
                    "Work in the {} layer toward \"{goal}\": {}.",
                    layer.as_str(),
                    names.join(", ")
                )
            }
            TextRequest::TicketTitle { finding, .. } => {
                if finding.from_hotspots {
                    format!("Review {}", finding.symbol)
                } else {
                    format!("Update {}", finding.symbol)
                }
            }
            TextRequest::TicketDescription { goal, finding } => {
                let assessment = &finding.assessment;
                format!(
                    "{} in {} for \"{goal}\". Risk {} (score {:.1}, confidence {:.2}); {} affected component(s).",
                    finding.symbol,
                    finding.file,
                    assessment.risk_level,
                    assessment.risk_score,
                    assessment.confidence_score,
                    assessment.affected_components.len()
                )
            }
            TextRequest::SubtaskDescription { kind, finding } => match kind {
                SubtaskKind::CharacterizationTests => {
                    format!("Pin down the current behavior of {} with tests.", finding.name)
                }
                SubtaskKind::Implementation => format!("Make the change in {}.", finding.file),
                SubtaskKind::CallerUpdates => format!(
                    "Update and verify the {} affected caller(s).",
                    finding.assessment.affected_components.len()
                ),
                SubtaskKind::EvidenceGathering => format!(
                    "Resolve the gaps that left {} ungraded: {}",
                    finding.name, finding.assessment.rationale
                ),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tickets and epics
// ---------------------------------------------------------------------------

fn round_half_hours(hours: f64) -> f64 {
    ((hours * 2.0).round() / 2.0).max(0.5)
}

/// Effort grows with blast radius, size and missing tests, capped per
/// ticket and rounded to half hours.
pub fn estimate_effort(finding: &Finding, planning: &PlanningConfig) -> f64 {
    let mut hours = planning.base_effort_hours
        + planning.effort_per_affected * finding.assessment.affected_components.len() as f64
        + planning.effort_per_span_line * finding.line_span as f64;
    if finding.untested {
        hours += planning.untested_effort_hours;
    }
    round_half_hours(hours.min(planning.max_ticket_hours))
}

pub fn priority_for(finding: &Finding) -> Priority {
    match finding.match_score {
        s if s >= 0.95 => Priority::Critical,
        s if s >= 0.85 => Priority::High,
        s if s >= MIN_MATCH_SCORE => Priority::Medium,
        _ => Priority::Low,
    }
}

fn subtasks(finding: &Finding, effort: f64, text: &dyn TextGenerator) -> Vec<Subtask> {
    let mut kinds = vec![SubtaskKind::CharacterizationTests, SubtaskKind::Implementation];
    if !finding.assessment.affected_components.is_empty() {
        kinds.push(SubtaskKind::CallerUpdates);
    }
    if finding.assessment.insufficient_data {
        kinds.push(SubtaskKind::EvidenceGathering);
    }
    let total_weight: f64 = kinds.iter().map(SubtaskKind::weight).sum();

    let mut assigned = 0.0;
    kinds
        .iter()
        .enumerate()
        .map(|(position, kind)| {
            let hours = if position + 1 == kinds.len() {
                effort - assigned
            } else {
                (effort * kind.weight() / total_weight * 100.0).round() / 100.0
            };
            assigned += hours;
            Subtask {
                title: kind.title().to_string(),
                description: text.generate(&TextRequest::SubtaskDescription {
                    kind: *kind,
                    finding,
                }),
                effort_hours: hours,
            }
        })
        .collect()
}

fn is_dependency_edge(kind: EdgeKind) -> bool {
    matches!(kind, EdgeKind::Calls | EdgeKind::Inherits)
}

/// Finding indexes that `finding` calls or extends, excluding direct mutual
/// pairs.
fn callee_findings(graph: &Graph, findings: &[Finding], of: usize) -> Vec<usize> {
    let by_node: HashMap<usize, usize> = findings
        .iter()
        .enumerate()
        .map(|(i, f)| (f.node, i))
        .collect();
    let calls = |from: usize, to: usize| {
        graph
            .callees(from)
            .any(|(target, edge)| target == to && is_dependency_edge(edge.kind) && !edge.is_unresolved())
    };
    let source = findings[of].node;
    let mut out: Vec<usize> = graph
        .callees(source)
        .filter(|(target, edge)| *target != source && is_dependency_edge(edge.kind) && !edge.is_unresolved())
        .filter_map(|(target, _)| by_node.get(&target).copied())
        .filter(|&callee| !calls(findings[callee].node, source))
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// Turn findings into epics grouped by layer. Ticket ids run `T-001`,
/// `T-002`, ... in epic order.
pub fn build_epics(
    graph: &Graph,
    goal: &str,
    findings: &[Finding],
    planning: &PlanningConfig,
    text: &dyn TextGenerator,
) -> Vec<Epic> {
    let mut by_layer: BTreeMap<Layer, Vec<usize>> = BTreeMap::new();
    for (i, finding) in findings.iter().enumerate() {
        by_layer.entry(finding.layer).or_default().push(i);
    }

    let mut ticket_ids: Vec<String> = vec![String::new(); findings.len()];
    let mut next = 1;
    for members in by_layer.values() {
        for &i in members {
            ticket_ids[i] = format!("T-{next:03}");
            next += 1;
        }
    }

    by_layer
        .into_iter()
        .map(|(layer, members)| {
            let grouped: Vec<&Finding> = members.iter().map(|&i| &findings[i]).collect();
            let tickets = members
                .iter()
                .map(|&i| {
                    let finding = &findings[i];
                    let effort = estimate_effort(finding, planning);
                    let mut risk_flags = finding.assessment.primary_risk_factors.clone();
                    if finding.assessment.insufficient_data {
                        risk_flags.push("insufficient_data".to_string());
                    }
                    Ticket {
                        ticket_id: ticket_ids[i].clone(),
                        title: text.generate(&TextRequest::TicketTitle { goal, finding }),
                        description: text
                            .generate(&TextRequest::TicketDescription { goal, finding }),
                        priority: priority_for(finding),
                        risk_flags,
                        risk_level: finding.assessment.risk_level,
                        effort_hours: effort,
                        dependencies: callee_findings(graph, findings, i)
                            .into_iter()
                            .map(|callee| ticket_ids[callee].clone())
                            .collect(),
                        subtasks: subtasks(finding, effort, text),
                    }
                })
                .collect();
            Epic {
                name: text.generate(&TextRequest::EpicName { layer, goal }),
                description: text.generate(&TextRequest::EpicDescription {
                    layer,
                    goal,
                    findings: &grouped,
                }),
                tickets,
            }
        })
        .collect()
}

/// Goal to epics in one step.
pub fn plan_work(
    graph: &Graph,
    goal: &str,
    config: &EngineConfig,
    text: &dyn TextGenerator,
) -> Vec<Epic> {
    let goal = truncate_query(goal);
    let findings = collect_findings(graph, &goal, config);
    let epics = build_epics(graph, &goal, &findings, &config.planning, text);
    info!(
        "Planned {} ticket(s) in {} epic(s) for goal {:?}",
        findings.len(),
        epics.len(),
        goal
    );
    epics
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::graph::GraphParts;
    use crate::models::{Edge, FileMetrics, FileStatus, Language, RiskLevel, SymbolId, SymbolNode};

    fn node(qualified: &str, kind: SymbolKind, file: &str) -> SymbolNode {
        SymbolNode {
            id: SymbolId::derive(&[file, qualified, kind.as_str()]),
            name: qualified.rsplit('.').next().unwrap_or(qualified).to_string(),
            qualified_name: qualified.to_string(),
            kind,
            file_path: file.to_string(),
            start_line: 1,
            end_line: 40,
            language: Language::Python,
            container: None,
            documented: false,
        }
    }

    fn calls(source: &SymbolNode, target: &SymbolNode) -> Edge {
        Edge::resolved(source.id.clone(), target.id.clone(), EdgeKind::Calls, 2)
    }

    /// `api/routes.py::refund_route -> core/refunds.py::RefundService`
    /// `-> core/payments.py::PaymentService`, with a test of the routes.
    fn graph() -> Graph {
        let payments = node("core.payments.PaymentService", SymbolKind::Class, "core/payments.py");
        let refunds = node("core.refunds.RefundService", SymbolKind::Class, "core/refunds.py");
        let route = node("api.routes.refund_route", SymbolKind::Function, "api/routes.py");
        let test = node("tests.test_routes.test_refund", SymbolKind::Function, "tests/test_routes.py");
        let edges = vec![
            calls(&refunds, &payments),
            calls(&route, &refunds),
            calls(&test, &route),
        ];
        let nodes = vec![payments, refunds, route, test];
        let files: Vec<String> = nodes.iter().map(|n| n.file_path.clone()).collect();
        let file_status: BTreeMap<String, FileStatus> = files
            .iter()
            .map(|f| (f.clone(), FileStatus::Resolved))
            .collect();
        let file_metrics: BTreeMap<String, FileMetrics> = files
            .iter()
            .map(|f| {
                let metrics = FileMetrics {
                    churn: 1,
                    test_coverage: Some(f == "api/routes.py"),
                    insufficient_history: false,
                    ..FileMetrics::unknown(f)
                };
                (f.clone(), metrics)
            })
            .collect();
        Graph::from_parts(GraphParts {
            nodes,
            edges,
            file_status,
            file_metrics,
            unresolvable_mentions: BTreeMap::new(),
            history_available: true,
            external_references: 0,
        })
        .unwrap()
    }

    #[test]
    fn test_lexical_score_levels() {
        assert_eq!(lexical_score("PaymentService", "PaymentService", "a.PaymentService"), 1.0);
        assert_eq!(lexical_score("payment", "PaymentService", "a.PaymentService"), 0.9);
        assert_eq!(lexical_score("core", "PaymentService", "core.PaymentService"), 0.8);
        assert_eq!(lexical_score("", "x", "y"), 0.0);
    }

    #[test]
    fn test_goal_terms_drop_stopwords() {
        assert_eq!(
            goal_terms("Add refund support to the PaymentService"),
            vec!["refund", "PaymentService"]
        );
    }

    #[test]
    fn test_match_goal_ranks_exact_names_first() {
        let graph = graph();
        let matches = match_goal(&graph, "Refund flow for PaymentService", 10);
        assert_eq!(matches.len(), 3);
        assert_eq!(graph.node(matches[0].0).name, "PaymentService");
        assert_eq!(matches[0].1, 1.0);
        let mut rest: Vec<&str> = matches[1..]
            .iter()
            .map(|&(i, _)| graph.node(i).name.as_str())
            .collect();
        rest.sort_unstable();
        assert_eq!(rest, vec!["RefundService", "refund_route"]);
        assert!(matches[1..].iter().all(|&(_, score)| score == 0.9));
    }

    #[test]
    fn test_unmatched_goal_falls_back_to_hotspots() {
        let graph = graph();
        let findings = collect_findings(&graph, "zzz qqq", &EngineConfig::default());
        assert!(!findings.is_empty());
        assert!(findings.iter().all(|f| f.from_hotspots && f.match_score == 0.0));
        assert!(findings.iter().all(|f| !is_test_path(&f.file)));
    }

    #[test]
    fn test_plan_groups_layers_and_links_callees() {
        let graph = graph();
        let epics = plan_work(
            &graph,
            "Refund flow for PaymentService",
            &EngineConfig::default(),
            &TemplateText,
        );
        let names: Vec<&str> = epics.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Interface changes", "Core changes"]);

        let tickets: Vec<&Ticket> = epics.iter().flat_map(|e| &e.tickets).collect();
        let id_of = |symbol: &str| {
            tickets
                .iter()
                .find(|t| t.title.ends_with(symbol))
                .map(|t| t.ticket_id.clone())
                .unwrap()
        };
        let refunds = tickets
            .iter()
            .find(|t| t.title.ends_with("RefundService"))
            .unwrap();
        assert_eq!(refunds.dependencies, vec![id_of("PaymentService")]);
        let route = tickets.iter().find(|t| t.title.ends_with("refund_route")).unwrap();
        assert_eq!(route.ticket_id, "T-001");
        assert_eq!(route.dependencies, vec![id_of("RefundService")]);

        for ticket in &tickets {
            assert!(ticket.effort_hours > 0.0);
            assert_eq!((ticket.effort_hours * 2.0).fract(), 0.0);
            let split: f64 = ticket.subtasks.iter().map(|s| s.effort_hours).sum();
            assert!((split - ticket.effort_hours).abs() < 1e-9);
            assert_ne!(ticket.risk_level, RiskLevel::Unknown);
        }
    }

    #[test]
    fn test_mutual_callers_are_not_linked() {
        let a = node("core.a.alpha", SymbolKind::Function, "core/a.py");
        let b = node("core.b.beta", SymbolKind::Function, "core/b.py");
        let edges = vec![calls(&a, &b), calls(&b, &a)];
        let graph = Graph::from_parts(GraphParts {
            nodes: vec![a, b],
            edges,
            ..GraphParts::default()
        })
        .unwrap();
        let epics = plan_work(&graph, "alpha beta", &EngineConfig::default(), &TemplateText);
        assert!(epics
            .iter()
            .flat_map(|e| &e.tickets)
            .all(|t| t.dependencies.is_empty()));
    }

    #[test]
    fn test_numbers_do_not_depend_on_text() {
        struct Loud;
        impl TextGenerator for Loud {
            fn generate(&self, _request: &TextRequest<'_>) -> String {
                "!!!".to_string()
            }
        }
        let graph = graph();
        let config = EngineConfig::default();
        let plain = plan_work(&graph, "PaymentService", &config, &TemplateText);
        let loud = plan_work(&graph, "PaymentService", &config, &Loud);
        let numbers = |epics: &[Epic]| -> Vec<(String, f64, Vec<String>)> {
            epics
                .iter()
                .flat_map(|e| &e.tickets)
                .map(|t| (t.ticket_id.clone(), t.effort_hours, t.dependencies.clone()))
                .collect()
        };
        assert_eq!(numbers(&plain[..]), numbers(&loud[..]));
    }
}
