//! Impact assessment: backward traversal from a target, the refusal
//! protocol, signal aggregation and the final graded result.

use std::collections::{BTreeSet, HashSet, VecDeque};

use tracing::{debug, info};

use crate::config::RiskConfig;
use crate::graph::{Graph, TargetMatch};
use crate::indexer::symbols::module_short_name;
use crate::models::{AffectedComponent, Edge, ImpactAssessment, RiskLevel};
use crate::risk::guards::{clamp_depth, truncate_query, MAX_GRAPH_VISITED, MAX_IMPACT_DEPTH};
use crate::risk::signals::{score, Signal, SignalInputs, SignalScores};

pub const TARGET_NOT_FOUND: &str = "target not found";

const MAX_LISTED_REFUSALS: usize = 3;

// ---------------------------------------------------------------------------
// Traversal
// ---------------------------------------------------------------------------

/// Outcome of the bounded backward walk from one target.
#[derive(Debug, Default)]
pub struct Traversal<'g> {
    /// Reached callers as `(node index, depth)`, in discovery order.
    pub reached: Vec<(usize, u32)>,
    /// Unresolved edges that may hide a caller of a reached node.
    pub hidden_callers: BTreeSet<&'g Edge>,
    /// Resolved incoming edges examined while expanding.
    pub resolved_edges: usize,
    /// Callers were left unexpanded at the depth limit or the visit cap.
    pub truncated: bool,
}

/// Breadth-first walk over caller edges from `start`, at most `max_depth`
/// hops, visiting each node once.
pub fn traverse_callers(graph: &Graph, start: usize, max_depth: u32) -> Traversal<'_> {
    let mut traversal = Traversal::default();
    let mut queue: VecDeque<(usize, u32)> = VecDeque::new();
    queue.push_back((start, 0));
    let mut visited: HashSet<usize> = HashSet::new();
    visited.insert(start);

    while let Some((current, depth)) = queue.pop_front() {
        traversal
            .hidden_callers
            .extend(graph.wildcard_dynamic_from(current));

        if depth >= max_depth {
            if graph.callers(current).any(|(s, _)| !visited.contains(&s)) {
                traversal.truncated = true;
            }
            continue;
        }

        traversal
            .hidden_callers
            .extend(graph.unresolved_named(&graph.node(current).name));

        for (source, _) in graph.callers(current) {
            traversal.resolved_edges += 1;
            if visited.contains(&source) {
                continue;
            }
            if visited.len() >= MAX_GRAPH_VISITED {
                traversal.truncated = true;
                break;
            }
            visited.insert(source);
            traversal.reached.push((source, depth + 1));
            queue.push_back((source, depth + 1));
        }
    }
    traversal
}

// ---------------------------------------------------------------------------
// Assessment
// ---------------------------------------------------------------------------

/// Evidence gaps that force an UNKNOWN grade.
#[derive(Debug, Default)]
struct Refusal {
    hidden_callers: Vec<String>,
    unresolvable_files: Vec<String>,
    thin_history: Vec<String>,
}

impl Refusal {
    fn graph_complete(&self) -> bool {
        self.hidden_callers.is_empty() && self.unresolvable_files.is_empty()
    }

    fn history_sufficient(&self) -> bool {
        self.thin_history.is_empty()
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.hidden_callers.is_empty() {
            parts.push(format!(
                "{} unresolved reference(s) may hide callers ({})",
                self.hidden_callers.len(),
                listed(&self.hidden_callers)
            ));
        }
        if !self.unresolvable_files.is_empty() {
            parts.push(format!(
                "unresolvable files touched ({})",
                listed(&self.unresolvable_files)
            ));
        }
        if !self.thin_history.is_empty() {
            parts.push(format!(
                "insufficient history for {}",
                listed(&self.thin_history)
            ));
        }
        format!("Refused to grade: {}.", parts.join("; "))
    }
}

fn listed(items: &[String]) -> String {
    let mut shown: Vec<String> = items.iter().take(MAX_LISTED_REFUSALS).cloned().collect();
    if items.len() > MAX_LISTED_REFUSALS {
        shown.push(format!("{} more", items.len() - MAX_LISTED_REFUSALS));
    }
    shown.join(", ")
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

pub fn grade(raw_score: f64, config: &RiskConfig) -> RiskLevel {
    if raw_score >= config.thresholds.high {
        RiskLevel::High
    } else if raw_score >= config.thresholds.medium {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn not_found(target: &str) -> ImpactAssessment {
    ImpactAssessment {
        target: target.to_string(),
        target_id: None,
        risk_score: 0.0,
        confidence_score: 0.0,
        risk_level: RiskLevel::Unknown,
        affected_components: Vec::new(),
        primary_risk_factors: Vec::new(),
        recommendations: vec![
            "Check the symbol name or pass a fully qualified name.".to_string(),
        ],
        insufficient_data: true,
        rationale: TARGET_NOT_FOUND.to_string(),
    }
}

fn factor_text(signal: Signal, inputs: &SignalInputs, affected: usize, file: &str) -> String {
    match signal {
        Signal::FanIn => format!("fan-in: {} direct callers", inputs.fan_in),
        Signal::Reach => format!("blast radius: {affected} affected components"),
        Signal::Span => format!("size: {} lines", inputs.line_span),
        Signal::Churn => format!("churn: {} recent commits to {file}", inputs.churn),
        Signal::Defects => format!("defect history in {file}"),
        Signal::Untested => "no associated tests".to_string(),
        Signal::Undocumented => "not documented".to_string(),
    }
}

fn recommendation(signal: Signal, name: &str, file: &str, affected: usize) -> String {
    match signal {
        Signal::FanIn | Signal::Reach => format!(
            "Keep {name}'s signature stable or stage the change; coordinate with the {affected} affected components."
        ),
        Signal::Span => format!("Split {name} into smaller units before changing its behavior."),
        Signal::Churn => format!("Review the recent changes to {file} before starting."),
        Signal::Defects => format!("Add regression tests for the defects previously fixed in {file}."),
        Signal::Untested => format!("Add characterization tests for {name} before modifying it."),
        Signal::Undocumented => format!("Document the current contract of {name}."),
    }
}

/// Assess the impact of changing `target`, walking at most `depth` caller
/// hops (clamped to `[1, 6]`).
pub fn assess(graph: &Graph, target: &str, depth: i64, config: &RiskConfig) -> ImpactAssessment {
    let target = truncate_query(target);
    match graph.find_target(&target) {
        Some(found) => assess_match(graph, &target, found, depth, config),
        None => {
            info!("Impact target {:?} not found", target);
            not_found(&target)
        }
    }
}

/// Assess an already located node.
pub fn assess_match(
    graph: &Graph,
    requested: &str,
    found: TargetMatch,
    depth: i64,
    config: &RiskConfig,
) -> ImpactAssessment {
    let max_depth = clamp_depth(depth, MAX_IMPACT_DEPTH) as u32;
    let node = graph.node(found.index);
    let traversal = traverse_callers(graph, found.index, max_depth);

    let mut affected: Vec<AffectedComponent> = traversal
        .reached
        .iter()
        .map(|&(i, d)| {
            let n = graph.node(i);
            AffectedComponent {
                name: n.qualified_name.clone(),
                depth: d,
                file: n.file_path.clone(),
            }
        })
        .collect();
    affected.sort_by(|a, b| {
        a.depth
            .cmp(&b.depth)
            .then_with(|| a.file.cmp(&b.file))
            .then_with(|| a.name.cmp(&b.name))
    });

    // Unparsed files naming the target, its module or a reached caller may
    // hold callers the graph never saw.
    let module = module_short_name(&node.file_path);
    let mut names: Vec<&str> = vec![node.name.as_str(), module.as_str()];
    names.extend(node.container.as_deref());
    names.extend(traversal.reached.iter().map(|&(i, _)| graph.node(i).name.as_str()));
    let unparsed = graph.unresolvable_files_mentioning(&names);

    let touched: BTreeSet<&str> = std::iter::once(node.file_path.as_str())
        .chain(affected.iter().map(|a| a.file.as_str()))
        .chain(unparsed.iter().copied())
        .collect();

    // Refusal protocol.
    let mut refusal = Refusal::default();
    for edge in &traversal.hidden_callers {
        let site = graph
            .node_by_id(&edge.source)
            .map(|n| format!("{}:{}", n.file_path, edge.line))
            .unwrap_or_else(|| format!("line {}", edge.line));
        let label = edge.reference.as_deref().unwrap_or("<dynamic>");
        refusal.hidden_callers.push(format!("{label} at {site}"));
    }
    for &file in &touched {
        if !graph.file_status(file).is_some_and(|s| s.is_resolved()) {
            refusal.unresolvable_files.push(file.to_string());
        }
        if !graph.history_available() || graph.metrics_for(file).insufficient_history {
            refusal.thin_history.push(file.to_string());
        }
    }

    // Signals.
    let target_metrics = graph.metrics_for(&node.file_path);
    let inputs = SignalInputs {
        fan_in: graph.fan_in(found.index),
        reach: traversal
            .reached
            .iter()
            .map(|&(_, d)| 1.0 / d.max(1) as f64)
            .sum(),
        line_span: node.line_span(),
        churn: target_metrics.churn,
        defect_history: target_metrics.defect_history,
        untested: target_metrics.test_coverage != Some(true),
        undocumented: !node.documented,
    };
    let scores = score(&inputs, config);

    // Confidence.
    let examined = traversal.resolved_edges + traversal.hidden_callers.len();
    let unresolved_ratio = if examined == 0 {
        0.0
    } else {
        traversal.hidden_callers.len() as f64 / examined as f64
    };
    let history_coverage =
        (touched.len() - refusal.thin_history.len()) as f64 / touched.len().max(1) as f64;
    let mut confidence = (1.0 - unresolved_ratio)
        * (0.5 + 0.5 * history_coverage)
        * (1.0 - graph.unresolvable_share());
    if traversal.truncated {
        confidence *= 1.0 - config.truncation_penalty;
    }
    if found.ambiguous {
        confidence *= 1.0 - config.ambiguity_penalty;
    }
    let confidence = confidence.clamp(0.0, 1.0);

    let insufficient = !refusal.graph_complete() || !refusal.history_sufficient();
    let risk_level = if insufficient {
        debug!(
            "Refusing to grade {}: {} hidden callers, {} unresolvable files, {} files with thin history",
            node.qualified_name,
            refusal.hidden_callers.len(),
            refusal.unresolvable_files.len(),
            refusal.thin_history.len()
        );
        RiskLevel::Unknown
    } else {
        grade(scores.raw_score, config)
    };

    let primary_risk_factors =
        risk_factors(graph, &scores, &inputs, affected.len(), &node.file_path);
    let recommendations = recommendations(
        graph,
        &scores,
        &node.name,
        &node.file_path,
        affected.len(),
        insufficient,
    );

    let mut rationale = format!(
        "{} ({}): {} affected components within depth {}; raw score {:.1} from structural {:.2}, historical {:.2}, quality {:.2}.",
        node.qualified_name,
        node.file_path,
        affected.len(),
        max_depth,
        scores.raw_score,
        scores.structural,
        scores.historical,
        scores.quality
    );
    if let Some(signal) = scores.dominant() {
        rationale.push_str(&format!(" Largest contribution: {}.", signal.as_str()));
    }
    if traversal.truncated {
        rationale.push_str(" Traversal stopped with callers left unexpanded.");
    }
    if found.ambiguous {
        rationale.push_str(&format!(
            " {requested:?} matched several declarations; the highest ranked was used."
        ));
    }
    if insufficient {
        rationale.push(' ');
        rationale.push_str(&refusal.describe());
    }

    info!(
        "Assessed {}: {} (score {:.1}, confidence {:.2}, {} affected)",
        node.qualified_name,
        risk_level,
        scores.raw_score,
        confidence,
        affected.len()
    );

    ImpactAssessment {
        target: requested.to_string(),
        target_id: Some(node.id.clone()),
        risk_score: round_to(scores.raw_score, 2),
        confidence_score: round_to(confidence, 3),
        risk_level,
        affected_components: affected,
        primary_risk_factors,
        recommendations,
        insufficient_data: insufficient,
        rationale,
    }
}

fn risk_factors(
    graph: &Graph,
    scores: &SignalScores,
    inputs: &SignalInputs,
    affected: usize,
    file: &str,
) -> Vec<String> {
    let mut factors: Vec<String> = scores
        .contributions
        .iter()
        .filter(|(_, points)| *points >= 1.0)
        .take(3)
        .map(|(signal, _)| factor_text(*signal, inputs, affected, file))
        .collect();

    let architecture = graph.architecture();
    if let Some(cycle) = architecture.cycle_containing(file) {
        factors.push(format!("import cycle: {}", cycle.join(" <-> ")));
    }
    if let Some(violation) = architecture.violations_touching(file).next() {
        factors.push(format!(
            "layer violation: {} ({}) imports {} ({})",
            violation.source_file,
            violation.source_layer.as_str(),
            violation.target_file,
            violation.target_layer.as_str()
        ));
    }
    factors
}

fn recommendations(
    graph: &Graph,
    scores: &SignalScores,
    name: &str,
    file: &str,
    affected: usize,
    insufficient: bool,
) -> Vec<String> {
    let mut out: Vec<String> = scores
        .contributions
        .iter()
        .filter(|(_, points)| *points >= 1.0)
        .take(2)
        .map(|(signal, _)| recommendation(*signal, name, file, affected))
        .collect();
    if graph.architecture().cycle_containing(file).is_some() {
        out.push(format!("Break the import cycle through {file} before extending it."));
    }
    if insufficient {
        out.push(
            "Resolve the references listed in the rationale or gather more history before relying on this assessment."
                .to_string(),
        );
    }
    out
}
