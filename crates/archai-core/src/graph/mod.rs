//! The frozen dependency graph.
//!
//! A [`Graph`] is assembled once per analysis session and never mutated
//! afterwards. Every lookup the risk engine and planner need is indexed at
//! freeze time, so concurrent readers share it through an `Arc` without
//! locking.

pub mod builder;
pub mod imports;
pub mod layers;
pub mod pagerank;
pub mod resolve;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::errors::{ArchaiError, ArchaiResult};
use crate::models::{Edge, EdgeKind, FileMetrics, FileStatus, SymbolId, SymbolKind, SymbolNode};

use self::layers::ArchitectureReport;

/// Result of a best-effort target lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetMatch {
    pub index: usize,
    /// Other declarations matched at the same lookup level.
    pub ambiguous: bool,
}

#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<SymbolNode>,
    index_of: HashMap<SymbolId, usize>,
    edges: Vec<Edge>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
    by_name: HashMap<String, Vec<usize>>,
    by_qualified: HashMap<String, Vec<usize>>,
    by_file: BTreeMap<String, Vec<usize>>,
    unresolved_by_reference: HashMap<String, Vec<usize>>,
    wildcard_dynamic: HashMap<usize, Vec<usize>>,
    file_status: BTreeMap<String, FileStatus>,
    file_metrics: BTreeMap<String, FileMetrics>,
    unresolvable_mentions: BTreeMap<String, BTreeSet<String>>,
    history_available: bool,
    pagerank: Vec<f64>,
    external_references: usize,
    architecture: ArchitectureReport,
}

/// Everything needed to freeze a graph.
#[derive(Clone, Debug, Default)]
pub struct GraphParts {
    pub nodes: Vec<SymbolNode>,
    pub edges: Vec<Edge>,
    pub file_status: BTreeMap<String, FileStatus>,
    pub file_metrics: BTreeMap<String, FileMetrics>,
    /// Identifier tokens of unparsed files, keyed by path.
    pub unresolvable_mentions: BTreeMap<String, BTreeSet<String>>,
    pub history_available: bool,
    pub external_references: usize,
}

impl Graph {
    /// Freeze `parts` into a graph. Fails when two nodes share an id or an
    /// edge names a node that does not exist.
    pub fn from_parts(parts: GraphParts) -> ArchaiResult<Self> {
        let GraphParts {
            nodes,
            edges,
            file_status,
            file_metrics,
            unresolvable_mentions,
            history_available,
            external_references,
        } = parts;

        let mut index_of = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index_of.insert(node.id.clone(), i).is_some() {
                return Err(ArchaiError::InvalidInput(format!(
                    "duplicate node id {}",
                    node.id
                )));
            }
        }

        let mut outgoing = vec![Vec::new(); nodes.len()];
        let mut incoming = vec![Vec::new(); nodes.len()];
        let mut unresolved_by_reference: HashMap<String, Vec<usize>> = HashMap::new();
        let mut wildcard_dynamic: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut ranked_edges = Vec::new();

        for (e, edge) in edges.iter().enumerate() {
            let (Some(&source), Some(&target)) =
                (index_of.get(&edge.source), index_of.get(&edge.target))
            else {
                return Err(ArchaiError::InvalidInput(format!(
                    "edge {} -> {} references a missing node",
                    edge.source, edge.target
                )));
            };
            outgoing[source].push(e);
            incoming[target].push(e);
            if edge.is_unresolved() {
                match &edge.reference {
                    Some(reference) => unresolved_by_reference
                        .entry(reference.clone())
                        .or_default()
                        .push(e),
                    None => wildcard_dynamic.entry(source).or_default().push(e),
                }
            } else {
                ranked_edges.push((source, target));
            }
        }

        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_qualified: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_file: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, node) in nodes.iter().enumerate() {
            by_file.entry(node.file_path.clone()).or_default().push(i);
            if node.is_synthetic() {
                continue;
            }
            by_name.entry(node.name.clone()).or_default().push(i);
            by_qualified
                .entry(node.qualified_name.clone())
                .or_default()
                .push(i);
        }

        let pagerank = pagerank::compute_pagerank(
            nodes.len(),
            &ranked_edges,
            pagerank::DEFAULT_DAMPING,
            pagerank::DEFAULT_EPSILON,
        );
        let architecture = layers::analyze(&nodes, &edges);

        Ok(Self {
            nodes,
            index_of,
            edges,
            outgoing,
            incoming,
            by_name,
            by_qualified,
            by_file,
            unresolved_by_reference,
            wildcard_dynamic,
            file_status,
            file_metrics,
            unresolvable_mentions,
            history_available,
            pagerank,
            external_references,
            architecture,
        })
    }

    // -----------------------------------------------------------------------
    // Nodes and edges
    // -----------------------------------------------------------------------

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> &[SymbolNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, index: usize) -> &SymbolNode {
        &self.nodes[index]
    }

    pub fn index_of(&self, id: &SymbolId) -> Option<usize> {
        self.index_of.get(id).copied()
    }

    pub fn node_by_id(&self, id: &SymbolId) -> Option<&SymbolNode> {
        self.index_of(id).map(|i| &self.nodes[i])
    }

    pub fn pagerank(&self, index: usize) -> f64 {
        self.pagerank.get(index).copied().unwrap_or(0.0)
    }

    pub fn external_references(&self) -> usize {
        self.external_references
    }

    pub fn unresolved_edge_count(&self) -> usize {
        self.edges.iter().filter(|e| e.is_unresolved()).count()
    }

    /// Resolved edges pointing at `index`, as `(source index, edge)`.
    pub fn callers(&self, index: usize) -> impl Iterator<Item = (usize, &Edge)> + '_ {
        self.incoming[index].iter().filter_map(move |&e| {
            let edge = &self.edges[e];
            if edge.is_unresolved() {
                return None;
            }
            self.index_of(&edge.source).map(|source| (source, edge))
        })
    }

    /// Edges leaving `index`, as `(target index, edge)`.
    pub fn callees(&self, index: usize) -> impl Iterator<Item = (usize, &Edge)> + '_ {
        self.outgoing[index].iter().filter_map(move |&e| {
            let edge = &self.edges[e];
            self.index_of(&edge.target).map(|target| (target, edge))
        })
    }

    /// Distinct nodes with a resolved edge into `index`.
    pub fn fan_in(&self, index: usize) -> usize {
        self.callers(index)
            .map(|(source, _)| source)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Unresolved edges whose reference token is `name`.
    pub fn unresolved_named(&self, name: &str) -> impl Iterator<Item = &Edge> + '_ {
        self.unresolved_by_reference
            .get(name)
            .into_iter()
            .flatten()
            .map(move |&e| &self.edges[e])
    }

    /// Unresolved edges without a token that leave `index`.
    pub fn wildcard_dynamic_from(&self, index: usize) -> impl Iterator<Item = &Edge> + '_ {
        self.wildcard_dynamic
            .get(&index)
            .into_iter()
            .flatten()
            .map(move |&e| &self.edges[e])
    }

    // -----------------------------------------------------------------------
    // Files
    // -----------------------------------------------------------------------

    pub fn file_statuses(&self) -> &BTreeMap<String, FileStatus> {
        &self.file_status
    }

    pub fn file_status(&self, path: &str) -> Option<&FileStatus> {
        self.file_status.get(path)
    }

    pub fn nodes_in_file(&self, path: &str) -> &[usize] {
        self.by_file.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn history_available(&self) -> bool {
        self.history_available
    }

    /// Unparsed files that may reference one of `names`: those whose tokens
    /// include a name, and those whose content was never read.
    pub fn unresolvable_files_mentioning(&self, names: &[&str]) -> Vec<&str> {
        self.file_status
            .iter()
            .filter(|(_, status)| !status.is_resolved())
            .filter(|(path, _)| match self.unresolvable_mentions.get(path.as_str()) {
                Some(tokens) => names.iter().any(|name| tokens.contains(*name)),
                None => true,
            })
            .map(|(path, _)| path.as_str())
            .collect()
    }

    /// Fraction of indexed files that could not be parsed.
    pub fn unresolvable_share(&self) -> f64 {
        if self.file_status.is_empty() {
            return 0.0;
        }
        let unresolvable = self
            .file_status
            .values()
            .filter(|status| !status.is_resolved())
            .count();
        unresolvable as f64 / self.file_status.len() as f64
    }

    /// Metrics for `path`; a file without recorded metrics is reported as
    /// unknown rather than missing.
    pub fn metrics_for(&self, path: &str) -> FileMetrics {
        self.file_metrics
            .get(path)
            .cloned()
            .unwrap_or_else(|| FileMetrics::unknown(path))
    }

    pub fn architecture(&self) -> &ArchitectureReport {
        &self.architecture
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    fn best_ranked(&self, mut matches: Vec<usize>) -> Option<TargetMatch> {
        if matches.is_empty() {
            return None;
        }
        matches.sort_by(|&a, &b| {
            self.pagerank(b)
                .total_cmp(&self.pagerank(a))
                .then_with(|| self.nodes[a].id.cmp(&self.nodes[b].id))
        });
        matches.dedup();
        Some(TargetMatch {
            index: matches[0],
            ambiguous: matches.len() > 1,
        })
    }

    /// Locate a target by exact qualified name, exact name, qualified-name
    /// suffix, then case-insensitive name. The first level with a match
    /// decides; ties go to the higher PageRank, then the smaller id.
    pub fn find_target(&self, target: &str) -> Option<TargetMatch> {
        let target = target.trim();
        if target.is_empty() {
            return None;
        }
        if let Some(found) = self
            .by_qualified
            .get(target)
            .and_then(|m| self.best_ranked(m.clone()))
        {
            return Some(found);
        }
        if let Some(found) = self
            .by_name
            .get(target)
            .and_then(|m| self.best_ranked(m.clone()))
        {
            return Some(found);
        }
        let suffix = format!(".{target}");
        let by_suffix: Vec<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.is_synthetic() && n.qualified_name.ends_with(&suffix))
            .map(|(i, _)| i)
            .collect();
        if let Some(found) = self.best_ranked(by_suffix) {
            return Some(found);
        }
        let lowered = target.to_lowercase();
        let by_lower: Vec<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.is_synthetic() && n.name.to_lowercase() == lowered)
            .map(|(i, _)| i)
            .collect();
        self.best_ranked(by_lower)
    }

    /// Classes and functions with the most distinct callers.
    pub fn hotspots(&self, limit: usize) -> Vec<usize> {
        let mut ranked: Vec<(usize, usize)> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| matches!(n.kind, SymbolKind::Class | SymbolKind::Function))
            .map(|(i, _)| (i, self.fan_in(i)))
            .filter(|&(_, fan_in)| fan_in > 0)
            .collect();
        ranked.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| self.pagerank(b.0).total_cmp(&self.pagerank(a.0)))
                .then_with(|| self.nodes[a.0].id.cmp(&self.nodes[b.0].id))
        });
        ranked.into_iter().take(limit).map(|(i, _)| i).collect()
    }

    pub fn count_edges(&self, kind: EdgeKind) -> usize {
        self.edges.iter().filter(|e| e.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Language, UnresolvedReason};

    pub(crate) fn node(name: &str, kind: SymbolKind, file: &str) -> SymbolNode {
        SymbolNode {
            id: SymbolId::derive(&[file, name, kind.as_str()]),
            name: name.rsplit('.').next().unwrap_or(name).to_string(),
            qualified_name: name.to_string(),
            kind,
            file_path: file.to_string(),
            start_line: 1,
            end_line: 5,
            language: Language::Python,
            container: None,
            documented: false,
        }
    }

    fn parts(nodes: Vec<SymbolNode>, edges: Vec<Edge>) -> GraphParts {
        GraphParts {
            nodes,
            edges,
            ..GraphParts::default()
        }
    }

    #[test]
    fn test_edge_to_missing_node_rejected() {
        let a = node("a.run", SymbolKind::Function, "a.py");
        let ghost = SymbolId::derive(&["ghost"]);
        let edge = Edge::resolved(a.id.clone(), ghost, EdgeKind::Calls, 3);
        let err = Graph::from_parts(parts(vec![a], vec![edge])).unwrap_err();
        assert!(matches!(err, ArchaiError::InvalidInput(_)));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let a = node("a.run", SymbolKind::Function, "a.py");
        assert!(Graph::from_parts(parts(vec![a.clone(), a], Vec::new())).is_err());
    }

    #[test]
    fn test_callers_and_fan_in_skip_unresolved() {
        let target = node("pay.charge", SymbolKind::Function, "pay.py");
        let a = node("a.run", SymbolKind::Function, "a.py");
        let b = node("b.run", SymbolKind::Function, "b.py");
        let unknown = node("<unknown>:charge", SymbolKind::UnknownTarget, "c.py");
        let edges = vec![
            Edge::resolved(a.id.clone(), target.id.clone(), EdgeKind::Calls, 2),
            Edge::resolved(a.id.clone(), target.id.clone(), EdgeKind::Calls, 4),
            Edge::resolved(b.id.clone(), target.id.clone(), EdgeKind::Calls, 2),
            Edge::unresolved(
                b.id.clone(),
                unknown.id.clone(),
                9,
                Some("charge".to_string()),
                UnresolvedReason::Ambiguous,
            ),
        ];
        let graph = Graph::from_parts(parts(vec![target, a, b, unknown], edges)).unwrap();
        assert_eq!(graph.fan_in(0), 2);
        assert_eq!(graph.callers(0).count(), 3);
        assert_eq!(graph.unresolved_named("charge").count(), 1);
        assert_eq!(graph.unresolved_edge_count(), 1);
        assert_eq!(graph.hotspots(5), vec![0]);
    }

    #[test]
    fn test_find_target_levels() {
        let service = node("pay.service.PaymentService", SymbolKind::Class, "pay/service.py");
        let other = node("billing.PaymentService", SymbolKind::Class, "billing.py");
        let helper = node("pay.service.helper", SymbolKind::Function, "pay/service.py");
        let graph = Graph::from_parts(parts(vec![service, other, helper], Vec::new())).unwrap();

        let exact = graph.find_target("billing.PaymentService").unwrap();
        assert_eq!(exact.index, 1);
        assert!(!exact.ambiguous);

        let by_name = graph.find_target("PaymentService").unwrap();
        assert!(by_name.ambiguous);

        let by_suffix = graph.find_target("service.helper").unwrap();
        assert_eq!(by_suffix.index, 2);

        let lowered = graph.find_target("HELPER").unwrap();
        assert_eq!(lowered.index, 2);

        assert!(graph.find_target("nothing").is_none());
    }

    #[test]
    fn test_unresolvable_files_mentioning() {
        let unresolvable = || FileStatus::Unresolvable {
            reason: "syntax error near line 3".to_string(),
        };
        let mut graph_parts = parts(Vec::new(), Vec::new());
        graph_parts
            .file_status
            .insert("core/payments.py".to_string(), FileStatus::Resolved);
        graph_parts
            .file_status
            .insert("api/routes.py".to_string(), unresolvable());
        graph_parts
            .file_status
            .insert("api/admin.py".to_string(), unresolvable());
        graph_parts
            .file_status
            .insert("jobs/unread.py".to_string(), unresolvable());
        graph_parts.unresolvable_mentions.insert(
            "api/routes.py".to_string(),
            ["payments", "PaymentService"].map(String::from).into(),
        );
        graph_parts
            .unresolvable_mentions
            .insert("api/admin.py".to_string(), ["users"].map(String::from).into());
        let graph = Graph::from_parts(graph_parts).unwrap();

        assert_eq!(
            graph.unresolvable_files_mentioning(&["PaymentService"]),
            vec!["api/routes.py", "jobs/unread.py"]
        );
        assert_eq!(
            graph.unresolvable_files_mentioning(&["RefundService"]),
            vec!["jobs/unread.py"]
        );
        assert!((graph.unresolvable_share() - 0.75).abs() < 1e-9);
        assert_eq!(Graph::default().unresolvable_share(), 0.0);
    }
}
