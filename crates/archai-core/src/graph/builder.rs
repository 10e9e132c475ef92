//! Assemble the frozen [`Graph`] from a [`SourceIndex`].
//!
//! Each indexed file's imports and raw references are resolved against the
//! shared, read-only symbol table on a Rayon pool. Per-file results are then
//! merged, sorted and deduplicated so the edge set depends only on file
//! contents.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::errors::ArchaiResult;
use crate::graph::imports::{python_submodule, resolve_import, FileSet, ImportTarget};
use crate::graph::layers::is_test_path;
use crate::graph::resolve::{resolve_call, resolve_inherit, Binding, FileScope, SymbolTable};
use crate::graph::{Graph, GraphParts};
use crate::history::collector::HistoryReport;
use crate::indexer::pipeline::{IndexedFile, SourceIndex};
use crate::indexer::references::RawReference;
use crate::models::{
    Edge, EdgeKind, FileMetrics, Language, SymbolId, SymbolKind, SymbolNode, UnresolvedReason,
};

const DYNAMIC_LABEL: &str = "<dynamic>";

#[derive(Default)]
struct FileEdges {
    edges: Vec<Edge>,
    synthetic: Vec<SymbolNode>,
    external: usize,
}

/// Synthetic stand-in for an unresolved reference, one per call site.
fn unknown_target(path: &str, language: Language, line: u32, reference: Option<&str>) -> SymbolNode {
    let label = reference.unwrap_or(DYNAMIC_LABEL);
    let qualified_name = format!("<unknown>:{label}");
    SymbolNode {
        id: SymbolId::derive(&[
            path,
            &qualified_name,
            SymbolKind::UnknownTarget.as_str(),
            &line.to_string(),
        ]),
        name: label.to_string(),
        qualified_name,
        kind: SymbolKind::UnknownTarget,
        file_path: path.to_string(),
        start_line: line,
        end_line: line,
        language,
        container: None,
        documented: false,
    }
}

struct FileResolver<'a> {
    file: &'a IndexedFile,
    index: &'a SourceIndex,
    table: &'a SymbolTable<'a>,
    files: &'a FileSet,
    /// This file's declarations usable as callers, module first.
    callers: Vec<&'a SymbolNode>,
    scope: FileScope,
    out: FileEdges,
}

impl<'a> FileResolver<'a> {
    fn new(
        file: &'a IndexedFile,
        index: &'a SourceIndex,
        table: &'a SymbolTable<'a>,
        files: &'a FileSet,
    ) -> Self {
        let callers = file
            .symbol_ids
            .iter()
            .filter_map(|id| index.node(id))
            .filter(|n| n.file_path == file.path && n.kind != SymbolKind::Variable)
            .collect();
        Self {
            file,
            index,
            table,
            files,
            callers,
            scope: FileScope::new(&file.path, file.language),
            out: FileEdges::default(),
        }
    }

    /// Smallest declaration whose line range contains `line`.
    fn caller_for_line(&self, line: u32) -> Option<&'a SymbolNode> {
        let mut best: Option<&'a SymbolNode> = None;
        for &symbol in &self.callers {
            if symbol.start_line <= line && line <= symbol.end_line {
                match best {
                    Some(current) if current.line_span() <= symbol.line_span() => {}
                    _ => best = Some(symbol),
                }
            }
        }
        best
    }

    fn push_unresolved(
        &mut self,
        source: SymbolId,
        line: u32,
        reference: Option<&str>,
        reason: UnresolvedReason,
    ) {
        let target = unknown_target(&self.file.path, self.file.language, line, reference);
        self.out.edges.push(Edge::unresolved(
            source,
            target.id.clone(),
            line,
            reference.map(str::to_string),
            reason,
        ));
        self.out.synthetic.push(target);
    }

    fn push_import(&mut self, target: &ImportTarget, module: &str, line: u32) {
        let index = self.index;
        let module_id = self.file.module_id.clone();
        match target {
            ImportTarget::Files(paths) => {
                for path in paths {
                    match index.files.get(path) {
                        Some(imported) => self.out.edges.push(Edge::resolved(
                            module_id.clone(),
                            imported.module_id.clone(),
                            EdgeKind::Imports,
                            line,
                        )),
                        // The file exists but could not be indexed.
                        None => self.push_unresolved(
                            module_id.clone(),
                            line,
                            Some(module),
                            UnresolvedReason::MissingModule,
                        ),
                    }
                }
            }
            ImportTarget::MissingRelative => {
                self.push_unresolved(module_id, line, Some(module), UnresolvedReason::MissingModule)
            }
            ImportTarget::External => self.out.external += 1,
        }
    }

    fn resolve_imports(&mut self) {
        let file = self.file;
        let path = file.path.as_str();
        let language = file.language;
        for import in &file.extraction.imports {
            let target = resolve_import(path, language, &import.module, self.files);

            if language == Language::Python && !import.names.is_empty() {
                // `from pkg import name` binds submodules as modules and the
                // rest as names exported by `pkg`.
                let mut binds_names = false;
                for name in &import.names {
                    let submodule = python_submodule(&import.module, &name.name);
                    let sub_target = resolve_import(path, language, &submodule, self.files);
                    if let ImportTarget::Files(_) = sub_target {
                        self.scope.add_module(&name.alias, &sub_target);
                        self.push_import(&sub_target, &submodule, import.line);
                    } else {
                        self.scope.add_name(name, &target);
                        binds_names = true;
                    }
                }
                if binds_names {
                    self.push_import(&target, &import.module, import.line);
                }
                continue;
            }

            if let Some(alias) = &import.alias {
                self.scope.add_module(alias, &target);
            }
            for name in &import.names {
                self.scope.add_name(name, &target);
            }
            self.push_import(&target, &import.module, import.line);
        }
    }

    fn resolve_references(&mut self) {
        let file = self.file;
        for reference in &file.extraction.references {
            let line = reference.line();
            let Some(caller) = self.caller_for_line(line) else {
                continue;
            };
            match reference {
                RawReference::Call {
                    name,
                    receiver,
                    receiver_types,
                    ..
                } => {
                    let binding =
                        resolve_call(self.table, &self.scope, caller, name, receiver, receiver_types);
                    self.bind(caller, binding, EdgeKind::Calls, name, line);
                }
                RawReference::Inherit { name, .. } => {
                    let binding = resolve_inherit(self.table, &self.scope, name);
                    self.bind(caller, binding, EdgeKind::Inherits, name, line);
                }
                RawReference::Dynamic { candidate, .. } => {
                    self.push_unresolved(
                        caller.id.clone(),
                        line,
                        candidate.as_deref(),
                        UnresolvedReason::Dynamic,
                    );
                }
            }
        }
    }

    fn bind(
        &mut self,
        caller: &SymbolNode,
        binding: Binding<'_>,
        kind: EdgeKind,
        name: &str,
        line: u32,
    ) {
        match binding {
            Binding::Resolved(target) if target.id == caller.id => {}
            Binding::Resolved(target) => self.out.edges.push(Edge::resolved(
                caller.id.clone(),
                target.id.clone(),
                kind,
                line,
            )),
            Binding::Ambiguous => {
                let reference = self.scope.original_name(name).to_string();
                self.push_unresolved(
                    caller.id.clone(),
                    line,
                    Some(&reference),
                    UnresolvedReason::Ambiguous,
                );
            }
            Binding::External => self.out.external += 1,
        }
    }

    fn run(mut self) -> FileEdges {
        self.resolve_imports();
        self.resolve_references();
        self.out
    }
}

/// Files with a resolved edge from a test file into one of their
/// declarations.
fn covered_files(nodes: &[SymbolNode], edges: &[Edge]) -> BTreeSet<String> {
    let file_of: std::collections::HashMap<&SymbolId, &str> = nodes
        .iter()
        .map(|n| (&n.id, n.file_path.as_str()))
        .collect();
    edges
        .iter()
        .filter(|e| !e.is_unresolved() && e.kind != EdgeKind::Imports)
        .filter_map(|e| Some((*file_of.get(&e.source)?, *file_of.get(&e.target)?)))
        .filter(|(source, target)| is_test_path(source) && !is_test_path(target))
        .map(|(_, target)| target.to_string())
        .collect()
}

fn resolve_all(
    index: &SourceIndex,
    table: &SymbolTable<'_>,
    files: &FileSet,
    workers: usize,
) -> Vec<FileEdges> {
    let indexed: Vec<&IndexedFile> = index.files.values().collect();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build();
    match pool {
        Ok(pool) => pool.install(|| {
            indexed
                .par_iter()
                .map(|file| FileResolver::new(file, index, table, files).run())
                .collect()
        }),
        Err(e) => {
            warn!("Falling back to sequential resolution: {e}");
            indexed
                .iter()
                .map(|file| FileResolver::new(file, index, table, files).run())
                .collect()
        }
    }
}

/// Resolve every reference in `index` and freeze the result together with
/// per-file status and history metrics.
pub fn build_graph(
    index: &SourceIndex,
    history: &HistoryReport,
    workers: usize,
) -> ArchaiResult<Graph> {
    let started = Instant::now();
    let table = SymbolTable::new(&index.nodes);
    let files = FileSet::new(index.statuses.keys().cloned());

    let mut synthetic: BTreeMap<SymbolId, SymbolNode> = BTreeMap::new();
    let mut edges: Vec<Edge> = Vec::new();
    let mut external_references = 0usize;
    for file_edges in resolve_all(index, &table, &files, workers) {
        edges.extend(file_edges.edges);
        external_references += file_edges.external;
        for node in file_edges.synthetic {
            synthetic.entry(node.id.clone()).or_insert(node);
        }
    }
    edges.sort();
    edges.dedup();

    let mut nodes: Vec<SymbolNode> = index.nodes.values().cloned().collect();
    nodes.extend(synthetic.into_values());

    let covered = covered_files(&nodes, &edges);
    let file_metrics: BTreeMap<String, FileMetrics> = index
        .files
        .keys()
        .map(|path| {
            let mut metrics = history
                .metrics
                .get(path)
                .cloned()
                .unwrap_or_else(|| FileMetrics::unknown(path));
            metrics.test_coverage = Some(covered.contains(path));
            (path.clone(), metrics)
        })
        .collect();

    let unresolved = edges.iter().filter(|e| e.is_unresolved()).count();
    let graph = Graph::from_parts(GraphParts {
        nodes,
        edges,
        file_status: index.statuses.clone(),
        file_metrics,
        unresolvable_mentions: index.mentions.clone(),
        history_available: history.available,
        external_references,
    })?;
    info!(
        "Built graph: {} nodes, {} edges ({} unresolved, {} external references) in {}ms",
        graph.node_count(),
        graph.edge_count(),
        unresolved,
        external_references,
        started.elapsed().as_millis()
    );
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexingConfig;
    use crate::indexer::filesystem::MemoryFileSource;
    use crate::indexer::pipeline::{index_files, CancellationToken};

    fn graph_of(source: &MemoryFileSource) -> Graph {
        let index = index_files(
            source,
            &IndexingConfig::default(),
            None,
            &CancellationToken::new(),
        )
        .unwrap();
        let history = HistoryReport::unavailable(index.files.keys().map(String::as_str));
        build_graph(&index, &history, 2).unwrap()
    }

    fn id_of(graph: &Graph, qualified: &str) -> usize {
        graph
            .nodes()
            .iter()
            .position(|n| n.qualified_name == qualified)
            .unwrap_or_else(|| panic!("{qualified} not in graph"))
    }

    fn payments_repo() -> MemoryFileSource {
        MemoryFileSource::new()
            .with_file(
                "pay/service.py",
                "class PaymentService:\n    def charge(self, amount):\n        return self.validate(amount)\n\n    def validate(self, amount):\n        return amount > 0\n",
            )
            .with_file(
                "pay/checkout.py",
                "from pay.service import PaymentService\nfrom .missing import thing\n\n\ndef checkout(total):\n    svc = PaymentService()\n    return svc.charge(total)\n",
            )
            .with_file(
                "pay/plugins.py",
                "def run_plugin(obj, name):\n    return getattr(obj, \"charge\")(name)\n",
            )
            .with_file(
                "tests/test_checkout.py",
                "from pay.checkout import checkout\n\n\ndef test_checkout():\n    assert checkout(3)\n",
            )
    }

    #[test]
    fn test_build_resolves_calls_and_imports() {
        let graph = graph_of(&payments_repo());
        let charge = id_of(&graph, "pay.service.PaymentService.charge");
        let validate = id_of(&graph, "pay.service.PaymentService.validate");
        let checkout = id_of(&graph, "pay.checkout.checkout");
        let class = id_of(&graph, "pay.service.PaymentService");

        let charge_callers: Vec<usize> = graph.callers(charge).map(|(s, _)| s).collect();
        assert_eq!(charge_callers, vec![checkout]);
        assert!(graph.callers(validate).any(|(s, _)| s == charge));
        assert!(graph.callers(class).any(|(s, _)| s == checkout));

        let module = id_of(&graph, "pay.checkout");
        let service_module = id_of(&graph, "pay.service");
        assert!(graph
            .callees(module)
            .any(|(t, e)| t == service_module && e.kind == EdgeKind::Imports));
    }

    #[test]
    fn test_unresolved_edges_are_tagged() {
        let graph = graph_of(&payments_repo());
        let dynamic: Vec<&Edge> = graph.unresolved_named("charge").collect();
        assert_eq!(dynamic.len(), 1);
        assert_eq!(dynamic[0].reason, Some(UnresolvedReason::Dynamic));
        let target = graph.node_by_id(&dynamic[0].target).unwrap();
        assert_eq!(target.kind, SymbolKind::UnknownTarget);
        assert_eq!(target.file_path, "pay/plugins.py");

        let missing: Vec<&Edge> = graph.unresolved_named(".missing").collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].reason, Some(UnresolvedReason::MissingModule));
        assert!(graph.external_references() > 0);
    }

    #[test]
    fn test_ambiguous_call_becomes_unresolved() {
        let source = MemoryFileSource::new()
            .with_file("a.py", "def process():\n    return 1\n")
            .with_file("b.py", "def process():\n    return 2\n")
            .with_file("main.py", "def main():\n    return process()\n");
        let graph = graph_of(&source);
        let edges: Vec<&Edge> = graph.unresolved_named("process").collect();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].reason, Some(UnresolvedReason::Ambiguous));
        assert_eq!(graph.count_edges(EdgeKind::Calls), 0);
    }

    #[test]
    fn test_test_coverage_from_test_callers() {
        let graph = graph_of(&payments_repo());
        assert_eq!(graph.metrics_for("pay/checkout.py").test_coverage, Some(true));
        assert_eq!(graph.metrics_for("pay/service.py").test_coverage, Some(false));
        assert!(graph.metrics_for("pay/service.py").insufficient_history);
    }

    #[test]
    fn test_build_is_deterministic() {
        let a = graph_of(&payments_repo());
        let b = graph_of(&payments_repo());
        assert_eq!(a.edges(), b.edges());
        let ids_a: Vec<_> = a.nodes().iter().map(|n| n.id.clone()).collect();
        let ids_b: Vec<_> = b.nodes().iter().map(|n| n.id.clone()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn test_inheritance_edges() {
        let source = MemoryFileSource::new()
            .with_file("models/base.py", "class BaseModel:\n    pass\n")
            .with_file(
                "models/user.py",
                "from .base import BaseModel\n\n\nclass User(BaseModel):\n    pass\n",
            );
        let graph = graph_of(&source);
        let base = id_of(&graph, "models.base.BaseModel");
        let user = id_of(&graph, "models.user.User");
        assert!(graph
            .callers(base)
            .any(|(s, e)| s == user && e.kind == EdgeKind::Inherits));
    }
}
