//! Architecture layers: ownership inferred from module paths, import cycles
//! among modules, and imports that point up the layer stack.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::models::{Edge, EdgeKind, SymbolKind, SymbolNode};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Layer {
    Interface,
    Core,
    Infrastructure,
    Data,
    Abstractions,
    Internal,
    Test,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Interface => "Interface",
            Layer::Core => "Core",
            Layer::Infrastructure => "Infrastructure",
            Layer::Data => "Data",
            Layer::Abstractions => "Abstractions",
            Layer::Internal => "Internal",
            Layer::Test => "Test",
        }
    }

    /// Ownership of a module from its path, falling back to the classes it
    /// declares. Path words are compared whole, so `rapid.py` is not `api`.
    pub fn infer<'a>(path: &str, class_names: impl IntoIterator<Item = &'a str>) -> Layer {
        if is_test_path(path) {
            return Layer::Test;
        }
        let words = path_words(path);
        let has = |keywords: &[&str]| {
            words.iter().any(|w| {
                keywords
                    .iter()
                    .any(|k| w == k || w.strip_suffix('s') == Some(*k))
            })
        };
        if has(&["infrastructure", "persistence", "caching", "cache"]) {
            Layer::Infrastructure
        } else if has(&["core", "orchestrator"]) {
            Layer::Core
        } else if has(&["api", "interface"]) {
            Layer::Interface
        } else if has(&["model", "data"]) {
            Layer::Data
        } else if class_names.into_iter().any(|c| c.contains("Base")) {
            Layer::Abstractions
        } else {
            Layer::Internal
        }
    }

    /// Whether a module in `self` may import a module in `other`.
    pub fn may_import(self, other: Layer) -> bool {
        use Layer::*;
        if self == other {
            return true;
        }
        match self {
            Interface => matches!(other, Core | Infrastructure | Data | Abstractions | Internal),
            Core => matches!(other, Infrastructure | Data | Abstractions | Internal),
            Infrastructure => matches!(other, Data | Abstractions | Internal | Core),
            Data => matches!(other, Abstractions | Internal | Infrastructure),
            Abstractions => matches!(other, Internal | Core | Infrastructure | Data | Interface),
            Internal | Test => true,
        }
    }
}

fn path_words(path: &str) -> Vec<String> {
    path.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_string())
        .collect()
}

/// Test sources: under a `test`/`tests` directory, or named `test_*`,
/// `*_test`, `*.test.*`, `*.spec.*` or `*Test`.
pub fn is_test_path(path: &str) -> bool {
    let mut parts: Vec<&str> = path.split('/').collect();
    let file = parts.pop().unwrap_or("");
    if parts
        .iter()
        .any(|dir| matches!(*dir, "test" | "tests" | "__tests__"))
    {
        return true;
    }
    let stem = file.split('.').next().unwrap_or(file);
    stem.starts_with("test_")
        || stem.ends_with("_test")
        || file.contains(".test.")
        || file.contains(".spec.")
        || (stem.ends_with("Test") && stem.len() > 4)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerViolation {
    pub source_file: String,
    pub target_file: String,
    pub source_layer: Layer,
    pub target_layer: Layer,
    pub line: u32,
}

/// Layer assignment plus the import-level findings of one graph.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureReport {
    pub module_layers: BTreeMap<String, Layer>,
    /// Each cycle is the sorted set of files in one strongly connected
    /// component of the module import graph.
    pub import_cycles: Vec<Vec<String>>,
    pub violations: Vec<LayerViolation>,
}

impl ArchitectureReport {
    /// Layer recorded for the file's module, or inferred from the path
    /// alone when the graph holds no module node for it.
    pub fn layer_of(&self, file: &str) -> Layer {
        self.module_layers
            .get(file)
            .copied()
            .unwrap_or_else(|| Layer::infer(file, []))
    }

    pub fn cycle_containing(&self, file: &str) -> Option<&Vec<String>> {
        self.import_cycles
            .iter()
            .find(|cycle| cycle.iter().any(|f| f == file))
    }

    pub fn violations_touching<'a>(
        &'a self,
        file: &'a str,
    ) -> impl Iterator<Item = &'a LayerViolation> + 'a {
        self.violations
            .iter()
            .filter(move |v| v.source_file == file || v.target_file == file)
    }
}

/// Tarjan's algorithm with an explicit stack; returns components with more
/// than one member or a self loop.
fn strongly_connected(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let n = adjacency.len();
    let mut index = vec![usize::MAX; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut components = Vec::new();

    for root in 0..n {
        if index[root] != usize::MAX {
            continue;
        }
        let mut work: Vec<(usize, usize)> = vec![(root, 0)];
        while let Some(frame) = work.last_mut() {
            let (node, child) = *frame;
            if child == 0 && index[node] == usize::MAX {
                index[node] = next_index;
                lowlink[node] = next_index;
                next_index += 1;
                stack.push(node);
                on_stack[node] = true;
            }
            if let Some(&next) = adjacency[node].get(child) {
                frame.1 += 1;
                if index[next] == usize::MAX {
                    work.push((next, 0));
                } else if on_stack[next] {
                    lowlink[node] = lowlink[node].min(index[next]);
                }
                continue;
            }
            work.pop();
            if let Some(&(parent, _)) = work.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[node]);
            }
            if lowlink[node] == index[node] {
                let mut component = Vec::new();
                while let Some(member) = stack.pop() {
                    on_stack[member] = false;
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                let self_loop = adjacency[node].contains(&node);
                if component.len() > 1 || self_loop {
                    components.push(component);
                }
            }
        }
    }
    components
}

/// Assign layers to every module node and check the module import graph.
pub fn analyze(nodes: &[SymbolNode], edges: &[Edge]) -> ArchitectureReport {
    let mut classes_by_file: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in nodes.iter().filter(|n| n.kind == SymbolKind::Class) {
        classes_by_file
            .entry(node.file_path.as_str())
            .or_default()
            .push(node.name.as_str());
    }

    let modules: Vec<&SymbolNode> = nodes
        .iter()
        .filter(|n| n.kind == SymbolKind::Module)
        .collect();
    let module_index: HashMap<&str, usize> = modules
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut report = ArchitectureReport::default();
    for module in &modules {
        let classes = classes_by_file
            .get(module.file_path.as_str())
            .cloned()
            .unwrap_or_default();
        report
            .module_layers
            .insert(module.file_path.clone(), Layer::infer(&module.file_path, classes));
    }

    let mut adjacency: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); modules.len()];
    for edge in edges.iter().filter(|e| e.kind == EdgeKind::Imports) {
        let (Some(&from), Some(&to)) = (
            module_index.get(edge.source.as_str()),
            module_index.get(edge.target.as_str()),
        ) else {
            continue;
        };
        adjacency[from].insert(to);

        let source_file = &modules[from].file_path;
        let target_file = &modules[to].file_path;
        let source_layer = report.layer_of(source_file);
        let target_layer = report.layer_of(target_file);
        if !source_layer.may_import(target_layer) {
            report.violations.push(LayerViolation {
                source_file: source_file.clone(),
                target_file: target_file.clone(),
                source_layer,
                target_layer,
                line: edge.line,
            });
        }
    }

    let adjacency: Vec<Vec<usize>> = adjacency
        .into_iter()
        .map(|targets| targets.into_iter().collect())
        .collect();
    let mut cycles: Vec<Vec<String>> = strongly_connected(&adjacency)
        .into_iter()
        .map(|component| {
            let mut files: Vec<String> = component
                .into_iter()
                .map(|i| modules[i].file_path.clone())
                .collect();
            files.sort();
            files
        })
        .collect();
    cycles.sort();
    report.import_cycles = cycles;
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Language, SymbolId};

    fn module(path: &str) -> SymbolNode {
        SymbolNode {
            id: SymbolId::derive(&[path]),
            name: path.to_string(),
            qualified_name: path.to_string(),
            kind: SymbolKind::Module,
            file_path: path.to_string(),
            start_line: 1,
            end_line: 10,
            language: Language::Python,
            container: None,
            documented: false,
        }
    }

    fn import(from: &SymbolNode, to: &SymbolNode) -> Edge {
        Edge::resolved(from.id.clone(), to.id.clone(), EdgeKind::Imports, 1)
    }

    #[test]
    fn test_infer_layers_from_path_words() {
        assert_eq!(Layer::infer("app/infrastructure/db.py", []), Layer::Infrastructure);
        assert_eq!(Layer::infer("app/core/engine.py", []), Layer::Core);
        assert_eq!(Layer::infer("app/api/routes.py", []), Layer::Interface);
        assert_eq!(Layer::infer("app/models/user.py", []), Layer::Data);
        assert_eq!(Layer::infer("tests/test_core.py", []), Layer::Test);
        assert_eq!(Layer::infer("app/rapid.py", []), Layer::Internal);
        assert_eq!(Layer::infer("app/shapes.py", ["BaseShape"]), Layer::Abstractions);
    }

    #[test]
    fn test_is_test_path() {
        assert!(is_test_path("pkg/tests/helpers.py"));
        assert!(is_test_path("pkg/test_pay.py"));
        assert!(is_test_path("pay/charge_test.go"));
        assert!(is_test_path("web/app.test.ts"));
        assert!(is_test_path("src/PaymentServiceTest.java"));
        assert!(!is_test_path("pkg/contest.py"));
        assert!(!is_test_path("src/Test.java"));
    }

    #[test]
    fn test_layer_policy() {
        assert!(Layer::Interface.may_import(Layer::Core));
        assert!(!Layer::Core.may_import(Layer::Interface));
        assert!(!Layer::Data.may_import(Layer::Core));
        assert!(Layer::Test.may_import(Layer::Interface));
        assert!(Layer::Data.may_import(Layer::Data));
    }

    #[test]
    fn test_analyze_finds_cycles_and_violations() {
        let api = module("app/api/routes.py");
        let core = module("app/core/engine.py");
        let a = module("app/a.py");
        let b = module("app/b.py");
        let nodes = vec![api.clone(), core.clone(), a.clone(), b.clone()];
        let edges = vec![
            import(&api, &core),
            import(&core, &api),
            import(&a, &b),
            import(&b, &a),
        ];
        let report = analyze(&nodes, &edges);
        assert_eq!(report.import_cycles.len(), 2);
        assert_eq!(
            report.cycle_containing("app/a.py"),
            Some(&vec!["app/a.py".to_string(), "app/b.py".to_string()])
        );
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].source_layer, Layer::Core);
        assert_eq!(report.violations[0].target_layer, Layer::Interface);
        assert_eq!(report.violations_touching("app/api/routes.py").count(), 1);
    }

    #[test]
    fn test_layer_of_without_module_node_uses_path() {
        let report = analyze(&[module("app/a.py")], &[]);
        assert_eq!(report.layer_of("app/a.py"), Layer::Internal);
        assert_eq!(report.layer_of("app/api/routes.py"), Layer::Interface);
        assert_eq!(report.layer_of("tests/test_pay.py"), Layer::Test);
    }

    #[test]
    fn test_acyclic_imports_have_no_cycles() {
        let a = module("a.py");
        let b = module("b.py");
        let c = module("c.py");
        let report = analyze(
            &[a.clone(), b.clone(), c.clone()],
            &[import(&a, &b), import(&b, &c), import(&a, &c)],
        );
        assert!(report.import_cycles.is_empty());
    }
}
