//! Binding raw reference tokens to declarations.
//!
//! Resolution runs a cascade and stops at the first level that yields any
//! candidate:
//!
//! 1. Class scope (`self`/`this`/`cls` inside a method, or a Go receiver)
//! 2. Receiver: imported module alias, class name, or typed variable
//! 3. Same file, then same package for Java and Go
//! 4. Files imported by this file
//! 5. Whole codebase
//!
//! One candidate at the deciding level binds. Several make the reference
//! ambiguous. No declaration with the name at all makes it external.

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;

use crate::graph::imports::ImportTarget;
use crate::indexer::references::{ImportedName, Receiver};
use crate::models::{Language, SymbolId, SymbolKind, SymbolNode};

/// Outcome of resolving one reference.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Binding<'a> {
    Resolved(&'a SymbolNode),
    Ambiguous,
    External,
}

// ---------------------------------------------------------------------------
// Symbol table
// ---------------------------------------------------------------------------

/// Name-indexed view over every indexed declaration. Read-only, shared by
/// all resolution workers.
pub struct SymbolTable<'a> {
    callable: HashMap<&'a str, Vec<&'a SymbolNode>>,
    classes: HashMap<&'a str, Vec<&'a SymbolNode>>,
}

impl<'a> SymbolTable<'a> {
    pub fn new(nodes: &'a IndexMap<SymbolId, SymbolNode>) -> Self {
        let mut callable: HashMap<&str, Vec<&SymbolNode>> = HashMap::new();
        let mut classes: HashMap<&str, Vec<&SymbolNode>> = HashMap::new();
        for node in nodes.values() {
            match node.kind {
                SymbolKind::Class => {
                    callable.entry(node.name.as_str()).or_default().push(node);
                    classes.entry(node.name.as_str()).or_default().push(node);
                }
                // Constructors bind through their class.
                SymbolKind::Function if node.container.as_deref() == Some(node.name.as_str()) => {}
                SymbolKind::Function => {
                    callable.entry(node.name.as_str()).or_default().push(node);
                }
                SymbolKind::Module | SymbolKind::Variable | SymbolKind::UnknownTarget => {}
            }
        }
        Self { callable, classes }
    }

    fn callable(&self, name: &str) -> &[&'a SymbolNode] {
        self.callable.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    fn classes(&self, name: &str) -> &[&'a SymbolNode] {
        self.classes.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// Per-file import scope
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModuleBinding {
    Files(Vec<String>),
    External,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameBinding {
    /// The name as declared in the exporting module.
    pub name: String,
    /// `None` when the exporting module is outside the tree.
    pub files: Option<Vec<String>>,
}

/// What one file can see through its imports.
#[derive(Clone, Debug)]
pub struct FileScope {
    pub path: String,
    pub language: Language,
    pub imported_files: BTreeSet<String>,
    pub module_aliases: HashMap<String, ModuleBinding>,
    pub imported_names: HashMap<String, NameBinding>,
}

impl FileScope {
    pub fn new(path: &str, language: Language) -> Self {
        Self {
            path: path.to_string(),
            language,
            imported_files: BTreeSet::new(),
            module_aliases: HashMap::new(),
            imported_names: HashMap::new(),
        }
    }

    fn target_files(&mut self, target: &ImportTarget) -> Option<Vec<String>> {
        match target {
            ImportTarget::Files(files) => {
                self.imported_files.extend(files.iter().cloned());
                Some(files.clone())
            }
            ImportTarget::MissingRelative => Some(Vec::new()),
            ImportTarget::External => None,
        }
    }

    /// Bind `alias` to a whole module.
    pub fn add_module(&mut self, alias: &str, target: &ImportTarget) {
        let binding = match self.target_files(target) {
            Some(files) => ModuleBinding::Files(files),
            None => ModuleBinding::External,
        };
        self.module_aliases.insert(alias.to_string(), binding);
    }

    /// Bind a name imported from a module.
    pub fn add_name(&mut self, imported: &ImportedName, target: &ImportTarget) {
        let files = self.target_files(target);
        self.imported_names.insert(
            imported.alias.clone(),
            NameBinding {
                name: imported.name.clone(),
                files,
            },
        );
    }

    /// The declared name behind a local alias.
    pub fn original_name<'s>(&'s self, name: &'s str) -> &'s str {
        self.imported_names
            .get(name)
            .map(|b| b.name.as_str())
            .unwrap_or(name)
    }

    fn same_package(&self, other: &str) -> bool {
        let dir = |p: &str| p.rsplit_once('/').map(|(d, _)| d.to_string()).unwrap_or_default();
        dir(&self.path) == dir(other)
    }
}

// ---------------------------------------------------------------------------
// Cascade
// ---------------------------------------------------------------------------

fn decide<'a>(candidates: &[&'a SymbolNode]) -> Binding<'a> {
    match candidates {
        [] => Binding::External,
        [only] => Binding::Resolved(*only),
        _ => Binding::Ambiguous,
    }
}

fn narrow<'a>(
    pool: &[&'a SymbolNode],
    keep: impl Fn(&SymbolNode) -> bool,
) -> Vec<&'a SymbolNode> {
    pool.iter().copied().filter(|n| keep(n)).collect()
}

/// Levels 3 to 5 over an already filtered pool.
fn lexical_cascade<'a>(pool: &[&'a SymbolNode], scope: &FileScope) -> Binding<'a> {
    let same_file = narrow(pool, |n| n.file_path == scope.path);
    if !same_file.is_empty() {
        return decide(&same_file);
    }
    if matches!(scope.language, Language::Java | Language::Go) {
        let same_package = narrow(pool, |n| scope.same_package(&n.file_path));
        if !same_package.is_empty() {
            return decide(&same_package);
        }
    }
    let imported = narrow(pool, |n| scope.imported_files.contains(&n.file_path));
    if !imported.is_empty() {
        return decide(&imported);
    }
    decide(pool)
}

fn is_self_receiver(scope: &FileScope, receiver: &Receiver) -> bool {
    match (scope.language, receiver) {
        (Language::Java, Receiver::None) => true,
        (Language::Go, Receiver::Name(name)) => {
            !scope.module_aliases.contains_key(name) && !scope.imported_names.contains_key(name)
        }
        (_, Receiver::Name(name)) => matches!(name.as_str(), "self" | "this" | "cls"),
        _ => false,
    }
}

/// Resolve a call site of `caller` naming `name`.
pub fn resolve_call<'a>(
    table: &SymbolTable<'a>,
    scope: &FileScope,
    caller: &SymbolNode,
    name: &str,
    receiver: &Receiver,
    receiver_types: &[String],
) -> Binding<'a> {
    let imported = scope.imported_names.get(name);
    if let Some(NameBinding { files: None, .. }) = imported {
        return Binding::External;
    }
    let candidates = table.callable(scope.original_name(name));
    if candidates.is_empty() {
        return Binding::External;
    }

    // 1. Class scope.
    if let Some(container) = caller.container.as_deref() {
        if is_self_receiver(scope, receiver) {
            let scoped = narrow(candidates, |n| {
                n.container.as_deref() == Some(container) && n.file_path == caller.file_path
            });
            if !scoped.is_empty() {
                return decide(&scoped);
            }
        }
    }

    // 2. Receiver.
    let pool = match receiver {
        Receiver::Name(var) => {
            match scope.module_aliases.get(var) {
                Some(ModuleBinding::External) => return Binding::External,
                Some(ModuleBinding::Files(files)) => {
                    return decide(&narrow(candidates, |n| files.contains(&n.file_path)));
                }
                None => {}
            }
            if let Some(NameBinding { files: None, .. }) = scope.imported_names.get(var) {
                return Binding::External;
            }
            let class_name = scope.original_name(var);
            let on_class = narrow(candidates, |n| n.container.as_deref() == Some(class_name));
            if !on_class.is_empty() {
                return lexical_cascade(&on_class, scope);
            }
            if !receiver_types.is_empty() {
                let typed = narrow(candidates, |n| {
                    n.container
                        .as_deref()
                        .is_some_and(|c| receiver_types.iter().any(|t| t == c))
                });
                if typed.is_empty() {
                    return Binding::External;
                }
                return lexical_cascade(&typed, scope);
            }
            narrow(candidates, |n| n.container.is_some())
        }
        Receiver::Expression => narrow(candidates, |n| n.container.is_some()),
        // A bare call only reaches a method through class scope, except in
        // Java where inherited methods are called unqualified.
        Receiver::None if scope.language == Language::Java => candidates.to_vec(),
        Receiver::None => narrow(candidates, |n| n.container.is_none()),
    };
    if pool.is_empty() {
        return Binding::External;
    }

    // Names imported explicitly bind to their exporting module first.
    if let Some(NameBinding {
        files: Some(files), ..
    }) = imported
    {
        let from_module = narrow(&pool, |n| files.contains(&n.file_path));
        if !from_module.is_empty() {
            return decide(&from_module);
        }
    }

    lexical_cascade(&pool, scope)
}

/// Resolve an inheritance clause naming `name` to a class.
pub fn resolve_inherit<'a>(table: &SymbolTable<'a>, scope: &FileScope, name: &str) -> Binding<'a> {
    let imported = scope.imported_names.get(name);
    if let Some(NameBinding { files: None, .. }) = imported {
        return Binding::External;
    }
    let candidates = table.classes(scope.original_name(name));
    if candidates.is_empty() {
        return Binding::External;
    }
    if let Some(NameBinding {
        files: Some(files), ..
    }) = imported
    {
        let from_module = narrow(candidates, |n| files.contains(&n.file_path));
        if !from_module.is_empty() {
            return decide(&from_module);
        }
    }
    lexical_cascade(candidates, scope)
}
