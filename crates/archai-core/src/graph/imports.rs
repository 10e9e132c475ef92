//! Import resolution from language-specific import records to repository files.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::models::Language;

/// Where an import statement points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImportTarget {
    /// One or more files in the tree (a Java wildcard or a Go package can
    /// name several). Sorted, never empty.
    Files(Vec<String>),
    /// A relative import naming a file that is not in the tree.
    MissingRelative,
    /// An absolute import outside the tree (standard library, third party).
    External,
}

/// Known source files, with a directory index for package-level imports.
#[derive(Clone, Debug, Default)]
pub struct FileSet {
    files: BTreeSet<String>,
    by_dir: BTreeMap<String, Vec<String>>,
}

impl FileSet {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = FileSet::default();
        for path in paths {
            let path = path.into();
            let dir = parent_dir(&path);
            set.by_dir.entry(dir).or_default().push(path.clone());
            set.files.insert(path);
        }
        for files in set.by_dir.values_mut() {
            files.sort();
        }
        set
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains(path)
    }

    fn in_dir(&self, dir: &str, extension: &str) -> Vec<String> {
        self.by_dir
            .get(dir)
            .map(|files| {
                files
                    .iter()
                    .filter(|f| f.ends_with(extension))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Files equal to `suffix` or ending with `/suffix`.
    fn with_suffix(&self, suffix: &str) -> Vec<String> {
        let slashed = format!("/{suffix}");
        self.files
            .iter()
            .filter(|f| f.as_str() == suffix || f.ends_with(&slashed))
            .cloned()
            .collect()
    }
}

fn parent_dir(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => String::new(),
    }
}

pub(crate) fn normalize_posix_path(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            _ => stack.push(part),
        }
    }
    stack.join("/")
}

fn join(dir: &str, rest: &str) -> String {
    if dir.is_empty() {
        normalize_posix_path(rest)
    } else {
        normalize_posix_path(&format!("{dir}/{rest}"))
    }
}

/// True when a missing import of this module should be reported rather than
/// treated as a library.
pub fn is_relative(language: Language, module: &str) -> bool {
    match language {
        Language::Python => module.starts_with('.'),
        Language::Typescript | Language::Go => {
            module.starts_with("./") || module.starts_with("../")
        }
        Language::Java => false,
    }
}

fn first_existing(files: &FileSet, candidates: &[String]) -> Option<String> {
    candidates.iter().find(|c| files.contains(c)).cloned()
}

fn resolve_python(source_path: &str, module: &str, files: &FileSet) -> Vec<String> {
    if module.is_empty() {
        return Vec::new();
    }
    if module.starts_with('.') {
        let levels = module.chars().take_while(|&c| c == '.').count();
        let suffix = &module[levels..];
        let mut base_dir = parent_dir(source_path);
        for _ in 0..levels.saturating_sub(1) {
            base_dir = parent_dir(&base_dir);
        }
        let base = if suffix.is_empty() {
            base_dir
        } else {
            join(&base_dir, &suffix.replace('.', "/"))
        };
        let candidates = [format!("{base}.py"), join(&base, "__init__.py")];
        return first_existing(files, &candidates).into_iter().collect();
    }

    let base = module.replace('.', "/");
    let candidates = [format!("{base}.py"), format!("{base}/__init__.py")];
    if let Some(exact) = first_existing(files, &candidates) {
        return vec![exact];
    }
    // Source roots such as `src/` are not known; fall back to a path suffix.
    for candidate in &candidates {
        if let Some(first) = files.with_suffix(candidate).into_iter().next() {
            return vec![first];
        }
    }
    Vec::new()
}

fn resolve_java(module: &str, files: &FileSet) -> Vec<String> {
    if let Some(package) = module.strip_suffix(".*") {
        let dir_suffix = package.replace('.', "/");
        let slashed = format!("/{dir_suffix}");
        return files
            .by_dir
            .iter()
            .filter(|(dir, _)| dir.as_str() == dir_suffix || dir.ends_with(&slashed))
            .flat_map(|(_, entries)| entries.iter().filter(|f| f.ends_with(".java")).cloned())
            .collect();
    }
    let candidate = format!("{}.java", module.replace('.', "/"));
    files.with_suffix(&candidate).into_iter().take(1).collect()
}

fn resolve_typescript(source_path: &str, module: &str, files: &FileSet) -> Vec<String> {
    if !is_relative(Language::Typescript, module) {
        return Vec::new();
    }
    let base = join(&parent_dir(source_path), module);
    let candidates = [
        base.clone(),
        format!("{base}.ts"),
        format!("{base}.tsx"),
        format!("{base}/index.ts"),
        format!("{base}/index.tsx"),
    ];
    first_existing(files, &candidates).into_iter().collect()
}

fn resolve_go(source_path: &str, module: &str, files: &FileSet) -> Vec<String> {
    if is_relative(Language::Go, module) {
        let dir = join(&parent_dir(source_path), module);
        return files.in_dir(&dir, ".go");
    }
    // Without go.mod the module prefix is unknown: pick the longest package
    // directory the import path ends with.
    let best = files
        .by_dir
        .iter()
        .filter(|(dir, entries)| {
            !dir.is_empty()
                && entries.iter().any(|f| f.ends_with(".go"))
                && (module == dir.as_str() || module.ends_with(&format!("/{dir}")))
        })
        .map(|(dir, _)| dir)
        .max_by_key(|dir| dir.len());
    match best {
        Some(dir) => files.in_dir(dir, ".go"),
        None => Vec::new(),
    }
}

/// Resolve one import statement of `source_path` to files in `files`.
pub fn resolve_import(
    source_path: &str,
    language: Language,
    module: &str,
    files: &FileSet,
) -> ImportTarget {
    let mut resolved = match language {
        Language::Python => resolve_python(source_path, module, files),
        Language::Java => resolve_java(module, files),
        Language::Typescript => resolve_typescript(source_path, module, files),
        Language::Go => resolve_go(source_path, module, files),
    };
    resolved.retain(|f| f != source_path);
    resolved.sort();
    resolved.dedup();
    if !resolved.is_empty() {
        ImportTarget::Files(resolved)
    } else if is_relative(language, module) {
        ImportTarget::MissingRelative
    } else {
        ImportTarget::External
    }
}

/// Python `from pkg import name` may name a submodule `pkg/name.py`.
pub fn python_submodule(module: &str, name: &str) -> String {
    if module.ends_with('.') {
        format!("{module}{name}")
    } else {
        format!("{module}.{name}")
    }
}

pub fn file_stem(path: &str) -> &str {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files() -> FileSet {
        FileSet::new([
            "src/pay/__init__.py",
            "src/pay/service.py",
            "src/pay/gateway.py",
            "app/main.py",
            "java/com/acme/Gateway.java",
            "java/com/acme/util/Strings.java",
            "java/com/acme/util/Numbers.java",
            "web/app.ts",
            "web/lib/index.ts",
            "web/repo.tsx",
            "go/shop/payments/charge.go",
            "go/shop/payments/refund.go",
            "go/shop/orders/order.go",
        ])
    }

    #[test]
    fn test_python_relative_and_absolute() {
        let set = files();
        assert_eq!(
            resolve_import("src/pay/service.py", Language::Python, ".gateway", &set),
            ImportTarget::Files(vec!["src/pay/gateway.py".to_string()])
        );
        assert_eq!(
            resolve_import("app/main.py", Language::Python, "pay.service", &set),
            ImportTarget::Files(vec!["src/pay/service.py".to_string()])
        );
        assert_eq!(
            resolve_import("app/main.py", Language::Python, "pay", &set),
            ImportTarget::Files(vec!["src/pay/__init__.py".to_string()])
        );
        assert_eq!(
            resolve_import("src/pay/service.py", Language::Python, ".missing", &set),
            ImportTarget::MissingRelative
        );
        assert_eq!(
            resolve_import("app/main.py", Language::Python, "requests", &set),
            ImportTarget::External
        );
    }

    #[test]
    fn test_python_submodule_name() {
        assert_eq!(python_submodule(".", "models"), ".models");
        assert_eq!(python_submodule("pay", "service"), "pay.service");
    }

    #[test]
    fn test_java_class_and_wildcard() {
        let set = files();
        assert_eq!(
            resolve_import("x/A.java", Language::Java, "com.acme.Gateway", &set),
            ImportTarget::Files(vec!["java/com/acme/Gateway.java".to_string()])
        );
        assert_eq!(
            resolve_import("x/A.java", Language::Java, "com.acme.util.*", &set),
            ImportTarget::Files(vec![
                "java/com/acme/util/Numbers.java".to_string(),
                "java/com/acme/util/Strings.java".to_string(),
            ])
        );
        assert_eq!(
            resolve_import("x/A.java", Language::Java, "java.util.List", &set),
            ImportTarget::External
        );
    }

    #[test]
    fn test_typescript_relative_only() {
        let set = files();
        assert_eq!(
            resolve_import("web/app.ts", Language::Typescript, "./lib", &set),
            ImportTarget::Files(vec!["web/lib/index.ts".to_string()])
        );
        assert_eq!(
            resolve_import("web/app.ts", Language::Typescript, "./repo", &set),
            ImportTarget::Files(vec!["web/repo.tsx".to_string()])
        );
        assert_eq!(
            resolve_import("web/app.ts", Language::Typescript, "../gone", &set),
            ImportTarget::MissingRelative
        );
        assert_eq!(
            resolve_import("web/app.ts", Language::Typescript, "react", &set),
            ImportTarget::External
        );
    }

    #[test]
    fn test_go_package_suffix() {
        let set = files();
        assert_eq!(
            resolve_import(
                "go/shop/orders/order.go",
                Language::Go,
                "github.com/acme/go/shop/payments",
                &set
            ),
            ImportTarget::Files(vec![
                "go/shop/payments/charge.go".to_string(),
                "go/shop/payments/refund.go".to_string(),
            ])
        );
        assert_eq!(
            resolve_import("go/shop/orders/order.go", Language::Go, "fmt", &set),
            ImportTarget::External
        );
    }

    #[test]
    fn test_normalize_posix_path() {
        assert_eq!(normalize_posix_path("a/./b/../c"), "a/c");
        assert_eq!(normalize_posix_path("./x"), "x");
    }
}
