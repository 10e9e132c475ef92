//! Syntax validation with native tree-sitter grammars.
//!
//! Declarations are read by the line scanners in `symbols`; the grammar pass
//! decides whether a file is trustworthy enough to contribute nodes at all.

use crate::models::Language;

fn grammar_for(language: Language, path: &str) -> tree_sitter::Language {
    match language {
        Language::Python => tree_sitter_python::LANGUAGE.into(),
        Language::Java => tree_sitter_java::LANGUAGE.into(),
        Language::Typescript if path.ends_with(".tsx") => {
            tree_sitter_typescript::LANGUAGE_TSX.into()
        }
        Language::Typescript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        Language::Go => tree_sitter_go::LANGUAGE.into(),
    }
}

/// Parse `source` and reject trees containing error or missing nodes.
/// The error message names the first offending line (1-based).
pub fn validate_syntax(source: &str, path: &str, language: Language) -> Result<(), String> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&grammar_for(language, path))
        .map_err(|e| format!("Failed to set language: {e}"))?;

    let tree = parser
        .parse(source.as_bytes(), None)
        .ok_or_else(|| format!("Failed to parse {path}"))?;

    let root = tree.root_node();
    if !root.has_error() {
        return Ok(());
    }
    let line = first_error_line(root).unwrap_or(1);
    Err(format!("syntax error near line {line}"))
}

fn first_error_line(root: tree_sitter::Node<'_>) -> Option<usize> {
    let mut stack = vec![root];
    let mut best: Option<usize> = None;
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            let row = node.start_position().row + 1;
            best = Some(best.map_or(row, |b| b.min(row)));
            continue;
        }
        if !node.has_error() {
            continue;
        }
        for index in 0..node.child_count() {
            if let Some(child) = node.child(index) {
                stack.push(child);
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_sources_pass() {
        assert!(validate_syntax("def f(x):\n    return x\n", "a.py", Language::Python).is_ok());
        assert!(validate_syntax(
            "class A {\n  void run() {\n    System.out.println(1);\n  }\n}\n",
            "A.java",
            Language::Java
        )
        .is_ok());
        assert!(validate_syntax(
            "export function f(a: number): number {\n  return a;\n}\n",
            "f.ts",
            Language::Typescript
        )
        .is_ok());
        assert!(validate_syntax(
            "package main\n\nfunc main() {\n}\n",
            "main.go",
            Language::Go
        )
        .is_ok());
    }

    #[test]
    fn test_tsx_uses_tsx_grammar() {
        let source = "export const App = () => <div>hello</div>;\n";
        assert!(validate_syntax(source, "App.tsx", Language::Typescript).is_ok());
    }

    #[test]
    fn test_broken_python_reports_line() {
        let err = validate_syntax("def ok():\n    pass\n\ndef broken(:\n", "b.py", Language::Python)
            .unwrap_err();
        assert!(err.contains("syntax error"));
    }

    #[test]
    fn test_broken_java_rejected() {
        assert!(validate_syntax("class A { void f( { }", "A.java", Language::Java).is_err());
    }
}
