//! Declaration extraction from source code.
//!
//! Every language is scanned line by line with per-language regexes. Python
//! scopes follow indentation; Java, TypeScript and Go scopes follow brace
//! depth. Scanning runs over "code lines" (string contents and comments
//! blanked) so that braces and parentheses inside literals do not move scopes.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Language, SymbolKind};

// ---------------------------------------------------------------------------
// Extracted types
// ---------------------------------------------------------------------------

/// A declaration found in one file. Line numbers are 1-based and inclusive.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractedSymbol {
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    /// Enclosing class for methods and fields.
    pub container: Option<String>,
    pub start_line: u32,
    pub end_line: u32,
    pub documented: bool,
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Convert a file path to a dotted module name.
///
/// Strips the file extension and joins path components with dots, skipping
/// `.` segments. A trailing `__init__` or `index` collapses onto its package.
pub fn to_module_name(path: &str) -> String {
    let p = Path::new(path);
    let without_ext = p.with_extension("");
    let mut parts: Vec<&str> = without_ext
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(os) => os.to_str(),
            _ => None,
        })
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    if parts.len() > 1 && matches!(parts.last(), Some(&"__init__") | Some(&"index")) {
        parts.pop();
    }
    parts.join(".")
}

/// Short name of the module node for a file.
pub fn module_short_name(path: &str) -> String {
    let module = to_module_name(path);
    module.rsplit('.').next().unwrap_or(&module).to_string()
}

fn indentation(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

fn count_char(line: &str, target: char) -> i32 {
    line.chars().filter(|&c| c == target).count() as i32
}

/// Blank out string contents and comments, line by line.
///
/// The result has exactly one entry per source line. Quote characters are
/// kept so that `f("x")` still reads as a call; everything between them is
/// dropped. Multi-line strings and block comments become empty lines.
pub fn code_lines(source: &str, language: Language) -> Vec<String> {
    let mut out = Vec::new();
    let mut in_block_comment = false;
    let mut in_triple: Option<char> = None;
    let mut in_backtick = false;

    for line in source.lines() {
        let chars: Vec<char> = line.chars().collect();
        let mut code = String::with_capacity(line.len());
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();

            if in_block_comment {
                if c == '*' && next == Some('/') {
                    in_block_comment = false;
                    i += 2;
                } else {
                    i += 1;
                }
                continue;
            }
            if let Some(quote) = in_triple {
                if c == quote && next == Some(quote) && chars.get(i + 2) == Some(&quote) {
                    in_triple = None;
                    code.push(quote);
                    i += 3;
                } else {
                    i += 1;
                }
                continue;
            }
            if in_backtick {
                if c == '\\' {
                    i += 2;
                    continue;
                }
                if c == '`' {
                    in_backtick = false;
                    code.push('`');
                }
                i += 1;
                continue;
            }

            match language {
                Language::Python if c == '#' => break,
                Language::Java | Language::Typescript | Language::Go
                    if c == '/' && next == Some('/') =>
                {
                    break
                }
                Language::Java | Language::Typescript | Language::Go
                    if c == '/' && next == Some('*') =>
                {
                    in_block_comment = true;
                    i += 2;
                    continue;
                }
                _ => {}
            }

            let triple_capable = matches!(language, Language::Python | Language::Java);
            if (c == '"' || (c == '\'' && language == Language::Python))
                && triple_capable
                && next == Some(c)
                && chars.get(i + 2) == Some(&c)
            {
                code.push(c);
                in_triple = Some(c);
                i += 3;
                continue;
            }
            if c == '`' && matches!(language, Language::Typescript | Language::Go) {
                code.push('`');
                in_backtick = true;
                i += 1;
                continue;
            }
            if c == '"' || c == '\'' {
                code.push(c);
                i += 1;
                while i < chars.len() {
                    if chars[i] == '\\' {
                        i += 2;
                        continue;
                    }
                    if chars[i] == c {
                        code.push(c);
                        i += 1;
                        break;
                    }
                    i += 1;
                }
                continue;
            }
            code.push(c);
            i += 1;
        }
        out.push(code);
    }
    out
}

// ---------------------------------------------------------------------------
// Compiled regex patterns (LazyLock for one-time init)
// ---------------------------------------------------------------------------

// -- Python --

static PY_DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap()
});

static PY_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*class\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap());

static PY_ASSIGN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*(?::[^=]*)?=[^=]").unwrap()
});

// -- Java --

static JAVA_PACKAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*package\s+([A-Za-z0-9_.]+)\s*;").unwrap());

static JAVA_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:(?:public|private|protected|static|abstract|final|sealed|non-sealed|strictfp)\s+)*(?:class|interface|enum|record|@interface)\s+([A-Za-z_][A-Za-z0-9_]*)",
    )
    .unwrap()
});

static JAVA_METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:@\w+(?:\([^)]*\))?\s+)*(?:(?:public|private|protected|static|final|abstract|synchronized|native|default|strictfp)\s+)*(?:<[^>]+>\s+)?([A-Za-z0-9_<>\[\],.? ]+?)\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(",
    )
    .unwrap()
});

static JAVA_CONSTRUCTOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?:public|private|protected)\s+)?([A-Z][A-Za-z0-9_]*)\s*\(").unwrap()
});

static JAVA_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:(?:public|private|protected|static|final|transient|volatile)\s+)*([A-Za-z0-9_<>\[\],.?]+)\s+([A-Za-z_][A-Za-z0-9_]*)\s*(?:=[^;]*)?;\s*$",
    )
    .unwrap()
});

// -- TypeScript --

static TS_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?(?:class|interface|enum)\s+([A-Za-z_$][A-Za-z0-9_$]*)",
    )
    .unwrap()
});

static TS_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?type\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*(?:<[^>]*>)?\s*=").unwrap()
});

static TS_FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][A-Za-z0-9_$]*)",
    )
    .unwrap()
});

static TS_ARROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:function\b|(?:\([^)]*\)|[A-Za-z_$][A-Za-z0-9_$]*)\s*(?::\s*[^=]+)?=>)",
    )
    .unwrap()
});

static TS_CONST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)").unwrap()
});

static TS_METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:(?:public|private|protected|static|readonly|async|abstract|override|get|set)\s+)*([A-Za-z_$][A-Za-z0-9_$]*)\s*(?:<[^>]*>)?\s*\(",
    )
    .unwrap()
});

// -- Go --

static GO_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*type\s+([A-Za-z_][A-Za-z0-9_]*)(?:\[[^\]]*\])?\s+(?:struct|interface)\b").unwrap()
});

static GO_METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*func\s*\(\s*(?:[A-Za-z_][A-Za-z0-9_]*\s+)?\*?\s*([A-Za-z_][A-Za-z0-9_]*)(?:\[[^\]]*\])?\s*\)\s*([A-Za-z_][A-Za-z0-9_]*)\s*(?:\[[^\]]*\])?\(",
    )
    .unwrap()
});

static GO_FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*func\s+([A-Za-z_][A-Za-z0-9_]*)\s*(?:\[[^\]]*\])?\(").unwrap()
});

static GO_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:const|var)\s+([A-Za-z_][A-Za-z0-9_]*)\b").unwrap());

const STATEMENT_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "new", "else", "throw", "case", "do",
    "try", "function", "super", "await", "yield", "typeof", "delete",
];

fn is_statement_keyword(word: &str) -> bool {
    STATEMENT_KEYWORDS.contains(&word)
}

// ---------------------------------------------------------------------------
// Python extraction
// ---------------------------------------------------------------------------

struct PyScope {
    indent: usize,
    symbol: usize,
    is_class: bool,
    name: String,
}

fn python_docstring_follows(raw: &[&str], code: &[String], header_index: usize) -> bool {
    let mut end = header_index;
    let limit = (header_index + 20).min(code.len());
    while end < limit && !code[end].trim_end().ends_with(':') {
        end += 1;
    }
    raw.iter()
        .skip(end + 1)
        .map(|line| line.trim())
        .find(|line| !line.is_empty())
        .is_some_and(|line| {
            let body = line.trim_start_matches(['r', 'R', 'u', 'U', 'b', 'B']);
            body.starts_with("\"\"\"") || body.starts_with("'''") || body.starts_with('"')
        })
}

fn python_symbols(raw: &[&str], code: &[String], module: &str) -> Vec<ExtractedSymbol> {
    let mut symbols: Vec<ExtractedSymbol> = Vec::new();
    let mut stack: Vec<PyScope> = Vec::new();
    let mut paren_depth: i32 = 0;
    let mut last_code_line: u32 = 0;

    for (line_idx, line) in code.iter().enumerate() {
        let line_number = (line_idx + 1) as u32;
        let trimmed = line.trim();
        let continuation = paren_depth > 0;
        paren_depth += count_char(line, '(') + count_char(line, '[') + count_char(line, '{')
            - count_char(line, ')')
            - count_char(line, ']')
            - count_char(line, '}');
        paren_depth = paren_depth.max(0);
        if trimmed.is_empty() {
            continue;
        }
        if continuation {
            last_code_line = line_number;
            continue;
        }

        let indent = indentation(line);
        while stack.last().is_some_and(|top| top.indent >= indent) {
            if let Some(finished) = stack.pop() {
                symbols[finished.symbol].end_line = last_code_line.max(symbols[finished.symbol].start_line);
            }
        }

        let container = stack.last().filter(|s| s.is_class).map(|s| s.name.clone());
        let prefix = std::iter::once(module.to_string())
            .chain(stack.iter().map(|s| s.name.clone()))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(".");

        let declared = if let Some(caps) = PY_CLASS_RE.captures(line) {
            Some((caps[1].to_string(), SymbolKind::Class))
        } else if let Some(caps) = PY_DEF_RE.captures(line) {
            Some((caps[1].to_string(), SymbolKind::Function))
        } else {
            None
        };

        if let Some((name, kind)) = declared {
            let symbol_index = symbols.len();
            symbols.push(ExtractedSymbol {
                qualified_name: format!("{prefix}.{name}").trim_start_matches('.').to_string(),
                name: name.clone(),
                kind,
                container,
                start_line: line_number,
                end_line: line_number,
                documented: python_docstring_follows(raw, code, line_idx),
            });
            stack.push(PyScope {
                indent,
                symbol: symbol_index,
                is_class: kind == SymbolKind::Class,
                name,
            });
        } else if stack.is_empty() && indent == 0 {
            if let Some(caps) = PY_ASSIGN_RE.captures(line) {
                let name = caps[1].to_string();
                symbols.push(ExtractedSymbol {
                    qualified_name: format!("{module}.{name}"),
                    name,
                    kind: SymbolKind::Variable,
                    container: None,
                    start_line: line_number,
                    end_line: line_number,
                    documented: false,
                });
            }
        }
        last_code_line = line_number;
    }

    while let Some(finished) = stack.pop() {
        symbols[finished.symbol].end_line = last_code_line.max(symbols[finished.symbol].start_line);
    }
    symbols
}

// ---------------------------------------------------------------------------
// Brace-scoped extraction (Java, TypeScript, Go)
// ---------------------------------------------------------------------------

struct BraceScope {
    symbol: usize,
    open_depth: i32,
    opened: bool,
    is_class: bool,
    name: String,
    start_index: usize,
}

/// What a line scanner sees about the scope it is in.
struct LineContext<'a> {
    /// Innermost class whose body directly contains the line.
    class_body: Option<&'a str>,
    top_level: bool,
}

struct Declaration {
    name: String,
    kind: SymbolKind,
    /// Overrides the lexical container (Go method receivers).
    receiver: Option<String>,
}

/// Lines a declaration header may span before its body must open.
const MAX_PENDING_HEADER_LINES: usize = 5;

fn comment_precedes(raw: &[&str], line_idx: usize) -> bool {
    raw[..line_idx]
        .iter()
        .rev()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .find(|line| !line.starts_with('@'))
        .is_some_and(|line| line.ends_with("*/") || line.starts_with("//"))
}

fn brace_symbols<F>(
    raw: &[&str],
    code: &[String],
    namespace: &str,
    classify: F,
) -> Vec<ExtractedSymbol>
where
    F: Fn(&str, &LineContext<'_>) -> Option<Declaration>,
{
    let mut symbols: Vec<ExtractedSymbol> = Vec::new();
    let mut stack: Vec<BraceScope> = Vec::new();
    let mut depth: i32 = 0;

    for (line_idx, line) in code.iter().enumerate() {
        let line_number = (line_idx + 1) as u32;

        let class_body = stack
            .last()
            .filter(|top| top.is_class && top.opened && depth == top.open_depth + 1)
            .map(|top| top.name.as_str());
        let context = LineContext {
            class_body,
            top_level: depth == 0,
        };

        if let Some(decl) = classify(line, &context) {
            // A header still waiting for its body was a one-liner.
            while stack.last().is_some_and(|top| !top.opened) {
                if let Some(pending) = stack.pop() {
                    symbols[pending.symbol].end_line =
                        line_number.saturating_sub(1).max(symbols[pending.symbol].start_line);
                }
            }
            let class_body = stack
                .last()
                .filter(|top| top.is_class && top.opened && depth == top.open_depth + 1)
                .map(|top| top.name.clone());
            let container = decl.receiver.clone().or_else(|| {
                if decl.kind == SymbolKind::Class {
                    None
                } else {
                    class_body
                }
            });
            let mut prefix: Vec<String> = vec![namespace.to_string()];
            match &decl.receiver {
                Some(receiver) => prefix.push(receiver.clone()),
                None => prefix.extend(stack.iter().map(|s| s.name.clone())),
            }
            prefix.push(decl.name.clone());
            let qualified_name = prefix
                .into_iter()
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join(".");

            let symbol_index = symbols.len();
            symbols.push(ExtractedSymbol {
                name: decl.name.clone(),
                qualified_name,
                kind: decl.kind,
                container,
                start_line: line_number,
                end_line: line_number,
                documented: comment_precedes(raw, line_idx),
            });

            let opens = line.contains('{');
            let single_line = !opens
                && (decl.kind == SymbolKind::Variable || line.trim_end().ends_with(';'));
            if !single_line {
                stack.push(BraceScope {
                    symbol: symbol_index,
                    open_depth: depth,
                    opened: opens,
                    is_class: decl.kind == SymbolKind::Class,
                    name: decl.name,
                    start_index: line_idx,
                });
            }
        }

        depth += count_char(line, '{') - count_char(line, '}');
        depth = depth.max(0);

        for scope in stack.iter_mut() {
            if !scope.opened && depth > scope.open_depth {
                scope.opened = true;
            }
        }

        while let Some(top) = stack.last() {
            let closes = if top.opened {
                depth <= top.open_depth
            } else {
                line.trim_end().ends_with(';')
                    || line_idx >= top.start_index + MAX_PENDING_HEADER_LINES
            };
            if !closes {
                break;
            }
            let symbol = top.symbol;
            stack.pop();
            symbols[symbol].end_line = line_number;
        }
    }

    let last_line = code.len().max(1) as u32;
    while let Some(open) = stack.pop() {
        symbols[open.symbol].end_line = last_line;
    }
    symbols
}

fn java_classify(line: &str, context: &LineContext<'_>) -> Option<Declaration> {
    if let Some(caps) = JAVA_CLASS_RE.captures(line) {
        return Some(Declaration {
            name: caps[1].to_string(),
            kind: SymbolKind::Class,
            receiver: None,
        });
    }
    let class_name = context.class_body?;
    if let Some(caps) = JAVA_CONSTRUCTOR_RE.captures(line) {
        if &caps[1] == class_name {
            return Some(Declaration {
                name: caps[1].to_string(),
                kind: SymbolKind::Function,
                receiver: None,
            });
        }
    }
    if let Some(caps) = JAVA_METHOD_RE.captures(line) {
        let return_type = caps[1].trim();
        let name = &caps[2];
        let first_word = return_type.split_whitespace().next().unwrap_or("");
        if !is_statement_keyword(first_word) && !is_statement_keyword(name) {
            return Some(Declaration {
                name: name.to_string(),
                kind: SymbolKind::Function,
                receiver: None,
            });
        }
    }
    if let Some(caps) = JAVA_FIELD_RE.captures(line) {
        if !is_statement_keyword(&caps[1]) {
            return Some(Declaration {
                name: caps[2].to_string(),
                kind: SymbolKind::Variable,
                receiver: None,
            });
        }
    }
    None
}

fn typescript_classify(line: &str, context: &LineContext<'_>) -> Option<Declaration> {
    let declaration = |name: &str, kind| {
        Some(Declaration {
            name: name.to_string(),
            kind,
            receiver: None,
        })
    };
    if let Some(caps) = TS_CLASS_RE.captures(line) {
        return declaration(&caps[1], SymbolKind::Class);
    }
    if let Some(caps) = TS_TYPE_RE.captures(line) {
        return declaration(&caps[1], SymbolKind::Class);
    }
    if let Some(caps) = TS_FUNCTION_RE.captures(line) {
        return declaration(&caps[1], SymbolKind::Function);
    }
    if let Some(caps) = TS_ARROW_RE.captures(line) {
        return declaration(&caps[1], SymbolKind::Function);
    }
    if context.top_level {
        if let Some(caps) = TS_CONST_RE.captures(line) {
            return declaration(&caps[1], SymbolKind::Variable);
        }
    }
    if context.class_body.is_some() {
        if let Some(caps) = TS_METHOD_RE.captures(line) {
            if !is_statement_keyword(&caps[1]) {
                return declaration(&caps[1], SymbolKind::Function);
            }
        }
    }
    None
}

fn go_classify(line: &str, context: &LineContext<'_>) -> Option<Declaration> {
    if !context.top_level {
        return None;
    }
    if let Some(caps) = GO_TYPE_RE.captures(line) {
        return Some(Declaration {
            name: caps[1].to_string(),
            kind: SymbolKind::Class,
            receiver: None,
        });
    }
    if let Some(caps) = GO_METHOD_RE.captures(line) {
        return Some(Declaration {
            name: caps[2].to_string(),
            kind: SymbolKind::Function,
            receiver: Some(caps[1].to_string()),
        });
    }
    if let Some(caps) = GO_FUNCTION_RE.captures(line) {
        return Some(Declaration {
            name: caps[1].to_string(),
            kind: SymbolKind::Function,
            receiver: None,
        });
    }
    if let Some(caps) = GO_VALUE_RE.captures(line) {
        return Some(Declaration {
            name: caps[1].to_string(),
            kind: SymbolKind::Variable,
            receiver: None,
        });
    }
    None
}

fn module_documented(raw: &[&str], language: Language) -> bool {
    let first = raw.iter().map(|l| l.trim()).find(|l| !l.is_empty());
    match (language, first) {
        (Language::Python, Some(line)) => line.starts_with("\"\"\"") || line.starts_with("'''"),
        (Language::Go, Some(line)) => line.starts_with("// Package"),
        (_, Some(line)) => line.starts_with("/**"),
        (_, None) => false,
    }
}

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Extract the module declaration plus every declaration in the file.
///
/// The module symbol is always first and spans the whole file.
pub fn extract_symbols(source: &str, file_path: &str, language: Language) -> Vec<ExtractedSymbol> {
    let raw: Vec<&str> = source.lines().collect();
    let code = code_lines(source, language);
    let module = to_module_name(file_path);
    let line_count = raw.len().max(1) as u32;

    let mut symbols = vec![ExtractedSymbol {
        name: module_short_name(file_path),
        qualified_name: module.clone(),
        kind: SymbolKind::Module,
        container: None,
        start_line: 1,
        end_line: line_count,
        documented: module_documented(&raw, language),
    }];

    let declared = match language {
        Language::Python => python_symbols(&raw, &code, &module),
        Language::Java => {
            let package = raw
                .iter()
                .find_map(|line| JAVA_PACKAGE_RE.captures(line).map(|c| c[1].to_string()))
                .unwrap_or_else(|| {
                    Path::new(&module.replace('.', "/"))
                        .parent()
                        .map(|p| p.to_string_lossy().replace('/', "."))
                        .unwrap_or_default()
                });
            brace_symbols(&raw, &code, &package, java_classify)
        }
        Language::Typescript => brace_symbols(&raw, &code, &module, typescript_classify),
        Language::Go => brace_symbols(&raw, &code, &module, go_classify),
    };
    symbols.extend(declared);
    symbols
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(symbols: &'a [ExtractedSymbol], name: &str) -> &'a ExtractedSymbol {
        symbols
            .iter()
            .find(|s| s.name == name && s.kind != SymbolKind::Module)
            .unwrap_or_else(|| panic!("symbol {name} not extracted"))
    }

    #[test]
    fn test_to_module_name() {
        assert_eq!(to_module_name("pkg/service.py"), "pkg.service");
        assert_eq!(to_module_name("./pkg/__init__.py"), "pkg");
        assert_eq!(to_module_name("web/index.ts"), "web");
        assert_eq!(module_short_name("a/b/payments.go"), "payments");
    }

    #[test]
    fn test_code_lines_blank_strings_and_comments() {
        let source = "x = f(\"a(b)\")  # call(c)\n\"\"\"doc\nstill(doc)\n\"\"\"\n";
        let code = code_lines(source, Language::Python);
        assert_eq!(code.len(), 4);
        assert_eq!(code[0].trim_end(), "x = f(\"\")");
        assert_eq!(code[2], "");
    }

    #[test]
    fn test_code_lines_block_comment() {
        let source = "int a; /* {\n } */ int b;\n";
        let code = code_lines(source, Language::Java);
        assert_eq!(code[0].trim_end(), "int a;");
        assert_eq!(code[1].trim(), "int b;");
    }

    #[test]
    fn test_python_symbols_scopes() {
        let source = r#""""Payments module."""

RATE = 3


class PaymentService:
    """Charges cards."""

    def charge(self, amount):
        total = amount * RATE
        return total

    def refund(self, amount):
        return -amount


def helper():
    return 1
"#;
        let symbols = extract_symbols(source, "pay/service.py", Language::Python);
        let module = &symbols[0];
        assert_eq!(module.kind, SymbolKind::Module);
        assert_eq!(module.name, "service");
        assert!(module.documented);

        let class = find(&symbols, "PaymentService");
        assert_eq!(class.qualified_name, "pay.service.PaymentService");
        assert_eq!((class.start_line, class.end_line), (6, 14));
        assert!(class.documented);

        let charge = find(&symbols, "charge");
        assert_eq!(charge.container.as_deref(), Some("PaymentService"));
        assert_eq!(charge.qualified_name, "pay.service.PaymentService.charge");
        assert_eq!((charge.start_line, charge.end_line), (9, 11));
        assert!(!charge.documented);

        let helper = find(&symbols, "helper");
        assert_eq!(helper.container, None);
        assert_eq!((helper.start_line, helper.end_line), (17, 18));

        assert_eq!(find(&symbols, "RATE").kind, SymbolKind::Variable);
    }

    #[test]
    fn test_python_multiline_signature_keeps_scope() {
        let source = "def f(\n    a,\nb):\n    return a\n\n\ndef g():\n    pass\n";
        let symbols = extract_symbols(source, "m.py", Language::Python);
        let f = find(&symbols, "f");
        assert_eq!((f.start_line, f.end_line), (1, 4));
    }

    #[test]
    fn test_java_symbols() {
        let source = r#"package com.acme.pay;

/** Service docs. */
public class PaymentService {
    private final Gateway gateway;

    public PaymentService(Gateway gateway) {
        this.gateway = gateway;
    }

    public Receipt charge(int amount) {
        if (amount > 0) {
            return gateway.send(amount);
        }
        return null;
    }
}
"#;
        let symbols = extract_symbols(source, "src/com/acme/pay/PaymentService.java", Language::Java);
        let class = find(&symbols, "PaymentService");
        assert_eq!(class.kind, SymbolKind::Class);
        assert_eq!(class.qualified_name, "com.acme.pay.PaymentService");
        assert!(class.documented);
        assert_eq!((class.start_line, class.end_line), (4, 17));

        let charge = find(&symbols, "charge");
        assert_eq!(charge.qualified_name, "com.acme.pay.PaymentService.charge");
        assert_eq!(charge.container.as_deref(), Some("PaymentService"));
        assert_eq!((charge.start_line, charge.end_line), (11, 16));

        let field = find(&symbols, "gateway");
        assert_eq!(field.kind, SymbolKind::Variable);

        let constructors: Vec<_> = symbols
            .iter()
            .filter(|s| s.name == "PaymentService" && s.kind == SymbolKind::Function)
            .collect();
        assert_eq!(constructors.len(), 1);
        assert!(!symbols.iter().any(|s| s.name == "send"));
    }

    #[test]
    fn test_java_void_method_is_declared() {
        let source = "class Ledger {\n  void post(int amount) {\n    total += amount;\n  }\n}\n";
        let symbols = extract_symbols(source, "Ledger.java", Language::Java);
        let post = find(&symbols, "post");
        assert_eq!(post.kind, SymbolKind::Function);
        assert_eq!(post.container.as_deref(), Some("Ledger"));
        assert_eq!((post.start_line, post.end_line), (2, 4));
    }

    #[test]
    fn test_typescript_symbols() {
        let source = r#"import { Repo } from './repo';

export class OrderService {
  constructor(private repo: Repo) {}

  async place(id: string): Promise<void> {
    if (id) {
      await this.repo.save(id);
    }
  }
}

export function total(a: number, b: number): number {
  return a + b;
}

export const double = (x: number) => {
  return x * 2;
};
"#;
        let symbols = extract_symbols(source, "src/orders.ts", Language::Typescript);
        let class = find(&symbols, "OrderService");
        assert_eq!((class.start_line, class.end_line), (3, 11));
        let place = find(&symbols, "place");
        assert_eq!(place.qualified_name, "src.orders.OrderService.place");
        assert_eq!((place.start_line, place.end_line), (6, 10));
        assert_eq!(find(&symbols, "total").kind, SymbolKind::Function);
        assert_eq!(find(&symbols, "double").kind, SymbolKind::Function);
        assert!(!symbols.iter().any(|s| s.name == "if"));
    }

    #[test]
    fn test_go_symbols() {
        let source = r#"package payments

// Service charges cards.
type Service struct {
	gateway Gateway
}

func (s *Service) Charge(amount int) error {
	return s.gateway.Send(amount)
}

func NewService() *Service {
	return &Service{}
}
"#;
        let symbols = extract_symbols(source, "payments/service.go", Language::Go);
        let service = find(&symbols, "Service");
        assert_eq!(service.kind, SymbolKind::Class);
        assert!(service.documented);
        let charge = find(&symbols, "Charge");
        assert_eq!(charge.container.as_deref(), Some("Service"));
        assert_eq!(charge.qualified_name, "payments.service.Service.Charge");
        assert_eq!((charge.start_line, charge.end_line), (8, 10));
        assert_eq!(find(&symbols, "NewService").end_line, 14);
    }
}
