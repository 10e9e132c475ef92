//! Raw reference extraction: imports, call sites, inheritance clauses and
//! dynamic-dispatch sites. Nothing here is resolved; the graph builder binds
//! these tokens to declarations.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::indexer::symbols::{code_lines, ExtractedSymbol};
use crate::models::{Language, SymbolKind};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Receiver {
    /// Bare call: `charge(x)`.
    None,
    /// `svc.charge(x)`.
    Name(String),
    /// Call on an expression: `build().charge(x)`.
    Expression,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RawReference {
    Call {
        name: String,
        receiver: Receiver,
        /// Types the receiver variable was seen assigned or declared with.
        receiver_types: Vec<String>,
        line: u32,
    },
    Inherit {
        name: String,
        line: u32,
    },
    /// Reflection or evaluation; the candidate is the literal member or
    /// module name when one is visible at the call site.
    Dynamic {
        candidate: Option<String>,
        line: u32,
    },
}

impl RawReference {
    pub fn line(&self) -> u32 {
        match self {
            RawReference::Call { line, .. }
            | RawReference::Inherit { line, .. }
            | RawReference::Dynamic { line, .. } => *line,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportedName {
    pub name: String,
    pub alias: String,
}

/// One import statement. `module` is kept verbatim (`.utils`, `./repo`,
/// `com.acme.*`, `github.com/acme/pay`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedImport {
    pub module: String,
    /// Name the module itself is bound to in the importing file.
    pub alias: Option<String>,
    pub names: Vec<ImportedName>,
    pub line: u32,
}

// ---------------------------------------------------------------------------
// Regex patterns (compiled once via LazyLock)
// ---------------------------------------------------------------------------

static CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:([A-Za-z_$][A-Za-z0-9_$]*)\s*\.\s*)?([A-Za-z_$][A-Za-z0-9_$]*)\s*\(").unwrap()
});

static NEW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bnew\s+([A-Za-z_$][A-Za-z0-9_$.]*)\s*[(<]").unwrap()
});

static PY_BASES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*class\s+[A-Za-z_][A-Za-z0-9_]*\s*\(([^)]*)\)").unwrap());

static EXTENDS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:extends|implements)\s+([A-Za-z_$][A-Za-z0-9_$.]*(?:\s*,\s*[A-Za-z_$][A-Za-z0-9_$.]*)*)",
    )
    .unwrap()
});

static GENERIC_ARGS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^<>]*>").unwrap());

static CLASS_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:class|interface)\s+[A-Za-z_$]").unwrap());

// -- Dynamic dispatch --

static PY_GETATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"getattr\(\s*[^,]+,\s*['"]([A-Za-z_][A-Za-z0-9_]*)['"]"#).unwrap()
});

static PY_EVAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(?:eval|exec)\s*\(").unwrap());

static PY_IMPORT_MODULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:import_module|__import__)\(\s*['"]([A-Za-z0-9_.]+)['"]"#).unwrap()
});

static JAVA_FOR_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"forName\(\s*"([A-Za-z0-9_.$]+)""#).unwrap());

static JAVA_GET_METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"get(?:Declared)?Method\(\s*"([A-Za-z_][A-Za-z0-9_]*)""#).unwrap()
});

static TS_COMPUTED_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z_$\])][A-Za-z0-9_$]*\s*\[[^\]]+\]\s*\(").unwrap()
});

static TS_COMPUTED_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[\s*['"`]([A-Za-z_$][A-Za-z0-9_$]*)['"`]\s*\]\s*\("#).unwrap()
});

static TS_EVAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\beval\s*\(|\bnew\s+Function\s*\(").unwrap());

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_$][A-Za-z0-9_$]*").unwrap());

static GO_METHOD_BY_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"MethodByName\(\s*"([A-Za-z_][A-Za-z0-9_]*)""#).unwrap()
});

// -- Imports --

static PY_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s+(.+)$").unwrap());

static PY_FROM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*from\s+(\.*[A-Za-z0-9_.]*)\s+import\s+(.+)$").unwrap());

static JAVA_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*import\s+(static\s+)?([A-Za-z0-9_.]+?)(\.\*)?\s*;").unwrap()
});

static TS_IMPORT_FROM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*import\s+(?:type\s+)?(.+?)\s+from\s+['"]([^'"]+)['"]"#).unwrap()
});

static TS_IMPORT_BARE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*import\s+['"]([^'"]+)['"]"#).unwrap());

static TS_EXPORT_FROM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*export\s+(?:type\s+)?(?:\*|\{[^}]*\})(?:\s+as\s+\w+)?\s+from\s+['"]([^'"]+)['"]"#)
        .unwrap()
});

static GO_IMPORT_SINGLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*import\s+(?:([A-Za-z_.][A-Za-z0-9_]*)\s+)?"([^"]+)""#).unwrap()
});

static GO_IMPORT_BLOCK_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s*\(").unwrap());

static GO_IMPORT_BLOCK_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:([A-Za-z_.][A-Za-z0-9_]*)\s+)?"([^"]+)""#).unwrap()
});

// -- Receiver type hints: (variable, type) pairs --

static PY_CONSTRUCT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:self\.)?([A-Za-z_][A-Za-z0-9_]*)\s*=\s*([A-Z][A-Za-z0-9_]*)\s*\(").unwrap()
});

static ANNOTATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z_$][A-Za-z0-9_$]*)\s*[?!]?\s*:\s*([A-Z][A-Za-z0-9_$]*)").unwrap()
});

static NEW_ASSIGN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:this\.)?([A-Za-z_$][A-Za-z0-9_$]*)\s*=\s*new\s+([A-Z][A-Za-z0-9_$]*)").unwrap()
});

static JAVA_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z][A-Za-z0-9_]*)(?:<[^>]*>)?\s+([A-Za-z_][A-Za-z0-9_]*)\s*[;=,)]").unwrap()
});

static GO_SHORT_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*:=\s*&?(?:New)?([A-Z][A-Za-z0-9_]*)\s*[{(]").unwrap()
});

static GO_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([a-z_][A-Za-z0-9_]*)\s+\*?(?:[a-z][A-Za-z0-9_]*\.)?([A-Z][A-Za-z0-9_]*)\b").unwrap()
});

// ---------------------------------------------------------------------------
// Call keywords to skip
// ---------------------------------------------------------------------------

/// Language keywords that look like function calls but are not.
fn is_call_keyword(name: &str) -> bool {
    matches!(
        name,
        "if" | "elif"
            | "for"
            | "while"
            | "switch"
            | "return"
            | "new"
            | "function"
            | "func"
            | "class"
            | "catch"
            | "and"
            | "or"
            | "not"
            | "in"
            | "is"
            | "with"
            | "assert"
            | "yield"
            | "await"
            | "lambda"
            | "typeof"
            | "sizeof"
            | "synchronized"
            | "throw"
            | "case"
            | "def"
            | "import"
            | "from"
            | "except"
            | "defer"
            | "go"
            | "select"
            | "range"
    )
}

fn last_segment(value: &str, separator: char) -> String {
    value
        .trim()
        .rsplit(separator)
        .next()
        .unwrap_or(value)
        .to_string()
}

// ---------------------------------------------------------------------------
// Imports
// ---------------------------------------------------------------------------

fn split_alias(token: &str) -> (String, String) {
    let parts: Vec<&str> = token.splitn(2, " as ").map(|s| s.trim()).collect();
    let name = parts[0].to_string();
    let alias = parts.get(1).map(|s| s.to_string()).unwrap_or_else(|| name.clone());
    (name, alias)
}

/// Join a statement that continues over several lines until `done` holds.
fn joined_statement(raw: &[&str], start: usize, done: impl Fn(&str) -> bool) -> String {
    let mut statement = raw[start].trim().to_string();
    let mut index = start + 1;
    while !done(&statement) && index < raw.len() && index < start + 50 {
        statement.push(' ');
        statement.push_str(raw[index].trim());
        index += 1;
    }
    statement
}

fn python_imports(raw: &[&str], code: &[String]) -> Vec<ExtractedImport> {
    let mut imports = Vec::new();
    for (idx, code_line) in code.iter().enumerate() {
        let line = (idx + 1) as u32;
        let trimmed = code_line.trim();
        if trimmed.starts_with("from ") {
            let statement = if trimmed.contains('(') {
                joined_statement(raw, idx, |s| s.contains(')'))
            } else {
                trimmed.to_string()
            };
            let Some(caps) = PY_FROM_RE.captures(&statement) else {
                continue;
            };
            let names = caps[2]
                .replace(['(', ')'], "")
                .split(',')
                .map(|t| t.trim())
                .filter(|t| !t.is_empty() && *t != "*")
                .map(|t| {
                    let (name, alias) = split_alias(t);
                    ImportedName { name, alias }
                })
                .collect();
            imports.push(ExtractedImport {
                module: caps[1].to_string(),
                alias: None,
                names,
                line,
            });
        } else if let Some(caps) = PY_IMPORT_RE.captures(trimmed) {
            for token in caps[1].split(',') {
                let token = token.trim();
                if token.is_empty() {
                    continue;
                }
                let (module, alias) = split_alias(token);
                let alias = if token.contains(" as ") {
                    alias
                } else {
                    last_segment(&module, '.')
                };
                imports.push(ExtractedImport {
                    module,
                    alias: Some(alias),
                    names: Vec::new(),
                    line,
                });
            }
        }
    }
    imports
}

fn java_imports(raw: &[&str], code: &[String]) -> Vec<ExtractedImport> {
    let mut imports = Vec::new();
    for (idx, line_text) in raw.iter().enumerate() {
        if code[idx].trim().is_empty() {
            continue;
        }
        let Some(caps) = JAVA_IMPORT_RE.captures(line_text) else {
            continue;
        };
        let line = (idx + 1) as u32;
        let is_static = caps.get(1).is_some();
        let path = caps[2].to_string();
        let wildcard = caps.get(3).is_some();
        let import = match (is_static, wildcard) {
            (false, true) => ExtractedImport {
                module: format!("{path}.*"),
                alias: None,
                names: Vec::new(),
                line,
            },
            (false, false) => {
                let name = last_segment(&path, '.');
                ExtractedImport {
                    module: path,
                    alias: None,
                    names: vec![ImportedName {
                        alias: name.clone(),
                        name,
                    }],
                    line,
                }
            }
            (true, true) => ExtractedImport {
                module: path,
                alias: None,
                names: Vec::new(),
                line,
            },
            (true, false) => {
                let member = last_segment(&path, '.');
                let owner = path
                    .rsplit_once('.')
                    .map(|(owner, _)| owner.to_string())
                    .unwrap_or_default();
                ExtractedImport {
                    module: owner,
                    alias: None,
                    names: vec![ImportedName {
                        alias: member.clone(),
                        name: member,
                    }],
                    line,
                }
            }
        };
        imports.push(import);
    }
    imports
}

fn typescript_import_clause(clause: &str) -> (Option<String>, Vec<ImportedName>) {
    let mut alias = None;
    let mut names = Vec::new();
    let clause = clause.trim();
    let (outside, inside) = match (clause.find('{'), clause.rfind('}')) {
        (Some(open), Some(close)) if close > open => (
            format!("{} {}", &clause[..open], &clause[close + 1..]),
            Some(&clause[open + 1..close]),
        ),
        _ => (clause.to_string(), None),
    };
    if let Some(inside) = inside {
        for token in inside.split(',') {
            let token = token.trim().trim_start_matches("type ").trim();
            if token.is_empty() {
                continue;
            }
            let (name, local) = split_alias(token);
            names.push(ImportedName { name, alias: local });
        }
    }
    for part in outside.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some(namespace) = part.strip_prefix("* as ") {
            alias = Some(namespace.trim().to_string());
        } else {
            alias = Some(part.to_string());
        }
    }
    (alias, names)
}

fn typescript_imports(raw: &[&str], code: &[String]) -> Vec<ExtractedImport> {
    let mut imports = Vec::new();
    for (idx, code_line) in code.iter().enumerate() {
        let trimmed = code_line.trim();
        let line = (idx + 1) as u32;
        if trimmed.starts_with("export ") {
            if let Some(caps) = TS_EXPORT_FROM_RE.captures(raw[idx]) {
                imports.push(ExtractedImport {
                    module: caps[1].to_string(),
                    alias: None,
                    names: Vec::new(),
                    line,
                });
            }
            continue;
        }
        if !trimmed.starts_with("import ") && !trimmed.starts_with("import{") {
            continue;
        }
        if let Some(caps) = TS_IMPORT_BARE_RE.captures(raw[idx]) {
            imports.push(ExtractedImport {
                module: caps[1].to_string(),
                alias: None,
                names: Vec::new(),
                line,
            });
            continue;
        }
        let statement = joined_statement(raw, idx, |s| TS_IMPORT_FROM_RE.is_match(s));
        if let Some(caps) = TS_IMPORT_FROM_RE.captures(&statement) {
            let (alias, names) = typescript_import_clause(&caps[1]);
            imports.push(ExtractedImport {
                module: caps[2].to_string(),
                alias,
                names,
                line,
            });
        }
    }
    imports
}

fn go_import(alias: Option<&str>, path: &str, line: u32) -> ExtractedImport {
    let alias = match alias {
        Some("_") | Some(".") => None,
        Some(alias) => Some(alias.to_string()),
        None => Some(last_segment(path, '/')),
    };
    ExtractedImport {
        module: path.to_string(),
        alias,
        names: Vec::new(),
        line,
    }
}

fn go_imports(raw: &[&str]) -> Vec<ExtractedImport> {
    let mut imports = Vec::new();
    let mut in_block = false;
    for (idx, line_text) in raw.iter().enumerate() {
        let line = (idx + 1) as u32;
        if in_block {
            if line_text.trim().starts_with(')') {
                in_block = false;
                continue;
            }
            if let Some(caps) = GO_IMPORT_BLOCK_LINE_RE.captures(line_text) {
                imports.push(go_import(caps.get(1).map(|m| m.as_str()), &caps[2], line));
            }
            continue;
        }
        if GO_IMPORT_BLOCK_START_RE.is_match(line_text) {
            in_block = true;
            continue;
        }
        if let Some(caps) = GO_IMPORT_SINGLE_RE.captures(line_text) {
            imports.push(go_import(caps.get(1).map(|m| m.as_str()), &caps[2], line));
        }
    }
    imports
}

pub fn extract_imports(source: &str, language: Language) -> Vec<ExtractedImport> {
    let raw: Vec<&str> = source.lines().collect();
    let code = code_lines(source, language);
    match language {
        Language::Python => python_imports(&raw, &code),
        Language::Java => java_imports(&raw, &code),
        Language::Typescript => typescript_imports(&raw, &code),
        Language::Go => go_imports(&raw),
    }
}

// ---------------------------------------------------------------------------
// Receiver type hints
// ---------------------------------------------------------------------------

/// Variable → type names, collected file-wide from constructor assignments,
/// annotations and typed declarations.
fn receiver_type_hints(code: &[String], language: Language) -> BTreeMap<String, BTreeSet<String>> {
    let mut hints: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut record = |var: &str, ty: &str| {
        hints.entry(var.to_string()).or_default().insert(ty.to_string());
    };
    for line in code {
        match language {
            Language::Python => {
                for caps in PY_CONSTRUCT_RE.captures_iter(line) {
                    record(&caps[1], &caps[2]);
                }
                for caps in ANNOTATION_RE.captures_iter(line) {
                    record(&caps[1], &caps[2]);
                }
            }
            Language::Java => {
                for caps in JAVA_DECL_RE.captures_iter(line) {
                    record(&caps[2], &caps[1]);
                }
                for caps in NEW_ASSIGN_RE.captures_iter(line) {
                    record(&caps[1], &caps[2]);
                }
            }
            Language::Typescript => {
                for caps in ANNOTATION_RE.captures_iter(line) {
                    record(&caps[1], &caps[2]);
                }
                for caps in NEW_ASSIGN_RE.captures_iter(line) {
                    record(&caps[1], &caps[2]);
                }
            }
            Language::Go => {
                for caps in GO_SHORT_DECL_RE.captures_iter(line) {
                    record(&caps[1], &caps[2]);
                }
                for caps in GO_FIELD_RE.captures_iter(line) {
                    record(&caps[1], &caps[2]);
                }
            }
        }
    }
    hints
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

fn calls_on_line(
    code_line: &str,
    line: u32,
    declared: &HashSet<(u32, &str)>,
    hints: &BTreeMap<String, BTreeSet<String>>,
    out: &mut Vec<RawReference>,
) {
    for caps in CALL_RE.captures_iter(code_line) {
        let Some(name_match) = caps.get(2) else {
            continue;
        };
        let name = name_match.as_str();
        if is_call_keyword(name) || declared.contains(&(line, name)) {
            continue;
        }
        let match_start = caps.get(0).map_or(name_match.start(), |m| m.start());
        let prefix = code_line[..match_start].trim_end();
        if prefix.ends_with("def")
            || prefix.ends_with("function")
            || prefix.ends_with("func")
            || prefix.ends_with("class")
            || prefix.ends_with("new")
        {
            continue;
        }
        let receiver = match caps.get(1) {
            Some(m) => Receiver::Name(m.as_str().to_string()),
            None if prefix.ends_with('.') => Receiver::Expression,
            None => Receiver::None,
        };
        let receiver_types = match &receiver {
            Receiver::Name(var) => hints
                .get(var)
                .map(|types| types.iter().cloned().collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        out.push(RawReference::Call {
            name: name.to_string(),
            receiver,
            receiver_types,
            line,
        });
    }
    for caps in NEW_RE.captures_iter(code_line) {
        out.push(RawReference::Call {
            name: last_segment(&caps[1], '.'),
            receiver: Receiver::None,
            receiver_types: Vec::new(),
            line,
        });
    }
}

fn inherits_on_line(code_line: &str, language: Language, line: u32, out: &mut Vec<RawReference>) {
    match language {
        Language::Python => {
            if let Some(caps) = PY_BASES_RE.captures(code_line) {
                for base in caps[1].split(',') {
                    let base = base.trim();
                    if base.is_empty() || base.contains('=') {
                        continue;
                    }
                    let name = last_segment(base, '.');
                    if name != "object" {
                        out.push(RawReference::Inherit { name, line });
                    }
                }
            }
        }
        Language::Java | Language::Typescript => {
            if !CLASS_LINE_RE.is_match(code_line) {
                return;
            }
            let mut cleaned = code_line.to_string();
            for _ in 0..3 {
                cleaned = GENERIC_ARGS_RE.replace_all(&cleaned, "").to_string();
            }
            for caps in EXTENDS_RE.captures_iter(&cleaned) {
                for base in caps[1].split(',') {
                    let base = base.trim();
                    if !base.is_empty() {
                        out.push(RawReference::Inherit {
                            name: last_segment(base, '.'),
                            line,
                        });
                    }
                }
            }
        }
        Language::Go => {}
    }
}

fn dynamic_on_line(
    raw_line: &str,
    code_line: &str,
    language: Language,
    line: u32,
    out: &mut Vec<RawReference>,
) {
    let mut found: Vec<Option<String>> = Vec::new();
    match language {
        Language::Python => {
            if code_line.contains("getattr(") {
                found.push(PY_GETATTR_RE.captures(raw_line).map(|c| c[1].to_string()));
            }
            if PY_EVAL_RE.is_match(code_line) {
                found.push(None);
            }
            if code_line.contains("import_module(") || code_line.contains("__import__(") {
                found.push(
                    PY_IMPORT_MODULE_RE
                        .captures(raw_line)
                        .map(|c| last_segment(&c[1], '.')),
                );
            }
        }
        Language::Java => {
            if code_line.contains("forName(") {
                found.push(
                    JAVA_FOR_NAME_RE
                        .captures(raw_line)
                        .map(|c| last_segment(&c[1], '.')),
                );
            }
            if code_line.contains("getMethod(") || code_line.contains("getDeclaredMethod(") {
                found.push(JAVA_GET_METHOD_RE.captures(raw_line).map(|c| c[1].to_string()));
            } else if code_line.contains(".invoke(") {
                found.push(None);
            }
        }
        Language::Typescript => {
            if TS_COMPUTED_CALL_RE.is_match(code_line) {
                found.push(TS_COMPUTED_KEY_RE.captures(raw_line).map(|c| c[1].to_string()));
            }
            if TS_EVAL_RE.is_match(code_line) {
                found.push(None);
            }
        }
        Language::Go => {
            if code_line.contains("MethodByName(") {
                found.push(GO_METHOD_BY_NAME_RE.captures(raw_line).map(|c| c[1].to_string()));
            } else if code_line.contains("reflect.") && code_line.contains(".Call(") {
                found.push(None);
            }
        }
    }
    for candidate in found {
        out.push(RawReference::Dynamic { candidate, line });
    }
}

/// Extract raw call, inheritance and dynamic references for one file.
///
/// `symbols` are the file's own declarations; a declaration header is never
/// reported as a call to itself.
pub fn extract_references(
    source: &str,
    language: Language,
    symbols: &[ExtractedSymbol],
) -> Vec<RawReference> {
    let raw: Vec<&str> = source.lines().collect();
    let code = code_lines(source, language);
    let hints = receiver_type_hints(&code, language);
    let declared: HashSet<(u32, &str)> = symbols
        .iter()
        .filter(|s| s.kind != SymbolKind::Module)
        .map(|s| (s.start_line, s.name.as_str()))
        .collect();

    let mut references = Vec::new();
    for (idx, code_line) in code.iter().enumerate() {
        if code_line.trim().is_empty() {
            continue;
        }
        let line = (idx + 1) as u32;
        let trimmed = code_line.trim_start();
        if trimmed.starts_with("import ") || trimmed.starts_with("from ") || trimmed.starts_with("package ") {
            continue;
        }
        calls_on_line(code_line, line, &declared, &hints, &mut references);
        inherits_on_line(code_line, language, line, &mut references);
        dynamic_on_line(raw[idx], code_line, language, line, &mut references);
    }
    references
}

/// Every identifier-like token in `source`, comments and strings included.
/// Used for files that failed to parse, where nothing finer is available.
pub fn identifier_tokens(source: &str) -> BTreeSet<String> {
    IDENTIFIER_RE
        .find_iter(source)
        .map(|m| m.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::symbols::extract_symbols;

    fn refs(source: &str, path: &str, language: Language) -> Vec<RawReference> {
        let symbols = extract_symbols(source, path, language);
        extract_references(source, language, &symbols)
    }

    fn call_names(references: &[RawReference]) -> Vec<String> {
        references
            .iter()
            .filter_map(|r| match r {
                RawReference::Call { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_python_calls_skip_definitions_and_keywords() {
        let source = "def caller(x):\n    if check(x):\n        return helper(x)\n";
        let names = call_names(&refs(source, "m.py", Language::Python));
        assert_eq!(names, vec!["check", "helper"]);
    }

    #[test]
    fn test_python_receivers_and_type_hints() {
        let source = "class A:\n    def __init__(self):\n        self.repo = Repo()\n\n    def run(self):\n        self.repo.save(1)\n        self.flush()\n        build().emit()\n";
        let references = refs(source, "a.py", Language::Python);
        let save = references
            .iter()
            .find(|r| matches!(r, RawReference::Call { name, .. } if name == "save"))
            .unwrap();
        match save {
            RawReference::Call {
                receiver,
                receiver_types,
                line,
                ..
            } => {
                assert_eq!(receiver, &Receiver::Name("repo".to_string()));
                assert_eq!(receiver_types, &vec!["Repo".to_string()]);
                assert_eq!(*line, 6);
            }
            _ => unreachable!(),
        }
        assert!(references.iter().any(|r| matches!(
            r,
            RawReference::Call { name, receiver: Receiver::Expression, .. } if name == "emit"
        )));
        assert!(references.iter().any(|r| matches!(
            r,
            RawReference::Call { name, receiver: Receiver::Name(recv), .. } if name == "flush" && recv == "self"
        )));
    }

    #[test]
    fn test_calls_inside_strings_ignored() {
        let source = "def f():\n    log(\"call(me)\")\n";
        let names = call_names(&refs(source, "m.py", Language::Python));
        assert_eq!(names, vec!["log"]);
    }

    #[test]
    fn test_python_inheritance() {
        let source = "class Child(base.Parent, Mixin, metaclass=Meta):\n    pass\n";
        let references = refs(source, "m.py", Language::Python);
        let bases: Vec<_> = references
            .iter()
            .filter_map(|r| match r {
                RawReference::Inherit { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(bases, vec!["Parent", "Mixin"]);
    }

    #[test]
    fn test_java_inheritance_with_generics() {
        let source = "public class Repo extends Base<Item> implements Store<Item>, Closeable {\n}\n";
        let references = refs(source, "Repo.java", Language::Java);
        let bases: Vec<_> = references
            .iter()
            .filter_map(|r| match r {
                RawReference::Inherit { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(bases, vec!["Base", "Store", "Closeable"]);
    }

    #[test]
    fn test_python_dynamic_dispatch() {
        let source = "def f(obj, code):\n    getattr(obj, \"process_payment\")()\n    eval(code)\n    importlib.import_module(\"plugins.stripe\")\n";
        let references = refs(source, "m.py", Language::Python);
        let dynamic: Vec<_> = references
            .iter()
            .filter_map(|r| match r {
                RawReference::Dynamic { candidate, line } => Some((candidate.clone(), *line)),
                _ => None,
            })
            .collect();
        assert_eq!(
            dynamic,
            vec![
                (Some("process_payment".to_string()), 2),
                (None, 3),
                (Some("stripe".to_string()), 4),
            ]
        );
    }

    #[test]
    fn test_java_and_ts_and_go_dynamic_dispatch() {
        let java = "class A {\n  void f(Object o) throws Exception {\n    o.getClass().getMethod(\"charge\").invoke(o);\n  }\n}\n";
        assert!(refs(java, "A.java", Language::Java).contains(&RawReference::Dynamic {
            candidate: Some("charge".to_string()),
            line: 3
        }));

        let ts = "export function f(o: any, k: string) {\n  o['charge']();\n  o[k]();\n}\n";
        let ts_refs = refs(ts, "f.ts", Language::Typescript);
        assert!(ts_refs.contains(&RawReference::Dynamic {
            candidate: Some("charge".to_string()),
            line: 2
        }));
        assert!(ts_refs.contains(&RawReference::Dynamic {
            candidate: None,
            line: 3
        }));

        let go = "package p\n\nfunc f(v reflect.Value) {\n\tv.MethodByName(\"Charge\").Call(nil)\n}\n";
        assert!(refs(go, "p.go", Language::Go).contains(&RawReference::Dynamic {
            candidate: Some("Charge".to_string()),
            line: 4
        }));
    }

    #[test]
    fn test_identifier_tokens_cover_broken_source() {
        let source = "from core.payments import PaymentService\n\ndef route(:\n    PaymentService().charge(1)\n";
        let tokens = identifier_tokens(source);
        for expected in ["core", "payments", "PaymentService", "route", "charge"] {
            assert!(tokens.contains(expected), "missing {expected}");
        }
        assert!(!tokens.contains("1"));
    }

    #[test]
    fn test_java_new_is_a_call() {
        let source = "class A {\n  void f() {\n    Gateway g = new Gateway(1);\n  }\n}\n";
        let names = call_names(&refs(source, "A.java", Language::Java));
        assert_eq!(names, vec!["Gateway"]);
    }

    #[test]
    fn test_python_imports() {
        let source = "import os.path\nimport payments.service as svc\nfrom .utils import (\n    fmt,\n    parse as p,\n)\nfrom . import models\n";
        let imports = extract_imports(source, Language::Python);
        assert_eq!(imports.len(), 4);
        assert_eq!(imports[0].module, "os.path");
        assert_eq!(imports[0].alias.as_deref(), Some("path"));
        assert_eq!(imports[1].alias.as_deref(), Some("svc"));
        assert_eq!(imports[2].module, ".utils");
        assert_eq!(
            imports[2].names,
            vec![
                ImportedName {
                    name: "fmt".to_string(),
                    alias: "fmt".to_string()
                },
                ImportedName {
                    name: "parse".to_string(),
                    alias: "p".to_string()
                },
            ]
        );
        assert_eq!(imports[3].module, ".");
        assert_eq!(imports[3].names[0].name, "models");
    }

    #[test]
    fn test_java_imports() {
        let source = "package a;\nimport com.acme.Gateway;\nimport com.acme.util.*;\nimport static com.acme.Util.helper;\n";
        let imports = extract_imports(source, Language::Java);
        assert_eq!(imports.len(), 3);
        assert_eq!(imports[0].module, "com.acme.Gateway");
        assert_eq!(imports[0].names[0].name, "Gateway");
        assert_eq!(imports[1].module, "com.acme.util.*");
        assert_eq!(imports[2].module, "com.acme.Util");
        assert_eq!(imports[2].names[0].name, "helper");
    }

    #[test]
    fn test_typescript_imports() {
        let source = "import Default, { a, b as c } from './lib';\nimport * as ns from \"../ns\";\nimport {\n  x,\n} from './multi';\nimport './side';\nexport * from './re';\n";
        let imports = extract_imports(source, Language::Typescript);
        let modules: Vec<_> = imports.iter().map(|i| i.module.as_str()).collect();
        assert_eq!(modules, vec!["./lib", "../ns", "./multi", "./side", "./re"]);
        assert_eq!(imports[0].alias.as_deref(), Some("Default"));
        assert_eq!(imports[0].names.len(), 2);
        assert_eq!(imports[0].names[1].alias, "c");
        assert_eq!(imports[1].alias.as_deref(), Some("ns"));
        assert_eq!(imports[2].names[0].name, "x");
    }

    #[test]
    fn test_go_imports() {
        let source = "package main\n\nimport \"fmt\"\n\nimport (\n\tpay \"github.com/acme/shop/payments\"\n\t\"github.com/acme/shop/orders\"\n\t_ \"embed\"\n)\n";
        let imports = extract_imports(source, Language::Go);
        assert_eq!(imports.len(), 4);
        assert_eq!(imports[0].alias.as_deref(), Some("fmt"));
        assert_eq!(imports[1].alias.as_deref(), Some("pay"));
        assert_eq!(imports[2].alias.as_deref(), Some("orders"));
        assert_eq!(imports[3].alias, None);
    }
}
