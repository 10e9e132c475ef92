//! File sources for indexing passes: language detection, content hashing and
//! the `FileSource` seam with an on-disk and an in-memory implementation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::errors::{ArchaiError, ArchaiResult};
use crate::models::Language;

const LANGUAGE_BY_EXTENSION: &[(&str, Language)] = &[
    (".py", Language::Python),
    (".java", Language::Java),
    (".ts", Language::Typescript),
    (".tsx", Language::Typescript),
    (".go", Language::Go),
];

const DEFAULT_SENSITIVE_EXCLUDE_PATTERNS: &[&str] = &[
    ".env",
    ".env.*",
    "*.pem",
    "*.key",
    "*.p12",
    "*secret*",
    "*secrets*",
    "*credential*",
    "id_rsa",
    "id_dsa",
];

const IMPLICIT_IGNORED_DIRS: &[&str] = &[
    ".git",
    "__pycache__",
    "node_modules",
    ".venv",
    "venv",
    "dist",
    "build",
];

pub fn detect_language(path: &str) -> Option<Language> {
    let ext = Path::new(path)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))?;
    LANGUAGE_BY_EXTENSION
        .iter()
        .find(|(e, _)| *e == ext.as_str())
        .map(|(_, lang)| *lang)
}

pub fn compute_content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Forward-slash relative path, without a leading `./`.
pub fn normalize_rel_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    normalized.trim_start_matches("./").to_string()
}

// ---------------------------------------------------------------------------
// FileSource
// ---------------------------------------------------------------------------

/// Supplies the files of one codebase. Ignore filtering is the source's job;
/// the indexer only skips extensions it has no grammar for.
pub trait FileSource: Send + Sync {
    /// Relative, forward-slash paths in ascending order.
    fn list_files(&self) -> ArchaiResult<Vec<String>>;

    fn read(&self, path: &str) -> ArchaiResult<Vec<u8>>;
}

/// Walks a directory tree honouring `.gitignore`, `.archaiignore` and the
/// configured exclude globs.
pub struct FsFileSource {
    root: PathBuf,
    exclude_patterns: Vec<String>,
    exclude_sensitive: bool,
}

impl FsFileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclude_patterns: Vec::new(),
            exclude_sensitive: true,
        }
    }

    pub fn with_excludes(mut self, patterns: &[String]) -> Self {
        self.exclude_patterns.extend(
            patterns
                .iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
        );
        self
    }

    pub fn exclude_sensitive(mut self, enabled: bool) -> Self {
        self.exclude_sensitive = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn overrides(&self) -> ArchaiResult<ignore::overrides::Override> {
        let mut builder = OverrideBuilder::new(&self.root);
        let mut patterns: Vec<String> = self.exclude_patterns.clone();
        if self.exclude_sensitive {
            patterns.extend(DEFAULT_SENSITIVE_EXCLUDE_PATTERNS.iter().map(|p| p.to_string()));
        }
        for pattern in patterns {
            let pattern = pattern.trim_start_matches("./").trim_end_matches('/');
            builder
                .add(&format!("!{pattern}"))
                .map_err(|e| ArchaiError::Config(format!("invalid exclude pattern {pattern}: {e}")))?;
        }
        builder
            .build()
            .map_err(|e| ArchaiError::Config(format!("invalid exclude patterns: {e}")))
    }
}

impl FileSource for FsFileSource {
    fn list_files(&self) -> ArchaiResult<Vec<String>> {
        if !self.root.is_dir() {
            return Err(ArchaiError::InvalidInput(format!(
                "not a directory: {}",
                self.root.display()
            )));
        }
        let walker = WalkBuilder::new(&self.root)
            .hidden(false)
            .git_ignore(true)
            .git_exclude(true)
            .require_git(false)
            .add_custom_ignore_filename(".archaiignore")
            .overrides(self.overrides()?)
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                !(entry.file_type().is_some_and(|t| t.is_dir())
                    && IMPLICIT_IGNORED_DIRS.contains(&name.as_ref()))
            })
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {e}", self.root.display());
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .to_string();
            files.push(normalize_rel_path(&rel));
        }
        files.sort();
        debug!("Listed {} files under {}", files.len(), self.root.display());
        Ok(files)
    }

    fn read(&self, path: &str) -> ArchaiResult<Vec<u8>> {
        Ok(std::fs::read(self.root.join(path))?)
    }
}

/// In-memory file set, mostly for tests and embedding callers.
#[derive(Clone, Debug, Default)]
pub struct MemoryFileSource {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryFileSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents);
        self
    }

    pub fn insert(&mut self, path: &str, contents: impl Into<Vec<u8>>) {
        self.files.insert(normalize_rel_path(path), contents.into());
    }
}

impl FileSource for MemoryFileSource {
    fn list_files(&self) -> ArchaiResult<Vec<String>> {
        Ok(self.files.keys().cloned().collect())
    }

    fn read(&self, path: &str) -> ArchaiResult<Vec<u8>> {
        self.files.get(path).cloned().ok_or_else(|| {
            ArchaiError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such file: {path}"),
            ))
        })
    }
}
