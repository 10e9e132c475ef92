//! Indexing pipeline orchestration with Rayon-based parallelism.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::IndexingConfig;
use crate::errors::{ArchaiError, ArchaiResult};
use crate::indexer::cache::ExtractionCache;
use crate::indexer::filesystem::{compute_content_hash, detect_language, FileSource};
use crate::indexer::parser::validate_syntax;
use crate::indexer::references::{
    extract_imports, extract_references, identifier_tokens, ExtractedImport, RawReference,
};
use crate::indexer::symbols::{extract_symbols, ExtractedSymbol};
use crate::models::{FileStatus, Language, SymbolId, SymbolNode};

pub const CANCELLED_REASON: &str = "indexing cancelled";

/// Everything read out of one file. Immutable once built, so it can be
/// shared through the extraction cache.
#[derive(Clone, Debug, PartialEq)]
pub struct FileExtraction {
    pub path: String,
    pub language: Language,
    pub content_hash: String,
    pub line_count: u32,
    /// Module declaration first, then declarations in source order.
    pub symbols: Vec<ExtractedSymbol>,
    pub imports: Vec<ExtractedImport>,
    pub references: Vec<RawReference>,
}

/// Cooperative cancellation flag checked before each file.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

enum WorkerOutcome {
    Parsed(Arc<FileExtraction>, bool),
    Failed {
        reason: String,
        /// Identifier tokens when the bytes could be read at all.
        mentions: Option<BTreeSet<String>>,
    },
    Cancelled,
}

/// A parsed file and the ids its declarations received.
#[derive(Clone, Debug)]
pub struct IndexedFile {
    pub path: String,
    pub language: Language,
    pub module_id: SymbolId,
    /// Parallel to `extraction.symbols`.
    pub symbol_ids: Vec<SymbolId>,
    pub extraction: Arc<FileExtraction>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub files_seen: usize,
    pub files_indexed: usize,
    pub files_failed: usize,
    pub files_cancelled: usize,
    pub symbols_indexed: usize,
    pub cache_hits: usize,
    pub elapsed_ms: u128,
}

/// Output of the indexer: the symbol table plus per-file raw references and
/// status.
#[derive(Clone, Debug, Default)]
pub struct SourceIndex {
    pub nodes: IndexMap<SymbolId, SymbolNode>,
    pub files: BTreeMap<String, IndexedFile>,
    pub statuses: BTreeMap<String, FileStatus>,
    /// Identifier tokens of files that were read but failed to parse.
    pub mentions: BTreeMap<String, BTreeSet<String>>,
    pub stats: IndexStats,
}

impl SourceIndex {
    pub fn node(&self, id: &SymbolId) -> Option<&SymbolNode> {
        self.nodes.get(id)
    }
}

/// Parse one file's contents. Any failure is an [`ArchaiError::Parse`] and
/// makes the whole file unresolvable.
pub fn extract_file(
    path: &str,
    language: Language,
    bytes: &[u8],
    content_hash: String,
) -> ArchaiResult<FileExtraction> {
    let parse_error = |message: String| ArchaiError::Parse {
        path: path.to_string(),
        message,
    };
    let source = std::str::from_utf8(bytes)
        .map_err(|e| parse_error(format!("file is not valid UTF-8: {e}")))?;
    validate_syntax(source, path, language).map_err(parse_error)?;

    let symbols = extract_symbols(source, path, language);
    let imports = extract_imports(source, language);
    let references = extract_references(source, language, &symbols);
    Ok(FileExtraction {
        path: path.to_string(),
        language,
        content_hash,
        line_count: source.lines().count().max(1) as u32,
        symbols,
        imports,
        references,
    })
}

fn extract_file_worker(
    source: &dyn FileSource,
    path: &str,
    language: Language,
    cache: Option<&ExtractionCache>,
    cancel: &CancellationToken,
) -> WorkerOutcome {
    if cancel.is_cancelled() {
        return WorkerOutcome::Cancelled;
    }
    let bytes = match source.read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            return WorkerOutcome::Failed {
                reason: format!("read failed: {e}"),
                mentions: None,
            }
        }
    };
    let content_hash = compute_content_hash(&bytes);
    if let Some(hit) = cache.and_then(|c| c.get(path, &content_hash)) {
        return WorkerOutcome::Parsed(hit, true);
    }
    match extract_file(path, language, &bytes, content_hash) {
        Ok(extraction) => {
            let extraction = Arc::new(extraction);
            if let Some(cache) = cache {
                cache.insert(Arc::clone(&extraction));
            }
            WorkerOutcome::Parsed(extraction, false)
        }
        Err(err) => {
            let reason = match err {
                ArchaiError::Parse { message, .. } => message,
                other => other.to_string(),
            };
            WorkerOutcome::Failed {
                reason,
                mentions: Some(identifier_tokens(&String::from_utf8_lossy(&bytes))),
            }
        }
    }
}

fn parallel_extract(
    source: &dyn FileSource,
    jobs: &[(String, Language)],
    workers: usize,
    cache: Option<&ExtractionCache>,
    cancel: &CancellationToken,
) -> Vec<WorkerOutcome> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build();

    match pool {
        Ok(pool) => pool.install(|| {
            jobs.par_iter()
                .map(|(path, lang)| extract_file_worker(source, path, *lang, cache, cancel))
                .collect()
        }),
        Err(e) => {
            warn!("Falling back to sequential indexing: {e}");
            jobs.iter()
                .map(|(path, lang)| extract_file_worker(source, path, *lang, cache, cancel))
                .collect()
        }
    }
}

fn symbol_node(path: &str, language: Language, symbol: &ExtractedSymbol) -> SymbolNode {
    let id = SymbolId::derive(&[
        path,
        &symbol.qualified_name,
        symbol.kind.as_str(),
        &symbol.start_line.to_string(),
    ]);
    SymbolNode {
        id,
        name: symbol.name.clone(),
        qualified_name: symbol.qualified_name.clone(),
        kind: symbol.kind,
        file_path: path.to_string(),
        start_line: symbol.start_line,
        end_line: symbol.end_line,
        language,
        container: symbol.container.clone(),
        documented: symbol.documented,
    }
}

/// Index every supported file of `source`.
///
/// Per-file failures never abort the run: the file is recorded as
/// unresolvable and contributes no nodes, only its identifier tokens.
/// Extraction runs on a Rayon pool; the results are merged by this thread
/// alone, in path order.
pub fn index_files(
    source: &dyn FileSource,
    config: &IndexingConfig,
    cache: Option<&ExtractionCache>,
    cancel: &CancellationToken,
) -> ArchaiResult<SourceIndex> {
    let started = Instant::now();
    let listed = source.list_files()?;
    let files_seen = listed.len();
    let mut jobs: Vec<(String, Language)> = listed
        .into_iter()
        .filter_map(|path| detect_language(&path).map(|lang| (path, lang)))
        .collect();
    jobs.sort();
    jobs.dedup();

    let outcomes = parallel_extract(source, &jobs, config.workers, cache, cancel);

    let mut index = SourceIndex::default();
    let mut stats = IndexStats {
        files_seen,
        ..IndexStats::default()
    };

    for ((path, language), outcome) in jobs.iter().zip(outcomes) {
        match outcome {
            WorkerOutcome::Parsed(extraction, from_cache) => {
                if from_cache {
                    stats.cache_hits += 1;
                }
                let mut symbol_ids = Vec::with_capacity(extraction.symbols.len());
                for symbol in &extraction.symbols {
                    let node = symbol_node(path, *language, symbol);
                    symbol_ids.push(node.id.clone());
                    if index.nodes.contains_key(&node.id) {
                        debug!("Duplicate declaration {} in {}", node.qualified_name, path);
                        continue;
                    }
                    index.nodes.insert(node.id.clone(), node);
                }
                stats.files_indexed += 1;
                index.statuses.insert(path.clone(), FileStatus::Resolved);
                index.files.insert(
                    path.clone(),
                    IndexedFile {
                        path: path.clone(),
                        language: *language,
                        module_id: symbol_ids[0].clone(),
                        symbol_ids,
                        extraction,
                    },
                );
            }
            WorkerOutcome::Failed { reason, mentions } => {
                warn!("Parse failure in {}: {}", path, reason);
                stats.files_failed += 1;
                if let Some(mentions) = mentions {
                    index.mentions.insert(path.clone(), mentions);
                }
                index
                    .statuses
                    .insert(path.clone(), FileStatus::Unresolvable { reason });
            }
            WorkerOutcome::Cancelled => {
                stats.files_cancelled += 1;
                index.statuses.insert(
                    path.clone(),
                    FileStatus::Unresolvable {
                        reason: CANCELLED_REASON.to_string(),
                    },
                );
            }
        }
    }

    stats.symbols_indexed = index.nodes.len();
    stats.elapsed_ms = started.elapsed().as_millis();
    index.stats = stats;
    info!(
        "Indexed {} of {} files ({} failed, {} cancelled, {} cached), {} symbols in {}ms",
        stats.files_indexed,
        jobs.len(),
        stats.files_failed,
        stats.files_cancelled,
        stats.cache_hits,
        stats.symbols_indexed,
        stats.elapsed_ms
    );
    Ok(index)
}
