//! Bounded extraction cache shared across analysis sessions.
//!
//! Entries are keyed by (path, content hash) so an edited file always misses.
//! Recency is kept by re-inserting hits at the back of an `IndexMap`; the
//! front entry is evicted when the cache is over capacity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::indexer::pipeline::FileExtraction;

type CacheKey = (String, String);

pub struct ExtractionCache {
    max_entries: usize,
    entries: Mutex<IndexMap<CacheKey, Arc<FileExtraction>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl ExtractionCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            entries: Mutex::new(IndexMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, path: &str, content_hash: &str) -> Option<Arc<FileExtraction>> {
        let key = (path.to_string(), content_hash.to_string());
        let mut entries = self.entries.lock();
        match entries.shift_remove(&key) {
            Some(entry) => {
                // Move to end for LRU
                entries.insert(key, Arc::clone(&entry));
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, extraction: Arc<FileExtraction>) {
        let key = (extraction.path.clone(), extraction.content_hash.clone());
        let mut entries = self.entries.lock();
        entries.shift_remove(&key);
        entries.insert(key, extraction);
        while entries.len() > self.max_entries {
            entries.shift_remove_index(0);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            max_entries: self.max_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Language;

    fn extraction(path: &str, hash: &str) -> Arc<FileExtraction> {
        Arc::new(FileExtraction {
            path: path.to_string(),
            language: Language::Python,
            content_hash: hash.to_string(),
            line_count: 1,
            symbols: Vec::new(),
            imports: Vec::new(),
            references: Vec::new(),
        })
    }

    #[test]
    fn test_hit_requires_same_hash() {
        let cache = ExtractionCache::new(4);
        cache.insert(extraction("a.py", "h1"));
        assert!(cache.get("a.py", "h1").is_some());
        assert!(cache.get("a.py", "h2").is_none());
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = ExtractionCache::new(2);
        cache.insert(extraction("a.py", "h"));
        cache.insert(extraction("b.py", "h"));
        assert!(cache.get("a.py", "h").is_some());
        cache.insert(extraction("c.py", "h"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("b.py", "h").is_none());
        assert!(cache.get("a.py", "h").is_some());
        assert!(cache.get("c.py", "h").is_some());
    }
}
