//! Bounded response cache
//!
//! Completion answers for classification and validation are cached by
//! normalized query text. Eviction is purely capacity-based (least recently
//! used); there is no time-based invalidation.

use lazy_static::lazy_static;
use lru::LruCache;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::Mutex;

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"[^\p{L}\p{N}\s]+").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalize_query(query: &str) -> String {
    let lowered = query.to_lowercase();
    let stripped = NON_WORD.replace_all(&lowered, " ");
    WHITESPACE.replace_all(stripped.trim(), " ").to_string()
}

/// Process-wide LRU cache keyed by normalized query text
pub struct ResponseCache<V> {
    entries: Mutex<LruCache<String, V>>,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    pub fn get(&self, query: &str) -> Option<V> {
        let key = normalize_query(query);
        self.entries
            .lock()
            .ok()
            .and_then(|mut entries| entries.get(&key).cloned())
    }

    pub fn insert(&self, query: &str, value: V) {
        let key = normalize_query(query);
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(key, value);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
