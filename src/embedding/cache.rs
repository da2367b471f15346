//! Content-addressed embedding cache.

use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// LRU cache keyed by SHA-256 of the model identifier plus the text.
///
/// Entries are valid for the lifetime of the process; the LRU bound only
/// caps memory, it does not expire entries by time.
pub struct EmbeddingCache {
    model: String,
    inner: Mutex<LruCache<String, Vec<f32>>>,
}

impl EmbeddingCache {
    /// Creates a cache for `model` holding up to `capacity` entries.
    #[must_use]
    pub fn new(model: impl Into<String>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            model: model.into(),
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn key(&self, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.model.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Returns the cached vector for `text`, if present.
    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        let key = self.key(text);
        match self.inner.lock() {
            Ok(mut cache) => cache.get(&key).cloned(),
            Err(poisoned) => poisoned.into_inner().get(&key).cloned(),
        }
    }

    /// Stores the vector for `text`.
    pub fn put(&self, text: &str, vector: Vec<f32>) {
        let key = self.key(text);
        match self.inner.lock() {
            Ok(mut cache) => {
                cache.put(key, vector);
            },
            Err(poisoned) => {
                poisoned.into_inner().put(key, vector);
            },
        }
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        match self.inner.lock() {
            Ok(cache) => cache.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Returns true when the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
