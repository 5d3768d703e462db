//! LRU cache over embedding lookups, keyed by the text that was embedded.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub maxsize: usize,
}

pub struct EmbeddingCache {
    inner: Mutex<LruCache<String, Vec<f32>>>,
    maxsize: usize,
    hits: Mutex<u64>,
    misses: Mutex<u64>,
}

impl EmbeddingCache {
    pub fn new(maxsize: usize) -> Self {
        let capacity = NonZeroUsize::new(maxsize.max(1)).unwrap();
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            maxsize,
            hits: Mutex::new(0),
            misses: Mutex::new(0),
        }
    }

    /// Returns the cached embedding and marks this key as most-recently-used,
    /// or records a miss and returns `None`.
    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        let mut inner = self.inner.lock().expect("embedding cache lock poisoned");
        match inner.get(key) {
            Some(value) => {
                *self.hits.lock().expect("hits lock poisoned") += 1;
                Some(value.clone())
            }
            None => {
                *self.misses.lock().expect("misses lock poisoned") += 1;
                None
            }
        }
    }

    /// Inserts or refreshes `key`. Re-inserting an existing key moves it to
    /// the most-recently-used position.
    pub fn put(&self, key: String, value: Vec<f32>) {
        let mut inner = self.inner.lock().expect("embedding cache lock poisoned");
        inner.put(key, value);
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("embedding cache lock poisoned");
        CacheStats {
            hits: *self.hits.lock().expect("hits lock poisoned"),
            misses: *self.misses.lock().expect("misses lock poisoned"),
            size: inner.len(),
            maxsize: self.maxsize,
        }
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new(1000)
    }
}
