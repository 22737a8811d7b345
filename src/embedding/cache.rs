//! LRU-caching decorator around an [`Embedder`].
//!
//! Cache keys include the model identifier alongside the normalized text so
//! a configuration change to `embedding.model` can never return a stale
//! vector computed under a different model.

use std::sync::Mutex;

use lru::LruCache;

use crate::Result;
use crate::core::source::sha256_hex;
use crate::embedding::Embedder;

use std::num::NonZeroUsize;

/// Default maximum number of cached entries.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Wraps an [`Embedder`], caching results keyed on
/// `sha256(model_id || normalized_text)`.
///
/// The cache is a simple `Mutex<LruCache<..>>`; embedding calls are already
/// I/O-bound, so the brief lock held during a cache hit/miss check is not a
/// contention concern in practice.
pub struct CachedEmbedder<E> {
    inner: E,
    model_id: String,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl<E: Embedder> CachedEmbedder<E> {
    /// Wraps `inner`, tagging cache entries with `model_id` and bounding the
    /// cache to `capacity` entries.
    #[must_use]
    pub fn new(inner: E, model_id: impl Into<String>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            model_id: model_id.into(),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn cache_key(&self, text: &str) -> String {
        let normalized = text.trim().to_lowercase();
        sha256_hex(format!("{}\u{0}{normalized}", self.model_id).as_bytes())
    }

    /// Number of entries currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: Embedder> Embedder for CachedEmbedder<E> {
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = self.cache_key(text);

        if let Ok(mut cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return Ok(hit.clone());
            }
        }

        let embedding = self.inner.embed(text)?;

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, embedding.clone());
        }

        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{DEFAULT_DIMENSIONS, FallbackEmbedder};
    use std::cell::Cell;

    struct CountingEmbedder {
        inner: FallbackEmbedder,
        calls: Cell<usize>,
    }

    impl Embedder for CountingEmbedder {
        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.set(self.calls.get() + 1);
            self.inner.embed(text)
        }
    }

    // SAFETY: CountingEmbedder is only exercised single-threaded in tests.
    #[allow(unsafe_code)]
    unsafe impl Sync for CountingEmbedder {}

    #[test]
    fn test_cache_hit_skips_inner_call() {
        let embedder = CachedEmbedder::new(
            CountingEmbedder {
                inner: FallbackEmbedder::new(DEFAULT_DIMENSIONS),
                calls: Cell::new(0),
            },
            "test-model",
            10,
        );

        let first = embedder.embed("hello world").unwrap();
        let second = embedder.embed("hello world").unwrap();
        assert_eq!(first, second);
        assert_eq!(embedder.inner.calls.get(), 1);
    }

    #[test]
    fn test_different_text_misses_cache() {
        let embedder = CachedEmbedder::new(
            CountingEmbedder {
                inner: FallbackEmbedder::new(DEFAULT_DIMENSIONS),
                calls: Cell::new(0),
            },
            "test-model",
            10,
        );

        embedder.embed("hello").unwrap();
        embedder.embed("world").unwrap();
        assert_eq!(embedder.inner.calls.get(), 2);
    }

    #[test]
    fn test_model_id_changes_cache_key() {
        let a = CachedEmbedder::new(FallbackEmbedder::new(DEFAULT_DIMENSIONS), "model-a", 10);
        let b = CachedEmbedder::new(FallbackEmbedder::new(DEFAULT_DIMENSIONS), "model-b", 10);
        assert_ne!(a.cache_key("text"), b.cache_key("text"));
    }

    #[test]
    fn test_normalization_shares_cache_entry() {
        let a = CachedEmbedder::new(FallbackEmbedder::new(DEFAULT_DIMENSIONS), "model", 10);
        assert_eq!(a.cache_key("  Hello  "), a.cache_key("hello"));
    }

    #[test]
    fn test_len_tracks_insertions() {
        let embedder = CachedEmbedder::new(FallbackEmbedder::new(DEFAULT_DIMENSIONS), "model", 10);
        assert!(embedder.is_empty());
        embedder.embed("a").unwrap();
        embedder.embed("b").unwrap();
        assert_eq!(embedder.len(), 2);
    }
}
