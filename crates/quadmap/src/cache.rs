//! Byte caches for HTTP tile providers.
//!
//! The cache is keyed by request URL, which already encodes the provider
//! identity, so it can be shared between providers without collisions.
//!
//! - [`MemoryCache`]: in-memory cache with an optional size limit
//! - [`NoCache`]: passthrough implementation that caches nothing

use std::{
    collections::{HashMap, VecDeque},
    future::Future,
    pin::Pin,
    sync::{Arc, PoisonError, RwLock},
};

use crate::error::Result;

/// Future type for cache get operations.
pub type GetFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>>> + Send + 'a>>;

/// Future type for cache put/remove operations.
pub type CacheFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// A cache for downloaded tile payloads.
pub trait Cache: Send + Sync {
    /// Get data from the cache, `Ok(None)` on a miss.
    fn get(&self, url: &str) -> GetFuture<'_>;

    /// Store data for later retrieval.
    fn put(&self, url: &str, data: Vec<u8>) -> CacheFuture<'_>;

    /// Remove data from the cache.
    fn remove(&self, url: &str) -> CacheFuture<'_>;

    /// Clear all cached data.
    fn clear(&self) -> CacheFuture<'_>;
}

/// A cache that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl Cache for NoCache {
    fn get(&self, _url: &str) -> GetFuture<'_> {
        Box::pin(async { Ok(None) })
    }

    fn put(&self, _url: &str, _data: Vec<u8>) -> CacheFuture<'_> {
        Box::pin(async { Ok(()) })
    }

    fn remove(&self, _url: &str) -> CacheFuture<'_> {
        Box::pin(async { Ok(()) })
    }

    fn clear(&self) -> CacheFuture<'_> {
        Box::pin(async { Ok(()) })
    }
}

/// An in-memory cache.
///
/// When a size limit is set, the oldest entries are evicted first. Clones
/// share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    data: Arc<RwLock<MemoryCacheInner>>,
    max_size: Option<usize>,
}

#[derive(Debug, Default)]
struct MemoryCacheInner {
    entries: HashMap<String, Vec<u8>>,
    /// Insertion order, oldest first.
    order: VecDeque<String>,
    current_size: usize,
}

impl MemoryCacheInner {
    fn remove(&mut self, url: &str) {
        if let Some(old) = self.entries.remove(url) {
            self.current_size -= old.len();
            self.order.retain(|k| k != url);
        }
    }
}

impl MemoryCache {
    /// Create a memory cache with no size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a memory cache holding at most `max_size` bytes.
    #[must_use]
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            data: Arc::default(),
            max_size: Some(max_size),
        }
    }

    /// Total size of cached data in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.read().unwrap_or_else(PoisonError::into_inner).current_size
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().unwrap_or_else(PoisonError::into_inner).entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for MemoryCache {
    fn get(&self, url: &str) -> GetFuture<'_> {
        let result = self
            .data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(url)
            .cloned();
        Box::pin(async move { Ok(result) })
    }

    fn put(&self, url: &str, data: Vec<u8>) -> CacheFuture<'_> {
        let mut cache = self.data.write().unwrap_or_else(PoisonError::into_inner);
        cache.remove(url);

        let data_size = data.len();
        if let Some(max_size) = self.max_size {
            // Entries larger than the whole cache are not stored.
            if data_size > max_size {
                return Box::pin(async { Ok(()) });
            }
            while cache.current_size + data_size > max_size {
                let Some(oldest) = cache.order.pop_front() else {
                    break;
                };
                if let Some(old) = cache.entries.remove(&oldest) {
                    cache.current_size -= old.len();
                }
            }
        }

        cache.entries.insert(url.to_string(), data);
        cache.order.push_back(url.to_string());
        cache.current_size += data_size;

        Box::pin(async { Ok(()) })
    }

    fn remove(&self, url: &str) -> CacheFuture<'_> {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url);
        Box::pin(async { Ok(()) })
    }

    fn clear(&self) -> CacheFuture<'_> {
        let mut cache = self.data.write().unwrap_or_else(PoisonError::into_inner);
        cache.entries.clear();
        cache.order.clear();
        cache.current_size = 0;
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use futures_lite::future::block_on;

    use super::*;

    #[test]
    fn test_no_cache() {
        let cache = NoCache;
        block_on(cache.put("http://tiles/0/0/0.png", vec![1, 2, 3])).unwrap();
        assert!(block_on(cache.get("http://tiles/0/0/0.png")).unwrap().is_none());
    }

    #[test]
    fn test_memory_cache_basic() {
        let cache = MemoryCache::new();
        assert!(cache.is_empty());

        block_on(cache.put("http://tiles/a", vec![1, 2, 3])).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.size(), 3);
        assert_eq!(
            block_on(cache.get("http://tiles/a")).unwrap(),
            Some(vec![1, 2, 3])
        );

        block_on(cache.remove("http://tiles/a")).unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_memory_cache_eviction() {
        let cache = MemoryCache::with_max_size(10);
        block_on(cache.put("a", vec![0; 5])).unwrap();
        block_on(cache.put("b", vec![0; 5])).unwrap();
        assert_eq!(cache.size(), 10);

        // Evicts "a", the oldest entry.
        block_on(cache.put("c", vec![0; 3])).unwrap();
        assert_eq!(cache.size(), 8);
        assert!(block_on(cache.get("a")).unwrap().is_none());
        assert!(block_on(cache.get("b")).unwrap().is_some());
        assert!(block_on(cache.get("c")).unwrap().is_some());

        // Too large to ever fit.
        block_on(cache.put("d", vec![0; 11])).unwrap();
        assert!(block_on(cache.get("d")).unwrap().is_none());
        assert_eq!(cache.size(), 8);
    }

    #[test]
    fn test_memory_cache_update_and_clear() {
        let cache = MemoryCache::new();
        block_on(cache.put("a", vec![1, 2, 3])).unwrap();
        block_on(cache.put("a", vec![1, 2, 3, 4, 5])).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.size(), 5);

        let shared = cache.clone();
        block_on(shared.clear()).unwrap();
        assert!(cache.is_empty());
    }
}
