//! Memoized read results.
//!
//! A cached read remembers the version of every table that could affect it.
//! A later identical read reuses the cached `Arc` as long as all of those
//! versions are unchanged, so callers can detect "nothing relevant changed"
//! with `Arc::ptr_eq`. Writes to unrelated tables never invalidate an entry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use entitygraph_core::{IdSelector, ReadMode, ReadResult, Result};
use quick_cache::sync::Cache;

/// Identity of a read: which model, which records, which mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub model: String,
    pub mode: ReadMode,
    pub ids: IdSelector,
}

impl QueryKey {
    #[must_use]
    pub fn new(model: impl Into<String>, mode: ReadMode, ids: IdSelector) -> Self {
        Self {
            model: model.into(),
            mode,
            ids,
        }
    }
}

/// Versions of the tables a read depends on, in relevance order.
/// `None` marks a model with no table.
pub type Dependencies = Vec<(String, Option<u64>)>;

#[derive(Clone)]
struct CachedRead {
    dependencies: Dependencies,
    result: Arc<ReadResult>,
}

/// Hit and miss counters of a [`QueryCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Bounded cache of read results keyed by [`QueryKey`].
pub struct QueryCache {
    entries: Cache<QueryKey, CachedRead>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    /// Creates a cache holding at most `capacity` results (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Cache::new(capacity.max(1)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the cached result for `key` if it was computed against the
    /// same `dependencies`, otherwise runs `compute` and caches its output.
    ///
    /// # Errors
    ///
    /// Returns whatever `compute` fails with. Failures are not cached.
    pub fn get_or_compute<F>(
        &self,
        key: QueryKey,
        dependencies: Dependencies,
        compute: F,
    ) -> Result<Arc<ReadResult>>
    where
        F: FnOnce() -> Result<ReadResult>,
    {
        if let Some(cached) = self.entries.get(&key) {
            if cached.dependencies == dependencies {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(cached.result);
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let result = Arc::new(compute()?);
        self.entries.insert(
            key,
            CachedRead {
                dependencies,
                result: Arc::clone(&result),
            },
        );
        Ok(result)
    }

    /// Number of cached results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every cached result.
    pub fn clear(&self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
