use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::sync::Cache;

use crate::config::CacheConfig;
use crate::schema::Schema;

/// A cached schema and the moment it was stored
///
/// Entries are never mutated; a reload stores a new entry under the same path.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub schema: Arc<Schema>,
    pub loaded_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            loaded_at: Utc::now(),
        }
    }

    /// Age of the entry at `now`
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.loaded_at
    }

    /// An entry is fresh while its age is below the renewal interval.
    /// A zero interval makes every entry stale.
    pub fn is_fresh(&self, renewal_interval: Duration, now: DateTime<Utc>) -> bool {
        if renewal_interval.is_zero() {
            return false;
        }
        let interval = chrono::Duration::from_std(renewal_interval)
            .unwrap_or(chrono::Duration::MAX);
        self.age(now) < interval
    }
}

/// Path-keyed in-memory schema cache with time-based renewal
///
/// Backed by `moka` so concurrent readers and writers need no external lock.
/// Concurrent reloads of the same stale path may both run; the last `put`
/// replaces the entry.
pub struct SchemaCache {
    entries: Cache<PathBuf, Arc<CacheEntry>>,
    renewal_interval: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    stale: AtomicU64,
}

impl SchemaCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_interval(config.renewal_interval(), config.max_entries)
    }

    pub fn with_interval(renewal_interval: Duration, max_entries: u64) -> Self {
        let entries = Cache::builder().max_capacity(max_entries).build();

        Self {
            entries,
            renewal_interval,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stale: AtomicU64::new(0),
        }
    }

    pub fn renewal_interval(&self) -> Duration {
        self.renewal_interval
    }

    /// Get a fresh schema for `path`, or `None` when absent or stale
    pub fn get(&self, path: &Path) -> Option<Arc<Schema>> {
        match self.entries.get(path) {
            Some(entry) if entry.is_fresh(self.renewal_interval, Utc::now()) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(path = %path.display(), "schema cache hit");
                Some(entry.schema.clone())
            }
            Some(entry) => {
                self.stale.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    path = %path.display(),
                    loaded_at = %entry.loaded_at,
                    "schema cache entry is stale"
                );
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(path = %path.display(), "schema cache miss");
                None
            }
        }
    }

    /// Get the stored entry regardless of freshness
    pub fn entry(&self, path: &Path) -> Option<Arc<CacheEntry>> {
        self.entries.get(path)
    }

    /// Store a schema under `path`, replacing any previous entry
    pub fn put(&self, path: PathBuf, schema: Arc<Schema>) {
        self.entries.insert(path, Arc::new(CacheEntry::new(schema)));
    }

    pub fn remove(&self, path: &Path) {
        self.entries.invalidate(path);
    }

    /// True when a fresh entry exists for `path`
    pub fn contains(&self, path: &Path) -> bool {
        self.entries
            .get(path)
            .is_some_and(|entry| entry.is_fresh(self.renewal_interval, Utc::now()))
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        // Flush pending maintenance so the entry count is accurate
        self.entries.run_pending_tasks();

        CacheStats {
            entry_count: self.entries.entry_count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
        }
    }
}

/// Statistics for cache operations
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entry_count: u64,
    pub hits: u64,
    pub misses: u64,
    pub stale: u64,
}

impl CacheStats {
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses + self.stale
    }

    pub fn hit_rate(&self) -> f64 {
        let lookups = self.lookups();
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}
