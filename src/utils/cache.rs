//! In-memory, short-lived caching of search results.
//!
//! Entries are keyed by the normalized query and limit, live for a fixed TTL,
//! and are evicted lazily: an expired entry found by a lookup is removed and
//! reported as a miss. There is no background sweep.
//!
//! The cache is the only state shared between concurrent searches. It is an
//! injectable component (not a process-wide singleton) guarded by a `RwLock`;
//! `put` replaces a whole entry under the write lock, so readers never see a
//! partial update.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::models::Paper;

/// Default time-to-live for cached searches
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Source of the current time for expiry checks
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to; for tests
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        self.start + offset
    }
}

/// Cache key derived from `(lowercased trimmed query, limit)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(query: &str, limit: usize) -> Self {
        let input = format!("{}|{}", query.trim().to_lowercase(), limit);
        Self(format!("{:x}", md5::compute(input.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cached search: the final papers and the providers that contributed them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSearch {
    pub papers: Vec<Paper>,
    pub sources_used: Vec<String>,
}

#[derive(Debug)]
struct CacheEntry {
    value: CachedSearch,
    inserted_at: Instant,
}

/// Result of a cache lookup
#[derive(Debug, PartialEq, Eq)]
pub enum CacheResult<T> {
    /// Item was found and is valid
    Hit(T),

    /// Item was not found
    Miss,

    /// Item was found but has expired; it has been removed
    Expired,
}

impl<T> CacheResult<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            CacheResult::Hit(value) => Some(value),
            CacheResult::Miss | CacheResult::Expired => None,
        }
    }
}

/// TTL cache for search results
#[derive(Debug)]
pub struct SearchCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SearchCache {
    /// Create a cache with the default TTL and the wall clock
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.inserted_at) < self.ttl
    }

    /// Look up an entry, evicting it if it has expired
    pub fn lookup(&self, key: &CacheKey) -> CacheResult<CachedSearch> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(key) {
                None => return CacheResult::Miss,
                Some(entry) if self.is_fresh(entry, now) => {
                    return CacheResult::Hit(entry.value.clone())
                }
                Some(_) => {}
            }
        }

        // Re-check under the write lock: a concurrent put may have refreshed it
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) if self.is_fresh(entry, now) => CacheResult::Hit(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                tracing::debug!(key = %key, "Cache entry expired");
                CacheResult::Expired
            }
            None => CacheResult::Miss,
        }
    }

    /// Get a live entry
    pub fn get(&self, key: &CacheKey) -> Option<CachedSearch> {
        self.lookup(key).into_option()
    }

    /// Insert or replace an entry
    pub fn put(&self, key: CacheKey, value: CachedSearch) {
        let entry = CacheEntry {
            value,
            inserted_at: self.clock.now(),
        };
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, entry);
    }

    /// Number of stored entries, expired ones included until looked up
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::new()
    }
}
