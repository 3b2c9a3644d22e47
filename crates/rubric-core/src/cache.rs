//! Snapshot cache keyed by scope, policy and `as_of`.
//!
//! Each entry remembers the per-prompt record versions observed before its
//! records were read. An entry is served only while those versions are
//! unchanged and the entry is younger than the staleness bound; any
//! submission for a covered prompt bumps its version and so invalidates
//! every entry that depends on it.
//!
//! Inserting prunes entries that are past the staleness bound or that were
//! built from older versions of the prompts just read, and evicts the
//! oldest entries beyond the capacity. Queries with many distinct `as_of`
//! instants therefore cannot grow the map without bound.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::domain::{AggregationPolicy, MetricSnapshot, ScopeKey};

/// Record version per prompt, as returned by `RecordLedger::prompt_version`.
pub type VersionVector = BTreeMap<String, u64>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub scope: ScopeKey,
    pub policy: AggregationPolicy,
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    versions: VersionVector,
    snapshot: MetricSnapshot,
    inserted_at: Instant,
}

pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

impl CacheEntry {
    /// True if the entry was computed from an older version of any prompt
    /// in `current`.
    fn superseded_by(&self, current: &VersionVector) -> bool {
        current.iter().any(|(prompt, version)| {
            self.versions
                .get(prompt)
                .is_some_and(|seen| seen < version)
        })
    }
}

/// In-process snapshot cache.
#[derive(Debug)]
pub struct SnapshotCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    capacity: usize,
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache holding at most `capacity` snapshots (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached snapshot and its age, if the entry is still valid for
    /// `versions` and no older than `max_staleness`.
    pub fn get(
        &self,
        key: &CacheKey,
        versions: &VersionVector,
        max_staleness: Duration,
    ) -> Option<(MetricSnapshot, Duration)> {
        let mut entries = self.entries.lock().ok()?;
        let entry = entries.get(key)?;
        let age = entry.inserted_at.elapsed();
        if entry.versions != *versions || age > max_staleness {
            entries.remove(key);
            return None;
        }
        Some((entry.snapshot.clone(), age))
    }

    /// Store `snapshot` under `key`, pruning stale and superseded entries
    /// first.
    pub fn insert(
        &self,
        key: CacheKey,
        versions: VersionVector,
        snapshot: MetricSnapshot,
        max_staleness: Duration,
    ) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };

        entries.retain(|_, entry| {
            entry.inserted_at.elapsed() <= max_staleness && !entry.superseded_by(&versions)
        });
        entries.remove(&key);
        while entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    entries.remove(&k);
                }
                None => break,
            }
        }

        entries.insert(
            key,
            CacheEntry {
                versions,
                snapshot,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

}
