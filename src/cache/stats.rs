//! Cache Statistics Module
//!
//! Snapshot of table composition plus running hit/miss/eviction counters.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::cache::{CacheEntry, EntryType, Priority};

// == Counters ==
/// Running counters; live only for the process lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired_removed: u64,
}

impl Counters {
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    pub fn record_expired(&mut self, count: usize) {
        self.expired_removed += count as u64;
    }
}

// == Cache Stats ==
/// Statistics returned by `CacheStore::get_stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Current number of entries in the table (expired-but-unswept included)
    pub total_entries: usize,
    pub by_type: BTreeMap<EntryType, usize>,
    pub by_priority: BTreeMap<Priority, usize>,
    /// Smallest `timestamp` in the table
    pub oldest_entry: Option<i64>,
    /// Largest `timestamp` in the table
    pub newest_entry: Option<i64>,
    /// Approximate serialized size of all entries in bytes
    pub total_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired_removed: u64,
    /// True when the last durable write failed and the on-disk copy lags memory
    pub durable_stale: bool,
}

impl CacheStats {
    // == Collect ==
    /// Builds stats from the current entries and counters.
    pub fn collect<'a, I>(entries: I, counters: Counters, durable_stale: bool) -> Self
    where
        I: IntoIterator<Item = &'a CacheEntry>,
    {
        let mut stats = CacheStats {
            hits: counters.hits,
            misses: counters.misses,
            evictions: counters.evictions,
            expired_removed: counters.expired_removed,
            durable_stale,
            ..CacheStats::default()
        };
        for entry_type in EntryType::ALL {
            stats.by_type.insert(entry_type, 0);
        }
        for priority in Priority::ALL {
            stats.by_priority.insert(priority, 0);
        }

        for entry in entries {
            stats.total_entries += 1;
            *stats.by_type.entry(entry.entry_type).or_default() += 1;
            *stats.by_priority.entry(entry.priority).or_default() += 1;
            stats.oldest_entry = Some(
                stats
                    .oldest_entry
                    .map_or(entry.timestamp, |t| t.min(entry.timestamp)),
            );
            stats.newest_entry = Some(
                stats
                    .newest_entry
                    .map_or(entry.timestamp, |t| t.max(entry.timestamp)),
            );
            stats.total_size += serde_json::to_string(entry).map_or(0, |s| s.len());
        }
        stats
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn count_of(&self, entry_type: EntryType) -> usize {
        self.by_type.get(&entry_type).copied().unwrap_or(0)
    }
}
