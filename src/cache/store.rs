//! Cache Store Module
//!
//! Main cache engine: the entry table, its capacity and expiry rules, and the
//! write-through to a durable `KeyValueStore`.
//!
//! Every mutating operation re-serializes the whole table under a single
//! storage key. Persistence failures never reach the caller: a full store
//! triggers an emergency prune and one retry, after which the in-memory table
//! stays authoritative and the durable copy is flagged stale.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::eviction::enforce_capacity;
use crate::cache::query::{self, FindCriteria};
use crate::cache::stats::{CacheStats, Counters};
use crate::cache::{CacheEntry, Clock, EntryMetadata, EntryType, Priority, SystemClock};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::storage::{KeyValueStore, MemoryStore};

/// Version tag written into export snapshots.
pub const SNAPSHOT_VERSION: &str = "1.0";

/// Age past which low-priority drafts are dropped when the store is full.
pub const EMERGENCY_PRUNE_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub(crate) fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

// == Set Options ==
/// Per-write settings for `CacheStore::set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOptions {
    pub entry_type: EntryType,
    pub priority: Priority,
    /// Lifetime of the entry; None uses the store default
    pub ttl: Option<Duration>,
    pub metadata: Option<EntryMetadata>,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            entry_type: EntryType::Draft,
            priority: Priority::default(),
            ttl: None,
            metadata: None,
        }
    }
}

impl SetOptions {
    pub fn of_type(entry_type: EntryType) -> Self {
        Self {
            entry_type,
            ..Self::default()
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn metadata(mut self, metadata: EntryMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

// == Export Snapshot ==
/// Versioned backup format produced by `export_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSnapshot {
    pub version: String,
    pub timestamp: i64,
    pub entries: Vec<(String, CacheEntry)>,
}

impl ExportSnapshot {
    /// Checks the shape of a parsed snapshot before it may replace the table.
    fn validate(&self) -> Result<()> {
        if self.version != SNAPSHOT_VERSION {
            return Err(CacheError::InvalidSnapshot(format!(
                "unsupported version '{}'",
                self.version
            )));
        }
        let mut seen = HashSet::new();
        for (key, entry) in &self.entries {
            check_pair(key, entry)?;
            if !seen.insert(key.as_str()) {
                return Err(CacheError::InvalidSnapshot(format!("duplicate key '{}'", key)));
            }
        }
        Ok(())
    }
}

/// Rejects a `(key, entry)` pair whose key is not its id or whose expiry
/// precedes its timestamp.
fn check_pair(key: &str, entry: &CacheEntry) -> Result<()> {
    if key != entry.id {
        return Err(CacheError::InvalidSnapshot(format!(
            "key '{}' does not match entry id '{}'",
            key, entry.id
        )));
    }
    if entry.expires_at.is_some_and(|expires| expires < entry.timestamp) {
        return Err(CacheError::InvalidSnapshot(format!(
            "entry '{}' expires before it was written",
            key
        )));
    }
    Ok(())
}

// == Cache Store ==
/// Entry table with priority eviction, TTL expiry and durable write-through.
pub struct CacheStore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// Durable backing store
    storage: Box<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    /// Durable key holding the serialized table
    storage_key: String,
    /// Maximum number of entries allowed
    max_entries: usize,
    /// TTL for entries written without one
    default_ttl: Duration,
    counters: Counters,
    /// Set when the last durable write failed
    durable_stale: bool,
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("entries", &self.entries.len())
            .field("storage_key", &self.storage_key)
            .field("max_entries", &self.max_entries)
            .field("default_ttl", &self.default_ttl)
            .field("counters", &self.counters)
            .field("durable_stale", &self.durable_stale)
            .finish_non_exhaustive()
    }
}

impl CacheStore {
    // == Constructor ==
    /// Opens the cache over `storage`, hydrating from the durable blob.
    ///
    /// An absent or malformed blob yields an empty table. After hydration the
    /// table is swept for expired entries and trimmed to capacity, once.
    pub fn open<S, C>(storage: S, clock: C, config: &Config) -> Self
    where
        S: KeyValueStore + 'static,
        C: Clock + 'static,
    {
        let mut store = Self {
            entries: HashMap::new(),
            storage: Box::new(storage),
            clock: Arc::new(clock),
            storage_key: config.storage_key.clone(),
            max_entries: config.max_entries,
            default_ttl: Duration::from_secs(config.default_ttl),
            counters: Counters::default(),
            durable_stale: false,
        };
        store.hydrate();

        let evicted = enforce_capacity(&mut store.entries, store.max_entries);
        store.counters.record_evictions(evicted.len());
        let removed = store.cleanup();
        info!(
            "Cache hydrated: {} entries ({} expired removed, {} evicted)",
            store.entries.len(),
            removed,
            evicted.len()
        );
        store
    }

    /// Opens a cache over an unbounded in-memory store and the system clock.
    pub fn in_memory(config: &Config) -> Self {
        Self::open(MemoryStore::unbounded(), SystemClock, config)
    }

    fn hydrate(&mut self) {
        let blob = match self.storage.read(&self.storage_key) {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                debug!("No durable cache found under '{}'", self.storage_key);
                return;
            }
            Err(err) => {
                warn!(
                    "Failed to read durable cache '{}', starting empty; the stored blob \
                     will be overwritten by the startup sweep: {}",
                    self.storage_key, err
                );
                return;
            }
        };

        let pairs = match serde_json::from_str::<Vec<(String, CacheEntry)>>(&blob) {
            Ok(pairs) => pairs,
            Err(err) => {
                let err = CacheError::Deserialization(err.to_string());
                warn!(
                    "Discarding malformed durable cache '{}'; the stored blob \
                     will be overwritten by the startup sweep: {}",
                    self.storage_key, err
                );
                return;
            }
        };

        for (key, entry) in pairs {
            if let Err(err) = check_pair(&key, &entry) {
                warn!("Dropping invalid durable entry: {}", err);
                continue;
            }
            if self.entries.contains_key(&key) {
                warn!("Dropping duplicate durable entry '{}'", key);
                continue;
            }
            self.entries.insert(key, entry);
        }
    }

    // == Set ==
    /// Stores a copy of `data` under `key`.
    ///
    /// An existing key is replaced and its timestamp and expiry reset. The
    /// table is trimmed to capacity and persisted afterwards. Only a payload
    /// JSON cannot represent is an error; persistence problems are absorbed.
    pub fn set<T>(&mut self, key: impl Into<String>, data: &T, options: SetOptions) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let value =
            serde_json::to_value(data).map_err(|e| CacheError::Serialization(e.to_string()))?;
        let key = key.into();
        let ttl = options.ttl.unwrap_or(self.default_ttl);
        let entry = CacheEntry::new(
            key.clone(),
            value,
            options.entry_type,
            options.priority,
            self.clock.now_ms(),
            duration_ms(ttl),
            options.metadata,
        );
        self.entries.insert(key, entry);

        let evicted = enforce_capacity(&mut self.entries, self.max_entries);
        if !evicted.is_empty() {
            debug!("Evicted {} entries over capacity", evicted.len());
            self.counters.record_evictions(evicted.len());
        }

        self.persist();
        Ok(())
    }

    // == Get ==
    /// Retrieves a copy of the payload stored under `key`.
    ///
    /// A live hit refreshes the entry's timestamp. An expired entry is removed
    /// and reported as absent.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        self.touch(key).map(|entry| entry.data.clone())
    }

    /// Like `get`, returning the whole entry.
    pub fn get_entry(&mut self, key: &str) -> Option<CacheEntry> {
        self.touch(key).cloned()
    }

    /// Like `get`, decoding the payload into `T`.
    pub fn get_as<T: DeserializeOwned>(&mut self, key: &str) -> Result<T> {
        let entry = self
            .touch(key)
            .ok_or_else(|| CacheError::NotFound(key.to_string()))?;
        serde_json::from_value(entry.data.clone())
            .map_err(|e| CacheError::Deserialization(e.to_string()))
    }

    fn touch(&mut self, key: &str) -> Option<&CacheEntry> {
        let now = self.clock.now_ms();
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                self.counters.record_miss();
                return None;
            }
        };

        if expired {
            self.entries.remove(key);
            self.counters.record_miss();
            self.counters.record_expired(1);
            debug!("Lazily removed expired entry '{}'", key);
            self.persist();
            return None;
        }

        if let Some(entry) = self.entries.get_mut(key) {
            entry.timestamp = now;
        }
        self.counters.record_hit();
        self.persist();
        self.entries.get(key)
    }

    // == Delete ==
    /// Removes an entry by key; returns whether it existed.
    pub fn delete(&mut self, key: &str) -> bool {
        let existed = self.entries.remove(key).is_some();
        if existed {
            self.persist();
        }
        existed
    }

    // == Find ==
    /// Returns live entries matching `criteria`, most recently touched first.
    ///
    /// Does not refresh timestamps or remove expired entries.
    pub fn find(&self, criteria: &FindCriteria) -> Vec<&CacheEntry> {
        query::find(self.entries.values(), criteria, self.clock.now_ms())
    }

    // == Cleanup ==
    /// Removes all expired entries and persists once.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup(&mut self) -> usize {
        let now = self.clock.now_ms();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - self.entries.len();

        self.counters.record_expired(removed);
        self.persist();
        removed
    }

    // == Clear ==
    /// Removes every entry of `entry_type`; returns how many were removed.
    pub fn clear_by_type(&mut self, entry_type: EntryType) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.entry_type != entry_type);
        let removed = before - self.entries.len();

        info!("Cleared {} {} entries", removed, entry_type);
        self.persist();
        removed
    }

    /// Removes every entry; returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.persist();
        removed
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn get_stats(&self) -> CacheStats {
        CacheStats::collect(self.entries.values(), self.counters, self.durable_stale)
    }

    // == Export / Import ==
    /// Builds a versioned snapshot of the whole table.
    pub fn snapshot(&self) -> ExportSnapshot {
        ExportSnapshot {
            version: SNAPSHOT_VERSION.to_string(),
            timestamp: self.clock.now_ms(),
            entries: self
                .sorted_pairs()
                .into_iter()
                .map(|(key, entry)| (key.clone(), entry.clone()))
                .collect(),
        }
    }

    /// Serializes `snapshot()` as JSON.
    pub fn export_data(&self) -> Result<String> {
        serde_json::to_string(&self.snapshot())
            .map_err(|e| CacheError::Serialization(e.to_string()))
    }

    /// Replaces the whole table with the contents of an exported snapshot.
    ///
    /// Nothing changes unless the blob parses and validates. The imported
    /// table is trimmed to capacity and persisted. Returns the entry count.
    pub fn import_data(&mut self, blob: &str) -> Result<usize> {
        let snapshot: ExportSnapshot = serde_json::from_str(blob).map_err(|e| {
            warn!("Rejected import: {}", e);
            CacheError::Deserialization(e.to_string())
        })?;
        if let Err(err) = snapshot.validate() {
            warn!("Rejected import: {}", err);
            return Err(err);
        }

        self.entries = snapshot.entries.into_iter().collect();
        let evicted = enforce_capacity(&mut self.entries, self.max_entries);
        self.counters.record_evictions(evicted.len());
        info!("Imported {} entries", self.entries.len());

        self.persist();
        Ok(self.entries.len())
    }

    // == Persistence ==
    /// Writes the table to the durable store now.
    ///
    /// Returns false if the durable copy is left stale.
    pub fn flush(&mut self) -> bool {
        self.persist();
        !self.durable_stale
    }

    fn sorted_pairs(&self) -> Vec<(&String, &CacheEntry)> {
        let mut pairs: Vec<(&String, &CacheEntry)> = self.entries.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        pairs
    }

    fn serialize_table(&self) -> Result<String> {
        serde_json::to_string(&self.sorted_pairs())
            .map_err(|e| CacheError::Serialization(e.to_string()))
    }

    fn write_table(&mut self) -> Result<()> {
        let blob = self.serialize_table()?;
        self.storage.write(&self.storage_key, &blob)
    }

    fn persist(&mut self) {
        let err = match self.write_table() {
            Ok(()) => {
                self.durable_stale = false;
                return;
            }
            Err(err) => err,
        };

        if !err.is_quota() {
            warn!("Failed to persist cache, durable copy is stale: {}", err);
            self.durable_stale = true;
            return;
        }

        let pruned = self.emergency_prune();
        warn!("{}; pruned {} old low-priority drafts, retrying", err, pruned);
        match self.write_table() {
            Ok(()) => self.durable_stale = false,
            Err(err) => {
                warn!(
                    "Retry failed, keeping {} entries in memory only: {}",
                    self.entries.len(),
                    err
                );
                self.durable_stale = true;
            }
        }
    }

    /// Drops drafts that are low priority and older than seven days.
    fn emergency_prune(&mut self) -> usize {
        let cutoff = self
            .clock
            .now_ms()
            .saturating_sub(duration_ms(EMERGENCY_PRUNE_AGE));
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            !(entry.entry_type == EntryType::Draft
                && entry.priority == Priority::Low
                && entry.timestamp < cutoff)
        });
        before - self.entries.len()
    }

    // == Accessors ==
    /// Current time according to the store's clock.
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// True if `key` is in the table, expired or not.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the current number of entries in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// True when the last durable write failed.
    pub fn is_durable_stale(&self) -> bool {
        self.durable_stale
    }
}
