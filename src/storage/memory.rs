//! In-memory Store
//!
//! Quota-bounded store kept in process memory. Clones share the same map, so a
//! test can keep a handle and inspect or corrupt what the cache wrote.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{CacheError, Result};
use crate::storage::KeyValueStore;

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<String, String>,
    quota: usize,
    writes: u64,
    rejected: u64,
}

impl Inner {
    /// Bytes used by every key and value except `skip`.
    fn usage_without(&self, skip: &str) -> usize {
        self.values
            .iter()
            .filter(|(k, _)| k.as_str() != skip)
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

// == Memory Store ==
/// Shared in-memory `KeyValueStore` with a byte quota.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    // == Constructor ==
    /// Creates an empty store that accepts at most `quota` bytes of keys plus values.
    pub fn new(quota: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                quota,
                ..Inner::default()
            })),
        }
    }

    /// Creates an empty store with no practical quota.
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned map is still a consistent map: writes are single inserts.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Changes the quota; existing values are kept even if they exceed it.
    pub fn set_quota(&self, quota: usize) {
        self.lock().quota = quota;
    }

    /// Stores `value` bypassing the quota.
    pub fn put_raw(&self, key: &str, value: &str) {
        self.lock().values.insert(key.to_string(), value.to_string());
    }

    /// Returns the raw value under `key`.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.lock().values.get(key).cloned()
    }

    /// Bytes currently used by keys and values.
    pub fn usage(&self) -> usize {
        self.lock().usage_without("")
    }

    /// Number of accepted writes.
    pub fn writes(&self) -> u64 {
        self.lock().writes
    }

    /// Number of writes refused for quota.
    pub fn rejected_writes(&self) -> u64 {
        self.lock().rejected
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().values.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.lock();
        let needed = inner
            .usage_without(key)
            .saturating_add(key.len() + value.len());
        if needed > inner.quota {
            inner.rejected += 1;
            return Err(CacheError::QuotaExceeded {
                needed,
                quota: inner.quota,
            });
        }
        inner.values.insert(key.to_string(), value.to_string());
        inner.writes += 1;
        Ok(())
    }
}
