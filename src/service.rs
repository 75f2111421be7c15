//! Cache Service
//!
//! The one cache a process owns: the shared store plus its cleanup task.
//! Constructed once at startup and handed to every consumer by clone.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::cache::{CacheStore, SystemClock};
use crate::config::Config;
use crate::error::Result;
use crate::storage::FileStore;
use crate::tasks::{spawn_cleanup_task, CleanupTask};

/// Thread-safe handle to the cache store.
pub type SharedCache = Arc<RwLock<CacheStore>>;

// == Cache Service ==
/// Owns the shared cache and the single recurring cleanup task.
#[derive(Debug)]
pub struct CacheService {
    cache: SharedCache,
    cleanup: CleanupTask,
}

impl CacheService {
    /// Opens the file-backed store described by `config` and starts the
    /// cleanup task. Must be called inside a tokio runtime.
    pub fn start(config: &Config) -> Result<Self> {
        let storage = FileStore::open(&config.data_dir, config.quota_bytes)?;
        info!("Using file store at {}", storage.dir().display());
        let store = CacheStore::open(storage, SystemClock, config);
        Ok(Self::with_store(store, config))
    }

    /// Wraps an already opened store and starts the cleanup task.
    pub fn with_store(store: CacheStore, config: &Config) -> Self {
        let cache: SharedCache = Arc::new(RwLock::new(store));
        let cleanup = spawn_cleanup_task(
            cache.clone(),
            Duration::from_secs(config.cleanup_interval.max(1)),
        );
        Self { cache, cleanup }
    }

    /// Handle for consumers; clones share the same store.
    pub fn cache(&self) -> SharedCache {
        self.cache.clone()
    }

    /// Stops the cleanup task and makes a final durable write.
    pub async fn shutdown(self) {
        self.cleanup.shutdown().await;
        let mut cache = self.cache.write().await;
        if cache.flush() {
            info!("Cache persisted with {} entries", cache.len());
        } else {
            warn!("Final persist failed; durable copy is stale");
        }
    }
}
