//! Expiry Cleanup Task
//!
//! Background task that periodically sweeps expired cache entries until it is
//! told to stop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio::task::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::cache::CacheStore;

// == Cleanup Task ==
/// Handle to the running sweep loop.
///
/// `shutdown` stops the loop gracefully; dropping the handle aborts it.
#[derive(Debug)]
pub struct CleanupTask {
    stop: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl CleanupTask {
    /// Signals the loop to stop and waits for it to exit.
    pub async fn shutdown(mut self) {
        // Err only means the loop already exited and dropped its receiver.
        let _ = self.stop.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    warn!("Cleanup task ended abnormally: {}", err);
                }
            }
        }
        info!("Cleanup task stopped");
    }

    /// True once the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for CleanupTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Spawns a background task that calls `cleanup` on the cache every `interval`.
///
/// The first sweep happens one full interval after spawning; the sweep at
/// startup is done by `CacheStore::open`. Each sweep runs on the blocking pool
/// while holding the write lock. Must be called inside a tokio runtime.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(RwLock::new(CacheStore::in_memory(&Config::default())));
/// let task = spawn_cleanup_task(cache.clone(), Duration::from_secs(3600));
/// // Later, during shutdown:
/// task.shutdown().await;
/// ```
pub fn spawn_cleanup_task(cache: Arc<RwLock<CacheStore>>, interval: Duration) -> CleanupTask {
    let (stop, mut stopped) = watch::channel(false);

    let handle = tokio::spawn(async move {
        info!("Starting expiry cleanup task with interval of {:?}", interval);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = stopped.changed() => {
                    // A dropped sender counts as a stop request too.
                    if changed.is_err() || *stopped.borrow() {
                        debug!("Cleanup task received stop signal");
                        break;
                    }
                    continue;
                }
            }

            // The sweep persists through blocking storage I/O; keep it off the runtime workers.
            let mut cache_guard = cache.clone().write_owned().await;
            let removed = match task::spawn_blocking(move || cache_guard.cleanup()).await {
                Ok(removed) => removed,
                Err(err) => {
                    warn!("Expiry cleanup failed: {}", err);
                    continue;
                }
            };

            if removed > 0 {
                info!("Expiry cleanup: removed {} expired entries", removed);
            } else {
                debug!("Expiry cleanup: no expired entries found");
            }
        }
    });

    CleanupTask {
        stop,
        handle: Some(handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ManualClock, SetOptions};
    use crate::config::Config;
    use crate::error::Result;
    use crate::storage::{KeyValueStore, MemoryStore};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Instant;

    /// Store whose writes block the calling thread for `delay_ms`.
    struct SlowStore {
        delay_ms: Arc<AtomicU64>,
    }

    impl KeyValueStore for SlowStore {
        fn read(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        fn write(&mut self, _key: &str, _value: &str) -> Result<()> {
            std::thread::sleep(Duration::from_millis(self.delay_ms.load(Ordering::SeqCst)));
            Ok(())
        }
    }

    fn shared_cache() -> (Arc<RwLock<CacheStore>>, ManualClock) {
        let clock = ManualClock::new(1_700_000_000_000);
        let store = CacheStore::open(MemoryStore::unbounded(), clock.clone(), &Config::default());
        (Arc::new(RwLock::new(store)), clock)
    }

    #[tokio::test]
    async fn test_cleanup_task_removes_expired_entries() {
        let (cache, clock) = shared_cache();
        cache
            .write()
            .await
            .set("expire_soon", "value", SetOptions::default().ttl(Duration::from_secs(60)))
            .unwrap();

        let task = spawn_cleanup_task(cache.clone(), Duration::from_millis(50));

        clock.advance_secs(61);
        tokio::time::sleep(Duration::from_millis(300)).await;

        {
            let guard = cache.read().await;
            assert!(!guard.contains_key("expire_soon"), "Expired entry should have been swept");
            assert_eq!(guard.get_stats().expired_removed, 1);
        }

        task.shutdown().await;
    }

    #[tokio::test]
    async fn test_cleanup_task_preserves_valid_entries() {
        let (cache, _) = shared_cache();
        cache
            .write()
            .await
            .set("long_lived", "value", SetOptions::default())
            .unwrap();

        let task = spawn_cleanup_task(cache.clone(), Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(
            cache.write().await.get("long_lived"),
            Some(serde_json::json!("value"))
        );
        task.shutdown().await;
    }

    #[tokio::test]
    async fn test_cleanup_task_shutdown_stops_loop() {
        let (cache, _) = shared_cache();
        let task = spawn_cleanup_task(cache, Duration::from_secs(3600));
        assert!(!task.is_finished());

        tokio::time::timeout(Duration::from_secs(1), task.shutdown())
            .await
            .expect("shutdown should not wait for the next tick");
    }

    #[tokio::test]
    async fn test_cleanup_task_drop_aborts() {
        let (cache, _) = shared_cache();
        let task = spawn_cleanup_task(cache.clone(), Duration::from_secs(3600));
        drop(task);

        tokio::time::sleep(Duration::from_millis(100)).await;
        // The aborted task released its clone of the cache
        assert_eq!(Arc::strong_count(&cache), 1);
    }

    #[tokio::test]
    async fn test_slow_storage_does_not_stall_runtime() {
        let delay_ms = Arc::new(AtomicU64::new(0));
        let store = CacheStore::open(
            SlowStore {
                delay_ms: delay_ms.clone(),
            },
            ManualClock::new(0),
            &Config::default(),
        );
        let cache = Arc::new(RwLock::new(store));
        delay_ms.store(400, Ordering::SeqCst);

        let task = spawn_cleanup_task(cache, Duration::from_millis(10));
        // Let a sweep start and park in the slow write
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = Instant::now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(
            started.elapsed() < Duration::from_millis(200),
            "timer was delayed by the sweep: {:?}",
            started.elapsed()
        );

        task.shutdown().await;
    }
}
