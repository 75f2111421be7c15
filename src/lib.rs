//! Form Cache - persistent cache for form drafts, submissions and templates
//!
//! Provides a bounded entry table with TTL expiry, priority eviction and
//! write-through persistence to a quota-limited key-value store.

pub mod cache;
pub mod config;
pub mod error;
pub mod service;
pub mod storage;
pub mod tasks;

pub use cache::{
    CacheEntry, CacheStore, EntryMetadata, EntryType, FindCriteria, Priority, SetOptions,
};
pub use config::Config;
pub use error::{CacheError, Result};
pub use service::{CacheService, SharedCache};
pub use tasks::spawn_cleanup_task;
