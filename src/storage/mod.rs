//! Storage Module
//!
//! The durable, quota-bounded string store the cache persists itself into.
//!
//! # Contract
//! - `read` returns `Ok(None)` for an absent key
//! - `write` either stores the whole value or fails; a full store fails with
//!   `CacheError::QuotaExceeded` and leaves the previous value in place

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::Result;

// == Key Value Store ==
/// Durable string-keyed store with quota semantics.
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`, if any.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Replaces the value stored under `key`.
    fn write(&mut self, key: &str, value: &str) -> Result<()>;
}
