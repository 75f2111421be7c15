//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Default capacity bound of the entry table.
pub const DEFAULT_MAX_ENTRIES: usize = 100;
/// Default TTL in seconds (24 hours).
pub const DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;
/// Default sweep period in seconds (1 hour).
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60 * 60;
/// Default durable key holding the serialized table.
pub const DEFAULT_STORAGE_KEY: &str = "intelligent_form_cache";
/// Default durable-store quota (5 MiB).
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of entries the table can hold
    pub max_entries: usize,
    /// Default TTL in seconds for entries without explicit TTL
    pub default_ttl: u64,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
    /// Directory backing the file store
    pub data_dir: PathBuf,
    /// Durable key under which the whole table is written
    pub storage_key: String,
    /// Byte quota of the durable store
    pub quota_bytes: usize,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_ENTRIES` - Capacity bound (default: 100)
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 86400)
    /// - `CACHE_CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 3600)
    /// - `CACHE_DATA_DIR` - File store directory (default: ./cache-data)
    /// - `CACHE_STORAGE_KEY` - Durable key (default: intelligent_form_cache)
    /// - `CACHE_QUOTA_BYTES` - Durable quota in bytes (default: 5 MiB)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_entries: parse_var("CACHE_MAX_ENTRIES").unwrap_or(defaults.max_entries),
            default_ttl: parse_var("CACHE_DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            cleanup_interval: parse_var("CACHE_CLEANUP_INTERVAL")
                .unwrap_or(defaults.cleanup_interval),
            data_dir: env::var("CACHE_DATA_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            storage_key: env::var("CACHE_STORAGE_KEY")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.storage_key),
            quota_bytes: parse_var("CACHE_QUOTA_BYTES").unwrap_or(defaults.quota_bytes),
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            default_ttl: DEFAULT_TTL_SECS,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL_SECS,
            data_dir: PathBuf::from("./cache-data"),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            quota_bytes: DEFAULT_QUOTA_BYTES,
        }
    }
}
