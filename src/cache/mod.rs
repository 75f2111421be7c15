//! Cache Module
//!
//! Persistent entry table with TTL expiry, priority eviction and a small
//! query surface for form drafts, submissions and templates.

mod clock;
mod drafts;
mod entry;
mod eviction;
mod query;
mod stats;
mod store;


// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock};
pub use drafts::{
    normalize_template_name, template_key, DraftContext, DraftPayload, DRAFT_RECOVERY_WINDOW,
    DRAFT_TTL, TEMPLATE_TTL,
};
pub use entry::{CacheEntry, EntryMetadata, EntryType, Priority};
pub use eviction::enforce_capacity;
pub use query::FindCriteria;
pub use stats::{CacheStats, Counters};
pub use store::{CacheStore, ExportSnapshot, SetOptions, EMERGENCY_PRUNE_AGE, SNAPSHOT_VERSION};
