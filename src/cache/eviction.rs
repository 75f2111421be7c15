//! Eviction Policy Module
//!
//! Keeps the entry table within its capacity bound.
//!
//! Every over-capacity insert re-ranks the whole table, O(n log n) in the
//! table size. The bound is small, so there is no persistent ranking index.

use std::cmp::Reverse;
use std::collections::HashMap;

use crate::cache::CacheEntry;

// == Enforce Capacity ==
/// Trims `entries` down to the `max_entries` best-ranked entries.
///
/// Ranking is priority descending, then timestamp descending. Remaining ties
/// are broken by key so the outcome does not depend on map iteration order.
///
/// # Returns
/// The keys that were evicted (empty when already within capacity).
pub fn enforce_capacity(
    entries: &mut HashMap<String, CacheEntry>,
    max_entries: usize,
) -> Vec<String> {
    if entries.len() <= max_entries {
        return Vec::new();
    }

    let mut ranked: Vec<(&String, &CacheEntry)> = entries.iter().collect();
    ranked.sort_by_key(|(key, entry)| (Reverse(entry.rank()), *key));

    let evicted: Vec<String> = ranked
        .into_iter()
        .skip(max_entries)
        .map(|(key, _)| key.clone())
        .collect();

    for key in &evicted {
        entries.remove(key);
    }
    evicted
}
