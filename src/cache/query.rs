//! Query Module
//!
//! Criteria-based search over the entry table.

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheEntry, EntryType};

// == Find Criteria ==
/// AND-combined filter; an unset field matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindCriteria {
    #[serde(rename = "type")]
    pub entry_type: Option<EntryType>,
    pub patient_id: Option<String>,
    pub form_type: Option<String>,
    /// Inclusive lower bound on `timestamp` (Unix milliseconds)
    pub since: Option<i64>,
}

impl FindCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_type(mut self, entry_type: EntryType) -> Self {
        self.entry_type = Some(entry_type);
        self
    }

    pub fn patient(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    pub fn form_type(mut self, form_type: impl Into<String>) -> Self {
        self.form_type = Some(form_type.into());
        self
    }

    pub fn since(mut self, since_ms: i64) -> Self {
        self.since = Some(since_ms);
        self
    }

    // == Matches ==
    /// Checks every present criterion against `entry`.
    pub fn matches(&self, entry: &CacheEntry) -> bool {
        if let Some(entry_type) = self.entry_type {
            if entry.entry_type != entry_type {
                return false;
            }
        }
        if let Some(patient_id) = &self.patient_id {
            if entry.patient_id() != Some(patient_id.as_str()) {
                return false;
            }
        }
        if let Some(form_type) = &self.form_type {
            if entry.form_type() != Some(form_type.as_str()) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }
        true
    }
}

// == Find ==
/// Returns live entries matching `criteria`, most recently touched first.
///
/// Expired entries are skipped but left in place; removing them is the job
/// of reads and the cleanup sweep. Equal timestamps are ordered by key.
pub fn find<'a, I>(entries: I, criteria: &FindCriteria, now: i64) -> Vec<&'a CacheEntry>
where
    I: IntoIterator<Item = &'a CacheEntry>,
{
    let mut matches: Vec<&CacheEntry> = entries
        .into_iter()
        .filter(|entry| !entry.is_expired(now) && criteria.matches(entry))
        .collect();
    matches.sort_by(|a, b| {
        Reverse(a.timestamp)
            .cmp(&Reverse(b.timestamp))
            .then_with(|| a.id.cmp(&b.id))
    });
    matches
}
