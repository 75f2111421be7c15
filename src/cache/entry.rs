//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.
//!
//! # Payload contract
//! Payloads are captured as `serde_json::Value` at write time. Only what JSON
//! can represent survives: a payload whose `Serialize` impl skips fields loses
//! them, and a payload JSON cannot express is rejected by `set`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// == Entry Type ==
/// Kind of record held by an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// In-progress form snapshot
    Draft,
    /// Finished submission
    Completed,
    /// Reusable named payload
    Template,
}

impl EntryType {
    /// All entry types, in display order.
    pub const ALL: [EntryType; 3] = [EntryType::Draft, EntryType::Completed, EntryType::Template];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Draft => "draft",
            EntryType::Completed => "completed",
            EntryType::Template => "template",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Priority ==
/// Eviction rank of an entry; `High` survives longest.
///
/// Variant order defines the ranking: `Low < Medium < High`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// All priorities, lowest first.
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Entry Metadata ==
/// Optional tags used by queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_route: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
}

impl EntryMetadata {
    pub fn for_patient(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: Some(patient_id.into()),
            ..Self::default()
        }
    }

    pub fn with_form_type(mut self, form_type: impl Into<String>) -> Self {
        self.form_type = Some(form_type.into());
        self
    }

    pub fn with_flow_route(mut self, flow_route: impl Into<String>) -> Self {
        self.flow_route = Some(flow_route.into());
        self
    }

    pub fn with_step(mut self, step: u32) -> Self {
        self.step = Some(step);
        self
    }
}

// == Cache Entry ==
/// Represents a single cache entry with payload and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Key of the entry in the table
    pub id: String,
    /// Last-touched timestamp (Unix milliseconds)
    pub timestamp: i64,
    /// Payload captured at write time
    pub data: Value,
    /// Kind of record
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    #[serde(default)]
    pub priority: Priority,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EntryMetadata>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry touched at `now`, expiring `ttl_ms` later.
    ///
    /// A negative TTL is treated as zero so `expires_at >= timestamp` always holds.
    pub fn new(
        id: impl Into<String>,
        data: Value,
        entry_type: EntryType,
        priority: Priority,
        now: i64,
        ttl_ms: i64,
        metadata: Option<EntryMetadata>,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp: now,
            data,
            entry_type,
            priority,
            expires_at: Some(now.saturating_add(ttl_ms.max(0))),
            metadata,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// An entry is expired once `now` is strictly past `expires_at`; at the
    /// exact instant of expiry it is still readable.
    pub fn is_expired(&self, now: i64) -> bool {
        match self.expires_at {
            Some(expires) => now > expires,
            None => false,
        }
    }

    /// Ranking key used by eviction: higher sorts first.
    pub fn rank(&self) -> (Priority, i64) {
        (self.priority, self.timestamp)
    }

    pub fn patient_id(&self) -> Option<&str> {
        self.metadata.as_ref()?.patient_id.as_deref()
    }

    pub fn form_type(&self) -> Option<&str> {
        self.metadata.as_ref()?.form_type.as_deref()
    }
}
