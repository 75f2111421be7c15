//! Draft and Template Helpers
//!
//! Form-flow conveniences built only on the public `CacheStore` surface:
//! autosaving drafts, recovering the latest one, and named templates.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::query::FindCriteria;
use crate::cache::store::{duration_ms, SetOptions};
use crate::cache::{CacheEntry, CacheStore, EntryMetadata, EntryType, Priority};
use crate::error::Result;

/// Lifetime of an autosaved draft.
pub const DRAFT_TTL: Duration = Duration::from_secs(2 * 60 * 60);
/// How far back `get_latest_draft` looks.
pub const DRAFT_RECOVERY_WINDOW: Duration = Duration::from_secs(2 * 60 * 60);
/// Lifetime of a saved template.
pub const TEMPLATE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

const AUTOSAVE_PREFIX: &str = "autosave";
const TEMPLATE_PREFIX: &str = "template";

// == Draft Context ==
/// Form context recorded alongside an autosave.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftContext {
    pub form_type: Option<String>,
    pub flow_route: Option<String>,
    /// Completion percentage shown by the form, if it tracks one
    pub progress: Option<u8>,
}

// == Draft Payload ==
/// Payload stored by `auto_save`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftPayload<T = Value> {
    pub form_data: T,
    pub step: u32,
    pub progress: Option<u8>,
    /// Unix milliseconds at save time
    pub last_modified: i64,
}

/// Case-folds `name` and joins its words with underscores.
pub fn normalize_template_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// Key under which a template for `form_type` named `name` is stored.
///
/// The form type is escaped so the `:` separator only ever appears between
/// fields; distinct `(form_type, normalized name)` pairs never share a key.
pub fn template_key(name: &str, form_type: &str) -> String {
    format!(
        "{}:{}:{}",
        TEMPLATE_PREFIX,
        escape_key_field(form_type),
        normalize_template_name(name)
    )
}

fn escape_key_field(field: &str) -> String {
    field.replace('%', "%25").replace(':', "%3A")
}

impl CacheStore {
    // == Auto Save ==
    /// Saves a new draft snapshot for `patient_id`; earlier autosaves are kept.
    ///
    /// Drafts are high priority and live for two hours. Returns the new key.
    pub fn auto_save<T>(
        &mut self,
        patient_id: &str,
        form_data: &T,
        step: u32,
        context: DraftContext,
    ) -> Result<String>
    where
        T: Serialize + ?Sized,
    {
        let now = self.now_ms();
        let base = format!("{}_{}_{}", AUTOSAVE_PREFIX, patient_id, now);
        let mut key = base.clone();
        let mut suffix = 1;
        while self.contains_key(&key) {
            key = format!("{}_{}", base, suffix);
            suffix += 1;
        }

        let payload = DraftPayload {
            form_data,
            step,
            progress: context.progress,
            last_modified: now,
        };
        let metadata = EntryMetadata {
            patient_id: Some(patient_id.to_string()),
            form_type: context.form_type,
            flow_route: context.flow_route,
            step: Some(step),
        };
        self.set(
            key.clone(),
            &payload,
            SetOptions::of_type(EntryType::Draft)
                .priority(Priority::High)
                .ttl(DRAFT_TTL)
                .metadata(metadata),
        )?;
        Ok(key)
    }

    // == Latest Draft ==
    /// Returns the payload of the most recent draft touched within the
    /// recovery window, optionally restricted to one patient.
    pub fn get_latest_draft(&self, patient_id: Option<&str>) -> Option<Value> {
        let mut criteria = FindCriteria::new()
            .of_type(EntryType::Draft)
            .since(self.now_ms() - duration_ms(DRAFT_RECOVERY_WINDOW));
        if let Some(patient_id) = patient_id {
            criteria = criteria.patient(patient_id);
        }
        self.find(&criteria)
            .first()
            .map(|entry| entry.data.clone())
    }

    // == Templates ==
    /// Saves `template` under a key derived from `form_type` and the
    /// normalized `name`, replacing any template already stored there.
    pub fn save_template<T>(&mut self, name: &str, form_type: &str, template: &T) -> Result<String>
    where
        T: Serialize + ?Sized,
    {
        let key = template_key(name, form_type);
        self.set(
            key.clone(),
            template,
            SetOptions::of_type(EntryType::Template)
                .priority(Priority::Medium)
                .ttl(TEMPLATE_TTL)
                .metadata(EntryMetadata {
                    form_type: Some(form_type.to_string()),
                    ..EntryMetadata::default()
                }),
        )?;
        Ok(key)
    }

    /// Fetches one template by name and form type.
    pub fn get_template(&mut self, name: &str, form_type: &str) -> Option<Value> {
        self.get(&template_key(name, form_type))
    }

    /// Lists live templates for `form_type`, most recently touched first.
    pub fn get_templates(&self, form_type: &str) -> Vec<&CacheEntry> {
        self.find(
            &FindCriteria::new()
                .of_type(EntryType::Template)
                .form_type(form_type),
        )
    }
}
