//! Integration Tests for the Form Cache
//!
//! Exercises the public surface end to end over a file-backed store, with a
//! manual clock standing in for hours and days of wall time.

use std::time::Duration;

use form_cache::cache::{DraftContext, ManualClock, DRAFT_TTL};
use form_cache::storage::{FileStore, KeyValueStore, MemoryStore};
use form_cache::{
    CacheError, CacheService, CacheStore, Config, EntryMetadata, EntryType, FindCriteria,
    Priority, SetOptions,
};
use serde_json::{json, Value};
use tempfile::TempDir;

// == Helper Functions ==

const START_MS: i64 = 1_700_000_000_000;

fn test_config(dir: &TempDir) -> Config {
    Config {
        data_dir: dir.path().to_path_buf(),
        ..Config::default()
    }
}

fn open_file_cache(config: &Config, clock: &ManualClock) -> CacheStore {
    let storage = FileStore::open(&config.data_dir, config.quota_bytes).unwrap();
    CacheStore::open(storage, clock.clone(), config)
}

// == Draft Scenario ==

#[test]
fn test_autosave_then_recover_within_window() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let clock = ManualClock::new(START_MS);
    let mut cache = open_file_cache(&config, &clock);

    let key = cache
        .auto_save(
            "p1",
            &json!({"name": "Ada", "allergies": ["penicillin"]}),
            3,
            DraftContext {
                form_type: Some("adult".to_string()),
                ..DraftContext::default()
            },
        )
        .unwrap();

    let entry = cache.get_entry(&key).unwrap();
    assert_eq!(entry.entry_type, EntryType::Draft);
    assert_eq!(entry.priority, Priority::High);
    assert_eq!(
        entry.expires_at.unwrap() - entry.timestamp,
        DRAFT_TTL.as_millis() as i64
    );

    let draft = cache.get_latest_draft(Some("p1")).unwrap();
    assert_eq!(draft["formData"]["name"], "Ada");
    assert_eq!(draft["step"], 3);
}

#[test]
fn test_latest_draft_gone_after_two_hours() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let clock = ManualClock::new(START_MS);
    let mut cache = open_file_cache(&config, &clock);

    cache
        .auto_save("p1", &json!({"field": "value"}), 3, DraftContext::default())
        .unwrap();
    clock.advance_secs(2 * 60 * 60 + 1);

    assert_eq!(cache.get_latest_draft(Some("p1")), None);
    // Still physically present: nothing evicted or swept it yet
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get_stats().evictions, 0);
    assert_eq!(cache.cleanup(), 1);
}

#[test]
fn test_latest_draft_other_patient_not_returned() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let clock = ManualClock::new(START_MS);
    let mut cache = open_file_cache(&config, &clock);

    cache
        .auto_save("p2", &json!({"x": 1}), 1, DraftContext::default())
        .unwrap();
    assert_eq!(cache.get_latest_draft(Some("p1")), None);
    assert!(cache.get_latest_draft(None).is_some());
}

// == Templates ==

#[test]
fn test_template_name_normalization_overwrites() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let clock = ManualClock::new(START_MS);
    let mut cache = open_file_cache(&config, &clock);

    cache
        .save_template("Diabetes Plan", "adult", &json!({"version": "T1"}))
        .unwrap();
    cache
        .save_template("diabetes plan", "adult", &json!({"version": "T2"}))
        .unwrap();

    let templates = cache.find(&FindCriteria::new().of_type(EntryType::Template));
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].data, json!({"version": "T2"}));
}

// == Persistence ==

#[test]
fn test_state_survives_restart() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let clock = ManualClock::new(START_MS);

    {
        let mut cache = open_file_cache(&config, &clock);
        cache
            .set(
                "submission_1",
                &json!({"score": 42}),
                SetOptions::of_type(EntryType::Completed)
                    .metadata(EntryMetadata::for_patient("p1").with_form_type("adult")),
            )
            .unwrap();
        cache.save_template("Intake", "adult", &json!({})).unwrap();
    }

    let mut reopened = open_file_cache(&config, &clock);
    assert_eq!(reopened.len(), 2);
    assert_eq!(reopened.get("submission_1"), Some(json!({"score": 42})));
    let completed = reopened.find(
        &FindCriteria::new()
            .of_type(EntryType::Completed)
            .patient("p1")
            .form_type("adult"),
    );
    assert_eq!(completed.len(), 1);
}

#[test]
fn test_restart_sweeps_entries_expired_while_down() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let clock = ManualClock::new(START_MS);

    {
        let mut cache = open_file_cache(&config, &clock);
        cache
            .auto_save("p1", &json!({}), 1, DraftContext::default())
            .unwrap();
        cache.save_template("Intake", "adult", &json!({})).unwrap();
    }

    clock.advance_secs(3 * 60 * 60);
    let reopened = open_file_cache(&config, &clock);
    assert_eq!(reopened.len(), 1);
    assert_eq!(reopened.get_stats().count_of(EntryType::Template), 1);

    // The sweep was written back
    let storage = FileStore::open(&config.data_dir, config.quota_bytes).unwrap();
    let blob = storage.read(&config.storage_key).unwrap().unwrap();
    let pairs: Vec<(String, Value)> = serde_json::from_str(&blob).unwrap();
    assert_eq!(pairs.len(), 1);
}

#[test]
fn test_corrupt_file_recovers_to_empty() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let mut storage = FileStore::open(&config.data_dir, config.quota_bytes).unwrap();
    storage
        .write(&config.storage_key, "[[\"k\", {\"truncated\": ")
        .unwrap();

    let mut cache = CacheStore::open(storage, ManualClock::new(START_MS), &config);
    assert!(cache.is_empty());
    cache.set("k", "fresh", SetOptions::default()).unwrap();
    assert_eq!(cache.get("k"), Some(json!("fresh")));
}

#[test]
fn test_file_quota_exhaustion_keeps_serving_from_memory() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        quota_bytes: 600,
        ..test_config(&dir)
    };
    let clock = ManualClock::new(START_MS);
    let mut cache = open_file_cache(&config, &clock);

    for i in 0..10 {
        cache
            .set(
                format!("note_{}", i),
                &"x".repeat(100),
                SetOptions::of_type(EntryType::Completed),
            )
            .unwrap();
    }

    assert_eq!(cache.len(), 10);
    assert!(cache.is_durable_stale());
    assert_eq!(cache.get("note_9"), Some(json!("x".repeat(100))));

    // The durable copy is the last table that fit
    let reopened = open_file_cache(&config, &clock);
    assert!(reopened.len() < 10);
}

// == Export / Import ==

#[test]
fn test_export_import_across_stores() {
    let clock = ManualClock::new(START_MS);
    let config = Config::default();
    let mut source = CacheStore::open(MemoryStore::unbounded(), clock.clone(), &config);
    source
        .auto_save("p1", &json!({"a": 1}), 1, DraftContext::default())
        .unwrap();
    source.save_template("Plan", "child", &json!([1, 2])).unwrap();

    let backup = source.export_data().unwrap();
    let parsed: Value = serde_json::from_str(&backup).unwrap();
    assert_eq!(parsed["version"], "1.0");
    assert_eq!(parsed["entries"].as_array().unwrap().len(), 2);

    let target_storage = MemoryStore::unbounded();
    let mut target = CacheStore::open(target_storage.clone(), clock.clone(), &config);
    target.set("to_be_replaced", "old", SetOptions::default()).unwrap();
    assert_eq!(target.import_data(&backup).unwrap(), 2);

    assert!(!target.contains_key("to_be_replaced"));
    assert_eq!(target.snapshot().entries, source.snapshot().entries);

    // Import is persisted
    let reopened = CacheStore::open(target_storage, clock, &config);
    assert_eq!(reopened.len(), 2);
}

#[test]
fn test_import_failure_leaves_state_untouched() {
    let config = Config::default();
    let mut cache = CacheStore::open(MemoryStore::unbounded(), ManualClock::new(START_MS), &config);
    cache.set("keep", "me", SetOptions::default()).unwrap();

    let err = cache.import_data(r#"{"version":"1.0","entries":"nope"}"#).unwrap_err();
    assert!(matches!(err, CacheError::Deserialization(_)));
    assert_eq!(cache.len(), 1);
}

// == Service ==

#[tokio::test]
async fn test_service_sweeps_on_interval() {
    let clock = ManualClock::new(START_MS);
    let config = Config {
        cleanup_interval: 1,
        ..Config::default()
    };
    let store = CacheStore::open(MemoryStore::unbounded(), clock.clone(), &config);
    let service = CacheService::with_store(store, &config);

    service
        .cache()
        .write()
        .await
        .set("short", "v", SetOptions::default().ttl(Duration::from_secs(5)))
        .unwrap();
    clock.advance_secs(10);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!service.cache().read().await.contains_key("short"));
    service.shutdown().await;
}
