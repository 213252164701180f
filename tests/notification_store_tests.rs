//! Integration tests for the persisted notification store.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use hublink::config::NotificationConfig;
use hublink::notifications::{NotificationDraft, NotificationStore, NOTIFICATIONS_KEY};
use hublink::storage::{KeyValueStorage, MemoryStorage};

fn store_with(
    storage: Arc<dyn KeyValueStorage>,
    config: NotificationConfig,
) -> NotificationStore {
    NotificationStore::new(storage, &config)
}

fn draft(id: &str) -> NotificationDraft {
    NotificationDraft {
        id: Some(id.to_string()),
        ..Default::default()
    }
}

#[test]
fn test_unread_count_tracks_mutations() {
    let store = store_with(Arc::new(MemoryStorage::new()), NotificationConfig::default());

    store.remember(draft("a")).unwrap();
    store.remember(draft("b")).unwrap();
    store.remember(draft("c")).unwrap();
    assert_eq!(store.unread_count(), 3);

    store.mark_as_read("b");
    assert_eq!(store.unread_count(), 2);

    store.delete("a");
    assert_eq!(store.unread_count(), 1);

    store.mark_all_as_read();
    assert_eq!(store.unread_count(), 0);
    assert_eq!(store.notifications().len(), 2);
}

#[test]
fn test_duplicate_ids_are_rejected() {
    let store = store_with(Arc::new(MemoryStorage::new()), NotificationConfig::default());

    assert!(store.remember(draft("dup")).is_some());
    assert!(store.remember(draft("dup")).is_none());
    assert_eq!(store.notifications().len(), 1);
    assert_eq!(store.unread_count(), 1);
}

#[test]
fn test_overflow_drops_oldest() {
    let store = store_with(
        Arc::new(MemoryStorage::new()),
        NotificationConfig {
            max_stored: 5,
            retention_days: 7,
        },
    );

    for i in 0..7 {
        store.remember(draft(&format!("n{i}")));
    }

    let entries = store.notifications();
    assert_eq!(entries.len(), 5);
    // Newest first; the two oldest are gone.
    assert_eq!(entries[0].id, "n6");
    assert_eq!(entries[4].id, "n2");
}

#[test]
fn test_load_evicts_expired_entries() {
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
    let recent = (Utc::now() - Duration::days(6)).to_rfc3339();
    let stale = (Utc::now() - Duration::days(8)).to_rfc3339();
    let seeded = json!([
        { "id": "recent", "timestamp": recent, "read": false, "type": "system" },
        { "id": "stale", "timestamp": stale, "read": false, "type": "system" },
        { "id": "broken", "timestamp": "not-a-date", "read": false, "type": "system" },
    ]);
    storage.set(NOTIFICATIONS_KEY, &seeded.to_string()).unwrap();

    let store = store_with(Arc::clone(&storage), NotificationConfig::default());
    store.load();

    let entries = store.notifications();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, "recent");

    // Eviction is persisted immediately.
    let raw = storage.get(NOTIFICATIONS_KEY).unwrap().unwrap();
    assert!(raw.contains("recent"));
    assert!(!raw.contains("stale"));
}

#[test]
fn test_load_with_corrupt_storage_starts_empty() {
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
    storage.set(NOTIFICATIONS_KEY, "{definitely not json").unwrap();

    let store = store_with(Arc::clone(&storage), NotificationConfig::default());
    store.load();
    assert!(store.notifications().is_empty());
}

#[test]
fn test_mutations_write_through_to_storage() {
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());

    let store = store_with(Arc::clone(&storage), NotificationConfig::default());
    store.remember(draft("persisted")).unwrap();
    store.mark_as_read("persisted");

    // A fresh store over the same storage sees the mutated state.
    let reloaded = store_with(Arc::clone(&storage), NotificationConfig::default());
    reloaded.load();
    let entries = reloaded.notifications();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, "persisted");
    assert!(entries[0].read);
    assert_eq!(reloaded.unread_count(), 0);
}

#[test]
fn test_clear_erases_the_persisted_key() {
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
    let store = store_with(Arc::clone(&storage), NotificationConfig::default());

    store.remember(draft("a")).unwrap();
    assert!(storage.get(NOTIFICATIONS_KEY).unwrap().is_some());

    store.clear();
    assert!(store.notifications().is_empty());
    // Key removed outright, not rewritten as an empty list.
    assert!(storage.get(NOTIFICATIONS_KEY).unwrap().is_none());
}
