//! Persisted notification records with read/unread state.
//!
//! The store is the only writer to its persisted key. Every mutation writes
//! the full list through to storage; a persistence failure is logged and the
//! in-memory mutation stands. The unread count is always recomputed from the
//! entries, never tracked out-of-band, so it cannot drift.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::NotificationConfig;
use crate::storage::{self, KeyValueStorage};

/// Persisted key holding the JSON-encoded notification list
pub const NOTIFICATIONS_KEY: &str = "membership_remembered_notifications";

/// A remembered notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    /// RFC 3339 timestamp of when the notification was remembered
    pub timestamp: String,
    pub read: bool,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

/// Input to `remember`: a toast-like candidate. Missing id/timestamp/kind are
/// filled in at insert time.
#[derive(Debug, Clone, Default)]
pub struct NotificationDraft {
    pub id: Option<String>,
    pub timestamp: Option<String>,
    pub kind: Option<String>,
    pub title: Option<String>,
    pub message: Option<String>,
    pub icon: Option<String>,
    pub raw: Option<Value>,
}

/// In-memory + persisted notification list with bounded growth.
pub struct NotificationStore {
    storage: Arc<dyn KeyValueStorage>,
    entries: Mutex<Vec<Notification>>,
    max_stored: usize,
    retention: Duration,
}

impl NotificationStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>, config: &NotificationConfig) -> Self {
        Self {
            storage,
            entries: Mutex::new(Vec::new()),
            max_stored: config.max_stored,
            retention: Duration::days(config.retention_days),
        }
    }

    /// Read the persisted list, discarding entries older than the retention
    /// window. Corrupt or missing storage seeds an empty store; load never
    /// fails.
    pub fn load(&self) {
        let loaded: Vec<Notification> =
            storage::load_json(self.storage.as_ref(), NOTIFICATIONS_KEY).unwrap_or_default();

        let cutoff = Utc::now() - self.retention;
        let before = loaded.len();
        let kept: Vec<Notification> = loaded
            .into_iter()
            .filter(|n| match DateTime::parse_from_rfc3339(&n.timestamp) {
                Ok(ts) => ts.with_timezone(&Utc) > cutoff,
                Err(_) => false,
            })
            .collect();

        if before != kept.len() {
            debug!(evicted = before - kept.len(), "evicted expired notifications");
        }
        *self.entries.lock().unwrap() = kept;
        self.persist();
    }

    /// Insert a notification built from `draft`, newest first. A duplicate id
    /// is a no-op. Returns the stored notification, or `None` on duplicate.
    pub fn remember(&self, draft: NotificationDraft) -> Option<Notification> {
        let notification = Notification {
            id: draft.id.unwrap_or_else(generate_id),
            timestamp: draft.timestamp.unwrap_or_else(|| Utc::now().to_rfc3339()),
            read: false,
            kind: draft.kind.unwrap_or_else(|| "system".to_string()),
            title: draft.title,
            message: draft.message,
            icon: draft.icon,
            raw: draft.raw,
        };

        {
            let mut entries = self.entries.lock().unwrap();
            if entries.iter().any(|n| n.id == notification.id) {
                return None;
            }
            entries.insert(0, notification.clone());
            entries.truncate(self.max_stored);
        }
        self.persist();
        Some(notification)
    }

    /// Flip an entry to read. Idempotent; returns true only on a transition.
    pub fn mark_as_read(&self, id: &str) -> bool {
        let changed = {
            let mut entries = self.entries.lock().unwrap();
            match entries.iter_mut().find(|n| n.id == id && !n.read) {
                Some(entry) => {
                    entry.read = true;
                    true
                }
                None => false,
            }
        };
        if changed {
            self.persist();
        }
        changed
    }

    /// Mark every entry read.
    pub fn mark_all_as_read(&self) {
        {
            let mut entries = self.entries.lock().unwrap();
            for entry in entries.iter_mut() {
                entry.read = true;
            }
        }
        self.persist();
    }

    /// Remove one entry. Returns true if it existed.
    pub fn delete(&self, id: &str) -> bool {
        let removed = {
            let mut entries = self.entries.lock().unwrap();
            let before = entries.len();
            entries.retain(|n| n.id != id);
            entries.len() != before
        };
        if removed {
            self.persist();
        }
        removed
    }

    /// Empty the list and erase the persisted key entirely.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
        if let Err(e) = self.storage.remove(NOTIFICATIONS_KEY) {
            warn!("failed to clear persisted notifications: {e}");
        }
    }

    /// Snapshot of the current list, newest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.entries.lock().unwrap().clone()
    }

    /// Count of unread entries, recomputed from the list.
    pub fn unread_count(&self) -> usize {
        self.entries.lock().unwrap().iter().filter(|n| !n.read).count()
    }

    fn persist(&self) {
        let entries = self.entries.lock().unwrap().clone();
        if let Err(e) = storage::save_json(self.storage.as_ref(), NOTIFICATIONS_KEY, &entries) {
            warn!("failed to persist notifications: {e}");
        }
    }
}

fn generate_id() -> String {
    let suffix: String = (0..9)
        .map(|_| {
            let idx = rand::random::<usize>() % 36;
            char::from_digit(idx as u32, 36).unwrap_or('0')
        })
        .collect();
    format!("notif-{}-{}", Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn store() -> NotificationStore {
        NotificationStore::new(
            Arc::new(MemoryStorage::new()),
            &NotificationConfig::default(),
        )
    }

    #[test]
    fn test_remember_fills_defaults() {
        let store = store();
        let stored = store.remember(NotificationDraft::default()).unwrap();
        assert!(stored.id.starts_with("notif-"));
        assert_eq!(stored.kind, "system");
        assert!(!stored.read);
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_mark_as_read_is_idempotent() {
        let store = store();
        store
            .remember(NotificationDraft {
                id: Some("n1".to_string()),
                ..Default::default()
            })
            .unwrap();

        assert!(store.mark_as_read("n1"));
        assert!(!store.mark_as_read("n1"));
        assert!(!store.mark_as_read("missing"));
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn test_delete_unknown_id_is_noop() {
        let store = store();
        assert!(!store.delete("missing"));
        assert_eq!(store.unread_count(), 0);
    }
}
