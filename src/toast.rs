//! Ephemeral, auto-expiring toasts.
//!
//! Toasts live in an in-memory active list and are independent of the
//! notification store until explicitly remembered. Ids are monotonic per
//! session and never reused, so a late timer can never remove a toast that
//! took over an old slot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::notifications::{NotificationDraft, NotificationStore};

/// An active toast.
#[derive(Debug, Clone)]
pub struct Toast {
    pub id: u64,
    /// Category tag used for styling/icon lookup
    pub kind: String,
    pub title: Option<String>,
    pub message: Option<String>,
    pub icon: Option<String>,
    /// Auto-dismiss delay; zero means the user must act
    pub duration_ms: u64,
    pub timestamp: Option<String>,
    pub raw: Option<Value>,
}

/// Input to `show`; unset fields get defaults.
#[derive(Debug, Clone, Default)]
pub struct ToastDraft {
    pub kind: Option<String>,
    pub title: Option<String>,
    pub message: Option<String>,
    pub icon: Option<String>,
    pub duration_ms: Option<u64>,
    pub timestamp: Option<String>,
    pub raw: Option<Value>,
}

struct ToastEntry {
    toast: Toast,
    timer: Option<JoinHandle<()>>,
}

struct ToastState {
    active: Mutex<Vec<ToastEntry>>,
    next_id: AtomicU64,
}

impl ToastState {
    /// Remove a toast and cancel its pending timer. Unknown ids are a no-op.
    fn remove(&self, id: u64) -> Option<Toast> {
        let mut active = self.active.lock().unwrap();
        let index = active.iter().position(|e| e.toast.id == id)?;
        let entry = active.remove(index);
        if let Some(timer) = entry.timer {
            timer.abort();
        }
        Some(entry.toast)
    }
}

/// Manages the active toast list and the bridge into the notification store.
pub struct ToastDispatcher {
    state: Arc<ToastState>,
    notifications: Arc<NotificationStore>,
    default_duration_ms: u64,
}

impl ToastDispatcher {
    pub fn new(notifications: Arc<NotificationStore>, default_duration_ms: u64) -> Self {
        Self {
            state: Arc::new(ToastState {
                active: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
            notifications,
            default_duration_ms,
        }
    }

    /// Show a toast; returns its session-unique id. Schedules auto-dismiss
    /// when the effective duration is positive.
    pub fn show(&self, draft: ToastDraft) -> u64 {
        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
        let toast = Toast {
            id,
            kind: draft.kind.unwrap_or_else(|| "info".to_string()),
            title: draft.title,
            message: draft.message,
            icon: draft.icon,
            duration_ms: draft.duration_ms.unwrap_or(self.default_duration_ms),
            timestamp: draft
                .timestamp
                .or_else(|| Some(chrono::Utc::now().to_rfc3339())),
            raw: draft.raw,
        };
        let duration_ms = toast.duration_ms;

        self.state
            .active
            .lock()
            .unwrap()
            .push(ToastEntry { toast, timer: None });

        if duration_ms > 0 {
            let weak: Weak<ToastState> = Arc::downgrade(&self.state);
            let timer = tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(duration_ms)).await;
                if let Some(state) = weak.upgrade() {
                    state.remove(id);
                }
            });

            // Arm the timer on the entry so dismiss/remember can cancel it.
            let mut active = self.state.active.lock().unwrap();
            match active.iter_mut().find(|e| e.toast.id == id) {
                Some(entry) => entry.timer = Some(timer),
                // Dismissed between insert and arm; stand the timer down.
                None => timer.abort(),
            }
        }

        id
    }

    /// Remove a toast unconditionally. Unknown ids are a silent no-op.
    pub fn dismiss(&self, id: u64) {
        if self.state.remove(id).is_some() {
            debug!(toast = id, "toast dismissed");
        }
    }

    /// Promote a toast into the notification store, then dismiss it. This is
    /// the sole bridge from ephemeral to persisted state. Returns false for
    /// unknown ids.
    pub fn remember(&self, id: u64) -> bool {
        let Some(toast) = self.state.remove(id) else {
            return false;
        };
        self.notifications.remember(NotificationDraft {
            id: Some(format!("toast-{}", toast.id)),
            timestamp: toast.timestamp,
            kind: Some(toast.kind),
            title: toast.title,
            message: toast.message,
            icon: toast.icon,
            raw: toast.raw,
        });
        true
    }

    /// Snapshot of the active toasts, oldest first.
    pub fn active(&self) -> Vec<Toast> {
        self.state
            .active
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.toast.clone())
            .collect()
    }
}
