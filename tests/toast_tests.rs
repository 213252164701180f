//! Integration tests for the toast dispatcher and its notification bridge.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use hublink::config::NotificationConfig;
use hublink::notifications::NotificationStore;
use hublink::storage::MemoryStorage;
use hublink::toast::{ToastDispatcher, ToastDraft};

fn dispatcher(default_duration_ms: u64) -> (ToastDispatcher, Arc<NotificationStore>) {
    let notifications = Arc::new(NotificationStore::new(
        Arc::new(MemoryStorage::new()),
        &NotificationConfig::default(),
    ));
    (
        ToastDispatcher::new(Arc::clone(&notifications), default_duration_ms),
        notifications,
    )
}

#[tokio::test]
async fn test_show_applies_defaults() {
    let (toasts, _notifications) = dispatcher(4000);

    let id = toasts.show(ToastDraft {
        title: Some("Hello".to_string()),
        ..Default::default()
    });

    let active = toasts.active();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, id);
    assert_eq!(active[0].kind, "info");
    assert_eq!(active[0].duration_ms, 4000);
    assert!(active[0].timestamp.is_some());
}

#[tokio::test]
async fn test_ids_are_unique_within_a_session() {
    let (toasts, _notifications) = dispatcher(0);

    let a = toasts.show(ToastDraft::default());
    let b = toasts.show(ToastDraft::default());
    assert_ne!(a, b);
    assert_eq!(toasts.active().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_positive_duration_auto_dismisses() {
    let (toasts, _notifications) = dispatcher(4000);

    toasts.show(ToastDraft {
        duration_ms: Some(100),
        ..Default::default()
    });
    assert_eq!(toasts.active().len(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(toasts.active().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_zero_duration_is_sticky() {
    let (toasts, _notifications) = dispatcher(4000);

    let id = toasts.show(ToastDraft {
        duration_ms: Some(0),
        ..Default::default()
    });

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(toasts.active().len(), 1);

    toasts.dismiss(id);
    assert!(toasts.active().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dismiss_cancels_the_pending_timer() {
    let (toasts, _notifications) = dispatcher(4000);

    let id = toasts.show(ToastDraft {
        duration_ms: Some(5000),
        ..Default::default()
    });
    toasts.dismiss(id);
    assert!(toasts.active().is_empty());

    // The aborted timer must not resurrect or remove anything later.
    let other = toasts.show(ToastDraft {
        duration_ms: Some(0),
        ..Default::default()
    });
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(toasts.active().len(), 1);
    assert_eq!(toasts.active()[0].id, other);
}

#[tokio::test]
async fn test_dismiss_unknown_id_is_a_noop() {
    let (toasts, _notifications) = dispatcher(0);
    toasts.dismiss(12345);
    assert!(toasts.active().is_empty());
}

#[tokio::test]
async fn test_remember_promotes_into_the_store() {
    let (toasts, notifications) = dispatcher(0);

    let id = toasts.show(ToastDraft {
        kind: Some("buddy_request".to_string()),
        title: Some("Buddy Request".to_string()),
        message: Some("Sam wants to connect".to_string()),
        icon: Some("user-plus".to_string()),
        raw: Some(json!({ "name": "Sam" })),
        ..Default::default()
    });

    assert!(toasts.remember(id));
    assert!(toasts.active().is_empty());

    let stored = notifications.notifications();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, format!("toast-{id}"));
    assert_eq!(stored[0].kind, "buddy_request");
    assert_eq!(stored[0].message.as_deref(), Some("Sam wants to connect"));
    assert!(!stored[0].read);
    assert_eq!(notifications.unread_count(), 1);
}

#[tokio::test]
async fn test_remember_unknown_or_repeated_id_returns_false() {
    let (toasts, notifications) = dispatcher(0);

    assert!(!toasts.remember(999));

    let id = toasts.show(ToastDraft::default());
    assert!(toasts.remember(id));
    // The toast is gone after the first remember.
    assert!(!toasts.remember(id));
    assert_eq!(notifications.notifications().len(), 1);
}
