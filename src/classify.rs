//! Routing from normalized messages to user-facing toast content.
//!
//! Mirrors the portal's notification surface: the type name of the primary
//! action picks a category, and the first payload value supplies whatever
//! detail text it carries. Unknown types fall back to a generic system
//! notification. All toasts produced here are sticky (duration 0); the user
//! decides whether to remember or dismiss them.

use serde_json::Value;

use crate::gateway::NormalizedMessage;
use crate::toast::ToastDraft;

/// Notification category tags, used for styling/icon lookup downstream.
pub mod notification_types {
    pub const BUDDY_REQUEST: &str = "buddy_request";
    pub const BUDDY_ACCEPTED: &str = "buddy_accepted";
    pub const TOKEN_TRANSFER: &str = "token_transfer";
    pub const TOKEN_RECEIVED: &str = "token_received";
    pub const MESSAGE: &str = "message";
    pub const SYSTEM: &str = "system";
    pub const CALL_INCOMING: &str = "call_incoming";
    pub const CHAT_REQUEST: &str = "chat_request";
}

/// Build a sticky toast draft for a message, or `None` when the message
/// carries no action metadata to route on.
pub fn toast_for_message(message: &NormalizedMessage) -> Option<ToastDraft> {
    let action = message.action.as_ref()?;
    let type_name = action
        .value_type_name
        .as_deref()
        .unwrap_or("")
        .to_lowercase();
    let value = message.values.first();

    let (kind, title, body, icon) = if type_name.contains("buddy") || type_name.contains("friend") {
        if type_name.contains("request") {
            (
                notification_types::BUDDY_REQUEST,
                "Buddy Request".to_string(),
                value_field(value, "name")
                    .map(|name| format!("{name} wants to connect"))
                    .unwrap_or_else(|| "New buddy request".to_string()),
                "user-plus",
            )
        } else if type_name.contains("accept") {
            (
                notification_types::BUDDY_ACCEPTED,
                "Buddy Connected".to_string(),
                value_field(value, "name")
                    .map(|name| format!("{name} accepted your request"))
                    .unwrap_or_else(|| "Connection accepted".to_string()),
                "users",
            )
        } else {
            system_fallback(action, value)
        }
    } else if type_name.contains("token") || type_name.contains("transfer") {
        (
            notification_types::TOKEN_TRANSFER,
            "Token Update".to_string(),
            value_field(value, "message")
                .unwrap_or_else(|| "Token activity on your wallet".to_string()),
            "ticket",
        )
    } else if type_name.contains("call") {
        (
            notification_types::CALL_INCOMING,
            "Incoming Call".to_string(),
            value_field(value, "callerName")
                .map(|name| format!("{name} is calling"))
                .unwrap_or_else(|| "Incoming call".to_string()),
            "phone",
        )
    } else if type_name.contains("chat") || type_name.contains("message") {
        (
            notification_types::MESSAGE,
            "New Message".to_string(),
            value_field(value, "preview").unwrap_or_else(|| "You have a new message".to_string()),
            "message-circle",
        )
    } else {
        system_fallback(action, value)
    };

    Some(ToastDraft {
        kind: Some(kind.to_string()),
        title: Some(title),
        message: Some(body),
        icon: Some(icon.to_string()),
        // Sticky; the user must act.
        duration_ms: Some(0),
        timestamp: None,
        raw: Some(message.raw.clone()),
    })
}

fn system_fallback(
    action: &crate::gateway::ActionMetadata,
    value: Option<&Value>,
) -> (&'static str, String, String, &'static str) {
    (
        notification_types::SYSTEM,
        action
            .message
            .clone()
            .unwrap_or_else(|| "Notification".to_string()),
        value_field(value, "message").unwrap_or_else(|| "New update available".to_string()),
        "bell",
    )
}

fn value_field(value: Option<&Value>, key: &str) -> Option<String> {
    value?
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
}
