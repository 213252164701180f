//! Minimal JSON hub protocol codec.
//!
//! The hub speaks the SignalR JSON hub protocol over a raw WebSocket: every
//! frame is a JSON document terminated by the `0x1e` record separator, the
//! session opens with a protocol handshake, and application traffic arrives
//! as type-1 invocations of named client methods. Only the message kinds this
//! client actually consumes are modeled; everything else parses as `Other`
//! and is skipped.

use serde_json::{json, Value};

/// Record separator terminating every hub protocol frame
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Hub message types this client handles
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    /// A named client-method invocation carrying application payloads
    Invocation {
        target: String,
        arguments: Vec<Value>,
    },
    /// Keepalive; ignored beyond resetting liveness expectations
    Ping,
    /// Server-initiated close
    Close { error: Option<String> },
    /// Anything else (completions, stream items); skipped
    Other,
}

/// Handshake frame sent immediately after the socket opens
pub fn handshake_request() -> String {
    format!(
        "{}{}",
        json!({ "protocol": "json", "version": 1 }),
        RECORD_SEPARATOR
    )
}

/// Check a handshake response frame; the server replies `{}` on success and
/// `{"error": "..."}` otherwise.
pub fn handshake_error(frame: &str) -> Option<String> {
    let value: Value = serde_json::from_str(frame).ok()?;
    value
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Encode an outbound non-blocking invocation
pub fn encode_invocation(target: &str, arguments: &[Value]) -> String {
    format!(
        "{}{}",
        json!({ "type": 1, "target": target, "arguments": arguments }),
        RECORD_SEPARATOR
    )
}

/// Split a WebSocket text payload into individual hub frames
pub fn split_frames(payload: &str) -> impl Iterator<Item = &str> {
    payload
        .split(RECORD_SEPARATOR)
        .filter(|frame| !frame.is_empty())
}

/// Parse one hub frame. Returns `None` for frames that are not JSON objects.
pub fn parse_message(frame: &str) -> Option<HubMessage> {
    let value: Value = serde_json::from_str(frame).ok()?;
    let kind = value.get("type").and_then(Value::as_i64)?;

    match kind {
        1 => {
            let target = value.get("target").and_then(Value::as_str)?.to_string();
            let arguments = match value.get("arguments") {
                Some(Value::Array(args)) => args.clone(),
                _ => Vec::new(),
            };
            Some(HubMessage::Invocation { target, arguments })
        }
        6 => Some(HubMessage::Ping),
        7 => Some(HubMessage::Close {
            error: value
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string),
        }),
        _ => Some(HubMessage::Other),
    }
}
