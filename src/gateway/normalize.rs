//! Normalization of heterogeneous inbound payloads.
//!
//! The one-shot membership API wraps its payload one level deep under
//! `dataPayload`; hub pushes put the same fields at the top level, and either
//! source may send `action`/`value` as a bare object instead of a list.
//! Everything funnels through `normalize`, which is total: for any non-null
//! input it produces a well-formed record with empty lists in place of
//! missing fields, and it never panics on unexpected shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Provenance tag for a normalized message, kept for audit/debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    /// Pushed over the persistent hub connection
    Hub,
    /// Returned by a one-shot API fetch
    Api,
    /// Injected directly by application code
    Manual,
}

impl MessageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageSource::Hub => "hub",
            MessageSource::Api => "api",
            MessageSource::Manual => "manual",
        }
    }
}

impl std::fmt::Display for MessageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action metadata attached to a message. All fields are optional; unknown or
/// wrongly-typed fields are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionMetadata {
    pub groupname: Option<String>,
    pub procedure: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "valueType")]
    pub value_type: Option<String>,
    #[serde(rename = "valueTypeName")]
    pub value_type_name: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "IsWallet")]
    pub is_wallet: Option<bool>,
}

impl ActionMetadata {
    /// Extract metadata from an arbitrary JSON value, tolerating anything.
    /// Numeric type codes are accepted and stringified.
    fn from_value(value: &Value) -> Self {
        Self {
            groupname: string_field(value, "groupname"),
            procedure: string_field(value, "procedure"),
            status: string_field(value, "status"),
            value_type: string_field(value, "valueType"),
            value_type_name: string_field(value, "valueTypeName"),
            message: string_field(value, "message"),
            is_wallet: value.get("IsWallet").and_then(Value::as_bool),
        }
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// The canonical record every raw inbound payload is converted into.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedMessage {
    /// First element of `action_list`, or `None` when that list is empty
    pub action: Option<ActionMetadata>,
    /// Full ordered action-metadata list (insertion order = source order)
    pub action_list: Vec<ActionMetadata>,
    /// Payload values; always a list, singular inputs wrapped
    pub values: Vec<Value>,
    /// Opaque status echo from the envelope, when present
    pub status_response: Option<Value>,
    /// Where this message came from
    pub source: MessageSource,
    /// The original untouched input, for rules needing unpromoted fields
    pub raw: Value,
}

impl NormalizedMessage {
    /// Case-folded type name of the primary action, if any
    pub fn type_name(&self) -> Option<String> {
        self.action
            .as_ref()
            .and_then(|a| a.value_type_name.as_deref())
            .map(str::to_lowercase)
    }
}

/// Convert an arbitrarily-shaped inbound payload into the canonical record.
///
/// Returns `None` only for `Value::Null`; any other input yields a record.
pub fn normalize(raw: &Value, source: MessageSource) -> Option<NormalizedMessage> {
    if raw.is_null() {
        return None;
    }

    // API responses nest the payload one level down; the nested form takes
    // precedence when present.
    let payload = match raw.get("dataPayload") {
        Some(inner) if !inner.is_null() => inner,
        _ => raw,
    };

    let action_list = coerce_list(field(payload, raw, "action"))
        .iter()
        .map(|v| ActionMetadata::from_value(v))
        .collect::<Vec<_>>();
    let action = action_list.first().cloned();

    let values = coerce_list(field(payload, raw, "value"));

    let status_response = match raw.get("statusResponse") {
        Some(v) if !v.is_null() => Some(v.clone()),
        _ => None,
    };

    Some(NormalizedMessage {
        action,
        action_list,
        values,
        status_response,
        source,
        raw: raw.clone(),
    })
}

/// Look up a field on the payload, falling back to the outer envelope.
fn field<'a>(payload: &'a Value, raw: &'a Value, key: &str) -> Option<&'a Value> {
    match payload.get(key) {
        Some(v) if !v.is_null() => Some(v),
        _ => match raw.get(key) {
            Some(v) if !v.is_null() => Some(v),
            _ => None,
        },
    }
}

/// Wrap a bare scalar/object into a one-element list; pass lists through.
fn coerce_list(value: Option<&Value>) -> Vec<Value> {
    match value {
        None => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(single) => vec![single.clone()],
    }
}
