//! Human-readable failure descriptions from ComfyUI history entries.

use serde_json::Value;

use crate::history::{message_pair, HistoryEntry};

/// Fallback text when an entry carries no usable error detail.
pub const NO_DIAGNOSTICS: &str = "No detailed error info available";

/// Whether a `[kind, data]` message list contains `kind`.
///
/// Absent or empty lists never match.
pub fn has_status_message(messages: Option<&[Value]>, kind: &str) -> bool {
    messages
        .unwrap_or_default()
        .iter()
        .filter_map(message_pair)
        .any(|(k, _)| k == kind)
}

/// Describe why a prompt failed, from its history entry value.
///
/// Prefers a structured `execution_error` status message, formatted as
/// `Node <id> (<kind>): <ExceptionType>: <message>`; falls back to a
/// top-level `error` field; otherwise returns [`NO_DIAGNOSTICS`].
pub fn extract_diagnostics(payload: &Value) -> String {
    let Some(entry) = HistoryEntry::from_value(payload) else {
        return NO_DIAGNOSTICS.to_string();
    };

    if let Some(err) = entry.execution_error() {
        let node = match err.node_id.as_ref() {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Null) | None => "?".to_string(),
            Some(other) => other.to_string(),
        };
        let location = match err.node_type.as_deref() {
            Some(kind) => format!("Node {node} ({kind})"),
            None => format!("Node {node}"),
        };
        let exception_type = err.exception_type.as_deref().unwrap_or("Error");
        let message = err.exception_message.as_deref().unwrap_or("").trim();
        return format!("{location}: {exception_type}: {message}");
    }

    if let Some(error) = entry.error.as_ref() {
        return match error {
            Value::String(s) => s.clone(),
            Value::Object(obj) => obj
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string()),
            other => other.to_string(),
        };
    }

    NO_DIAGNOSTICS.to_string()
}
