//! Typed views over ComfyUI `/history` entries.
//!
//! A history response has the shape `{prompt_id: entry}` where each entry
//! carries `outputs` (node id to produced files), a `status` block with
//! `[kind, data]` message pairs, and occasionally a top-level `error`.
//! Parsing is lenient: unknown or malformed pieces are ignored rather than
//! failing the whole entry.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Status message emitted when a prompt finished without error.
pub const EXECUTION_SUCCESS: &str = "execution_success";

/// Status message emitted when a node raised.
pub const EXECUTION_ERROR: &str = "execution_error";

/// A produced file as addressed by ComfyUI's `/view` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default = "default_folder_type")]
    pub folder_type: String,
}

fn default_folder_type() -> String {
    "output".to_string()
}

/// `status` block of a history entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryStatus {
    #[serde(default)]
    pub status_str: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
    /// Raw `[kind, data]` pairs.
    #[serde(default)]
    pub messages: Vec<Value>,
}

/// Payload of an `execution_error` status message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionErrorData {
    #[serde(default)]
    pub node_id: Option<Value>,
    #[serde(default)]
    pub node_type: Option<String>,
    #[serde(default)]
    pub exception_type: Option<String>,
    #[serde(default)]
    pub exception_message: Option<String>,
}

/// One prompt's history record.
#[derive(Debug, Clone, Default)]
pub struct HistoryEntry {
    pub outputs: Map<String, Value>,
    pub status: Option<HistoryStatus>,
    pub error: Option<Value>,
}

impl HistoryEntry {
    /// Interpret a single entry value. Returns `None` for non-objects.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            outputs: obj
                .get("outputs")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            status: obj
                .get("status")
                .and_then(|s| serde_json::from_value(s.clone()).ok()),
            error: obj.get("error").filter(|e| !e.is_null()).cloned(),
        })
    }

    pub fn messages(&self) -> &[Value] {
        self.status
            .as_ref()
            .map(|s| s.messages.as_slice())
            .unwrap_or_default()
    }

    pub fn status_str(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.status_str.as_deref())
    }

    pub fn has_outputs(&self) -> bool {
        self.outputs.values().any(|node| match node {
            Value::Object(map) => !map.is_empty(),
            _ => false,
        })
    }

    /// Whether the entry records a failed run: an `execution_error`
    /// message, a `status_str` of `error`, or a top-level `error`.
    pub fn is_failed(&self) -> bool {
        self.messages()
            .iter()
            .filter_map(message_pair)
            .any(|(kind, _)| kind == EXECUTION_ERROR)
            || self.status_str() == Some("error")
            || self.error.is_some()
    }

    /// First `execution_error` payload, if any.
    pub fn execution_error(&self) -> Option<ExecutionErrorData> {
        self.messages()
            .iter()
            .filter_map(message_pair)
            .find(|(kind, _)| *kind == EXECUTION_ERROR)
            .map(|(_, data)| serde_json::from_value(data.clone()).unwrap_or_default())
    }
}

static NULL: Value = Value::Null;

/// Split a `[kind, data]` message into its parts.
pub fn message_pair(message: &Value) -> Option<(&str, &Value)> {
    let pair = message.as_array()?;
    let kind = pair.first()?.as_str()?;
    Some((kind, pair.get(1).unwrap_or(&NULL)))
}

/// Pick the primary output file from history `outputs`.
///
/// Preference keys are tried in order across every node; when none
/// matches, any key whose value carries file objects is accepted.
pub fn select_output(outputs: &Map<String, Value>, preferences: &[String]) -> Option<OutputFile> {
    let files_under = |key: &str| {
        outputs
            .values()
            .filter_map(|node| node.get(key))
            .find_map(first_file)
    };

    preferences
        .iter()
        .find_map(|key| files_under(key.as_str()))
        .or_else(|| {
            outputs
                .values()
                .filter_map(Value::as_object)
                .flat_map(|node| node.values())
                .find_map(first_file)
        })
}

fn first_file(value: &Value) -> Option<OutputFile> {
    value
        .as_array()?
        .iter()
        .filter(|item| item.get("filename").and_then(Value::as_str).is_some())
        .find_map(|item| serde_json::from_value(item.clone()).ok())
}
