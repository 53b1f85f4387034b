//! ComfyUI workflow templates: graph model, placeholder discovery and
//! output classification.
//!
//! A template is a ComfyUI API-format graph in which some input values are
//! placeholder tokens (`PARAM_PROMPT`, `PARAM_INT_STEPS`, ...). Each distinct
//! placeholder name becomes a [`ToolParameter`]; the set of parameters plus
//! the output classification form the template's [`ToolDefinition`].

use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::defaults::builtin_default;
use crate::error::CoreError;
use crate::types::JsonMap;

// ---------------------------------------------------------------------------
// Placeholder tokens
// ---------------------------------------------------------------------------

/// Prefix shared by every placeholder token.
pub const PLACEHOLDER_PREFIX: &str = "PARAM_";

/// Typed placeholder infixes, checked after [`PLACEHOLDER_PREFIX`].
const TYPED_PREFIXES: &[(&str, ParamType)] = &[
    ("STR_", ParamType::String),
    ("INT_", ParamType::Int),
    ("FLOAT_", ParamType::Float),
    ("BOOL_", ParamType::Bool),
];

/// Name of the parameter that triggers checkpoint validation.
pub const MODEL_PARAMETER: &str = "model";

/// Name of the parameter that is generated randomly when not supplied.
pub const SEED_PARAMETER: &str = "seed";

// ---------------------------------------------------------------------------
// Output classification
// ---------------------------------------------------------------------------

/// History output keys searched (in order) for image workflows.
pub const IMAGE_OUTPUT_KEYS: &[&str] = &["images", "image", "gifs", "gif"];

/// History output keys searched (in order) for audio workflows.
pub const AUDIO_OUTPUT_KEYS: &[&str] = &["audio", "audios", "sound", "files"];

/// History output keys searched (in order) for video workflows.
pub const VIDEO_OUTPUT_KEYS: &[&str] = &["videos", "video", "mp4", "mov", "webm"];

/// Terminal node kinds that produce audio.
const AUDIO_OUTPUT_NODES: &[&str] = &[
    "SaveAudio",
    "SaveAudioMP3",
    "SaveAudioOpus",
    "PreviewAudio",
];

/// Terminal node kinds that produce video.
const VIDEO_OUTPUT_NODES: &[&str] = &["SaveVideo", "SaveWEBM", "CreateVideo", "VHS_VideoCombine"];

/// Generation domain of a workflow. Used both as the output kind and as the
/// namespace that selects applicable defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
}

impl MediaKind {
    pub const ALL: [MediaKind; 3] = [MediaKind::Image, MediaKind::Audio, MediaKind::Video];

    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }

    /// History output keys to search for this kind's primary artifact.
    pub fn output_keys(self) -> &'static [&'static str] {
        match self {
            MediaKind::Image => IMAGE_OUTPUT_KEYS,
            MediaKind::Audio => AUDIO_OUTPUT_KEYS,
            MediaKind::Video => VIDEO_OUTPUT_KEYS,
        }
    }

    /// Guess the kind from a workflow identifier alone.
    ///
    /// Returns `None` when the name carries no hint.
    pub fn guess_from_id(workflow_id: &str) -> Option<MediaKind> {
        let id = workflow_id.to_lowercase();
        if ["song", "audio", "music", "sfx"].iter().any(|h| id.contains(h)) {
            Some(MediaKind::Audio)
        } else if id.contains("video") {
            Some(MediaKind::Video)
        } else if id.contains("image") {
            Some(MediaKind::Image)
        } else {
            None
        }
    }

    /// Parse a namespace name (`image`, `audio`, `video`).
    pub fn parse(value: &str) -> Option<MediaKind> {
        match value.trim().to_lowercase().as_str() {
            "image" => Some(MediaKind::Image),
            "audio" => Some(MediaKind::Audio),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Graph model
// ---------------------------------------------------------------------------

/// A single node of a ComfyUI API-format graph.
///
/// Unknown keys (for example `_meta`) are preserved so a rendered graph
/// round-trips everything the template author wrote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// ComfyUI class type (e.g. "KSampler", "CLIPTextEncode").
    pub class_type: String,
    /// Literal values and `[node_id, slot]` links keyed by input name.
    #[serde(default)]
    pub inputs: JsonMap,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// A full node graph keyed by node id.
pub type WorkflowGraph = BTreeMap<String, WorkflowNode>;

/// Parse a ComfyUI workflow JSON object into a typed graph.
///
/// The expected format is an object where each key is a node ID and each
/// value is an object with `class_type` and `inputs` fields:
///
/// ```json
/// {
///   "3": {
///     "class_type": "KSampler",
///     "inputs": { "seed": "PARAM_INT_SEED", "cfg": 7.5 }
///   }
/// }
/// ```
pub fn parse_workflow(json: &serde_json::Value) -> Result<WorkflowGraph, CoreError> {
    let obj = json
        .as_object()
        .ok_or_else(|| CoreError::Validation("Workflow JSON must be an object".to_string()))?;

    if obj.is_empty() {
        return Err(CoreError::Validation(
            "Workflow JSON must contain at least one node".to_string(),
        ));
    }

    let mut graph = WorkflowGraph::new();
    for (node_id, node_value) in obj {
        if node_value.get("class_type").and_then(|v| v.as_str()).is_none() {
            return Err(CoreError::Validation(format!(
                "Node '{node_id}' is missing required 'class_type' field"
            )));
        }
        let node: WorkflowNode = serde_json::from_value(node_value.clone()).map_err(|e| {
            CoreError::Validation(format!("Node '{node_id}' is malformed: {e}"))
        })?;
        graph.insert(node_id.clone(), node);
    }

    Ok(graph)
}

/// Iterate every `(node_id, input_name, value)` triple in the graph.
pub fn iter_inputs(
    graph: &WorkflowGraph,
) -> impl Iterator<Item = (&str, &str, &serde_json::Value)> {
    graph.iter().flat_map(|(node_id, node)| {
        node.inputs
            .iter()
            .map(move |(name, value)| (node_id.as_str(), name.as_str(), value))
    })
}

/// Replace every input whose value is exactly `token` with `value`.
///
/// Returns the number of inputs replaced.
pub fn replace_token(graph: &mut WorkflowGraph, token: &str, value: &serde_json::Value) -> usize {
    let mut replaced = 0;
    for node in graph.values_mut() {
        for input in node.inputs.values_mut() {
            if input.as_str() == Some(token) {
                *input = value.clone();
                replaced += 1;
            }
        }
    }
    replaced
}

/// Whether any input value in the graph is exactly `token`.
pub fn contains_token(graph: &WorkflowGraph, token: &str) -> bool {
    iter_inputs(graph).any(|(_, _, value)| value.as_str() == Some(token))
}

/// All placeholder tokens still present in the graph.
pub fn remaining_placeholders(graph: &WorkflowGraph) -> Vec<String> {
    let mut tokens: Vec<String> = iter_inputs(graph)
        .filter_map(|(_, _, value)| value.as_str())
        .filter(|s| parse_placeholder(s).is_some())
        .map(str::to_string)
        .collect();
    tokens.sort();
    tokens.dedup();
    tokens
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Declared scalar type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Int,
    Float,
    Bool,
}

/// A placeholder token decoded into its parameter name and type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Lowercased parameter name.
    pub name: String,
    pub param_type: ParamType,
    /// `true` when the token carried an explicit type infix.
    pub typed: bool,
}

/// Decode a placeholder token.
///
/// `PARAM_PROMPT` yields a string parameter `prompt`; `PARAM_INT_STEPS`
/// yields an int parameter `steps`. Returns `None` for anything that is not
/// a well-formed token.
pub fn parse_placeholder(token: &str) -> Option<Placeholder> {
    let rest = token.strip_prefix(PLACEHOLDER_PREFIX)?;

    let (name, param_type, typed) = TYPED_PREFIXES
        .iter()
        .find_map(|(infix, ty)| {
            rest.strip_prefix(infix)
                .filter(|name| !name.is_empty())
                .map(|name| (name, *ty, true))
        })
        .unwrap_or((rest, ParamType::String, false));

    let well_formed = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    if !well_formed {
        return None;
    }

    Some(Placeholder {
        name: name.to_lowercase(),
        param_type,
        typed,
    })
}

/// Every token spelling that refers to parameter `name`, untyped first.
pub fn placeholder_tokens(name: &str) -> Vec<String> {
    let upper = name.to_uppercase();
    std::iter::once(format!("{PLACEHOLDER_PREFIX}{upper}"))
        .chain(
            TYPED_PREFIXES
                .iter()
                .map(|(infix, _)| format!("{PLACEHOLDER_PREFIX}{infix}{upper}")),
        )
        .collect()
}

/// A single parameter of a workflow-backed tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolParameter {
    pub name: String,
    pub param_type: ParamType,
    /// `true` when the caller must supply a value (no default is known at
    /// scan time). Runtime defaults may still satisfy it.
    pub required: bool,
    pub default: Option<serde_json::Value>,
    /// Placeholder tokens that this parameter substitutes.
    pub placeholders: Vec<String>,
}

/// Discover every placeholder in the graph and build the parameter schema.
///
/// Untyped `PARAM_<NAME>` tokens declare required string parameters that
/// only an argument or a runtime/configured default can satisfy. Typed
/// tokens take their default from the namespace defaults table and are
/// required only when no default exists; `seed` is never required.
pub fn extract_parameters(
    graph: &WorkflowGraph,
    namespace: MediaKind,
) -> BTreeMap<String, ToolParameter> {
    let mut params: BTreeMap<String, ToolParameter> = BTreeMap::new();
    let mut explicit: BTreeMap<String, bool> = BTreeMap::new();

    for (_, _, value) in iter_inputs(graph) {
        let Some(token) = value.as_str() else {
            continue;
        };
        let Some(placeholder) = parse_placeholder(token) else {
            continue;
        };

        let entry = params
            .entry(placeholder.name.clone())
            .or_insert_with(|| ToolParameter {
                name: placeholder.name.clone(),
                param_type: placeholder.param_type,
                required: false,
                default: None,
                placeholders: Vec::new(),
            });

        if !entry.placeholders.iter().any(|t| t == token) {
            entry.placeholders.push(token.to_string());
        }

        let seen_typed = explicit.entry(placeholder.name.clone()).or_insert(false);
        if placeholder.typed {
            if *seen_typed && entry.param_type != placeholder.param_type {
                tracing::warn!(
                    parameter = %placeholder.name,
                    kept = ?entry.param_type,
                    ignored = ?placeholder.param_type,
                    "Conflicting placeholder types; keeping the first",
                );
            } else {
                entry.param_type = placeholder.param_type;
                *seen_typed = true;
            }
        }
    }

    for param in params.values_mut() {
        let typed = explicit.get(&param.name).copied().unwrap_or(false);
        if typed {
            param.default = builtin_default(namespace, &param.name);
            param.required = param.default.is_none() && param.name != SEED_PARAMETER;
        } else {
            param.required = param.name != SEED_PARAMETER;
        }
        param.placeholders.sort();
    }

    params
}

/// Classify the output kind from terminal node kinds.
///
/// Absence of any audio or video marker means `image`.
pub fn classify_output_kind(graph: &WorkflowGraph) -> MediaKind {
    let kinds = || graph.values().map(|node| node.class_type.as_str());

    let is_audio = |kind: &str| {
        AUDIO_OUTPUT_NODES.contains(&kind)
            || ((kind.starts_with("Save") || kind.starts_with("Preview")) && kind.contains("Audio"))
    };
    let is_video = |kind: &str| {
        VIDEO_OUTPUT_NODES.contains(&kind) || (kind.starts_with("Save") && kind.contains("Video"))
    };

    if kinds().any(is_video) {
        MediaKind::Video
    } else if kinds().any(is_audio) {
        MediaKind::Audio
    } else {
        MediaKind::Image
    }
}

/// Determine the namespace of a template.
///
/// Graph content wins: audio or video terminal nodes decide. Otherwise the
/// workflow id is consulted, then `image` is assumed.
pub fn classify_namespace(workflow_id: &str, graph: &WorkflowGraph) -> MediaKind {
    match classify_output_kind(graph) {
        MediaKind::Image => MediaKind::guess_from_id(workflow_id).unwrap_or(MediaKind::Image),
        content => content,
    }
}

/// Refine a namespace using the output preference keys of a definition.
///
/// An exact match with the audio or video key set overrides the base
/// classification.
pub fn refine_namespace(base: MediaKind, output_preferences: &[String]) -> MediaKind {
    let matches = |keys: &[&str]| {
        output_preferences.len() == keys.len()
            && output_preferences.iter().zip(keys).all(|(a, b)| a == b)
    };
    if matches(AUDIO_OUTPUT_KEYS) {
        MediaKind::Audio
    } else if matches(VIDEO_OUTPUT_KEYS) {
        MediaKind::Video
    } else {
        base
    }
}

// ---------------------------------------------------------------------------
// Templates and tool definitions
// ---------------------------------------------------------------------------

/// The dispatchable schema of a workflow-backed tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub tool_name: String,
    pub workflow_id: String,
    pub description: String,
    pub parameters: BTreeMap<String, ToolParameter>,
    pub output_kind: MediaKind,
    pub output_preferences: Vec<String>,
    pub namespace: MediaKind,
}

impl ToolDefinition {
    /// Build the definition for a parsed graph.
    pub fn from_graph(workflow_id: &str, graph: &WorkflowGraph) -> Self {
        let output_kind = classify_output_kind(graph);
        let namespace = classify_namespace(workflow_id, graph);
        let parameters = extract_parameters(graph, namespace);

        let description = if parameters.is_empty() {
            format!("Run the '{workflow_id}' workflow ({output_kind} output). Takes no parameters.")
        } else {
            let names: Vec<&str> = parameters.keys().map(String::as_str).collect();
            format!(
                "Run the '{workflow_id}' workflow ({output_kind} output). Parameters: {}.",
                names.join(", ")
            )
        };

        Self {
            tool_name: workflow_id.to_string(),
            workflow_id: workflow_id.to_string(),
            description,
            parameters,
            output_kind,
            output_preferences: output_kind
                .output_keys()
                .iter()
                .map(|k| k.to_string())
                .collect(),
            namespace,
        }
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    /// Namespace after output-preference refinement.
    pub fn runtime_namespace(&self) -> MediaKind {
        refine_namespace(self.namespace, &self.output_preferences)
    }
}

/// A parsed template as held by the template store.
#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    pub id: String,
    pub graph: WorkflowGraph,
    /// File modification time observed when the template was parsed.
    pub modified: SystemTime,
    pub definition: ToolDefinition,
}

impl WorkflowTemplate {
    pub fn new(id: &str, graph: WorkflowGraph, modified: SystemTime) -> Self {
        let definition = ToolDefinition::from_graph(id, &graph);
        Self {
            id: id.to_string(),
            graph,
            modified,
            definition,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
