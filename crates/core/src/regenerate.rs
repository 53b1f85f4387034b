//! Graph edits used when regenerating a stored asset.
//!
//! A stored graph has no placeholders left, so overrides are routed to node
//! inputs through a fixed policy table instead.

use serde_json::Value;

use crate::error::CoreError;
use crate::render::{random_seed, OverrideReport};
use crate::types::JsonMap;
use crate::workflow::{MediaKind, WorkflowGraph};

/// Which nodes a regeneration override writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prompt {
    Positive,
    Negative,
    Any,
}

struct ParamMapping {
    param: &'static str,
    /// Restrict to nodes of this class; `None` matches any node with the input.
    class_type: Option<&'static str>,
    input: &'static str,
    prompt: Prompt,
}

const fn mapping(
    param: &'static str,
    class_type: Option<&'static str>,
    input: &'static str,
    prompt: Prompt,
) -> ParamMapping {
    ParamMapping {
        param,
        class_type,
        input,
        prompt,
    }
}

const PARAM_MAPPINGS: &[ParamMapping] = &[
    mapping("prompt", Some("CLIPTextEncode"), "text", Prompt::Positive),
    mapping("negative_prompt", Some("CLIPTextEncode"), "text", Prompt::Negative),
    mapping("steps", Some("KSampler"), "steps", Prompt::Any),
    mapping("cfg", Some("KSampler"), "cfg", Prompt::Any),
    mapping("sampler_name", Some("KSampler"), "sampler_name", Prompt::Any),
    mapping("scheduler", Some("KSampler"), "scheduler", Prompt::Any),
    mapping("denoise", Some("KSampler"), "denoise", Prompt::Any),
    mapping("width", Some("EmptyLatentImage"), "width", Prompt::Any),
    mapping("height", Some("EmptyLatentImage"), "height", Prompt::Any),
    mapping("model", Some("CheckpointLoaderSimple"), "ckpt_name", Prompt::Any),
    mapping("tags", None, "tags", Prompt::Any),
    mapping("lyrics", None, "lyrics", Prompt::Any),
    mapping("seconds", None, "seconds", Prompt::Any),
    mapping("lyrics_strength", None, "lyrics_strength", Prompt::Any),
];

/// Node class whose seed input is rewritten.
const SAMPLER_CLASS: &str = "KSampler";

/// Best-effort negative prompt detection.
///
/// A text encoder counts as negative when its serialized node mentions
/// "negative" or its id contains "neg". Graphs that label neither will
/// route both prompt overrides to every text encoder.
fn looks_negative(node_id: &str, node: &crate::workflow::WorkflowNode) -> bool {
    let serialized = serde_json::to_string(node)
        .unwrap_or_default()
        .to_lowercase();
    serialized.contains("negative") || node_id.to_lowercase().contains("neg")
}

/// Apply regeneration overrides to a concrete graph.
pub fn apply_param_overrides(graph: &mut WorkflowGraph, overrides: &JsonMap) -> OverrideReport {
    let mut report = OverrideReport::default();

    for (name, value) in overrides {
        let Some(mapping) = PARAM_MAPPINGS.iter().find(|m| m.param == name) else {
            tracing::warn!(parameter = %name, "Unknown regenerate parameter, skipping");
            report
                .dropped
                .insert(name.clone(), format!("'{name}' is not a regenerable parameter"));
            continue;
        };

        let targets: Vec<String> = graph
            .iter()
            .filter(|(_, node)| mapping.class_type.map_or(true, |c| node.class_type == c))
            .filter(|(_, node)| node.inputs.contains_key(mapping.input))
            .filter(|(id, node)| match mapping.prompt {
                Prompt::Positive => !looks_negative(id, node),
                Prompt::Negative => looks_negative(id, node),
                Prompt::Any => true,
            })
            .map(|(id, _)| id.clone())
            .collect();

        if targets.is_empty() {
            tracing::warn!(parameter = %name, "No node found to update");
            report.dropped.insert(
                name.clone(),
                format!("no node with input '{}' found in the stored workflow", mapping.input),
            );
            continue;
        }

        for id in targets {
            if let Some(node) = graph.get_mut(&id) {
                node.inputs.insert(mapping.input.to_string(), value.clone());
            }
        }
        report.applied.insert(name.clone(), value.clone());
    }

    report
}

/// Seed handling requested for a regeneration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedChoice {
    /// Leave the stored seed in place.
    Keep,
    Random,
    Fixed(u64),
}

impl SeedChoice {
    /// `None` means random, `-1` keeps the original seed.
    pub fn from_request(seed: Option<i64>) -> Result<Self, CoreError> {
        match seed {
            None => Ok(SeedChoice::Random),
            Some(-1) => Ok(SeedChoice::Keep),
            Some(n) if n >= 0 => Ok(SeedChoice::Fixed(n as u64)),
            Some(n) => Err(CoreError::Validation(format!(
                "Seed must be non-negative or -1 to keep the original, got {n}"
            ))),
        }
    }
}

/// Write the chosen seed into every sampler node. Returns the seed written.
pub fn update_seed(graph: &mut WorkflowGraph, choice: SeedChoice) -> Option<u64> {
    let seed = match choice {
        SeedChoice::Keep => return None,
        SeedChoice::Random => random_seed(),
        SeedChoice::Fixed(seed) => seed,
    };
    for node in graph.values_mut().filter(|n| n.class_type == SAMPLER_CLASS) {
        node.inputs.insert("seed".to_string(), Value::from(seed));
    }
    Some(seed)
}

/// Output kind hinted by a workflow id, checked image, audio, then video.
pub fn guess_output_kind(workflow_id: &str) -> Option<MediaKind> {
    let id = workflow_id.to_lowercase();
    if id.contains("image") {
        Some(MediaKind::Image)
    } else if id.contains("audio") || id.contains("song") {
        Some(MediaKind::Audio)
    } else if id.contains("video") {
        Some(MediaKind::Video)
    } else {
        None
    }
}
