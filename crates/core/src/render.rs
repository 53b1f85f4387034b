//! Placeholder substitution and override reconciliation.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::defaults::NamespaceDefaults;
use crate::error::CoreError;
use crate::types::JsonMap;
use crate::workflow::{
    contains_token, parse_placeholder, placeholder_tokens, remaining_placeholders, replace_token,
    MediaKind, ParamType, ToolParameter, WorkflowGraph, WorkflowTemplate, PLACEHOLDER_PREFIX,
    SEED_PARAMETER,
};

/// Outcome of applying caller overrides to a graph.
///
/// Every override key lands in exactly one of the two maps.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverrideReport {
    /// Override name to the value actually written into the graph.
    pub applied: BTreeMap<String, Value>,
    /// Override name to the reason it was not applied.
    pub dropped: BTreeMap<String, String>,
}

/// Random seed over the full range the backend accepts.
pub fn random_seed() -> u64 {
    rand::random::<u64>()
}

/// Coerce a value towards a declared parameter type.
///
/// Values that cannot be coerced are returned unchanged.
pub fn coerce(value: &Value, param_type: ParamType) -> Value {
    match param_type {
        ParamType::String => value.clone(),
        ParamType::Int => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => value.clone(),
            Value::Number(n) => n
                .as_f64()
                .map(|f| Value::from(f.trunc() as i64))
                .unwrap_or_else(|| value.clone()),
            Value::String(s) => parse_int(s).map(Value::from).unwrap_or_else(|| value.clone()),
            _ => value.clone(),
        },
        ParamType::Float => match value {
            Value::Number(n) => n.as_f64().map(Value::from).unwrap_or_else(|| value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::from)
                .unwrap_or_else(|| value.clone()),
            _ => value.clone(),
        },
        ParamType::Bool => match value {
            Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Value::Bool(true),
            Value::String(s) if s.trim().eq_ignore_ascii_case("false") => Value::Bool(false),
            _ => value.clone(),
        },
    }
}

fn parse_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    trimmed.parse().ok()
}

pub struct RenderEngine {
    defaults: Arc<NamespaceDefaults>,
}

impl RenderEngine {
    pub fn new(defaults: Arc<NamespaceDefaults>) -> Self {
        Self { defaults }
    }

    /// Produce a submittable graph from a template and named arguments.
    ///
    /// Each declared parameter resolves as: explicit argument, namespace
    /// default, parameter default, generated seed. Fails only when a
    /// parameter resolves to nothing.
    pub fn render(
        &self,
        template: &WorkflowTemplate,
        arguments: &JsonMap,
    ) -> Result<WorkflowGraph, CoreError> {
        let definition = &template.definition;
        let namespace = definition.runtime_namespace();
        let mut graph = template.graph.clone();

        for param in definition.parameters.values() {
            let value = self
                .resolve(namespace, param, arguments.get(&param.name))
                .ok_or_else(|| CoreError::MissingParameter {
                    workflow_id: template.id.clone(),
                    parameter: param.name.clone(),
                })?;
            let value = coerce(&value, param.param_type);
            for token in &param.placeholders {
                replace_token(&mut graph, token, &value);
            }
        }

        let ignored: Vec<&str> = arguments
            .keys()
            .filter(|k| !definition.parameters.contains_key(k.as_str()))
            .map(String::as_str)
            .collect();
        if !ignored.is_empty() {
            tracing::debug!(workflow_id = %template.id, ?ignored, "Ignoring undeclared arguments");
        }

        Ok(graph)
    }

    /// Substitute defaults for placeholders left after overrides.
    ///
    /// Fails with `Validation` when any placeholder remains afterwards.
    pub fn fill_defaults(
        &self,
        template: &WorkflowTemplate,
        mut graph: WorkflowGraph,
    ) -> Result<WorkflowGraph, CoreError> {
        let namespace = template.definition.runtime_namespace();

        for param in template.definition.parameters.values() {
            if !param.placeholders.iter().any(|t| contains_token(&graph, t)) {
                continue;
            }
            if let Some(value) = self.resolve(namespace, param, None) {
                let value = coerce(&value, param.param_type);
                for token in &param.placeholders {
                    replace_token(&mut graph, token, &value);
                }
            }
        }

        let unresolved = remaining_placeholders(&graph);
        if !unresolved.is_empty() {
            return Err(CoreError::Validation(format!(
                "Workflow '{}' has unresolved placeholders: {}. Supply them as overrides.",
                template.id,
                unresolved.join(", ")
            )));
        }
        Ok(graph)
    }

    fn resolve(
        &self,
        namespace: MediaKind,
        param: &ToolParameter,
        provided: Option<&Value>,
    ) -> Option<Value> {
        // Required parameters never fall back to the built-in table.
        let layered = if param.required {
            self.defaults.get_explicit(namespace, &param.name, provided)
        } else {
            self.defaults.get(namespace, &param.name, provided)
        };
        layered
            .or_else(|| param.default.clone())
            .or_else(|| (param.name == SEED_PARAMETER).then(|| Value::from(random_seed())))
    }
}

/// Apply caller overrides to a graph.
///
/// For each key the placeholder `PARAM_<KEY>` and its typed spellings are
/// searched; every matching input is replaced with the (coerced) value.
pub fn apply_overrides(
    mut graph: WorkflowGraph,
    template_id: &str,
    overrides: &JsonMap,
) -> (WorkflowGraph, OverrideReport) {
    let mut report = OverrideReport::default();

    for (key, value) in overrides {
        let mut written: Option<Value> = None;

        for token in placeholder_tokens(key) {
            if !contains_token(&graph, &token) {
                continue;
            }
            let param_type = parse_placeholder(&token)
                .map(|p| p.param_type)
                .unwrap_or(ParamType::String);
            let coerced = coerce(value, param_type);
            replace_token(&mut graph, &token, &coerced);
            written.get_or_insert(coerced);
        }

        match written {
            Some(value) => {
                report.applied.insert(key.clone(), value);
            }
            None => {
                let reason = format!(
                    "no placeholder `{PLACEHOLDER_PREFIX}{}` found in workflow '{template_id}'",
                    key.to_uppercase()
                );
                report.dropped.insert(key.clone(), reason);
            }
        }
    }

    if !report.dropped.is_empty() {
        tracing::debug!(
            workflow_id = template_id,
            dropped = ?report.dropped.keys().collect::<Vec<_>>(),
            "Some overrides matched no placeholder",
        );
    }

    (graph, report)
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::workflow::parse_workflow;

    fn template(id: &str, body: serde_json::Value) -> WorkflowTemplate {
        WorkflowTemplate::new(id, parse_workflow(&body).unwrap(), SystemTime::UNIX_EPOCH)
    }

    fn sampler_template() -> WorkflowTemplate {
        template(
            "txt2img",
            json!({
                "3": {
                    "class_type": "KSampler",
                    "inputs": {
                        "seed": "PARAM_INT_SEED",
                        "steps": "PARAM_INT_STEPS",
                        "cfg": "PARAM_FLOAT_CFG"
                    }
                },
                "6": { "class_type": "CLIPTextEncode", "inputs": { "text": "PARAM_PROMPT" } },
                "9": { "class_type": "SaveImage", "inputs": { "images": ["8", 0] } }
            }),
        )
    }

    fn engine() -> RenderEngine {
        RenderEngine::new(Arc::new(NamespaceDefaults::new()))
    }

    fn args(value: serde_json::Value) -> JsonMap {
        value.as_object().cloned().unwrap()
    }

    // -- coercion -------------------------------------------------------------

    #[test]
    fn coerce_int() {
        assert_eq!(coerce(&json!("30"), ParamType::Int), json!(30));
        assert_eq!(coerce(&json!(" -4 "), ParamType::Int), json!(-4));
        assert_eq!(coerce(&json!(7.9), ParamType::Int), json!(7));
        assert_eq!(coerce(&json!("3.5"), ParamType::Int), json!("3.5"));
        assert_eq!(coerce(&json!("abc"), ParamType::Int), json!("abc"));
    }

    #[test]
    fn coerce_float_and_bool() {
        assert_eq!(coerce(&json!("7.5"), ParamType::Float), json!(7.5));
        assert_eq!(coerce(&json!(7), ParamType::Float), json!(7.0));
        assert_eq!(coerce(&json!("NaN"), ParamType::Float), json!("NaN"));
        assert_eq!(coerce(&json!("true"), ParamType::Bool), json!(true));
        assert_eq!(coerce(&json!("False"), ParamType::Bool), json!(false));
        assert_eq!(coerce(&json!("yes"), ParamType::Bool), json!("yes"));
        assert_eq!(coerce(&json!(12), ParamType::String), json!(12));
    }

    // -- render ---------------------------------------------------------------

    #[test]
    fn render_coerces_numeric_strings() {
        let graph = engine()
            .render(&sampler_template(), &args(json!({ "prompt": "a cat", "steps": "30" })))
            .unwrap();
        assert_eq!(graph["3"].inputs["steps"], json!(30));
        assert_eq!(graph["6"].inputs["text"], "a cat");
    }

    #[test]
    fn render_uses_namespace_defaults_and_random_seed() {
        let graph = engine()
            .render(&sampler_template(), &args(json!({ "prompt": "a cat" })))
            .unwrap();
        assert_eq!(graph["3"].inputs["steps"], json!(20));
        assert_eq!(graph["3"].inputs["cfg"], json!(8.0));
        assert!(graph["3"].inputs["seed"].is_u64());
    }

    #[test]
    fn render_prefers_runtime_default_over_builtin() {
        let defaults = Arc::new(NamespaceDefaults::new());
        defaults.set(MediaKind::Image, "steps", json!(42));
        let graph = RenderEngine::new(defaults)
            .render(&sampler_template(), &args(json!({ "prompt": "x" })))
            .unwrap();
        assert_eq!(graph["3"].inputs["steps"], json!(42));
    }

    #[test]
    fn render_missing_required_parameter() {
        let err = engine().render(&sampler_template(), &JsonMap::new()).unwrap_err();
        assert_matches!(err, CoreError::MissingParameter { parameter, .. } if parameter == "prompt");
    }

    #[test]
    fn untyped_parameter_ignores_builtin_table() {
        let template = template(
            "latent",
            json!({ "5": { "class_type": "EmptyLatentImage", "inputs": { "width": "PARAM_WIDTH" } } }),
        );
        assert!(template.definition.parameters["width"].required);

        let err = engine().render(&template, &JsonMap::new()).unwrap_err();
        assert_matches!(err, CoreError::MissingParameter { parameter, .. } if parameter == "width");

        let err = engine()
            .fill_defaults(&template, template.graph.clone())
            .unwrap_err();
        assert_matches!(err, CoreError::Validation(msg) if msg.contains("PARAM_WIDTH"));
    }

    #[test]
    fn untyped_parameter_accepts_runtime_default() {
        let template = template(
            "latent",
            json!({ "5": { "class_type": "EmptyLatentImage", "inputs": { "width": "PARAM_WIDTH" } } }),
        );
        let defaults = Arc::new(NamespaceDefaults::new());
        defaults.set(MediaKind::Image, "width", json!(640));
        let graph = RenderEngine::new(defaults)
            .render(&template, &JsonMap::new())
            .unwrap();
        assert_eq!(graph["5"].inputs["width"], json!(640));
    }

    #[test]
    fn untyped_seed_is_generated() {
        let template = template(
            "seeded",
            json!({ "3": { "class_type": "KSampler", "inputs": { "seed": "PARAM_SEED" } } }),
        );
        assert!(!template.definition.parameters["seed"].required);
        let graph = engine().render(&template, &JsonMap::new()).unwrap();
        assert!(!graph["3"].inputs["seed"].is_null());
    }

    #[test]
    fn render_leaves_template_untouched() {
        let template = sampler_template();
        engine()
            .render(&template, &args(json!({ "prompt": "x" })))
            .unwrap();
        assert_eq!(template.graph["6"].inputs["text"], "PARAM_PROMPT");
    }

    // -- overrides ------------------------------------------------------------

    #[test]
    fn overrides_partition_into_applied_and_dropped() {
        let overrides = args(json!({ "prompt": "hello", "bogus": 42 }));
        let (graph, report) =
            apply_overrides(sampler_template().graph, "txt2img", &overrides);

        assert_eq!(graph["6"].inputs["text"], "hello");
        assert_eq!(report.applied.keys().collect::<Vec<_>>(), vec!["prompt"]);
        assert_eq!(report.dropped.keys().collect::<Vec<_>>(), vec!["bogus"]);
        assert!(report.dropped["bogus"].contains("PARAM_BOGUS"));
    }

    #[test]
    fn overrides_match_typed_tokens_and_coerce() {
        let overrides = args(json!({ "seed": "12345", "cfg": "4.5" }));
        let (graph, report) =
            apply_overrides(sampler_template().graph, "txt2img", &overrides);

        assert_eq!(graph["3"].inputs["seed"], json!(12345));
        assert_eq!(graph["3"].inputs["cfg"], json!(4.5));
        assert_eq!(report.applied["seed"], json!(12345));
        assert!(report.dropped.is_empty());
    }

    #[test]
    fn override_partition_covers_every_key() {
        let overrides = args(json!({ "prompt": 1, "steps": 2, "nope": 3, "also_nope": 4 }));
        let (_, report) = apply_overrides(sampler_template().graph, "txt2img", &overrides);
        for key in overrides.keys() {
            assert!(report.applied.contains_key(key) ^ report.dropped.contains_key(key));
        }
    }

    #[test]
    fn fill_defaults_after_overrides() {
        let template = sampler_template();
        let overrides = args(json!({ "prompt": "hello" }));
        let (graph, _) = apply_overrides(template.graph.clone(), &template.id, &overrides);

        let graph = engine().fill_defaults(&template, graph).unwrap();
        assert_eq!(graph["3"].inputs["steps"], json!(20));
        assert!(remaining_placeholders(&graph).is_empty());
    }

    #[test]
    fn fill_defaults_rejects_unresolved_placeholders() {
        let template = sampler_template();
        let err = engine()
            .fill_defaults(&template, template.graph.clone())
            .unwrap_err();
        assert_matches!(err, CoreError::Validation(msg) if msg.contains("PARAM_PROMPT"));
    }
}
