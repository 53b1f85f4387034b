//! Checkpoint availability checks performed before submission.

use std::sync::RwLock;

use serde::Serialize;

use crate::defaults::NamespaceDefaults;
use crate::types::JsonMap;
use crate::workflow::{ToolDefinition, MODEL_PARAMETER};

/// Number of available models listed when a requested one is missing.
pub const MODEL_SAMPLE_SIZE: usize = 5;

/// Checkpoint names last reported by the backend.
#[derive(Debug, Default)]
pub struct ModelCatalog {
    models: RwLock<Vec<String>>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the catalog contents.
    pub fn refresh(&self, mut models: Vec<String>) {
        models.sort();
        models.dedup();
        tracing::debug!(count = models.len(), "Model catalog refreshed");
        *self.models.write().unwrap_or_else(|e| e.into_inner()) = models;
    }

    pub fn list(&self) -> Vec<String> {
        self.models.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_empty(&self) -> bool {
        self.models.read().unwrap_or_else(|e| e.into_inner()).is_empty()
    }

    pub fn contains(&self, model: &str) -> bool {
        self.models
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|m| m == model)
    }
}

/// Where the model name being validated came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    Argument,
    Default,
}

/// Result of validating a workflow's model against the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelCheck {
    /// The workflow declares no `model` parameter.
    NotApplicable,
    Valid { model: String },
    /// A model is declared but neither supplied nor defaulted.
    Unresolved,
    Missing {
        model: String,
        source: ModelSource,
        /// Up to [`MODEL_SAMPLE_SIZE`] models that are available.
        sample: Vec<String>,
    },
}

/// Validate the model a tool call would use.
///
/// Only definitions that declare a `model` parameter are checked. An empty
/// catalog means the listing was unavailable, so nothing is rejected.
pub fn check_model(
    definition: &ToolDefinition,
    arguments: &JsonMap,
    defaults: &NamespaceDefaults,
    catalog: &ModelCatalog,
) -> ModelCheck {
    if !definition.has_parameter(MODEL_PARAMETER) {
        return ModelCheck::NotApplicable;
    }

    let provided = arguments.get(MODEL_PARAMETER).filter(|v| !v.is_null());
    let source = if provided.is_some() {
        ModelSource::Argument
    } else {
        ModelSource::Default
    };

    let Some(value) = defaults.get(definition.runtime_namespace(), MODEL_PARAMETER, provided) else {
        return ModelCheck::Unresolved;
    };
    let model = match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    };

    if catalog.is_empty() || catalog.contains(&model) {
        return ModelCheck::Valid { model };
    }

    let sample = catalog.list().into_iter().take(MODEL_SAMPLE_SIZE).collect();
    tracing::warn!(
        workflow_id = %definition.workflow_id,
        model = %model,
        ?source,
        "Requested model is not available on the backend",
    );
    ModelCheck::Missing {
        model,
        source,
        sample,
    }
}
