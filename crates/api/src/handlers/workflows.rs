//! Handlers for the `/workflows` resource.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use comfybridge_core::render::apply_overrides;
use comfybridge_core::types::JsonMap;
use comfybridge_core::workflow::{MediaKind, ToolDefinition};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::response::{DataResponse, RunResponse};
use crate::runs::{ensure_model_available, execute, RunContext};
use crate::state::AppState;

/// Listing entry for one workflow template.
#[derive(Debug, Serialize)]
pub struct WorkflowSummary {
    pub workflow_id: String,
    pub output_kind: MediaKind,
    pub namespace: MediaKind,
    /// Every declared parameter name, sorted.
    pub parameters: Vec<String>,
    /// Parameters that must be supplied because nothing defaults them.
    pub required: Vec<String>,
}

impl From<ToolDefinition> for WorkflowSummary {
    fn from(definition: ToolDefinition) -> Self {
        let required = definition
            .parameters
            .values()
            .filter(|p| p.required)
            .map(|p| p.name.clone())
            .collect();
        Self {
            namespace: definition.runtime_namespace(),
            workflow_id: definition.workflow_id,
            output_kind: definition.output_kind,
            parameters: definition.parameters.into_keys().collect(),
            required,
        }
    }
}

/// Request body for `POST /workflows/{id}/run`.
#[derive(Debug, Default, Deserialize)]
pub struct RunWorkflowInput {
    /// Placeholder name (without the `PARAM_` prefix) to value.
    #[serde(default)]
    pub overrides: JsonMap,
    pub session_id: Option<String>,
}

/// GET /api/v1/workflows
pub async fn list_workflows(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let workflows: Vec<WorkflowSummary> = state
        .templates
        .scan()
        .into_iter()
        .map(WorkflowSummary::from)
        .collect();
    Ok(Json(DataResponse { data: workflows }))
}

/// POST /api/v1/workflows/{id}/run
///
/// Run a workflow file directly with placeholder overrides. Overrides that
/// match no placeholder are reported in `overrides_dropped`; placeholders
/// still unresolved after defaults fail the request before submission.
pub async fn run_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    Json(input): Json<RunWorkflowInput>,
) -> AppResult<impl IntoResponse> {
    let template = state.templates.template(&workflow_id)?;

    ensure_model_available(&state, &template.definition, &input.overrides)?;

    let (graph, report) = apply_overrides(template.graph.clone(), &workflow_id, &input.overrides);
    let graph = state.renderer.fill_defaults(&template, graph)?;

    let context = RunContext {
        workflow_id: workflow_id.clone(),
        session_id: input.session_id,
        ..Default::default()
    };
    let result = execute(
        &state,
        graph,
        &template.definition.output_preferences,
        context,
    )
    .await?;

    Ok(match result.into_artifact(&state) {
        Ok(artifact) => (
            StatusCode::OK,
            Json(DataResponse {
                data: RunResponse::Completed(Box::new(artifact.with_report(report))),
            }),
        ),
        Err(handle) => (
            StatusCode::ACCEPTED,
            Json(DataResponse {
                data: RunResponse::pending(handle, Some(report)),
            }),
        ),
    })
}
