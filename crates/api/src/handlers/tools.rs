//! Handlers for the `/tools` resource.
//!
//! Every workflow template is exposed as a tool whose parameter schema is
//! derived from its placeholders. Calls go through one generic dispatcher.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use comfybridge_core::types::JsonMap;
use serde::Deserialize;

use crate::error::AppResult;
use crate::response::{DataResponse, RunResponse};
use crate::runs::{attach_inline_preview, ensure_model_available, execute, RunContext};
use crate::state::AppState;

/// Request body for `POST /tools/{name}`.
#[derive(Debug, Default, Deserialize)]
pub struct ToolCallInput {
    /// Named arguments matched against the tool's parameters.
    #[serde(default)]
    pub arguments: JsonMap,
    /// Session the produced asset is filed under.
    pub session_id: Option<String>,
    /// Embed a small base64 preview of an image result.
    #[serde(default)]
    pub return_inline_preview: bool,
}

/// GET /api/v1/tools
///
/// Rescan the workflow directory and list every tool definition.
pub async fn list_tools(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let definitions = state.templates.scan();
    Ok(Json(DataResponse { data: definitions }))
}

/// POST /api/v1/tools/{name}
///
/// Validate the model, render the template with the given arguments, run
/// it, and register the output. Returns 200 with the artifact, or 202 with
/// a job handle when the run is still in progress.
pub async fn call_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(input): Json<ToolCallInput>,
) -> AppResult<impl IntoResponse> {
    let template = state.templates.template(&name)?;
    let definition = &template.definition;

    ensure_model_available(&state, definition, &input.arguments)?;

    let graph = state.renderer.render(&template, &input.arguments)?;

    let context = RunContext {
        workflow_id: definition.workflow_id.clone(),
        tool: Some(definition.tool_name.clone()),
        session_id: input.session_id,
        metadata: JsonMap::new(),
    };
    let result = execute(&state, graph, &definition.output_preferences, context).await?;

    Ok(match result.into_artifact(&state) {
        Ok(mut artifact) => {
            if input.return_inline_preview {
                attach_inline_preview(&state, &mut artifact).await;
            }
            (
                StatusCode::OK,
                Json(DataResponse {
                    data: RunResponse::Completed(Box::new(artifact)),
                }),
            )
        }
        Err(handle) => (
            StatusCode::ACCEPTED,
            Json(DataResponse {
                data: RunResponse::pending(handle, None),
            }),
        ),
    })
}
