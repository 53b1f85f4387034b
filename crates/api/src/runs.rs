//! Run-and-register flow shared by the tool, workflow and regenerate
//! handlers.
//!
//! A completed run is registered in the asset registry (with best-effort
//! file metadata); a run that outlives the polling window is returned as a
//! pending job handle.

use comfybridge_comfyui::executor::{CompletedRun, RunOutcome};
use comfybridge_comfyui::history::OutputFile;
use comfybridge_comfyui::metadata::{collect_metadata, fetch_inline_preview};
use comfybridge_core::asset_registry::{AssetDescriptor, AssetRecord};
use comfybridge_core::job::JobHandle;
use comfybridge_core::models::{check_model, ModelCheck};
use comfybridge_core::types::JsonMap;
use comfybridge_core::workflow::{ToolDefinition, WorkflowGraph};
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::response::ArtifactResponse;
use crate::state::AppState;

/// Provenance attached to the asset a run produces.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub workflow_id: String,
    /// Tool that produced the asset, if any.
    pub tool: Option<String>,
    pub session_id: Option<String>,
    /// Extra metadata merged into the asset record.
    pub metadata: JsonMap,
}

/// Outcome of a run as seen by handlers.
#[derive(Debug)]
pub enum RunResult {
    Completed(AssetRecord),
    Pending(JobHandle),
}

impl RunResult {
    pub fn into_artifact(self, state: &AppState) -> Result<ArtifactResponse, JobHandle> {
        match self {
            RunResult::Completed(record) => {
                let url = state.assets.asset_url(&record);
                let tool = record
                    .metadata
                    .get("tool")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let mut response = ArtifactResponse::new(&record, url);
                response.tool = tool;
                Ok(response)
            }
            RunResult::Pending(handle) => Err(handle),
        }
    }
}

/// Attach a downscaled preview of the artifact's file.
///
/// Best effort: a failed fetch or decode leaves the response unchanged.
pub async fn attach_inline_preview(state: &AppState, artifact: &mut ArtifactResponse) {
    let file = OutputFile {
        filename: artifact.filename.clone(),
        subfolder: artifact.subfolder.clone(),
        folder_type: artifact.folder_type.clone(),
    };
    if let Some(preview) = fetch_inline_preview(state.backend.as_ref(), &file).await {
        artifact.inline_preview_base64 = Some(preview.data_uri);
        artifact.inline_preview_mime_type = Some(preview.mime_type);
    }
}

/// Refuse to submit when the model a tool would use is not installed.
pub fn ensure_model_available(
    state: &AppState,
    definition: &ToolDefinition,
    arguments: &JsonMap,
) -> AppResult<()> {
    match check_model(definition, arguments, &state.defaults, &state.models) {
        ModelCheck::Missing {
            model,
            source,
            sample,
        } => Err(AppError::ModelUnavailable {
            model,
            model_source: source,
            sample,
        }),
        _ => Ok(()),
    }
}

/// Submit `graph`, wait for it, and register the produced file.
pub async fn execute(
    state: &AppState,
    graph: WorkflowGraph,
    preferences: &[String],
    context: RunContext,
) -> AppResult<RunResult> {
    tracing::info!(workflow_id = %context.workflow_id, "Submitting workflow");

    match state.executor.run(graph, preferences).await? {
        RunOutcome::Completed(run) => {
            let record = register(state, run, context).await;
            Ok(RunResult::Completed(record))
        }
        RunOutcome::Pending(handle) => {
            tracing::info!(
                workflow_id = %context.workflow_id,
                prompt_id = %handle.prompt_id,
                "Run still pending, returning job handle",
            );
            Ok(RunResult::Pending(handle))
        }
    }
}

async fn register(state: &AppState, run: CompletedRun, context: RunContext) -> AssetRecord {
    let meta = collect_metadata(state.backend.as_ref(), &run.output).await;

    let mut metadata = JsonMap::new();
    metadata.insert(
        "workflow_id".to_string(),
        Value::String(context.workflow_id.clone()),
    );
    if let Some(tool) = &context.tool {
        metadata.insert("tool".to_string(), Value::String(tool.clone()));
    }
    metadata.extend(context.metadata);

    state
        .assets
        .register(AssetDescriptor {
            filename: run.output.filename,
            subfolder: run.output.subfolder,
            folder_type: run.output.folder_type,
            workflow_id: context.workflow_id,
            prompt_id: run.prompt_id,
            mime_type: meta.mime_type,
            width: meta.width,
            height: meta.height,
            bytes_size: meta.bytes_size,
            comfy_history: Some(run.history),
            submitted_workflow: Some(run.submitted_workflow),
            metadata,
            session_id: context.session_id,
        })
        .await
}
