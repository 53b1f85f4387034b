//! Handlers for the `/assets` resource.
//!
//! Assets live in memory only and expire after the configured TTL; an
//! expired or unknown id is a 404.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use comfybridge_core::asset_registry::{AssetRecord, DEFAULT_LIST_LIMIT};
use comfybridge_core::error::CoreError;
use comfybridge_core::regenerate::{apply_param_overrides, guess_output_kind, update_seed, SeedChoice};
use comfybridge_core::types::{JsonMap, Timestamp};
use comfybridge_core::workflow::MediaKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::query::AssetListParams;
use crate::response::{DataResponse, RunResponse};
use crate::runs::{attach_inline_preview, execute, RunContext};
use crate::state::AppState;

/// Listing entry; provenance payloads are only returned by `get_asset`.
#[derive(Debug, Serialize)]
pub struct AssetSummary {
    pub asset_id: String,
    pub asset_url: String,
    pub filename: String,
    pub subfolder: String,
    pub folder_type: String,
    pub workflow_id: String,
    pub prompt_id: String,
    pub mime_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bytes_size: Option<u64>,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub session_id: Option<String>,
}

impl AssetSummary {
    fn new(record: AssetRecord, asset_url: String) -> Self {
        Self {
            asset_id: record.asset_id,
            asset_url,
            filename: record.filename,
            subfolder: record.subfolder,
            folder_type: record.folder_type,
            workflow_id: record.workflow_id,
            prompt_id: record.prompt_id,
            mime_type: record.mime_type,
            width: record.width,
            height: record.height,
            bytes_size: record.bytes_size,
            created_at: record.created_at,
            expires_at: record.expires_at,
            session_id: record.session_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AssetList {
    pub assets: Vec<AssetSummary>,
    pub count: usize,
    pub workflow_id_filter: Option<String>,
    pub session_id_filter: Option<String>,
}

/// Full record including history snapshot and submitted workflow.
#[derive(Debug, Serialize)]
pub struct AssetDetail {
    pub asset_url: String,
    #[serde(flatten)]
    pub record: AssetRecord,
}

/// Request body for `POST /assets/{id}/regenerate`.
#[derive(Debug, Default, Deserialize)]
pub struct RegenerateInput {
    /// New sampler seed; `-1` keeps the original, absent picks a random one.
    pub seed: Option<i64>,
    /// Named parameter changes, e.g. `{"steps": 30, "prompt": "..."}`.
    #[serde(default)]
    pub param_overrides: JsonMap,
    /// Embed a small base64 preview of an image result.
    #[serde(default)]
    pub return_inline_preview: bool,
}

fn asset_not_found(asset_id: &str) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Asset",
        id: asset_id.to_string(),
    })
}

/// GET /api/v1/assets?limit=&workflow_id=&session_id=
///
/// Newest first. Filters combine with AND.
pub async fn list_assets(
    State(state): State<AppState>,
    Query(params): Query<AssetListParams>,
) -> AppResult<impl IntoResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let records = state
        .assets
        .list(limit, params.workflow_id.as_deref(), params.session_id.as_deref())
        .await;

    let assets: Vec<AssetSummary> = records
        .into_iter()
        .map(|record| {
            let url = state.assets.asset_url(&record);
            AssetSummary::new(record, url)
        })
        .collect();

    Ok(Json(DataResponse {
        data: AssetList {
            count: assets.len(),
            assets,
            workflow_id_filter: params.workflow_id,
            session_id_filter: params.session_id,
        },
    }))
}

/// GET /api/v1/assets/{id}
pub async fn get_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let record = state
        .assets
        .get(&asset_id)
        .await
        .ok_or_else(|| asset_not_found(&asset_id))?;

    Ok(Json(DataResponse {
        data: AssetDetail {
            asset_url: state.assets.asset_url(&record),
            record,
        },
    }))
}

/// POST /api/v1/assets/{id}/regenerate
///
/// Re-run the exact workflow that produced an asset, with parameter changes
/// and a new seed. The new asset keeps the original session.
pub async fn regenerate_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
    Json(input): Json<RegenerateInput>,
) -> AppResult<impl IntoResponse> {
    let record = state
        .assets
        .get(&asset_id)
        .await
        .ok_or_else(|| asset_not_found(&asset_id))?;

    let mut graph = record.submitted_workflow.clone().ok_or_else(|| {
        CoreError::Validation(format!(
            "No workflow data stored for asset {asset_id}. Cannot regenerate."
        ))
    })?;

    let seed_choice = SeedChoice::from_request(input.seed)?;
    let report = apply_param_overrides(&mut graph, &input.param_overrides);
    let seed = update_seed(&mut graph, seed_choice);

    let kind = guess_output_kind(&record.workflow_id)
        .or_else(|| {
            state
                .templates
                .definition(&record.workflow_id)
                .ok()
                .map(|d| d.output_kind)
        })
        .unwrap_or(MediaKind::Image);
    let preferences: Vec<String> = kind.output_keys().iter().map(|k| k.to_string()).collect();

    tracing::info!(
        asset_id = %asset_id,
        workflow_id = %record.workflow_id,
        ?seed,
        applied = report.applied.len(),
        dropped = report.dropped.len(),
        "Regenerating asset",
    );

    let mut metadata = JsonMap::new();
    metadata.insert("regenerated_from".to_string(), Value::String(asset_id.clone()));
    let context = RunContext {
        workflow_id: record.workflow_id.clone(),
        tool: Some("regenerate".to_string()),
        session_id: record.session_id.clone(),
        metadata,
    };
    let result = execute(&state, graph, &preferences, context).await?;

    Ok(match result.into_artifact(&state) {
        Ok(mut artifact) => {
            artifact.seed = seed;
            if input.return_inline_preview {
                attach_inline_preview(&state, &mut artifact).await;
            }
            (
                StatusCode::OK,
                Json(DataResponse {
                    data: RunResponse::Completed(Box::new(artifact.with_report(report))),
                }),
            )
        }
        Err(handle) => (
            StatusCode::ACCEPTED,
            Json(DataResponse {
                data: RunResponse::pending(handle, Some(report)),
            }),
        ),
    })
}
