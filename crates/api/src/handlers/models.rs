//! Handler for `GET /models`.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use comfybridge_core::workflow::{MediaKind, MODEL_PARAMETER};
use serde::Serialize;
use serde_json::Value;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ModelList {
    pub models: Vec<String>,
    pub count: usize,
    /// Effective default model per namespace, where one is set.
    pub defaults: BTreeMap<MediaKind, Value>,
}

/// GET /api/v1/models
///
/// Refresh the checkpoint catalog from ComfyUI and return it.
pub async fn list_models(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let models = state.refresh_models().await?;

    let defaults = MediaKind::ALL
        .into_iter()
        .filter_map(|ns| {
            state
                .defaults
                .get(ns, MODEL_PARAMETER, None)
                .map(|model| (ns, model))
        })
        .collect();

    Ok(Json(DataResponse {
        data: ModelList {
            count: models.len(),
            models,
            defaults,
        },
    }))
}
