//! Handlers for the `/defaults` resource.
//!
//! Defaults are layered per namespace: runtime values set here win over
//! configured models, which win over the built-in table.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use comfybridge_core::models::{ModelSource, MODEL_SAMPLE_SIZE};
use comfybridge_core::types::JsonMap;
use comfybridge_core::workflow::{MediaKind, MODEL_PARAMETER};
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

fn effective_defaults(state: &AppState) -> BTreeMap<MediaKind, JsonMap> {
    MediaKind::ALL
        .into_iter()
        .map(|ns| (ns, state.defaults.effective(ns)))
        .collect()
}

/// GET /api/v1/defaults
pub async fn get_defaults(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(DataResponse {
        data: effective_defaults(&state),
    }))
}

/// PUT /api/v1/defaults
///
/// Body: `{ "<namespace>": { "<key>": value, ... }, ... }`. A `null` value
/// clears the runtime override for that key. Model names are checked
/// against the catalog before anything is applied.
pub async fn set_defaults(
    State(state): State<AppState>,
    Json(input): Json<BTreeMap<String, JsonMap>>,
) -> AppResult<impl IntoResponse> {
    let mut updates = Vec::new();
    for (namespace, values) in input {
        let ns = MediaKind::parse(&namespace).ok_or_else(|| {
            AppError::BadRequest(format!(
                "Unknown namespace '{namespace}', expected one of: image, audio, video"
            ))
        })?;
        for (key, value) in values {
            if key == MODEL_PARAMETER {
                check_default_model(&state, &value)?;
            }
            updates.push((ns, key, value));
        }
    }

    for (ns, key, value) in updates {
        state.defaults.set(ns, &key, value);
    }

    Ok(Json(DataResponse {
        data: effective_defaults(&state),
    }))
}

fn check_default_model(state: &AppState, value: &Value) -> AppResult<()> {
    let Some(model) = value.as_str() else {
        if value.is_null() {
            return Ok(());
        }
        return Err(AppError::BadRequest("Default model must be a string".into()));
    };
    if state.models.is_empty() || state.models.contains(model) {
        return Ok(());
    }
    Err(AppError::ModelUnavailable {
        model: model.to_string(),
        model_source: ModelSource::Argument,
        sample: state
            .models
            .list()
            .into_iter()
            .take(MODEL_SAMPLE_SIZE)
            .collect(),
    })
}
