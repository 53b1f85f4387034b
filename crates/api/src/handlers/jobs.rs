//! Handlers for the `/jobs` resource.
//!
//! Job ids are ComfyUI prompt ids, returned by run endpoints when a
//! workflow outlives its polling window.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of a successful cancellation request.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub prompt_id: String,
    pub status: &'static str,
    pub message: &'static str,
}

/// GET /api/v1/jobs/{id}
///
/// Unified status from the live queue and history. Lookup failures are
/// reported inside the handle, so this always answers 200.
pub async fn get_job(
    State(state): State<AppState>,
    Path(prompt_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let handle = state.resolver.resolve(&prompt_id).await;
    Ok(Json(DataResponse { data: handle }))
}

/// POST /api/v1/jobs/{id}/cancel
///
/// A running job is interrupted; anything else is removed from the pending
/// queue. A job that already finished is not affected.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(prompt_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let running = match state.resolver.queue_snapshot().await {
        Ok(queue) => queue.running_ids().contains(&prompt_id),
        Err(e) => {
            tracing::warn!(prompt_id = %prompt_id, error = %e, "Queue check failed before cancel");
            false
        }
    };

    if running {
        state.backend.interrupt().await?;
    } else {
        state.backend.cancel(&prompt_id).await?;
    }

    tracing::info!(prompt_id = %prompt_id, interrupted = running, "Job cancellation requested");

    Ok(Json(DataResponse {
        data: CancelResponse {
            prompt_id,
            status: "cancelled",
            message: "Job cancellation requested",
        },
    }))
}
