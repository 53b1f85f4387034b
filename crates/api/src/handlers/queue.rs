//! Handler for `GET /queue`.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use comfybridge_comfyui::resolver::QueueStatus;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/queue
///
/// Prompt ids currently running and pending on ComfyUI.
pub async fn get_queue_status(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let snapshot = state.resolver.queue_snapshot().await?;
    Ok(Json(DataResponse {
        data: QueueStatus::from(&snapshot),
    }))
}
