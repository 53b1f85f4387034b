//! Route definitions for the `/workflows` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::workflows;
use crate::state::AppState;

/// Routes mounted at `/workflows`.
///
/// ```text
/// GET    /                -> list_workflows
/// POST   /{id}/run        -> run_workflow
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(workflows::list_workflows))
        .route("/{id}/run", post(workflows::run_workflow))
}
