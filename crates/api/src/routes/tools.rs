//! Route definitions for the `/tools` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::tools;
use crate::state::AppState;

/// Routes mounted at `/tools`.
///
/// ```text
/// GET    /                -> list_tools
/// POST   /{name}          -> call_tool
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(tools::list_tools))
        .route("/{name}", post(tools::call_tool))
}
