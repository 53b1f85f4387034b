pub mod assets;
pub mod health;
pub mod jobs;
pub mod tools;
pub mod workflows;

use axum::routing::get;
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /tools                                           list tool definitions
/// /tools/{name}                                    call tool (POST)
///
/// /workflows                                       list workflows
/// /workflows/{id}/run                              run with overrides (POST)
///
/// /queue                                           running + pending prompt ids
///
/// /jobs/{id}                                       unified job status
/// /jobs/{id}/cancel                                cancel (POST)
///
/// /assets                                          list (limit, workflow_id, session_id)
/// /assets/{id}                                     full metadata
/// /assets/{id}/regenerate                          regenerate (POST)
///
/// /models                                          list checkpoints
/// /defaults                                        get, set (PUT)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/tools", tools::router())
        .nest("/workflows", workflows::router())
        .nest("/jobs", jobs::router())
        .nest("/assets", assets::router())
        .route("/queue", get(handlers::queue::get_queue_status))
        .route("/models", get(handlers::models::list_models))
        .route(
            "/defaults",
            get(handlers::defaults::get_defaults).put(handlers::defaults::set_defaults),
        )
}
