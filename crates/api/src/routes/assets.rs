//! Route definitions for the `/assets` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::assets;
use crate::state::AppState;

/// Routes mounted at `/assets`.
///
/// ```text
/// GET    /                    -> list_assets
/// GET    /{id}                -> get_asset
/// POST   /{id}/regenerate     -> regenerate_asset
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(assets::list_assets))
        .route("/{id}", get(assets::get_asset))
        .route("/{id}/regenerate", post(assets::regenerate_asset))
}
