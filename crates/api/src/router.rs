//! Application router: routes plus the middleware stack.
//!
//! [`build_app_router`] is used by both `main.rs` and the integration tests,
//! so tests exercise the same timeout, CORS and request-id behaviour.

use std::time::Duration;

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::ServerConfig;
use crate::routes;
use crate::state::AppState;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Headroom on top of the polling window for metadata and preview downloads.
const RUN_GRACE: Duration = Duration::from_secs(30);

/// Build the application [`Router`].
///
/// Layers, outermost first: CORS, request id, tracing, request-id echo,
/// timeout, panic recovery.
pub fn build_app_router(state: AppState, config: &ServerConfig) -> Router {
    let request_id_header = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        // Liveness and ComfyUI reachability, outside the versioned prefix.
        .merge(routes::health::router())
        // Tools, workflows, jobs, assets, models, defaults.
        .nest("/api/v1", routes::api_routes())
        // -- Middleware (applied bottom-up) --
        // A panicking handler becomes a 500 instead of a dropped connection.
        .layer(CatchPanicLayer::new())
        // Run requests block while the job is polled.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout(config),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(build_cors_layer(config))
        .with_state(state)
}

/// Timeout applied to every request.
///
/// Never shorter than the executor's polling window plus [`RUN_GRACE`], so
/// a slow run is answered with a 202 job handle rather than a 408.
pub fn request_timeout(config: &ServerConfig) -> Duration {
    let configured = Duration::from_secs(config.request_timeout_secs);
    let polling = config
        .poll
        .interval
        .saturating_mul(config.poll.max_attempts)
        .saturating_add(RUN_GRACE);

    if configured < polling {
        tracing::warn!(
            configured_secs = configured.as_secs(),
            effective_secs = polling.as_secs(),
            "Request timeout shorter than the polling window, extending it",
        );
        polling
    } else {
        configured
    }
}

/// CORS for the configured origins.
///
/// Origins that fail to parse are logged and skipped. The request id is
/// exposed so browser clients can quote it.
pub fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(origin) => Some(origin),
            Err(e) => {
                tracing::warn!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([CONTENT_TYPE])
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
        .max_age(Duration::from_secs(3600))
}
