use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use comfybridge_comfyui::api::ComfyUIApi;
use comfybridge_comfyui::backend::ExecutionBackend;
use comfybridge_comfyui::readiness::wait_ready;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use comfybridge_api::background::asset_sweeper;
use comfybridge_api::config::ServerConfig;
use comfybridge_api::router::build_app_router;
use comfybridge_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "comfybridge_api=debug,comfybridge_comfyui=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = config.port,
        comfyui_url = %config.comfyui_url,
        workflow_dir = %config.workflow_dir.display(),
        "Loaded server configuration",
    );

    // --- ComfyUI readiness ---
    let backend: Arc<dyn ExecutionBackend> = Arc::new(ComfyUIApi::new(config.comfyui_url.clone()));
    let shutdown = CancellationToken::new();

    let ready = tokio::select! {
        ready = wait_ready(backend.as_ref(), &config.readiness, &shutdown) => ready,
        () = shutdown_signal() => {
            shutdown.cancel();
            false
        }
    };
    if !ready {
        tracing::error!(
            comfyui_url = %config.comfyui_url,
            "ComfyUI is not available, refusing to start",
        );
        std::process::exit(1);
    }

    // --- App state ---
    let state = AppState::new(config.clone(), backend);

    let tools = state.templates.scan();
    tracing::info!(count = tools.len(), "Workflow tools registered");

    match state.refresh_models().await {
        Ok(models) => tracing::info!(count = models.len(), "Model catalog loaded"),
        Err(e) => tracing::warn!(error = %e, "Could not list models, model validation disabled"),
    }

    // --- Background tasks ---
    let sweeper_handle = tokio::spawn(asset_sweeper::run(
        Arc::clone(&state.assets),
        Duration::from_secs(config.asset_sweep_interval_secs.max(1)),
        shutdown.clone(),
    ));

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    shutdown.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), sweeper_handle).await;
    tracing::info!("Asset sweeper stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
