use std::sync::Arc;

use comfybridge_comfyui::api::ComfyUIApiError;
use comfybridge_comfyui::backend::ExecutionBackend;
use comfybridge_comfyui::executor::WorkflowExecutor;
use comfybridge_comfyui::resolver::JobStatusResolver;
use comfybridge_core::asset_registry::AssetRegistry;
use comfybridge_core::defaults::NamespaceDefaults;
use comfybridge_core::models::ModelCatalog;
use comfybridge_core::render::RenderEngine;
use comfybridge_core::template_store::TemplateStore;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// ComfyUI connection used by every backend call.
    pub backend: Arc<dyn ExecutionBackend>,
    /// Workflow template cache.
    pub templates: Arc<TemplateStore>,
    pub renderer: Arc<RenderEngine>,
    /// Layered per-namespace defaults (shared with the renderer).
    pub defaults: Arc<NamespaceDefaults>,
    /// Checkpoints last reported by ComfyUI.
    pub models: Arc<ModelCatalog>,
    /// Produced artifacts.
    pub assets: Arc<AssetRegistry>,
    pub executor: WorkflowExecutor,
    pub resolver: JobStatusResolver,
}

impl AppState {
    /// Wire every component from configuration around one backend.
    pub fn new(config: ServerConfig, backend: Arc<dyn ExecutionBackend>) -> Self {
        let defaults = Arc::new(NamespaceDefaults::with_configured_models(
            config.default_models.clone(),
        ));
        let ttl = chrono::Duration::hours(config.asset_ttl_hours);

        Self {
            templates: Arc::new(TemplateStore::new(config.workflow_dir.clone())),
            renderer: Arc::new(RenderEngine::new(Arc::clone(&defaults))),
            defaults,
            models: Arc::new(ModelCatalog::new()),
            assets: Arc::new(AssetRegistry::new(config.comfyui_url.clone(), ttl)),
            executor: WorkflowExecutor::new(Arc::clone(&backend), config.poll.clone()),
            resolver: JobStatusResolver::new(Arc::clone(&backend)),
            backend,
            config: Arc::new(config),
        }
    }

    /// Reload the model catalog from the backend.
    ///
    /// On failure the previous catalog is kept and the error returned.
    pub async fn refresh_models(&self) -> Result<Vec<String>, ComfyUIApiError> {
        let models = self.backend.list_checkpoints().await?;
        self.models.refresh(models);
        Ok(self.models.list())
    }
}
