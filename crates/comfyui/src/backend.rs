//! The execution backend seam.
//!
//! Everything that talks to ComfyUI goes through [`ExecutionBackend`], so
//! the executor and resolver can run against an in-memory backend in tests.

use async_trait::async_trait;
use comfybridge_core::workflow::WorkflowGraph;
use serde_json::Value;

use crate::api::{ComfyUIApi, ComfyUIApiError};
use crate::history::OutputFile;

#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Capability probe; `Ok` means the backend is ready for work.
    async fn probe(&self) -> Result<(), ComfyUIApiError>;

    /// Queue a graph. Returns the backend job id.
    async fn submit(&self, graph: &WorkflowGraph) -> Result<String, ComfyUIApiError>;

    /// History for one job (`{id: entry}`) or for all jobs.
    async fn history(&self, prompt_id: Option<&str>) -> Result<Value, ComfyUIApiError>;

    /// Live queue snapshot.
    async fn queue(&self) -> Result<Value, ComfyUIApiError>;

    async fn cancel(&self, prompt_id: &str) -> Result<(), ComfyUIApiError>;

    async fn interrupt(&self) -> Result<(), ComfyUIApiError>;

    async fn list_checkpoints(&self) -> Result<Vec<String>, ComfyUIApiError>;

    /// Raw bytes of a produced file.
    async fn view(&self, file: &OutputFile) -> Result<Vec<u8>, ComfyUIApiError>;
}

#[async_trait]
impl ExecutionBackend for ComfyUIApi {
    async fn probe(&self) -> Result<(), ComfyUIApiError> {
        ComfyUIApi::probe(self).await
    }

    async fn submit(&self, graph: &WorkflowGraph) -> Result<String, ComfyUIApiError> {
        let workflow = serde_json::to_value(graph)
            .map_err(|e| ComfyUIApiError::UnexpectedResponse(format!("unserializable graph: {e}")))?;
        let response = self.submit_workflow(&workflow).await?;
        tracing::info!(
            prompt_id = %response.prompt_id,
            queue_number = response.number,
            "Workflow submitted",
        );
        Ok(response.prompt_id)
    }

    async fn history(&self, prompt_id: Option<&str>) -> Result<Value, ComfyUIApiError> {
        self.get_history(prompt_id).await
    }

    async fn queue(&self) -> Result<Value, ComfyUIApiError> {
        self.get_queue().await
    }

    async fn cancel(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        self.cancel_execution(prompt_id).await
    }

    async fn interrupt(&self) -> Result<(), ComfyUIApiError> {
        ComfyUIApi::interrupt(self).await
    }

    async fn list_checkpoints(&self) -> Result<Vec<String>, ComfyUIApiError> {
        ComfyUIApi::list_checkpoints(self).await
    }

    async fn view(&self, file: &OutputFile) -> Result<Vec<u8>, ComfyUIApiError> {
        ComfyUIApi::view(self, &file.filename, &file.subfolder, &file.folder_type).await
    }
}
