//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps the ComfyUI HTTP API (workflow submission, queue and history
//! inspection, cancellation, model listing, file download) using
//! [`reqwest`].

use std::time::Duration;

use serde::Deserialize;

/// Timeout for the startup capability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Node class whose `object_info` doubles as readiness probe and
/// checkpoint listing.
const CHECKPOINT_LOADER: &str = "CheckpointLoaderSimple";

/// HTTP client for a single ComfyUI instance.
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
    client_id: String,
}

/// Response returned by the ComfyUI `/prompt` endpoint after
/// successfully queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
    /// Position in the execution queue.
    #[serde(default)]
    pub number: i64,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// ComfyUI answered 2xx with a body of an unexpected shape.
    #[error("Unexpected ComfyUI response: {0}")]
    UnexpectedResponse(String),
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Client identifier sent with every submission.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Submit a workflow for execution.
    ///
    /// Sends a `POST /prompt` request with the given workflow JSON and
    /// client ID. Returns the server-assigned `prompt_id` and queue
    /// position. Validation failures reported by ComfyUI (`node_errors`)
    /// surface as [`ComfyUIApiError::ApiError`] with the raw body.
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": self.client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Remove a prompt from the pending queue.
    ///
    /// Sends `POST /queue {"delete": [prompt_id]}`. Running prompts are
    /// not affected; use [`interrupt`](Self::interrupt) for those.
    pub async fn cancel_execution(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        let body = serde_json::json!({
            "delete": [prompt_id],
        });

        let response = self
            .client
            .post(format!("{}/queue", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Interrupt whatever is executing right now.
    pub async fn interrupt(&self) -> Result<(), ComfyUIApiError> {
        let response = self
            .client
            .post(format!("{}/interrupt", self.api_url))
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Retrieve execution history.
    ///
    /// With a prompt id, sends `GET /history/{prompt_id}` and returns
    /// `{prompt_id: entry}` (or `{}` when unknown). Without one, returns the
    /// full history map.
    pub async fn get_history(
        &self,
        prompt_id: Option<&str>,
    ) -> Result<serde_json::Value, ComfyUIApiError> {
        let url = match prompt_id {
            Some(id) => format!("{}/history/{}", self.api_url, id),
            None => format!("{}/history", self.api_url),
        };
        let response = self.client.get(url).send().await?;

        Self::parse_response(response).await
    }

    /// Retrieve the live queue (`queue_running` / `queue_pending`).
    pub async fn get_queue(&self) -> Result<serde_json::Value, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/queue", self.api_url))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Capability probe used by the startup readiness wait.
    ///
    /// Succeeds only when `GET /object_info/CheckpointLoaderSimple` answers
    /// 2xx with an object describing the loader.
    pub async fn probe(&self) -> Result<(), ComfyUIApiError> {
        let info = self.checkpoint_loader_info(Some(PROBE_TIMEOUT)).await?;
        if info.is_object() {
            Ok(())
        } else {
            Err(ComfyUIApiError::UnexpectedResponse(format!(
                "missing '{CHECKPOINT_LOADER}' in object_info"
            )))
        }
    }

    /// List checkpoint file names known to the loader node.
    pub async fn list_checkpoints(&self) -> Result<Vec<String>, ComfyUIApiError> {
        let info = self.checkpoint_loader_info(None).await?;
        let names = info
            .pointer("/input/required/ckpt_name/0")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                ComfyUIApiError::UnexpectedResponse("checkpoint list not found".to_string())
            })?;

        Ok(names
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }

    /// Download a produced file via `GET /view`.
    pub async fn view(
        &self,
        filename: &str,
        subfolder: &str,
        folder_type: &str,
    ) -> Result<Vec<u8>, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&[
                ("filename", filename),
                ("subfolder", subfolder),
                ("type", folder_type),
            ])
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ---- private helpers ----

    async fn checkpoint_loader_info(
        &self,
        timeout: Option<Duration>,
    ) -> Result<serde_json::Value, ComfyUIApiError> {
        let mut request = self
            .client
            .get(format!("{}/object_info/{CHECKPOINT_LOADER}", self.api_url));
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let mut body: serde_json::Value = Self::parse_response(request.send().await?).await?;
        Ok(body
            .get_mut(CHECKPOINT_LOADER)
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null))
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ComfyUIApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}
