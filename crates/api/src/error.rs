use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use comfybridge_comfyui::api::ComfyUIApiError;
use comfybridge_comfyui::executor::ExecutionError;
use comfybridge_core::error::CoreError;
use comfybridge_core::models::ModelSource;
use serde_json::{json, Value};

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and the ComfyUI errors raised while
/// talking to the backend. Implements [`IntoResponse`] to produce consistent
/// JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `comfybridge_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Submission or execution of a workflow failed.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// A direct backend call (queue, cancel, model listing) failed.
    #[error("ComfyUI request failed: {0}")]
    Backend(#[from] ComfyUIApiError),

    /// The requested checkpoint is not installed on the backend.
    #[error("Model '{model}' is not available")]
    ModelUnavailable {
        model: String,
        model_source: ModelSource,
        sample: Vec<String>,
    },

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut details: Option<Value> = None;

        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::MissingParameter { .. } => {
                    (StatusCode::BAD_REQUEST, "MISSING_PARAMETER", core.to_string())
                }
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            // --- Backend errors ---
            AppError::Execution(err) => match err {
                ExecutionError::Submission(_) => {
                    (StatusCode::BAD_GATEWAY, "SUBMISSION_ERROR", err.to_string())
                }
                ExecutionError::Execution { prompt_id, .. }
                | ExecutionError::NoOutputs { prompt_id } => {
                    details = Some(json!({ "prompt_id": prompt_id }));
                    (StatusCode::BAD_GATEWAY, "EXECUTION_ERROR", err.to_string())
                }
            },
            AppError::Backend(err) => {
                tracing::warn!(error = %err, "ComfyUI request failed");
                (StatusCode::BAD_GATEWAY, "BACKEND_ERROR", self.to_string())
            }
            AppError::ModelUnavailable {
                model,
                model_source,
                sample,
            } => {
                let origin = match model_source {
                    ModelSource::Argument => "requested",
                    ModelSource::Default => "default",
                };
                details = Some(json!({
                    "model": model,
                    "source": model_source,
                    "available_models": sample,
                }));
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "MODEL_UNAVAILABLE",
                    format!("The {origin} model '{model}' is not installed in ComfyUI"),
                )
            }

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let Some(details) = details {
            body["details"] = details;
        }

        (status, axum::Json(body)).into_response()
    }
}
