/// Domain errors raised by the core components.
///
/// Expected, recoverable conditions (unmatched overrides, unavailable
/// models, jobs still running) are modelled as values elsewhere and never
/// appear here.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Missing required parameter '{parameter}' for workflow '{workflow_id}'")]
    MissingParameter {
        workflow_id: String,
        parameter: String,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
