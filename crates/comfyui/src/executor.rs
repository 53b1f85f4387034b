//! Submit-and-wait execution of rendered graphs.
//!
//! A run submits once, then polls `/history/{id}` a bounded number of
//! times. Outliving the polling window is not an error: the caller gets a
//! pending [`JobHandle`] and resolves it later.

use std::sync::Arc;
use std::time::Duration;

use comfybridge_core::job::JobHandle;
use comfybridge_core::workflow::WorkflowGraph;
use serde_json::Value;

use crate::api::ComfyUIApiError;
use crate::backend::ExecutionBackend;
use crate::diagnostics::{extract_diagnostics, has_status_message};
use crate::history::{select_output, HistoryEntry, OutputFile, EXECUTION_SUCCESS};

/// Bounds for history polling.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub max_attempts: u32,
    /// Sleep between attempts.
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(1),
        }
    }
}

/// Errors raised while running a workflow.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// The backend refused or never received the graph.
    #[error("Failed to submit workflow: {0}")]
    Submission(#[source] ComfyUIApiError),

    /// The backend ran the graph and reported a failure.
    #[error("Workflow execution failed for prompt {prompt_id}: {diagnostics}")]
    Execution {
        prompt_id: String,
        diagnostics: String,
    },

    /// The run completed but produced no file output.
    #[error("Workflow completed but produced no outputs (prompt {prompt_id})")]
    NoOutputs { prompt_id: String },
}

/// Terminal state observed in history.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalResult {
    Success { entry: Value },
    Failure { entry: Value, diagnostics: String },
}

/// A finished run and the file chosen as its primary output.
#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub prompt_id: String,
    pub output: OutputFile,
    /// History entry for the prompt.
    pub history: Value,
    pub submitted_workflow: WorkflowGraph,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(CompletedRun),
    Pending(JobHandle),
}

/// Classify a history entry as terminal or still in flight.
///
/// Failure wins over success: an `execution_error` message, a
/// `status_str` of `error`, or a top-level `error` field. Success needs
/// outputs plus an `execution_success` message, a completed status, or no
/// status block at all.
pub fn classify_entry(entry_value: &Value) -> Option<TerminalResult> {
    let entry = HistoryEntry::from_value(entry_value)?;
    let messages = Some(entry.messages());

    if entry.is_failed() {
        return Some(TerminalResult::Failure {
            entry: entry_value.clone(),
            diagnostics: extract_diagnostics(entry_value),
        });
    }

    let finished = match entry.status.as_ref() {
        None => true,
        Some(status) => {
            has_status_message(messages, EXECUTION_SUCCESS)
                || status.completed == Some(true)
                || status.status_str.as_deref() == Some("success")
        }
    };
    if finished && entry.has_outputs() {
        return Some(TerminalResult::Success {
            entry: entry_value.clone(),
        });
    }
    None
}

/// Drives runs against an [`ExecutionBackend`].
#[derive(Clone)]
pub struct WorkflowExecutor {
    backend: Arc<dyn ExecutionBackend>,
    poll: PollConfig,
}

impl WorkflowExecutor {
    pub fn new(backend: Arc<dyn ExecutionBackend>, poll: PollConfig) -> Self {
        Self { backend, poll }
    }

    pub fn backend(&self) -> &Arc<dyn ExecutionBackend> {
        &self.backend
    }

    /// Queue a graph once. Never retried.
    pub async fn submit(&self, graph: &WorkflowGraph) -> Result<String, ExecutionError> {
        self.backend.submit(graph).await.map_err(|e| {
            tracing::error!(error = %e, "Workflow submission failed");
            ExecutionError::Submission(e)
        })
    }

    /// Poll history until the prompt reaches a terminal state.
    ///
    /// Returns `None` once `config.max_attempts` polls passed without one.
    /// Transport errors count as non-terminal attempts.
    pub async fn poll(&self, prompt_id: &str, config: &PollConfig) -> Option<TerminalResult> {
        for attempt in 1..=config.max_attempts {
            match self.backend.history(Some(prompt_id)).await {
                Ok(history) => {
                    if let Some(result) = history.get(prompt_id).and_then(classify_entry) {
                        tracing::debug!(prompt_id, attempt, "Prompt reached terminal state");
                        return Some(result);
                    }
                }
                Err(e) => {
                    tracing::warn!(prompt_id, attempt, error = %e, "History poll failed");
                }
            }

            if attempt < config.max_attempts && !config.interval.is_zero() {
                tokio::time::sleep(config.interval).await;
            }
        }

        tracing::info!(
            prompt_id,
            attempts = config.max_attempts,
            "Prompt still running after polling window",
        );
        None
    }

    /// Submit, wait, and pick the primary output.
    pub async fn run(
        &self,
        graph: WorkflowGraph,
        preferences: &[String],
    ) -> Result<RunOutcome, ExecutionError> {
        let prompt_id = self.submit(&graph).await?;

        let Some(result) = self.poll(&prompt_id, &self.poll).await else {
            return Ok(RunOutcome::Pending(JobHandle::pending(prompt_id)));
        };

        let entry = match result {
            TerminalResult::Success { entry } => entry,
            TerminalResult::Failure { diagnostics, .. } => {
                tracing::error!(prompt_id = %prompt_id, %diagnostics, "Workflow execution failed");
                return Err(ExecutionError::Execution {
                    prompt_id,
                    diagnostics,
                });
            }
        };

        let outputs = entry
            .get("outputs")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let Some(output) = select_output(&outputs, preferences) else {
            return Err(ExecutionError::NoOutputs { prompt_id });
        };

        tracing::info!(prompt_id = %prompt_id, filename = %output.filename, "Workflow completed");
        Ok(RunOutcome::Completed(CompletedRun {
            prompt_id,
            output,
            history: entry,
            submitted_workflow: graph,
        }))
    }
}
