//! Job lifecycle as reported to callers.

use serde::Serialize;
use serde_json::Value;

/// Lifecycle status of a submitted job.
///
/// `queued -> running -> completed | error`, with `processing` covering the
/// window where history has an entry but outputs are not yet written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Processing,
    Completed,
    Error,
    NotFound,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

/// Unified status record for a backend job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobHandle {
    pub prompt_id: String,
    pub status: JobStatus,
    pub message: String,
    /// 1-based position in the pending queue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_prompt_ids: Option<Vec<String>>,
}

impl JobHandle {
    pub fn new(prompt_id: impl Into<String>, status: JobStatus, message: impl Into<String>) -> Self {
        Self {
            prompt_id: prompt_id.into(),
            status,
            message: message.into(),
            position: None,
            execution_id: None,
            outputs: None,
            error: None,
            history: None,
            available_prompt_ids: None,
        }
    }

    /// Handle returned when a run outlives its polling window.
    pub fn pending(prompt_id: impl Into<String>) -> Self {
        let prompt_id = prompt_id.into();
        let message = format!(
            "Job is still running. Poll GET /api/v1/jobs/{prompt_id} (get_job) to check completion."
        );
        Self::new(prompt_id, JobStatus::Running, message)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn pending_handle_points_at_get_job() {
        let handle = JobHandle::pending("abc");
        assert_eq!(handle.status, JobStatus::Running);
        assert!(handle.message.contains("get_job"));
        assert!(handle.message.contains("abc"));
    }

    #[test]
    fn serialization_skips_absent_fields() {
        let value = serde_json::to_value(JobHandle::pending("abc")).unwrap();
        assert_eq!(value["status"], "running");
        assert_eq!(value["prompt_id"], "abc");
        assert!(value.get("position").is_none());
        assert!(value.get("history").is_none());
    }

    #[test]
    fn not_found_serializes_snake_case() {
        let mut handle = JobHandle::new("x", JobStatus::NotFound, "missing");
        handle.available_prompt_ids = Some(vec!["a".into()]);
        let value = serde_json::to_value(handle).unwrap();
        assert_eq!(value["status"], "not_found");
        assert_eq!(value["available_prompt_ids"], json!(["a"]));
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
    }
}
