//! Unified job status from the live queue and persistent history.
//!
//! Queue membership is authoritative: a job that is queued or running is
//! reported as such even if history already mentions it. History is only
//! consulted for jobs absent from the queue.

use std::sync::Arc;

use comfybridge_core::job::{JobHandle, JobStatus};
use serde::Serialize;
use serde_json::Value;

use crate::backend::ExecutionBackend;
use crate::diagnostics::extract_diagnostics;
use crate::history::HistoryEntry;

/// Maximum number of known ids listed with a `not_found` answer.
const KNOWN_ID_SAMPLE: usize = 10;

/// Snapshot of the backend queue.
///
/// Each entry has the shape `[number, prompt_id, graph, ...]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueSnapshot {
    pub running: Vec<Value>,
    pub pending: Vec<Value>,
}

impl QueueSnapshot {
    pub fn from_value(value: &Value) -> Self {
        let list = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };
        Self {
            running: list("queue_running"),
            pending: list("queue_pending"),
        }
    }

    /// Prompt ids of running jobs, in queue order.
    pub fn running_ids(&self) -> Vec<String> {
        self.running.iter().filter_map(entry_prompt_id).map(str::to_string).collect()
    }

    /// Prompt ids of pending jobs, in queue order.
    pub fn pending_ids(&self) -> Vec<String> {
        self.pending.iter().filter_map(entry_prompt_id).map(str::to_string).collect()
    }
}

fn entry_prompt_id(entry: &Value) -> Option<&str> {
    entry.as_array()?.get(1)?.as_str()
}

/// Summary returned by the queue status tool.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub running: Vec<String>,
    pub pending: Vec<String>,
    pub running_count: usize,
    pub pending_count: usize,
    /// Entries exactly as ComfyUI reported them.
    pub queue_running: Vec<Value>,
    pub queue_pending: Vec<Value>,
}

impl From<&QueueSnapshot> for QueueStatus {
    fn from(snapshot: &QueueSnapshot) -> Self {
        let running = snapshot.running_ids();
        let pending = snapshot.pending_ids();
        Self {
            running_count: running.len(),
            pending_count: pending.len(),
            running,
            pending,
            queue_running: snapshot.running.clone(),
            queue_pending: snapshot.pending.clone(),
        }
    }
}

/// Merge a queue snapshot and a history lookup into one status.
///
/// `queue` is `None` when the queue could not be fetched; `history` is
/// `Err(reason)` when the history lookup failed.
pub fn merge_job_status(
    job_id: &str,
    queue: Option<&QueueSnapshot>,
    history: Result<&Value, String>,
) -> JobHandle {
    if job_id.trim().is_empty() {
        let mut handle = JobHandle::new(job_id, JobStatus::Error, "Invalid prompt_id: empty");
        handle.error = Some(Value::String("Invalid prompt_id: empty or missing".to_string()));
        return handle;
    }

    if let Some(queue) = queue {
        if let Some(entry) = queue
            .running
            .iter()
            .find(|e| entry_prompt_id(e) == Some(job_id))
        {
            let mut handle = JobHandle::new(job_id, JobStatus::Running, "Job is currently running");
            handle.execution_id = entry.as_array().and_then(|a| a.first()).cloned();
            return handle;
        }

        if let Some(index) = queue
            .pending
            .iter()
            .position(|e| entry_prompt_id(e) == Some(job_id))
        {
            let mut handle =
                JobHandle::new(job_id, JobStatus::Queued, "Job is queued and waiting to run");
            handle.position = Some(index + 1);
            return handle;
        }
    }

    let history = match history {
        Ok(history) => history,
        Err(reason) => {
            let mut handle = JobHandle::new(
                job_id,
                JobStatus::Error,
                "Could not check job status - ComfyUI may be unavailable",
            );
            handle.error = Some(Value::String(format!("Failed to retrieve history: {reason}")));
            return handle;
        }
    };

    let Some(entry) = history.get(job_id).filter(|e| e.is_object()) else {
        return not_found(job_id, history);
    };

    let failed = HistoryEntry::from_value(entry).is_some_and(|e| e.is_failed());
    if failed {
        let diagnostics = extract_diagnostics(entry);
        let mut handle = JobHandle::new(
            job_id,
            JobStatus::Error,
            format!("Job failed with error: {diagnostics}"),
        );
        handle.error = Some(
            entry
                .get("error")
                .filter(|e| !e.is_null())
                .cloned()
                .unwrap_or_else(|| Value::String(diagnostics)),
        );
        handle.history = Some(entry.clone());
        return handle;
    }

    let outputs = entry
        .get("outputs")
        .filter(|o| o.as_object().is_some_and(|m| !m.is_empty()));
    if let Some(outputs) = outputs {
        let mut handle = JobHandle::new(job_id, JobStatus::Completed, "Job completed successfully");
        handle.outputs = Some(outputs.clone());
        handle.history = Some(entry.clone());
        return handle;
    }

    let mut handle = JobHandle::new(
        job_id,
        JobStatus::Processing,
        "Job completed but outputs not yet available",
    );
    handle.history = Some(entry.clone());
    handle
}

fn not_found(job_id: &str, history: &Value) -> JobHandle {
    match history.as_object().filter(|m| !m.is_empty()) {
        Some(known) => {
            let mut handle = JobHandle::new(
                job_id,
                JobStatus::NotFound,
                "Prompt ID not found in ComfyUI history. It may not have been submitted yet, \
                 or ComfyUI may have been restarted.",
            );
            handle.available_prompt_ids =
                Some(known.keys().take(KNOWN_ID_SAMPLE).cloned().collect());
            handle
        }
        None => JobHandle::new(
            job_id,
            JobStatus::NotFound,
            "Prompt ID not found. ComfyUI history is empty or the job hasn't been recorded.",
        ),
    }
}

/// Gathers queue and history from the backend and merges them.
#[derive(Clone)]
pub struct JobStatusResolver {
    backend: Arc<dyn ExecutionBackend>,
}

impl JobStatusResolver {
    pub fn new(backend: Arc<dyn ExecutionBackend>) -> Self {
        Self { backend }
    }

    pub async fn queue_snapshot(&self) -> Result<QueueSnapshot, crate::api::ComfyUIApiError> {
        Ok(QueueSnapshot::from_value(&self.backend.queue().await?))
    }

    pub async fn resolve(&self, job_id: &str) -> JobHandle {
        if job_id.trim().is_empty() {
            return merge_job_status(job_id, None, Ok(&Value::Null));
        }

        let queue = match self.queue_snapshot().await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(prompt_id = job_id, error = %e, "Queue check failed, using history only");
                None
            }
        };

        let in_queue = queue.as_ref().is_some_and(|q| {
            q.running
                .iter()
                .chain(q.pending.iter())
                .any(|e| entry_prompt_id(e) == Some(job_id))
        });
        if in_queue {
            return merge_job_status(job_id, queue.as_ref(), Ok(&Value::Null));
        }

        let history = self.backend.history(Some(job_id)).await;
        if let Err(e) = &history {
            tracing::warn!(prompt_id = job_id, error = %e, "History lookup failed");
        }
        merge_job_status(
            job_id,
            queue.as_ref(),
            history.as_ref().map_err(|e| e.to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use serde_json::json;

    use super::*;
    use crate::fake::FakeBackend;

    fn queue(running: Value, pending: Value) -> QueueSnapshot {
        QueueSnapshot::from_value(&json!({ "queue_running": running, "queue_pending": pending }))
    }

    fn completed_history(id: &str) -> Value {
        json!({ id: { "outputs": { "9": { "images": [{ "filename": "a.png" }] } }, "status": {} } })
    }

    // -- merge_job_status -----------------------------------------------------

    #[test]
    fn blank_id_is_an_error() {
        let handle = merge_job_status("  ", None, Ok(&json!({})));
        assert_eq!(handle.status, JobStatus::Error);
    }

    #[test]
    fn running_queue_wins_over_completed_history() {
        let q = queue(json!([[7, "abc", {}]]), json!([]));
        let history = completed_history("abc");
        let handle = merge_job_status("abc", Some(&q), Ok(&history));
        assert_eq!(handle.status, JobStatus::Running);
        assert_eq!(handle.execution_id, Some(json!(7)));
    }

    #[test]
    fn pending_position_is_one_based() {
        let q = queue(json!([]), json!([[1, "first"], [2, "second"]]));
        let handle = merge_job_status("second", Some(&q), Ok(&json!({})));
        assert_eq!(handle.status, JobStatus::Queued);
        assert_eq!(handle.position, Some(2));
    }

    #[test]
    fn history_states() {
        let completed = completed_history("a");
        assert_eq!(merge_job_status("a", None, Ok(&completed)).status, JobStatus::Completed);

        let errored = json!({ "a": { "error": { "message": "boom" }, "outputs": {} } });
        let handle = merge_job_status("a", None, Ok(&errored));
        assert_eq!(handle.status, JobStatus::Error);
        assert!(handle.message.contains("boom"));

        let processing = json!({ "a": { "outputs": {}, "status": {} } });
        assert_eq!(merge_job_status("a", None, Ok(&processing)).status, JobStatus::Processing);
    }

    #[test]
    fn node_failure_in_status_block_is_an_error() {
        let history = json!({
            "a": {
                "outputs": {},
                "status": {
                    "status_str": "error",
                    "completed": false,
                    "messages": [["execution_error", {
                        "node_id": "3", "node_type": "KSampler",
                        "exception_type": "RuntimeError", "exception_message": "OOM"
                    }]]
                }
            }
        });
        let handle = merge_job_status("a", None, Ok(&history));
        assert_eq!(handle.status, JobStatus::Error);
        assert_eq!(
            handle.message,
            "Job failed with error: Node 3 (KSampler): RuntimeError: OOM"
        );
        assert_eq!(handle.error, Some(json!("Node 3 (KSampler): RuntimeError: OOM")));
        assert!(crate::executor::classify_entry(&history["a"]).is_some());
    }

    #[test]
    fn not_found_lists_known_ids() {
        let mut history = serde_json::Map::new();
        for i in 0..15 {
            history.insert(format!("id{i:02}"), json!({ "outputs": {} }));
        }
        let history = Value::Object(history);
        let handle = merge_job_status("missing", None, Ok(&history));
        assert_eq!(handle.status, JobStatus::NotFound);
        assert_eq!(handle.available_prompt_ids.unwrap().len(), 10);

        let empty = merge_job_status("missing", None, Ok(&json!({})));
        assert_eq!(empty.status, JobStatus::NotFound);
        assert!(empty.available_prompt_ids.is_none());
    }

    #[test]
    fn history_failure_is_error() {
        let handle = merge_job_status("a", None, Err("connection refused".to_string()));
        assert_eq!(handle.status, JobStatus::Error);
        assert_eq!(
            handle.error,
            Some(json!("Failed to retrieve history: connection refused"))
        );
    }

    #[test]
    fn queue_status_summary() {
        let q = queue(json!([[3, "r1"]]), json!([[4, "p1"], [5, "p2"], "garbage"]));
        let status = QueueStatus::from(&q);
        assert_eq!(status.running, vec!["r1"]);
        assert_eq!(status.pending, vec!["p1", "p2"]);
        assert_eq!(status.pending_count, 2);
        assert_eq!(status.queue_running, vec![json!([3, "r1"])]);
        assert_eq!(status.queue_pending.len(), 3);
        assert_eq!(status.queue_pending[2], json!("garbage"));
    }

    // -- resolver -------------------------------------------------------------

    #[tokio::test]
    async fn resolver_skips_history_for_queued_jobs() {
        let backend = Arc::new(
            FakeBackend::new("p").with_queue(Some(json!({ "queue_running": [], "queue_pending": [[1, "abc"]] }))),
        );
        let resolver = JobStatusResolver::new(backend.clone());
        let handle = resolver.resolve("abc").await;
        assert_eq!(handle.status, JobStatus::Queued);
        assert_eq!(backend.history_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resolver_degrades_to_history_when_queue_fails() {
        let backend = Arc::new(
            FakeBackend::new("p")
                .with_queue(None)
                .with_history(vec![Some(completed_history("abc"))]),
        );
        let handle = JobStatusResolver::new(backend).resolve("abc").await;
        assert_eq!(handle.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn resolver_reports_history_failure() {
        let backend = Arc::new(FakeBackend::new("p").with_history(vec![None]));
        let handle = JobStatusResolver::new(backend).resolve("abc").await;
        assert_eq!(handle.status, JobStatus::Error);
        assert!(handle.error.is_some());
    }
}
