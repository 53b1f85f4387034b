//! Scriptable in-memory backend for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use comfybridge_core::workflow::WorkflowGraph;
use serde_json::{json, Value};

use crate::api::ComfyUIApiError;
use crate::backend::ExecutionBackend;
use crate::history::OutputFile;

fn unavailable() -> ComfyUIApiError {
    ComfyUIApiError::ApiError {
        status: 503,
        body: "unavailable".to_string(),
    }
}

#[derive(Default)]
pub struct FakeBackend {
    pub probe_failures: AtomicU32,
    pub probe_calls: AtomicU32,
    pub history_calls: AtomicU32,
    pub reject_submit: bool,
    pub prompt_id: String,
    /// Successive history responses; the last one repeats. `None` is a
    /// transport failure.
    pub history: Mutex<VecDeque<Option<Value>>>,
    /// `None` makes the queue endpoint fail.
    pub queue: Mutex<Option<Value>>,
    pub submitted: Mutex<Vec<WorkflowGraph>>,
    pub cancelled: Mutex<Vec<String>>,
    pub view_bytes: Option<Vec<u8>>,
}

impl FakeBackend {
    pub fn new(prompt_id: &str) -> Self {
        Self {
            prompt_id: prompt_id.to_string(),
            queue: Mutex::new(Some(json!({ "queue_running": [], "queue_pending": [] }))),
            ..Default::default()
        }
    }

    pub fn with_history(self, responses: Vec<Option<Value>>) -> Self {
        *self.history.lock().unwrap() = responses.into();
        self
    }

    pub fn with_queue(self, queue: Option<Value>) -> Self {
        *self.queue.lock().unwrap() = queue;
        self
    }
}

#[async_trait]
impl ExecutionBackend for FakeBackend {
    async fn probe(&self) -> Result<(), ComfyUIApiError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.probe_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.probe_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(unavailable());
        }
        Ok(())
    }

    async fn submit(&self, graph: &WorkflowGraph) -> Result<String, ComfyUIApiError> {
        if self.reject_submit {
            return Err(ComfyUIApiError::ApiError {
                status: 400,
                body: r#"{"error":"invalid prompt"}"#.to_string(),
            });
        }
        self.submitted.lock().unwrap().push(graph.clone());
        Ok(self.prompt_id.clone())
    }

    async fn history(&self, _prompt_id: Option<&str>) -> Result<Value, ComfyUIApiError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let mut queue = self.history.lock().unwrap();
        let next = if queue.len() > 1 {
            queue.pop_front().flatten()
        } else {
            queue.front().cloned().unwrap_or(Some(json!({})))
        };
        next.ok_or_else(unavailable)
    }

    async fn queue(&self) -> Result<Value, ComfyUIApiError> {
        self.queue.lock().unwrap().clone().ok_or_else(unavailable)
    }

    async fn cancel(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        self.cancelled.lock().unwrap().push(prompt_id.to_string());
        Ok(())
    }

    async fn interrupt(&self) -> Result<(), ComfyUIApiError> {
        Ok(())
    }

    async fn list_checkpoints(&self) -> Result<Vec<String>, ComfyUIApiError> {
        Ok(vec!["sd15.safetensors".to_string()])
    }

    async fn view(&self, _file: &OutputFile) -> Result<Vec<u8>, ComfyUIApiError> {
        self.view_bytes.clone().ok_or_else(unavailable)
    }
}
