#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use comfybridge_api::config::ServerConfig;
use comfybridge_api::router::build_app_router;
use comfybridge_api::state::AppState;
use comfybridge_comfyui::api::ComfyUIApiError;
use comfybridge_comfyui::backend::ExecutionBackend;
use comfybridge_comfyui::history::OutputFile;
use comfybridge_core::workflow::WorkflowGraph;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

pub const CHECKPOINT: &str = "sd15.safetensors";

fn unavailable() -> ComfyUIApiError {
    ComfyUIApiError::ApiError {
        status: 503,
        body: "unavailable".to_string(),
    }
}

/// In-memory ComfyUI. With `complete_runs` set, every submission finishes
/// immediately with one PNG output named after its prompt id.
pub struct FakeBackend {
    pub healthy: AtomicBool,
    pub complete_runs: AtomicBool,
    pub reject_submit: AtomicBool,
    pub queue_unavailable: AtomicBool,
    counter: AtomicU32,
    pub history: Mutex<HashMap<String, Value>>,
    pub queue: Mutex<Value>,
    pub checkpoints: Mutex<Vec<String>>,
    pub submitted: Mutex<Vec<WorkflowGraph>>,
    pub cancelled: Mutex<Vec<String>>,
    pub interrupts: AtomicU32,
    /// Bytes served for every output file; `None` makes downloads fail.
    pub view_bytes: Mutex<Option<Vec<u8>>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            complete_runs: AtomicBool::new(true),
            reject_submit: AtomicBool::new(false),
            queue_unavailable: AtomicBool::new(false),
            counter: AtomicU32::new(0),
            history: Mutex::new(HashMap::new()),
            queue: Mutex::new(json!({ "queue_running": [], "queue_pending": [] })),
            checkpoints: Mutex::new(vec![CHECKPOINT.to_string()]),
            submitted: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            interrupts: AtomicU32::new(0),
            view_bytes: Mutex::new(None),
        }
    }
}

impl FakeBackend {
    pub fn last_submitted(&self) -> WorkflowGraph {
        self.submitted.lock().unwrap().last().cloned().expect("nothing submitted")
    }

    pub fn submission_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

#[async_trait]
impl ExecutionBackend for FakeBackend {
    async fn probe(&self) -> Result<(), ComfyUIApiError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(unavailable())
        }
    }

    async fn submit(&self, graph: &WorkflowGraph) -> Result<String, ComfyUIApiError> {
        if self.reject_submit.load(Ordering::SeqCst) {
            return Err(ComfyUIApiError::ApiError {
                status: 400,
                body: r#"{"error":"prompt_outputs_failed_validation"}"#.to_string(),
            });
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let prompt_id = format!("prompt-{n}");
        self.submitted.lock().unwrap().push(graph.clone());

        if self.complete_runs.load(Ordering::SeqCst) {
            let entry = json!({
                "outputs": {
                    "9": { "images": [{ "filename": format!("{prompt_id}.png"), "subfolder": "", "type": "output" }] }
                },
                "status": { "status_str": "success", "completed": true, "messages": [["execution_success", {}]] }
            });
            self.history.lock().unwrap().insert(prompt_id.clone(), entry);
        }
        Ok(prompt_id)
    }

    async fn history(&self, prompt_id: Option<&str>) -> Result<Value, ComfyUIApiError> {
        let history = self.history.lock().unwrap();
        let map: serde_json::Map<String, Value> = match prompt_id {
            Some(id) => history
                .get(id)
                .map(|e| (id.to_string(), e.clone()))
                .into_iter()
                .collect(),
            None => history.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        };
        Ok(Value::Object(map))
    }

    async fn queue(&self) -> Result<Value, ComfyUIApiError> {
        if self.queue_unavailable.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self.queue.lock().unwrap().clone())
    }

    async fn cancel(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        self.cancelled.lock().unwrap().push(prompt_id.to_string());
        Ok(())
    }

    async fn interrupt(&self) -> Result<(), ComfyUIApiError> {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_checkpoints(&self) -> Result<Vec<String>, ComfyUIApiError> {
        Ok(self.checkpoints.lock().unwrap().clone())
    }

    async fn view(&self, _file: &OutputFile) -> Result<Vec<u8>, ComfyUIApiError> {
        self.view_bytes.lock().unwrap().clone().ok_or_else(unavailable)
    }
}

/// An opaque PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::new(width, height);
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Image workflow with a model, prompt, typed sampler settings and seed.
pub fn image_workflow() -> Value {
    json!({
        "3": {
            "class_type": "KSampler",
            "inputs": {
                "seed": "PARAM_INT_SEED",
                "steps": "PARAM_INT_STEPS",
                "cfg": "PARAM_FLOAT_CFG",
                "sampler_name": "euler",
                "scheduler": "normal",
                "denoise": 1.0,
                "model": ["4", 0],
                "positive": ["6", 0],
                "negative": ["7", 0],
                "latent_image": ["5", 0]
            }
        },
        "4": { "class_type": "CheckpointLoaderSimple", "inputs": { "ckpt_name": "PARAM_MODEL" } },
        "5": {
            "class_type": "EmptyLatentImage",
            "inputs": { "width": "PARAM_INT_WIDTH", "height": "PARAM_INT_HEIGHT", "batch_size": 1 }
        },
        "6": { "class_type": "CLIPTextEncode", "inputs": { "text": "PARAM_PROMPT", "clip": ["4", 1] } },
        "7": { "class_type": "CLIPTextEncode", "inputs": { "text": "blurry", "clip": ["4", 1] } },
        "9": { "class_type": "SaveImage", "inputs": { "images": ["8", 0] } }
    })
}

/// Model-free workflow with a single required input.
pub fn upscale_workflow() -> Value {
    json!({
        "1": { "class_type": "LoadImage", "inputs": { "image": "PARAM_IMAGE" } },
        "9": { "class_type": "SaveImage", "inputs": { "images": ["1", 0] } }
    })
}

pub fn write_workflow(dir: &Path, id: &str, body: &Value) {
    std::fs::write(dir.join(format!("{id}.json")), serde_json::to_vec_pretty(body).unwrap()).unwrap();
}

/// Build a test `ServerConfig` pointing at `workflow_dir`.
///
/// Polling gives up after two immediate attempts so pending runs return
/// without sleeping.
pub fn test_config(workflow_dir: &Path) -> ServerConfig {
    let dir = workflow_dir.display().to_string();
    ServerConfig::from_lookup(|key| match key {
        "COMFY_MCP_WORKFLOW_DIR" => Some(dir.clone()),
        "COMFYUI_URL" => Some("http://comfy.test:8188".to_string()),
        "COMFYUI_POLL_MAX_ATTEMPTS" => Some("2".to_string()),
        "COMFYUI_POLL_INTERVAL_MS" => Some("0".to_string()),
        _ => None,
    })
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub backend: Arc<FakeBackend>,
    /// Kept alive for the duration of the test.
    pub workflows: TempDir,
}

impl TestApp {
    pub fn app(&self) -> Router {
        self.router.clone()
    }
}

/// Build the full application router around a [`FakeBackend`] with the
/// `generate_image` and `upscale` workflows installed and the model
/// catalog loaded.
pub async fn build_test_app() -> TestApp {
    build_test_app_with(FakeBackend::default()).await
}

pub async fn build_test_app_with(backend: FakeBackend) -> TestApp {
    let workflows = tempfile::tempdir().unwrap();
    write_workflow(workflows.path(), "generate_image", &image_workflow());
    write_workflow(workflows.path(), "upscale", &upscale_workflow());

    let backend = Arc::new(backend);
    let config = test_config(workflows.path());
    let state = AppState::new(config.clone(), backend.clone());
    state.refresh_models().await.unwrap();

    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
        backend,
        workflows,
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

async fn send_json(app: Router, method: Method, uri: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    send_json(app, Method::POST, uri, body).await
}

pub async fn put_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    send_json(app, Method::PUT, uri, body).await
}
