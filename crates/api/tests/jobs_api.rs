//! HTTP-level tests for job status, cancellation and the queue view.

mod common;

use std::sync::atomic::Ordering;

use axum::http::StatusCode;
use common::{body_json, get, post_json};
use serde_json::json;

#[tokio::test]
async fn queued_job_reports_position() {
    let test = common::build_test_app().await;
    *test.backend.queue.lock().unwrap() = json!({
        "queue_running": [[1, "run-1", {}]],
        "queue_pending": [[2, "wait-1", {}], [3, "wait-2", {}]]
    });

    let data = body_json(get(test.app(), "/api/v1/jobs/wait-2").await).await["data"].clone();
    assert_eq!(data["status"], "queued");
    assert_eq!(data["position"], 2);

    let data = body_json(get(test.app(), "/api/v1/jobs/run-1").await).await["data"].clone();
    assert_eq!(data["status"], "running");
    assert_eq!(data["execution_id"], 1);
}

#[tokio::test]
async fn running_in_queue_wins_over_history() {
    let test = common::build_test_app().await;
    post_json(
        test.app(),
        "/api/v1/tools/upscale",
        json!({ "arguments": { "image": "in.png" } }),
    )
    .await;
    *test.backend.queue.lock().unwrap() = json!({ "queue_running": [[1, "prompt-1"]], "queue_pending": [] });

    let data = body_json(get(test.app(), "/api/v1/jobs/prompt-1").await).await["data"].clone();
    assert_eq!(data["status"], "running");
}

#[tokio::test]
async fn completed_job_includes_outputs() {
    let test = common::build_test_app().await;
    post_json(
        test.app(),
        "/api/v1/tools/upscale",
        json!({ "arguments": { "image": "in.png" } }),
    )
    .await;

    let data = body_json(get(test.app(), "/api/v1/jobs/prompt-1").await).await["data"].clone();
    assert_eq!(data["status"], "completed");
    assert_eq!(data["outputs"]["9"]["images"][0]["filename"], "prompt-1.png");
}

#[tokio::test]
async fn failed_job_carries_diagnostics() {
    let test = common::build_test_app().await;
    test.backend.history.lock().unwrap().insert(
        "bad".to_string(),
        json!({
            "outputs": {},
            "error": { "message": "boom" },
            "status": {
                "status_str": "error",
                "messages": [["execution_error", {
                    "node_id": "3", "node_type": "KSampler",
                    "exception_type": "RuntimeError", "exception_message": "CUDA out of memory"
                }]]
            }
        }),
    );

    let data = body_json(get(test.app(), "/api/v1/jobs/bad").await).await["data"].clone();
    assert_eq!(data["status"], "error");
    assert!(data["message"]
        .as_str()
        .unwrap()
        .contains("Node 3 (KSampler): RuntimeError: CUDA out of memory"));
}

#[tokio::test]
async fn unknown_job_is_not_found_status() {
    let test = common::build_test_app().await;
    let response = get(test.app(), "/api/v1/jobs/missing").await;
    assert_eq!(response.status(), StatusCode::OK);

    let data = body_json(response).await["data"].clone();
    assert_eq!(data["status"], "not_found");
    assert!(data.get("available_prompt_ids").is_none());
}

#[tokio::test]
async fn queue_failure_degrades_to_history() {
    let test = common::build_test_app().await;
    post_json(
        test.app(),
        "/api/v1/tools/upscale",
        json!({ "arguments": { "image": "in.png" } }),
    )
    .await;
    test.backend.queue_unavailable.store(true, Ordering::SeqCst);

    let data = body_json(get(test.app(), "/api/v1/jobs/prompt-1").await).await["data"].clone();
    assert_eq!(data["status"], "completed");
}

#[tokio::test]
async fn cancel_forwards_to_backend() {
    let test = common::build_test_app().await;
    let response = post_json(test.app(), "/api/v1/jobs/abc/cancel", json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);

    let data = body_json(response).await["data"].clone();
    assert_eq!(data["status"], "cancelled");
    assert_eq!(data["prompt_id"], "abc");
    assert_eq!(*test.backend.cancelled.lock().unwrap(), vec!["abc".to_string()]);
    assert_eq!(test.backend.interrupts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancel_interrupts_running_job() {
    let test = common::build_test_app().await;
    *test.backend.queue.lock().unwrap() = json!({
        "queue_running": [[1, "abc", {}]],
        "queue_pending": []
    });

    let response = post_json(test.app(), "/api/v1/jobs/abc/cancel", json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(test.backend.interrupts.load(Ordering::SeqCst), 1);
    assert!(test.backend.cancelled.lock().unwrap().is_empty());
}

#[tokio::test]
async fn queue_status_lists_ids_and_counts() {
    let test = common::build_test_app().await;
    *test.backend.queue.lock().unwrap() = json!({
        "queue_running": [[1, "a"]],
        "queue_pending": [[2, "b", { "3": { "class_type": "KSampler" } }], [3, "c"]]
    });

    let data = body_json(get(test.app(), "/api/v1/queue").await).await["data"].clone();
    assert_eq!(data["running"], json!(["a"]));
    assert_eq!(data["pending"], json!(["b", "c"]));
    assert_eq!(data["running_count"], 1);
    assert_eq!(data["pending_count"], 2);
    assert_eq!(data["queue_running"], json!([[1, "a"]]));
    assert_eq!(data["queue_pending"][0][2]["3"]["class_type"], "KSampler");
}

#[tokio::test]
async fn queue_unavailable_is_502() {
    let test = common::build_test_app().await;
    test.backend.queue_unavailable.store(true, Ordering::SeqCst);

    let response = get(test.app(), "/api/v1/queue").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["code"], "BACKEND_ERROR");
}
