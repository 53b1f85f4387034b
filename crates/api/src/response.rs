//! Shared response envelope types for API handlers.
//!
//! All API responses use a `{ "data": ... }` envelope. Use [`DataResponse`]
//! instead of ad-hoc `serde_json::json!({ "data": ... })`.

use std::collections::BTreeMap;

use comfybridge_core::asset_registry::AssetRecord;
use comfybridge_core::job::JobHandle;
use comfybridge_core::render::OverrideReport;
use comfybridge_core::types::Timestamp;
use serde::Serialize;
use serde_json::Value;

/// Standard `{ "data": T }` response envelope.
///
/// # Example
///
/// ```ignore
/// Ok(Json(DataResponse { data: items }))
/// ```
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// A finished run: the registered artifact and where to fetch it.
#[derive(Debug, Serialize)]
pub struct ArtifactResponse {
    pub asset_id: String,
    pub asset_url: String,
    pub filename: String,
    pub subfolder: String,
    pub folder_type: String,
    pub workflow_id: String,
    pub prompt_id: String,
    pub mime_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bytes_size: Option<u64>,
    pub expires_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Seed written by a regeneration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrides_applied: Option<BTreeMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrides_dropped: Option<BTreeMap<String, String>>,
    /// Downscaled preview as a `data:` URI, when requested and available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_preview_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_preview_mime_type: Option<String>,
}

impl ArtifactResponse {
    pub fn new(record: &AssetRecord, asset_url: String) -> Self {
        Self {
            asset_id: record.asset_id.clone(),
            asset_url,
            filename: record.filename.clone(),
            subfolder: record.subfolder.clone(),
            folder_type: record.folder_type.clone(),
            workflow_id: record.workflow_id.clone(),
            prompt_id: record.prompt_id.clone(),
            mime_type: record.mime_type.clone(),
            width: record.width,
            height: record.height,
            bytes_size: record.bytes_size,
            expires_at: record.expires_at,
            session_id: record.session_id.clone(),
            tool: None,
            seed: None,
            overrides_applied: None,
            overrides_dropped: None,
            inline_preview_base64: None,
            inline_preview_mime_type: None,
        }
    }

    pub fn with_report(mut self, report: OverrideReport) -> Self {
        self.overrides_applied = Some(report.applied);
        self.overrides_dropped = Some(report.dropped);
        self
    }
}

/// Result of a run request: either the artifact or a handle to poll.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RunResponse {
    Completed(Box<ArtifactResponse>),
    Pending(PendingResponse),
}

/// Pending job handle, with the override report when one applies.
#[derive(Debug, Serialize)]
pub struct PendingResponse {
    #[serde(flatten)]
    pub job: JobHandle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrides_applied: Option<BTreeMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrides_dropped: Option<BTreeMap<String, String>>,
}

impl RunResponse {
    pub fn pending(job: JobHandle, report: Option<OverrideReport>) -> Self {
        let (applied, dropped) = match report {
            Some(report) => (Some(report.applied), Some(report.dropped)),
            None => (None, None),
        };
        RunResponse::Pending(PendingResponse {
            job,
            overrides_applied: applied,
            overrides_dropped: dropped,
        })
    }
}
