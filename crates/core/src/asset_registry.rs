//! In-memory registry of artifacts produced by completed jobs.
//!
//! Records are keyed by a digest of the backend's file identity
//! (filename, subfolder, folder type), so registering the same output twice
//! yields the same record. Expired records are invisible to readers whether
//! or not the sweeper has reclaimed them yet.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::hashing::sha256_hex;
use crate::types::{JsonMap, Timestamp};
use crate::workflow::WorkflowGraph;

/// Length of the hex asset identifier.
const ASSET_ID_LEN: usize = 32;

/// Default page size for listings.
pub const DEFAULT_LIST_LIMIT: usize = 10;

/// Stable identifier for a backend output file.
pub fn asset_id_for(filename: &str, subfolder: &str, folder_type: &str) -> String {
    let key = format!("{filename}\0{subfolder}\0{folder_type}");
    let mut digest = sha256_hex(key.as_bytes());
    digest.truncate(ASSET_ID_LEN);
    digest
}

/// Everything known about an output at registration time.
#[derive(Debug, Clone, Default)]
pub struct AssetDescriptor {
    pub filename: String,
    pub subfolder: String,
    pub folder_type: String,
    pub workflow_id: String,
    pub prompt_id: String,
    pub mime_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bytes_size: Option<u64>,
    pub comfy_history: Option<Value>,
    pub submitted_workflow: Option<WorkflowGraph>,
    pub metadata: JsonMap,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetRecord {
    pub asset_id: String,
    pub filename: String,
    pub subfolder: String,
    pub folder_type: String,
    pub workflow_id: String,
    pub prompt_id: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub mime_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bytes_size: Option<u64>,
    pub comfy_history: Option<Value>,
    pub submitted_workflow: Option<WorkflowGraph>,
    pub metadata: JsonMap,
    pub session_id: Option<String>,
}

impl AssetRecord {
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    fn merge(&mut self, descriptor: AssetDescriptor) {
        self.metadata.extend(descriptor.metadata);
        if descriptor.mime_type.is_some() {
            self.mime_type = descriptor.mime_type;
        }
        if descriptor.width.is_some() {
            self.width = descriptor.width;
        }
        if descriptor.height.is_some() {
            self.height = descriptor.height;
        }
        if descriptor.bytes_size.is_some() {
            self.bytes_size = descriptor.bytes_size;
        }
    }
}

pub struct AssetRegistry {
    base_url: String,
    ttl: Duration,
    records: RwLock<HashMap<String, AssetRecord>>,
}

impl AssetRegistry {
    /// A negative `ttl` is treated as zero.
    pub fn new(base_url: impl Into<String>, ttl: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ttl: ttl.max(Duration::zero()),
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Viewer URL for a record, derived from its stable identity.
    pub fn asset_url(&self, record: &AssetRecord) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("filename", &record.filename)
            .append_pair("subfolder", &record.subfolder)
            .append_pair("type", &record.folder_type)
            .finish();
        format!("{}/view?{query}", self.base_url)
    }

    pub async fn register(&self, descriptor: AssetDescriptor) -> AssetRecord {
        self.register_at(descriptor, Utc::now()).await
    }

    /// Register an output as of `now`.
    ///
    /// An unexpired record with the same identity absorbs the new metadata
    /// and is returned instead of a new one.
    pub async fn register_at(&self, descriptor: AssetDescriptor, now: Timestamp) -> AssetRecord {
        let asset_id = asset_id_for(
            &descriptor.filename,
            &descriptor.subfolder,
            &descriptor.folder_type,
        );
        let mut records = self.records.write().await;

        if let Some(existing) = records.get_mut(&asset_id) {
            if !existing.is_expired_at(now) {
                existing.merge(descriptor);
                tracing::debug!(asset_id = %asset_id, "Asset already registered, merged metadata");
                return existing.clone();
            }
        }

        let record = AssetRecord {
            asset_id: asset_id.clone(),
            filename: descriptor.filename,
            subfolder: descriptor.subfolder,
            folder_type: descriptor.folder_type,
            workflow_id: descriptor.workflow_id,
            prompt_id: descriptor.prompt_id,
            created_at: now,
            expires_at: now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            mime_type: descriptor.mime_type,
            width: descriptor.width,
            height: descriptor.height,
            bytes_size: descriptor.bytes_size,
            comfy_history: descriptor.comfy_history,
            submitted_workflow: descriptor.submitted_workflow,
            metadata: descriptor.metadata,
            session_id: descriptor.session_id,
        };
        records.insert(asset_id.clone(), record.clone());
        tracing::info!(
            asset_id = %asset_id,
            workflow_id = %record.workflow_id,
            filename = %record.filename,
            "Registered asset",
        );
        record
    }

    pub async fn get(&self, asset_id: &str) -> Option<AssetRecord> {
        self.get_at(asset_id, Utc::now()).await
    }

    pub async fn get_at(&self, asset_id: &str, now: Timestamp) -> Option<AssetRecord> {
        self.records
            .read()
            .await
            .get(asset_id)
            .filter(|r| !r.is_expired_at(now))
            .cloned()
    }

    /// Newest-first listing with conjunctive filters.
    pub async fn list(
        &self,
        limit: usize,
        workflow_id: Option<&str>,
        session_id: Option<&str>,
    ) -> Vec<AssetRecord> {
        self.list_at(limit, workflow_id, session_id, Utc::now()).await
    }

    pub async fn list_at(
        &self,
        limit: usize,
        workflow_id: Option<&str>,
        session_id: Option<&str>,
        now: Timestamp,
    ) -> Vec<AssetRecord> {
        let records = self.records.read().await;
        let mut matching: Vec<&AssetRecord> = records
            .values()
            .filter(|r| !r.is_expired_at(now))
            .filter(|r| workflow_id.map_or(true, |w| r.workflow_id == w))
            .filter(|r| session_id.map_or(true, |s| r.session_id.as_deref() == Some(s)))
            .collect();

        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.asset_id.cmp(&b.asset_id))
        });
        matching.into_iter().take(limit).cloned().collect()
    }

    /// Drop expired records. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: Timestamp) -> usize {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| !r.is_expired_at(now));
        let removed = before - records.len();
        if removed > 0 {
            tracing::info!(removed, remaining = records.len(), "Swept expired assets");
        }
        removed
    }

    /// Number of live (unexpired) records.
    pub async fn len(&self) -> usize {
        self.len_at(Utc::now()).await
    }

    pub async fn len_at(&self, now: Timestamp) -> usize {
        self.records
            .read()
            .await
            .values()
            .filter(|r| !r.is_expired_at(now))
            .count()
    }
}
