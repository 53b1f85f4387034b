//! Periodic reclamation of expired assets.
//!
//! Expired records are already invisible to readers; this task only frees
//! their memory.

use std::sync::Arc;
use std::time::Duration;

use comfybridge_core::asset_registry::AssetRegistry;
use tokio_util::sync::CancellationToken;

/// Run the sweep loop until `cancel` is triggered.
pub async fn run(registry: Arc<AssetRegistry>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Asset sweeper started");

    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately; nothing can have expired yet.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Asset sweeper stopping");
                break;
            }
            _ = ticker.tick() => {
                let removed = registry.sweep().await;
                if removed > 0 {
                    tracing::info!(removed, "Asset sweeper: reclaimed expired assets");
                } else {
                    tracing::debug!("Asset sweeper: nothing to reclaim");
                }
            }
        }
    }
}
