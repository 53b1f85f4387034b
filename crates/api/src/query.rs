//! Shared query parameter types for API handlers.

use serde::Deserialize;

/// Query parameters for `GET /assets` (`?limit=&workflow_id=&session_id=`).
#[derive(Debug, Default, Deserialize)]
pub struct AssetListParams {
    pub limit: Option<usize>,
    pub workflow_id: Option<String>,
    pub session_id: Option<String>,
}
