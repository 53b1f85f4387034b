/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Free-form JSON object used for arguments, overrides and metadata.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;
