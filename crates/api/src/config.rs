use std::collections::HashMap;
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use comfybridge_comfyui::executor::PollConfig;
use comfybridge_comfyui::readiness::ReadinessConfig;
use comfybridge_core::workflow::MediaKind;

/// Longest accepted asset lifetime (one year).
const MAX_ASSET_TTL_HOURS: i64 = 24 * 365;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local ComfyUI on its standard
/// port. In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `127.0.0.1`).
    pub host: String,
    /// Bind port (default: `9000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `120`).
    ///
    /// Must exceed the polling window or runs are cut off before they can
    /// return a pending handle.
    pub request_timeout_secs: u64,
    /// Base URL of the ComfyUI instance.
    pub comfyui_url: String,
    /// Directory scanned for `*.json` workflow templates.
    pub workflow_dir: PathBuf,
    /// Lifetime of registered assets in hours (default: `24`).
    pub asset_ttl_hours: i64,
    /// How often expired assets are reclaimed (default: `300`).
    pub asset_sweep_interval_secs: u64,
    /// Startup readiness backoff.
    pub readiness: ReadinessConfig,
    /// Per-run history polling bounds.
    pub poll: PollConfig,
    /// Default checkpoint per namespace from `COMFY_MCP_DEFAULT_<NS>_MODEL`.
    pub default_models: HashMap<MediaKind, String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                            | Default                  |
    /// |------------------------------------|--------------------------|
    /// | `HOST`                             | `127.0.0.1`              |
    /// | `PORT`                             | `9000`                   |
    /// | `CORS_ORIGINS`                     | `http://localhost:5173`  |
    /// | `REQUEST_TIMEOUT_SECS`             | `120`                    |
    /// | `COMFYUI_URL`                      | `http://localhost:8188`  |
    /// | `COMFY_MCP_WORKFLOW_DIR`           | `./workflows`            |
    /// | `COMFY_MCP_ASSET_TTL_HOURS`        | `24`                     |
    /// | `ASSET_SWEEP_INTERVAL_SECS`        | `300`                    |
    /// | `COMFYUI_READY_MAX_ATTEMPTS`       | `5`                      |
    /// | `COMFYUI_READY_INITIAL_DELAY_SECS` | `2`                      |
    /// | `COMFYUI_READY_MAX_DELAY_SECS`     | `16`                     |
    /// | `COMFYUI_POLL_MAX_ATTEMPTS`        | `30`                     |
    /// | `COMFYUI_POLL_INTERVAL_MS`         | `1000`                   |
    /// | `COMFY_MCP_DEFAULT_IMAGE_MODEL`    | unset                    |
    /// | `COMFY_MCP_DEFAULT_AUDIO_MODEL`    | unset                    |
    /// | `COMFY_MCP_DEFAULT_VIDEO_MODEL`    | unset                    |
    ///
    /// Numeric values that fail to parse fall back to the default. The asset
    /// TTL must lie within 1 hour and 1 year.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let string = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let cors_origins: Vec<String> = string("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let readiness = ReadinessConfig {
            max_attempts: parse_or(&lookup, "COMFYUI_READY_MAX_ATTEMPTS", 5),
            initial_delay: Duration::from_secs(parse_or(&lookup, "COMFYUI_READY_INITIAL_DELAY_SECS", 2)),
            max_delay: Duration::from_secs(parse_or(&lookup, "COMFYUI_READY_MAX_DELAY_SECS", 16)),
            ..Default::default()
        };

        let poll = PollConfig {
            max_attempts: parse_or(&lookup, "COMFYUI_POLL_MAX_ATTEMPTS", 30),
            interval: Duration::from_millis(parse_or(&lookup, "COMFYUI_POLL_INTERVAL_MS", 1000)),
        };

        let default_models = MediaKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let key = format!("COMFY_MCP_DEFAULT_{}_MODEL", kind.as_str().to_uppercase());
                lookup(&key)
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .map(|model| (kind, model))
            })
            .collect();

        Self {
            host: string("HOST", "127.0.0.1"),
            port: parse_or(&lookup, "PORT", 9000),
            cors_origins,
            request_timeout_secs: parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 120),
            comfyui_url: string("COMFYUI_URL", "http://localhost:8188"),
            workflow_dir: PathBuf::from(string("COMFY_MCP_WORKFLOW_DIR", "./workflows")),
            asset_ttl_hours: parse_within(
                &lookup,
                "COMFY_MCP_ASSET_TTL_HOURS",
                24,
                1..=MAX_ASSET_TTL_HOURS,
            ),
            asset_sweep_interval_secs: parse_or(&lookup, "ASSET_SWEEP_INTERVAL_SECS", 300),
            readiness,
            poll,
            default_models,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
    T::Err: Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, %default, "Invalid config value, using default");
            default
        }
    }
}

/// Like [`parse_or`] but also falls back when the value is outside `range`.
fn parse_within<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
    range: RangeInclusive<T>,
) -> T
where
    T: FromStr + Display + Copy + PartialOrd,
    T::Err: Display,
{
    let value = parse_or(lookup, key, default);
    if range.contains(&value) {
        return value;
    }
    tracing::warn!(
        key,
        %value,
        min = %range.start(),
        max = %range.end(),
        %default,
        "Config value out of range, using default",
    );
    default
}
