//! Exponential-backoff readiness wait for ComfyUI at startup.
//!
//! The server refuses to start serving until the backend answers the
//! capability probe. [`wait_ready`] retries with increasing delays until
//! the probe succeeds, attempts run out, or the [`CancellationToken`] is
//! triggered.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::backend::ExecutionBackend;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct ReadinessConfig {
    /// Total number of probes, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed probe.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(16),
            multiplier: 2.0,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`ReadinessConfig::max_delay`].
pub fn next_delay(current: Duration, config: &ReadinessConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Probe the backend until it is ready.
///
/// Returns `true` as soon as a probe succeeds, `false` when every attempt
/// failed or `cancel` fired first.
pub async fn wait_ready(
    backend: &dyn ExecutionBackend,
    config: &ReadinessConfig,
    cancel: &CancellationToken,
) -> bool {
    let mut delay = config.initial_delay;

    for attempt in 1..=config.max_attempts {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Readiness wait cancelled");
                return false;
            }
            result = backend.probe() => {
                match result {
                    Ok(()) => {
                        tracing::info!(attempt, "ComfyUI is available");
                        return true;
                    }
                    Err(e) => {
                        tracing::warn!(
                            attempt,
                            max_attempts = config.max_attempts,
                            error = %e,
                            "ComfyUI availability check failed",
                        );
                    }
                }
            }
        }

        if attempt == config.max_attempts {
            break;
        }

        tracing::info!(delay_ms = delay.as_millis() as u64, "Retrying ComfyUI probe");
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(delay) => {}
        }

        delay = next_delay(delay, config);
    }

    tracing::error!(attempts = config.max_attempts, "ComfyUI did not become available");
    false
}
