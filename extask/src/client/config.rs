use crate::core::{RetryPolicy, JSON_FORMAT};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Worker client settings.
///
/// Every field has a default, so a config can be deserialized from a partial
/// document:
///
/// ```
/// use extask::client::ClientConfig;
///
/// let config: ClientConfig = serde_json::from_str(r#"{
///     "base_url": "http://localhost:8080/engine-rest",
///     "max_tasks": 5
/// }"#).unwrap();
/// assert_eq!(config.max_tasks, 5);
/// assert_eq!(config.lock_duration, 20_000);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Engine REST endpoint, used when no embedded engine is given.
    pub base_url: Option<String>,
    pub worker_id: String,
    /// Upper bound on tasks fetched per poll cycle.
    pub max_tasks: i32,
    /// Long-poll timeout in milliseconds.
    pub async_response_timeout: Option<u64>,
    /// Default lock duration in milliseconds for subscriptions that set none.
    pub lock_duration: i64,
    pub use_priority: bool,
    /// Format for object variables that do not request one.
    pub default_serialization_format: String,
    /// Bound on concurrently running handlers. Unbounded when `None`.
    pub max_concurrent_handlers: Option<usize>,
    pub backoff: BackoffConfig,
    /// Schedule behind the implicit failure report of a failed handler.
    pub failure_retry_policy: RetryPolicy,
    /// Retries of reporting calls that fail with a transport error.
    pub report_retry_policy: Option<RetryPolicy>,
    /// Start polling as soon as the first subscription opens.
    pub auto_fetching: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            worker_id: default_worker_id(),
            max_tasks: 10,
            async_response_timeout: None,
            lock_duration: 20_000,
            use_priority: true,
            default_serialization_format: JSON_FORMAT.to_string(),
            max_concurrent_handlers: None,
            backoff: BackoffConfig::default(),
            failure_retry_policy: RetryPolicy::STANDARD,
            report_retry_policy: Some(RetryPolicy::with_max_attempts(3)),
            auto_fetching: true,
        }
    }
}

/// `<hostname>-<uuid>`, or `worker-<uuid>` when no host name is known.
pub fn default_worker_id() -> String {
    let host = std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "worker".to_string());
    format!("{}-{}", host, uuid::Uuid::new_v4())
}

/// Exponential backoff between poll cycles that found no work.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_ms: u64,
    pub factor: f64,
    pub max_ms: u64,
    /// Random extra delay, as a fraction of the computed delay.
    pub jitter: f64,
}

impl BackoffConfig {
    pub fn initial(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: 500,
            factor: 2.0,
            max_ms: 60_000,
            jitter: 0.1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.max_tasks, 10);
        assert_eq!(config.lock_duration, 20_000);
        assert!(config.use_priority);
        assert_eq!(config.default_serialization_format, "application/json");
        assert_eq!(config.backoff.initial(), Duration::from_millis(500));
        assert_eq!(config.backoff.max(), Duration::from_secs(60));
        assert!(!config.worker_id.is_empty());
    }

    #[test]
    fn test_worker_ids_are_unique() {
        assert_ne!(default_worker_id(), default_worker_id());
    }

    #[test]
    fn test_partial_backoff_document() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"backoff": {"initial_ms": 10}}"#).unwrap();
        assert_eq!(config.backoff.initial_ms, 10);
        assert_eq!(config.backoff.max_ms, 60_000);
    }
}
