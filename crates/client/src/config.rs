use std::time::Duration;

use crate::poller::PollConfig;
use crate::retry::RetryConfig;

/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local development stack.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root including the version prefix (default:
    /// `http://localhost:8000/api/v1`).
    pub api_url: String,
    /// Base URL that relative media paths are resolved against (default:
    /// `http://localhost:8000`).
    pub media_url: String,
    /// Delay between two status queries of the same job (default: 2 s).
    pub poll_interval: Duration,
    /// Retries for a transient status-query failure before polling is
    /// abandoned (default: `3`, `0` gives up on the first failure).
    pub max_poll_retries: u32,
    /// Per-request HTTP timeout (default: 30 s).
    pub request_timeout: Duration,
}

/// A configuration variable held an unusable value.
#[derive(Debug, thiserror::Error)]
#[error("{var} has invalid value {value:?}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000/api/v1".into(),
            media_url: "http://localhost:8000".into(),
            poll_interval: Duration::from_millis(2000),
            max_poll_retries: 3,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                        |
    /// |-----------------------------|--------------------------------|
    /// | `VTON_API_URL`              | `http://localhost:8000/api/v1` |
    /// | `VTON_MEDIA_URL`            | `http://localhost:8000`        |
    /// | `VTON_POLL_INTERVAL_MS`     | `2000`                         |
    /// | `VTON_POLL_MAX_RETRIES`     | `3`                            |
    /// | `VTON_REQUEST_TIMEOUT_SECS` | `30`                           |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading variables through
    /// `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let api_url = lookup("VTON_API_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_url);
        if api_url.is_empty() {
            return Err(ConfigError {
                var: "VTON_API_URL",
                value: api_url,
                reason: "must not be empty".into(),
            });
        }

        let media_url = lookup("VTON_MEDIA_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .unwrap_or(defaults.media_url);

        let poll_interval_ms: u64 = parse_var(&lookup, "VTON_POLL_INTERVAL_MS", 2000)?;
        if poll_interval_ms == 0 {
            return Err(ConfigError {
                var: "VTON_POLL_INTERVAL_MS",
                value: "0".into(),
                reason: "must be greater than zero".into(),
            });
        }

        let max_poll_retries: u32 = parse_var(&lookup, "VTON_POLL_MAX_RETRIES", 3)?;
        let request_timeout_secs: u64 = parse_var(&lookup, "VTON_REQUEST_TIMEOUT_SECS", 30)?;

        Ok(Self {
            api_url,
            media_url,
            poll_interval: Duration::from_millis(poll_interval_ms),
            max_poll_retries,
            request_timeout: Duration::from_secs(request_timeout_secs),
        })
    }

    /// Polling parameters derived from this configuration.
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: self.poll_interval,
            retry: RetryConfig {
                max_retries: self.max_poll_retries,
                ..RetryConfig::default()
            },
        }
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
