use std::time::Duration;

use crate::keepalive::DEFAULT_KEEPALIVE_INTERVAL;
use crate::reconnect::ReconnectPolicy;

/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local gateway.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Gateway base address, scheme + host + port (default: `http://localhost:8000`).
    pub gateway_url: String,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Interval between keepalive probes in seconds (default: `30`).
    pub keepalive_interval_secs: u64,
    /// Backoff policy for stream reconnects.
    pub reconnect: ReconnectPolicy,
}

/// Settings the registry needs to open and maintain streams.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Gateway base address; the stream URL is derived from it per group.
    pub endpoint: String,
    pub keepalive_interval: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_GATEWAY_URL.to_string(),
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

const DEFAULT_GATEWAY_URL: &str = "http://localhost:8000";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                 |
    /// |---------------------------|-------------------------|
    /// | `GATEWAY_URL`             | `http://localhost:8000` |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                    |
    /// | `KEEPALIVE_INTERVAL_SECS` | `30`                    |
    /// | `RECONNECT_MIN_DELAY_MS`  | `1000`                  |
    /// | `RECONNECT_MAX_DELAY_MS`  | `30000`                 |
    /// | `RECONNECT_MAX_ATTEMPTS`  | `20`                    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let gateway_url = lookup("GATEWAY_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string());
        if !has_supported_scheme(&gateway_url) {
            return Err(ConfigError::Invalid {
                var: "GATEWAY_URL",
                value: gateway_url,
            });
        }

        let defaults = ReconnectPolicy::default();
        let request_timeout_secs = parse_var(&lookup, "REQUEST_TIMEOUT_SECS", 30)?;
        let keepalive_interval_secs = parse_var(
            &lookup,
            "KEEPALIVE_INTERVAL_SECS",
            DEFAULT_KEEPALIVE_INTERVAL.as_secs(),
        )?;
        let min_delay_ms = parse_var(
            &lookup,
            "RECONNECT_MIN_DELAY_MS",
            defaults.min_delay.as_millis() as u64,
        )?;
        let max_delay_ms = parse_var(
            &lookup,
            "RECONNECT_MAX_DELAY_MS",
            defaults.max_delay.as_millis() as u64,
        )?;
        let max_attempts = parse_var(&lookup, "RECONNECT_MAX_ATTEMPTS", defaults.max_attempts)?;

        if keepalive_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "KEEPALIVE_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }
        if max_delay_ms < min_delay_ms {
            return Err(ConfigError::Invalid {
                var: "RECONNECT_MAX_DELAY_MS",
                value: max_delay_ms.to_string(),
            });
        }

        Ok(Self {
            gateway_url,
            request_timeout_secs,
            keepalive_interval_secs,
            reconnect: ReconnectPolicy {
                min_delay: Duration::from_millis(min_delay_ms),
                max_delay: Duration::from_millis(max_delay_ms),
                max_attempts,
                ..defaults
            },
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            endpoint: self.gateway_url.clone(),
            keepalive_interval: Duration::from_secs(self.keepalive_interval_secs),
            reconnect: self.reconnect.clone(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        None => Ok(default),
    }
}

fn has_supported_scheme(url: &str) -> bool {
    ["http://", "https://", "ws://", "wss://"]
        .iter()
        .any(|scheme| url.starts_with(scheme) && url.len() > scheme.len())
}

/// Derive the event-stream URL for a job group from the gateway address.
///
/// `http` becomes `ws` and `https` becomes `wss`; stream schemes are kept.
pub fn stream_url(endpoint: &str, job_group_id: &str) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    let base = if let Some(rest) = endpoint.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        endpoint.to_string()
    };
    format!("{base}/ws/job-group/{job_group_id}")
}
