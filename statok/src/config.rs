//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The collector endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "https://statok.dev0101.xyz";

/// Configuration for a [`Client`](crate::Client).
///
/// All fields except `api_key` have defaults matching the production
/// collector; `Config::new` plus struct update syntax covers most uses:
///
/// ```
/// let config = statok::Config {
///     endpoint: "https://statok.example.com".to_owned(),
///     ..statok::Config::new("1001_0123456789abcdef")
/// };
/// ```
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// The API key, in the form `"<client_id>_<secret>"`.
    pub api_key: String,

    /// Base URL of the collector.
    pub endpoint: String,

    /// Interval between flush ticks, in milliseconds.
    pub flush_interval_ms: u64,

    /// Capacity of the ingest queue. Events reported while the queue is
    /// full are dropped.
    pub event_queue_size: usize,

    /// Capacity of the outgoing frame queue.
    pub send_queue_size: usize,

    /// Maximum delivery attempts per frame. The frame is dropped once they
    /// are exhausted.
    pub send_retries: usize,

    /// Pause between delivery attempts, in seconds.
    pub retry_interval_secs: u64,
}

impl Config {
    /// Creates a configuration with the given API key and default settings.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub(crate) fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    pub(crate) fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            flush_interval_ms: 333,
            event_queue_size: 10_000,
            send_queue_size: 10,
            send_retries: 3,
            retry_interval_secs: 5,
        }
    }
}

/// An error raised when the configuration is rejected at initialization.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The API key does not have the form `"<client_id>_<secret>"` with a
    /// decimal client id.
    #[error("invalid api key: {0:?}")]
    InvalidApiKey(String),
}

/// The parsed client identity carried by every outgoing frame.
#[derive(Clone, Debug)]
pub(crate) struct Credentials {
    pub api_key: String,
    pub client_id: u64,
}

impl Credentials {
    /// Parses the `"<client_id>_<secret>"` API key format.
    pub fn parse(api_key: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidApiKey(api_key.to_owned());

        let (client_id, secret) = api_key.split_once('_').ok_or_else(invalid)?;
        if secret.is_empty() {
            return Err(invalid());
        }

        let client_id = client_id.parse().map_err(|_| invalid())?;

        Ok(Self {
            api_key: api_key.to_owned(),
            client_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_api_key() {
        let credentials = Credentials::parse("1001_deadbeef").unwrap();
        assert_eq!(credentials.client_id, 1001);
        assert_eq!(credentials.api_key, "1001_deadbeef");
    }

    #[test]
    fn test_rejects_malformed_api_keys() {
        for key in ["", "nounderscore", "abc_secret", "12x_secret", "123_"] {
            assert!(Credentials::parse(key).is_err(), "accepted {key:?}");
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::new("1_s");
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.flush_interval_ms, 333);
        assert_eq!(config.event_queue_size, 10_000);
        assert_eq!(config.send_queue_size, 10);
        assert_eq!(config.send_retries, 3);
        assert_eq!(config.retry_interval_secs, 5);
    }

    #[test]
    fn test_deserializes_with_defaults() {
        let config: Config = serde_json::from_str(r#"{"api_key": "7_s"}"#).unwrap();
        assert_eq!(config.api_key, "7_s");
        assert_eq!(config.flush_interval_ms, 333);
    }
}
