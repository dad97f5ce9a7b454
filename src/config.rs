//! Client configuration.
//!
//! [`ClientConfig`] sizes the worker pools and configures the default
//! transport. Every field has a default, so partial configuration documents
//! deserialize cleanly.
//!
//! # Examples
//!
//! ```
//! use relay_http::ClientConfig;
//!
//! let config = ClientConfig::from_json(r#"{ "network_threads": 4, "enable_logging": true }"#).unwrap();
//! assert_eq!(config.network_threads, 4);
//! assert_eq!(config.immediate_threads, 2);
//! ```

use crate::error::{DispatchError, Result};
use serde::{Deserialize, Serialize};

/// Dispatcher and default-transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Worker threads (and concurrent requests) of the normal network pool
    pub network_threads: usize,
    /// Worker threads (and concurrent requests) of the immediate pool
    pub immediate_threads: usize,
    /// Worker threads of the download/upload file pool
    pub transfer_threads: usize,
    /// Transport timeout per request, in milliseconds
    pub request_timeout_ms: u64,
    /// Idle connections kept per host by the default transport
    pub max_idle_per_host: usize,
    /// Proxy for every request; empty disables
    pub proxy_url: String,
    /// Default `User-Agent`; requests may override it
    pub user_agent: Option<String>,
    /// Log each request and response at info level
    pub enable_logging: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        ClientConfig {
            network_threads: cores * 2 + 1,
            immediate_threads: 2,
            transfer_threads: 2,
            request_timeout_ms: 30_000,
            max_idle_per_host: 32,
            proxy_url: String::new(),
            user_agent: None,
            enable_logging: false,
        }
    }
}

impl ClientConfig {
    /// Parse configuration from JSON, filling unspecified fields with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ClientConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject pool sizes that could never run a request.
    pub fn validate(&self) -> Result<()> {
        for (name, size) in [
            ("network_threads", self.network_threads),
            ("immediate_threads", self.immediate_threads),
            ("transfer_threads", self.transfer_threads),
        ] {
            if size == 0 {
                return Err(DispatchError::Config(format!("{} must be at least 1", name)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert!(config.network_threads >= 3);
        assert_eq!(config.immediate_threads, 2);
        assert!(config.proxy_url.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = ClientConfig::from_json(r#"{"user_agent": "relay/1.0"}"#).unwrap();
        assert_eq!(config.user_agent.as_deref(), Some("relay/1.0"));
        assert_eq!(config.request_timeout_ms, 30_000);
    }

    #[test]
    fn test_zero_pool_rejected() {
        let err = ClientConfig::from_json(r#"{"immediate_threads": 0}"#).unwrap_err();
        assert!(matches!(err, DispatchError::Config(_)));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(ClientConfig::from_json("{").is_err());
    }
}
