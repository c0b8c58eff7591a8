//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::endpoint::Endpoint;

/// How a client reaches the registry server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    /// Connect, read and write timeout
    pub timeout: Duration,
    /// Reported to the server on registration
    pub progname: String,
}

impl ClientConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ..Self::default()
        }
    }

    /// Defaults overridden by `APSERVER_ENDPOINT` and `APSERVER_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(v) = lookup("APSERVER_ENDPOINT") {
            match v.parse() {
                Ok(e) => config.endpoint = e,
                Err(e) => warn!(value = %v, error = %e, "bad APSERVER_ENDPOINT; using default"),
            }
        }
        if let Some(v) = lookup("APSERVER_TIMEOUT_MS") {
            match v.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => config.timeout = Duration::from_millis(ms),
                _ => warn!(value = %v, "bad APSERVER_TIMEOUT_MS; using default"),
            }
        }
        config
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            timeout: Duration::from_secs(5),
            progname: "apl".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_overrides() {
        let c = ClientConfig::from_lookup(|name| match name {
            "APSERVER_ENDPOINT" => Some("unix:/tmp/s".into()),
            "APSERVER_TIMEOUT_MS" => Some("250".into()),
            _ => None,
        });
        assert_eq!(c.endpoint, Endpoint::Unix("/tmp/s".into()));
        assert_eq!(c.timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_bad_env_keeps_defaults() {
        let c = ClientConfig::from_lookup(|name| match name {
            "APSERVER_ENDPOINT" => Some("unix:".into()),
            "APSERVER_TIMEOUT_MS" => Some("0".into()),
            _ => None,
        });
        assert_eq!(c, ClientConfig::default());
    }

    #[test]
    fn test_json_partial() {
        let c: ClientConfig = serde_json::from_str(r#"{"progname": "ap210"}"#).unwrap();
        assert_eq!(c.progname, "ap210");
        assert_eq!(c.timeout, Duration::from_secs(5));
    }
}
