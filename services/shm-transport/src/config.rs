//! Local transport configuration

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use tracing::warn;

use crate::error::ShmError;

/// Default name of the shared registry segment
pub const DEFAULT_SHM_NAME: &str = "/apl-svars";

/// Configuration for the shared-memory registry handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvarConfig {
    /// Use shared variables at all (default true).
    pub enabled: bool,
    /// POSIX shared-memory object name (leading `/`).
    pub shm_name: String,
    /// Where this process listens for notifications (port 0 = any).
    pub udp_bind: SocketAddr,
    /// Host that notifications are sent to.
    pub notify_host: IpAddr,
}

impl SvarConfig {
    /// Create a config with sensible defaults for segment `shm_name`.
    pub fn new(shm_name: impl Into<String>) -> Self {
        Self {
            shm_name: shm_name.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `APL_SVARS`, `APL_SVARS_SHM` and `APL_SVARS_UDP_BIND`.
    ///
    /// Unparsable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(v) = lookup("APL_SVARS") {
            config.enabled = !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "off" | "no" | "false");
        }
        if let Some(v) = lookup("APL_SVARS_SHM") {
            if v.starts_with('/') && v.len() > 1 {
                config.shm_name = v;
            } else {
                warn!(value = %v, "APL_SVARS_SHM must start with '/'; using default");
            }
        }
        if let Some(v) = lookup("APL_SVARS_UDP_BIND") {
            match v.parse() {
                Ok(addr) => config.udp_bind = addr,
                Err(e) => warn!(value = %v, error = %e, "bad APL_SVARS_UDP_BIND; using default"),
            }
        }
        config
    }

    /// Load a JSON config file; missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ShmError> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| ShmError::Config(e.to_string()))
    }
}

impl Default for SvarConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            shm_name: DEFAULT_SHM_NAME.to_string(),
            udp_bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            notify_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }
}
