//! Server configuration

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use svar_signals::Endpoint;

use crate::error::ServerError;

/// Where the server listens and whom it notifies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Every endpoint gets its own accept loop
    pub endpoints: Vec<Endpoint>,
    /// Host the UDP notifications go to
    pub notify_host: IpAddr,
    /// Default tracing filter; `RUST_LOG` wins
    pub log_level: String,
}

impl ServerConfig {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints,
            ..Self::default()
        }
    }

    /// Load a JSON config; missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ServerError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| ServerError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.endpoints.is_empty() {
            return Err(ServerError::Config("no endpoints to listen on".into()));
        }
        for (i, e) in self.endpoints.iter().enumerate() {
            if self.endpoints[..i].contains(e) {
                return Err(ServerError::Config(format!("endpoint {} listed twice", e)));
            }
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![Endpoint::default()],
            notify_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"endpoints": ["tcp:127.0.0.1:17000", "unix:/tmp/aps.sock"], "log_level": "debug"}}"#
        )
        .unwrap();

        let c = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(
            c.endpoints,
            vec![
                Endpoint::Tcp("127.0.0.1:17000".parse().unwrap()),
                Endpoint::Unix(PathBuf::from("/tmp/aps.sock")),
            ]
        );
        assert_eq!(c.log_level, "debug");
        assert_eq!(c.notify_host, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_bad_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"endpoints": ["unix:"]}}"#).unwrap();
        assert!(matches!(
            ServerConfig::from_file(file.path()),
            Err(ServerError::Config(_))
        ));
        assert!(ServerConfig::from_file(Path::new("/nonexistent/apserver.json")).is_err());
    }

    #[test]
    fn test_validate() {
        assert!(ServerConfig::default().validate().is_ok());
        assert!(ServerConfig::new(vec![]).validate().is_err());
        let e = Endpoint::default_tcp();
        assert!(ServerConfig::new(vec![e.clone(), e]).validate().is_err());
    }
}
