//! Server endpoints
//!
//! The server can listen on TCP, a unix socket path, or (on Linux) an
//! abstract unix socket name. Which one is the default is a build-time
//! choice made with the `unix-socket` / `abstract-socket` features.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

use crate::error::SignalError;

/// Default TCP port of the server
pub const DEFAULT_TCP_PORT: u16 = 16366;

/// Default unix socket path
pub const DEFAULT_UNIX_PATH: &str = "/tmp/apl-svars/apserver.sock";

/// Default abstract socket name (without the leading NUL)
pub const DEFAULT_ABSTRACT_NAME: &str = "apl-svars/apserver";

/// Where the server listens
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Endpoint {
    Tcp(SocketAddr),
    Unix(PathBuf),
    Abstract(String),
}

impl Endpoint {
    pub fn default_tcp() -> Self {
        Endpoint::Tcp(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::LOCALHOST,
            DEFAULT_TCP_PORT,
        )))
    }

    /// Open a blocking connection whose reads and writes time out.
    pub fn connect(&self, timeout: Duration) -> Result<Stream, SignalError> {
        let stream = match self {
            Endpoint::Tcp(addr) => {
                let s = TcpStream::connect_timeout(addr, timeout)?;
                s.set_nodelay(true)?;
                Stream::Tcp(s)
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => Stream::Unix(UnixStream::connect(path)?),
            #[cfg(target_os = "linux")]
            Endpoint::Abstract(name) => {
                use std::os::linux::net::SocketAddrExt;
                let addr = std::os::unix::net::SocketAddr::from_abstract_name(name.as_bytes())?;
                Stream::Unix(UnixStream::connect_addr(&addr)?)
            }
            #[allow(unreachable_patterns)]
            other => return Err(SignalError::BadEndpoint(other.to_string())),
        };
        stream.set_timeout(timeout)?;
        Ok(stream)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        if cfg!(feature = "abstract-socket") {
            Endpoint::Abstract(DEFAULT_ABSTRACT_NAME.to_string())
        } else if cfg!(feature = "unix-socket") {
            Endpoint::Unix(PathBuf::from(DEFAULT_UNIX_PATH))
        } else {
            Endpoint::default_tcp()
        }
    }
}

impl FromStr for Endpoint {
    type Err = SignalError;

    /// `tcp:host:port`, `host:port`, `unix:/path`, `/path`, `abstract:name`, `@name`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || SignalError::BadEndpoint(s.to_string());
        let s = s.trim();

        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(bad());
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }
        if s.starts_with('/') {
            return Ok(Endpoint::Unix(PathBuf::from(s)));
        }
        if let Some(name) = s.strip_prefix("abstract:").or_else(|| s.strip_prefix('@')) {
            if name.is_empty() {
                return Err(bad());
            }
            return Ok(Endpoint::Abstract(name.to_string()));
        }

        let host_port = s.strip_prefix("tcp:").unwrap_or(s);
        if let Ok(addr) = host_port.parse::<SocketAddr>() {
            return Ok(Endpoint::Tcp(addr));
        }
        host_port
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .map(Endpoint::Tcp)
            .ok_or_else(bad)
    }
}

impl TryFrom<String> for Endpoint {
    type Error = SignalError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Endpoint> for String {
    fn from(e: Endpoint) -> String {
        e.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp:{}", addr),
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
            Endpoint::Abstract(name) => write!(f, "abstract:{}", name),
        }
    }
}

/// A connected client stream
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    pub fn set_timeout(&self, timeout: Duration) -> io::Result<()> {
        let t = Some(timeout).filter(|t| !t.is_zero());
        match self {
            Stream::Tcp(s) => {
                s.set_read_timeout(t)?;
                s.set_write_timeout(t)
            }
            #[cfg(unix)]
            Stream::Unix(s) => {
                s.set_read_timeout(t)?;
                s.set_write_timeout(t)
            }
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush(),
            #[cfg(unix)]
            Stream::Unix(s) => s.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!(
            "tcp:127.0.0.1:9000".parse::<Endpoint>().unwrap(),
            Endpoint::Tcp("127.0.0.1:9000".parse().unwrap())
        );
        assert_eq!(
            "127.0.0.1:9000".parse::<Endpoint>().unwrap(),
            Endpoint::Tcp("127.0.0.1:9000".parse().unwrap())
        );
        assert_eq!(
            "unix:/tmp/x.sock".parse::<Endpoint>().unwrap(),
            Endpoint::Unix(PathBuf::from("/tmp/x.sock"))
        );
        assert_eq!(
            "/tmp/x.sock".parse::<Endpoint>().unwrap(),
            Endpoint::Unix(PathBuf::from("/tmp/x.sock"))
        );
        assert_eq!(
            "@apl".parse::<Endpoint>().unwrap(),
            Endpoint::Abstract("apl".into())
        );
        assert_eq!(
            "abstract:apl".parse::<Endpoint>().unwrap(),
            Endpoint::Abstract("apl".into())
        );
    }

    #[test]
    fn test_parse_rejects() {
        assert!("unix:".parse::<Endpoint>().is_err());
        assert!("@".parse::<Endpoint>().is_err());
        assert!("no port here".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_display_parses_back() {
        for e in [
            Endpoint::default_tcp(),
            Endpoint::Unix(PathBuf::from(DEFAULT_UNIX_PATH)),
            Endpoint::Abstract(DEFAULT_ABSTRACT_NAME.into()),
        ] {
            assert_eq!(e.to_string().parse::<Endpoint>().unwrap(), e);
        }
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&Endpoint::default_tcp()).unwrap();
        assert_eq!(json, "\"tcp:127.0.0.1:16366\"");
        let back: Endpoint = serde_json::from_str("\"unix:/run/s\"").unwrap();
        assert_eq!(back, Endpoint::Unix(PathBuf::from("/run/s")));
    }

    #[cfg(not(any(feature = "unix-socket", feature = "abstract-socket")))]
    #[test]
    fn test_default_is_tcp() {
        assert_eq!(Endpoint::default(), Endpoint::default_tcp());
    }
}
