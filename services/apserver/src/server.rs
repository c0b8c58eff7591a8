//! Listeners and accept loops
//!
//! One accept loop per configured endpoint, each spawning a task per
//! connection. All sessions share one `ServerState`.

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tokio::task::JoinSet;
use tracing::{info, warn};

use svar_signals::Endpoint;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::session::Session;
use crate::state::ServerState;

enum Listener {
    Tcp(TcpListener),
    /// `path` is removed again when the listener goes away
    Unix {
        listener: UnixListener,
        endpoint: Endpoint,
        path: Option<PathBuf>,
    },
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Listener::Unix { path: Some(path), .. } = self {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn bind_error(endpoint: &Endpoint) -> impl FnOnce(io::Error) -> ServerError + '_ {
    move |source| ServerError::Bind {
        endpoint: endpoint.clone(),
        source,
    }
}

impl Listener {
    async fn bind(endpoint: &Endpoint) -> Result<Self, ServerError> {
        match endpoint {
            Endpoint::Tcp(addr) => {
                let listener = TcpListener::bind(addr).await.map_err(bind_error(endpoint))?;
                Ok(Listener::Tcp(listener))
            }
            Endpoint::Unix(path) => {
                if let Some(dir) = path.parent() {
                    std::fs::create_dir_all(dir).map_err(bind_error(endpoint))?;
                }
                // left behind by a server that did not shut down cleanly
                match std::fs::remove_file(path) {
                    Ok(()) => warn!(path = %path.display(), "removed stale socket"),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(bind_error(endpoint)(e)),
                }
                let listener = UnixListener::bind(path).map_err(bind_error(endpoint))?;
                Ok(Listener::Unix {
                    listener,
                    endpoint: endpoint.clone(),
                    path: Some(path.clone()),
                })
            }
            #[cfg(target_os = "linux")]
            Endpoint::Abstract(name) => {
                use std::os::linux::net::SocketAddrExt;
                let addr = std::os::unix::net::SocketAddr::from_abstract_name(name.as_bytes())
                    .map_err(bind_error(endpoint))?;
                let std_listener = std::os::unix::net::UnixListener::bind_addr(&addr)
                    .map_err(bind_error(endpoint))?;
                std_listener
                    .set_nonblocking(true)
                    .map_err(bind_error(endpoint))?;
                let listener = UnixListener::from_std(std_listener).map_err(bind_error(endpoint))?;
                Ok(Listener::Unix {
                    listener,
                    endpoint: endpoint.clone(),
                    path: None,
                })
            }
            #[allow(unreachable_patterns)]
            other => Err(ServerError::Unsupported(other.clone())),
        }
    }

    /// The endpoint as actually bound (resolves TCP port 0)
    fn endpoint(&self) -> io::Result<Endpoint> {
        match self {
            Listener::Tcp(l) => Ok(Endpoint::Tcp(l.local_addr()?)),
            Listener::Unix { endpoint, .. } => Ok(endpoint.clone()),
        }
    }

    async fn accept_loop(self, state: ServerState) {
        loop {
            let accepted = match &self {
                Listener::Tcp(l) => l.accept().await.map(|(stream, addr)| {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(error = %e, "set_nodelay failed");
                    }
                    spawn_session(&state, addr.to_string(), stream);
                }),
                Listener::Unix { listener, endpoint, .. } => listener
                    .accept()
                    .await
                    .map(|(stream, _)| spawn_session(&state, endpoint.to_string(), stream)),
            };
            if let Err(e) = accepted {
                warn!(error = %e, "accept failed");
                // e.g. out of file descriptors; give it a moment
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

fn spawn_session<S>(state: &ServerState, peer: String, stream: S)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(Session::new(state.clone(), peer).run(stream));
}

/// The registry server: bound listeners plus the shared state
pub struct Server {
    state: ServerState,
    listeners: Vec<Listener>,
}

impl Server {
    /// Bind every configured endpoint.
    pub async fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let state = ServerState::new(config.notify_host)?;
        let mut listeners = Vec::with_capacity(config.endpoints.len());
        for endpoint in &config.endpoints {
            listeners.push(Listener::bind(endpoint).await?);
        }
        Ok(Self { state, listeners })
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Bound endpoints, with real TCP ports
    pub fn endpoints(&self) -> Result<Vec<Endpoint>, ServerError> {
        self.listeners
            .iter()
            .map(|l| l.endpoint().map_err(ServerError::from))
            .collect()
    }

    /// Serve until `shutdown` completes.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) {
        let mut loops = JoinSet::new();
        for listener in self.listeners {
            loops.spawn(listener.accept_loop(self.state.clone()));
        }
        info!(listeners = loops.len(), "server running");

        tokio::select! {
            _ = shutdown => info!("shutting down"),
            Some(res) = loops.join_next() => {
                if let Err(e) = res {
                    warn!(error = %e, "accept loop died");
                }
            }
        }
        loops.shutdown().await;
    }
}
