use std::io;
use thiserror::Error;

use svar_signals::{Endpoint, SignalError, SignalId};

/// Central error type for the registry server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot listen on {endpoint}: {source}")]
    Bind {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },

    #[error("endpoint {0} is not supported on this platform")]
    Unsupported(Endpoint),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("client sent {0}, which is not a request")]
    UnexpectedSignal(SignalId),

    #[error("transport error: {0}")]
    Signal(#[from] SignalError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
