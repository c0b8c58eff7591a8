//! Error types for the signal transport

use std::io;
use std::time::Duration;
use thiserror::Error;
use svar_types::errors::WireError;

use crate::signal::SignalId;

/// Signal transport errors
#[derive(Error, Debug)]
pub enum SignalError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed signal: {0}")]
    Wire(#[from] WireError),

    #[error("Unknown signal id {0}")]
    UnknownSignal(u16),

    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Expected {expected} but received {received}")]
    UnexpectedResponse { expected: SignalId, received: SignalId },

    #[error("Connection closed by peer")]
    Closed,

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Invalid endpoint {0:?}")]
    BadEndpoint(String),

    #[error("Not connected")]
    NotConnected,
}

impl SignalError {
    /// Map read/write timeouts of a blocking socket to `Timeout`
    pub(crate) fn from_io(err: io::Error, timeout: Duration) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => SignalError::Timeout(timeout),
            io::ErrorKind::UnexpectedEof => SignalError::Closed,
            _ => SignalError::Io(err),
        }
    }
}
