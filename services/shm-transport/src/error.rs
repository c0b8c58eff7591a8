//! Error types for the shared-memory transport

use std::io;
use thiserror::Error;

/// Shared-memory transport errors
#[derive(Error, Debug)]
pub enum ShmError {
    #[error("Invalid segment name: {0:?}")]
    BadName(String),

    #[error("shm_open({name}) failed: {source}")]
    Open { name: String, source: io::Error },

    #[error("{op} failed: {source}")]
    Os { op: &'static str, source: io::Error },

    #[error("Segment size mismatch: found {found} bytes, expected {expected}..={max}")]
    BadSize { found: u64, expected: usize, max: usize },

    #[error("Segment was never initialized by its creator")]
    NotInitialized,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ShmError {
    /// Wrap the current OS error for `op`
    pub(crate) fn last_os(op: &'static str) -> Self {
        ShmError::Os {
            op,
            source: io::Error::last_os_error(),
        }
    }
}
