//! Error types shared by the shared-variable crates
//!
//! Error taxonomy using thiserror

use thiserror::Error;

/// Errors raised while decoding or encoding wire fields
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("Truncated input: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("String too long for a 2-byte length prefix: {len} bytes")]
    StringTooLong { len: usize },

    #[error("Variable name too long: {len} code points")]
    NameTooLong { len: usize },

    #[error("Unknown notification tag: {0}")]
    UnknownTag(u16),

    #[error("Bad datagram length: expected {expected}, got {actual}")]
    BadDatagram { expected: usize, actual: usize },
}

/// Convenience alias for wire results
pub type WireResult<T> = Result<T, WireError>;
