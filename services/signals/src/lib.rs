//! Remote shared-variable transport
//!
//! Processes that cannot map the shared registry talk to a registry
//! server instead. Requests and responses are binary signals in
//! length-prefixed frames over TCP or a unix socket.
//!
//! # Modules
//! - `signal`: Signal ids and the `Signal` sum type
//! - `codec`: Payload encoding and decoding
//! - `frame`: Length-prefixed framing with a growable receive buffer
//! - `endpoint`: TCP / unix / abstract endpoints and client streams
//! - `config`: Client configuration
//! - `client`: `RemoteRegistry`, the blocking `SvarStore` client
//! - `asyncio`: Async framing (feature `tokio`)

pub mod signal;
pub mod codec;
pub mod frame;
pub mod endpoint;
pub mod config;
pub mod client;
pub mod error;
#[cfg(feature = "tokio")]
pub mod asyncio;

pub use client::RemoteRegistry;
pub use config::ClientConfig;
pub use endpoint::{Endpoint, Stream};
pub use error::SignalError;
pub use frame::{RecvBuffer, MAX_FRAME_LEN};
pub use signal::{Signal, SignalId, NO_ERROR, VALUE_ERROR};
