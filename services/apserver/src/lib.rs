//! Registry server for APL shared variables
//!
//! Hosts one `Registry` on the heap for processes that cannot map the
//! shared segment. Clients speak the signal protocol of `svar-signals`;
//! the server answers them and sends the same UDP notifications a local
//! handle would.
//!
//! # Modules
//! - `config`: `ServerConfig` (endpoints, notify host, log level)
//! - `server`: Listeners and accept loops
//! - `session`: One task per connection, cleanup on disconnect
//! - `dispatch`: Signal to registry mapping
//! - `state`: Shared registry, value store and notifier

pub mod config;
pub mod dispatch;
pub mod error;
pub mod server;
pub mod session;
pub mod state;

pub use config::ServerConfig;
pub use error::ServerError;
pub use server::Server;
pub use session::Session;
pub use state::ServerState;
