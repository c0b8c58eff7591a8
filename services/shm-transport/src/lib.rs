//! Local shared-variable transport
//!
//! Exposes the registry to every process on the machine through a POSIX
//! shared-memory segment guarded by process-shared semaphores, and carries
//! wake-up hints between processes as UDP datagrams.
//!
//! # Modules
//! - `config`: Local transport configuration
//! - `error`: Error taxonomy
//! - `semaphore`: Process-shared semaphore guard
//! - `segment`: Segment layout, creation, attach and mapping
//! - `liveness`: Process liveness probe for stale reclamation
//! - `udp`: Notification sender and event listener
//! - `handle`: `SvarDb`, the per-process registry handle

pub mod config;
pub mod error;
pub mod semaphore;
pub mod segment;
pub mod liveness;
pub mod udp;
pub mod handle;

pub use config::SvarConfig;
pub use error::ShmError;
pub use handle::SvarDb;
pub use liveness::ProcessProbe;
pub use udp::{EventListener, UdpNotifier};
