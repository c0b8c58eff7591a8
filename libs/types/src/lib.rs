//! Types library for APL shared variables
//!
//! This library provides the core type definitions shared by the registry,
//! the local shared-memory transport and the remote signal transport.
//!
//! # Modules
//! - `wire`: Big-endian field codecs used by both transports
//! - `ids`: Processor identities (ApNum, ApNum3) and variable keys (SvKey)
//! - `partner`: One side of a coupling, and the derived coupling of a row
//! - `name`: Fixed-capacity variable names and name matching
//! - `control`: Access-control bits and the row state
//! - `event`: Event bits delivered to partners
//! - `notice`: UDP notification datagram
//! - `errors`: Error taxonomy

// Public modules
pub mod wire;
pub mod ids;
pub mod partner;
pub mod name;
pub mod control;
pub mod event;
pub mod notice;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::partner::*;
    pub use crate::name::*;
    pub use crate::control::*;
    pub use crate::event::*;
    pub use crate::notice::*;
    pub use crate::errors::*;
}
