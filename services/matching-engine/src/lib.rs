//! Shared Variable Registry
//!
//! Offer/accept matching for APL shared variables. Everything here is pure
//! logic over a fixed-capacity `Registry`; notifications that have to leave
//! the process are appended to an outbox for the transport to send.
//!
//! **Key Invariants:**
//! - Coupling is derived from which sides are present, never stored
//! - Complementary offers converge to exactly one coupled row
//! - Keys are unique among live rows and never 0
//! - Nobody couples with their own offer

pub mod record;
pub mod matching;
pub mod registry;
pub mod access;
pub mod retract;
pub mod processors;
pub mod events;
pub mod reclaim;
pub mod dump;
pub mod store;

pub use record::{OfferedVar, ProcessorSlot, Side};
pub use reclaim::{Liveness, ReclaimReport};
pub use registry::{Registry, RegistryError, N_PROCS, N_VARS};
pub use store::{wait_may_set, wait_may_use, RetryPolicy, SvarStore};
