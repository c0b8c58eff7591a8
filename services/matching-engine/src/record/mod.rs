//! Registry records
//!
//! Plain-old-data rows that can live inside a shared-memory segment

pub mod offered_var;
pub mod processor_slot;

pub use offered_var::{OfferedVar, Side};
pub use processor_slot::ProcessorSlot;
