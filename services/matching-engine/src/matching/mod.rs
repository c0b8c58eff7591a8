//! Matching logic module
//!
//! Implements offer/accept matching: an incoming offer either completes a
//! compatible pending offer or becomes a new pending offer itself.

pub mod compat;
pub mod offer;

pub use compat::can_couple;
