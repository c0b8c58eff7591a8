//! Compatibility detection logic
//!
//! Determines when a pending offer can be completed by an incoming request

use svar_types::ids::ApNum3;

/// Check if a pending offer can be completed by a request
///
/// `offering` and `target` describe the pending row, `to` and `from` the
/// incoming request:
/// - nobody completes their own offer
/// - a general request only completes offers addressed to the requester;
///   two general offers never satisfy each other
/// - a specific request completes offers made by `to` that are either
///   general or addressed to the requester
pub fn can_couple(offering: &ApNum3, target: &ApNum3, to: &ApNum3, from: &ApNum3) -> bool {
    if offering == from {
        return false;
    }
    if to.is_general() {
        !target.is_general() && target == from
    } else {
        offering == to && (target.is_general() || target == from)
    }
}
