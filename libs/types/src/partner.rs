//! Partner records and coupling
//!
//! A shared-variable row has two sides. Each side is a `Partner`; whether
//! the row is coupled follows from which sides are present.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::control::Control;
use crate::ids::{ApNum3, AP_NULL};

/// Per-side flag word
///
/// The low nibble is that side's own control vector, seen from that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct PartnerFlags(u16);

impl PartnerFlags {
    pub const NONE: PartnerFlags = PartnerFlags(0);
    pub const CONTROL_MASK: u16 = 0x000F;
    /// An event is pending for this side on this row
    pub const EVENT: u16 = 0x0010;
    /// A MakeOffer notification was sent to this side
    pub const OFFER_SENT: u16 = 0x0020;

    pub fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u16 {
        self.0
    }

    pub fn control(&self) -> Control {
        Control::from_bits((self.0 & Self::CONTROL_MASK) as u8)
    }

    pub fn set_control(&mut self, ctl: Control) {
        self.0 = (self.0 & !Self::CONTROL_MASK) | ctl.bits() as u16;
    }

    pub fn has(&self, flag: u16) -> bool {
        self.0 & flag != 0
    }

    pub fn set(&mut self, flag: u16) {
        self.0 |= flag;
    }

    pub fn clear(&mut self, flag: u16) {
        self.0 &= !flag;
    }
}

/// One side of a shared variable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct Partner {
    pub id: ApNum3,
    pub pid: u32,
    /// UDP port for notifications (0 = none)
    pub port: u16,
    pub flags: PartnerFlags,
}

impl Partner {
    pub const EMPTY: Partner = Partner {
        id: ApNum3::NULL,
        pid: 0,
        port: 0,
        flags: PartnerFlags::NONE,
    };

    pub fn new(id: ApNum3, pid: u32, port: u16) -> Self {
        Self {
            id,
            pid,
            port,
            flags: PartnerFlags::default(),
        }
    }

    /// An absent side that only remembers whom an offer is addressed to
    pub fn target(id: ApNum3) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// A side is present once a live process fills it in.
    pub fn is_present(&self) -> bool {
        self.pid != 0 && self.id.proc > AP_NULL
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for Partner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (pid {}, port {})", self.id, self.pid, self.port)
    }
}

/// Coupling of a row, derived from the presence of its sides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Coupling {
    #[default]
    NoCoupling = 0,
    Offered = 1,
    Coupled = 2,
}

impl Coupling {
    pub fn from_sides(offering: &Partner, accepting: &Partner) -> Self {
        match (offering.is_present(), accepting.is_present()) {
            (true, true) => Coupling::Coupled,
            (true, false) => Coupling::Offered,
            // an accepting side never stands alone; such a row is unusable
            _ => Coupling::NoCoupling,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Coupling::Offered,
            2 => Coupling::Coupled,
            _ => Coupling::NoCoupling,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Coupling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coupling::NoCoupling => write!(f, "-"),
            Coupling::Offered => write!(f, "O"),
            Coupling::Coupled => write!(f, "C"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_needs_pid_and_proc() {
        assert!(!Partner::default().is_present());
        assert!(!Partner::target(ApNum3::single(1001)).is_present());
        assert!(!Partner::new(ApNum3::NULL, 42, 0).is_present());
        assert!(Partner::new(ApNum3::single(1001), 42, 0).is_present());
    }

    #[test]
    fn test_coupling_from_sides() {
        let a = Partner::new(ApNum3::single(1001), 10, 0);
        let b = Partner::new(ApNum3::single(1002), 11, 0);
        let target = Partner::target(ApNum3::single(1002));
        let empty = Partner::default();

        assert_eq!(Coupling::from_sides(&a, &b), Coupling::Coupled);
        assert_eq!(Coupling::from_sides(&a, &target), Coupling::Offered);
        assert_eq!(Coupling::from_sides(&a, &empty), Coupling::Offered);
        assert_eq!(Coupling::from_sides(&empty, &empty), Coupling::NoCoupling);
        assert_eq!(Coupling::from_sides(&empty, &b), Coupling::NoCoupling);
    }

    #[test]
    fn test_flags_keep_control_separate() {
        let mut flags = PartnerFlags::default();
        flags.set(PartnerFlags::EVENT);
        flags.set_control(Control::from_bits(0x0F));
        assert!(flags.has(PartnerFlags::EVENT));
        assert_eq!(flags.control().bits(), 0x0F);

        flags.set_control(Control::from_bits(0x02));
        assert_eq!(flags.bits(), 0x12);
        flags.clear(PartnerFlags::EVENT);
        assert_eq!(flags.bits(), 0x02);
    }

    #[test]
    fn test_coupling_u8_round_trip() {
        for c in [Coupling::NoCoupling, Coupling::Offered, Coupling::Coupled] {
            assert_eq!(Coupling::from_u8(c.as_u8()), c);
        }
        assert_eq!(Coupling::from_u8(99), Coupling::NoCoupling);
    }
}
