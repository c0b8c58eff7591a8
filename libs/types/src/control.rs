//! Access-control bits and row state
//!
//! Both are expressed from the offering side's point of view. `mirror`
//! converts between the offering and the accepting point of view.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr};

/// Four access-control bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Control(u8);

impl Control {
    pub const NONE: Control = Control(0);
    pub const SET_BY_OFFERING: Control = Control(0x08);
    pub const SET_BY_ACCEPTING: Control = Control(0x04);
    pub const USE_BY_OFFERING: Control = Control(0x02);
    pub const USE_BY_ACCEPTING: Control = Control(0x01);
    pub const ALL: Control = Control(0x0F);

    /// Build from raw bits; anything above the low nibble is dropped.
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0x0F)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, other: Control) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Swap the offering and accepting roles.
    pub fn mirror(self) -> Self {
        Self(((self.0 & 0x0A) >> 1) | ((self.0 & 0x05) << 1))
    }
}

impl BitOr for Control {
    type Output = Control;
    fn bitor(self, rhs: Control) -> Control {
        Control(self.0 | rhs.0)
    }
}

impl BitAnd for Control {
    type Output = Control;
    fn bitand(self, rhs: Control) -> Control {
        Control(self.0 & rhs.0)
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // rendered as the OAOA / SSUU columns of the database dump
        for bit in [0x08u8, 0x04, 0x02, 0x01] {
            write!(f, "{}", if self.0 & bit != 0 { '1' } else { '0' })?;
        }
        Ok(())
    }
}

/// Who most recently wrote the variable
///
/// Each state is stored as the set of accesses it restricts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SvarState {
    #[default]
    NotShared = 0x00,
    Idle = 0x03,
    OfferingHasSet = 0x0A,
    AcceptingHasSet = 0x05,
}

impl SvarState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0x03 => SvarState::Idle,
            0x0A => SvarState::OfferingHasSet,
            0x05 => SvarState::AcceptingHasSet,
            _ => SvarState::NotShared,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// The accesses this state restricts, offering point of view
    pub fn restriction(self) -> Control {
        Control::from_bits(self as u8)
    }

    /// The state as seen by the accepting side
    pub fn mirror(self) -> Self {
        match self {
            SvarState::OfferingHasSet => SvarState::AcceptingHasSet,
            SvarState::AcceptingHasSet => SvarState::OfferingHasSet,
            other => other,
        }
    }
}

impl fmt::Display for SvarState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SvarState::NotShared => "NotShared",
            SvarState::Idle => "Idle",
            SvarState::OfferingHasSet => "OfferingHasSet",
            SvarState::AcceptingHasSet => "AcceptingHasSet",
        };
        f.write_str(s)
    }
}
