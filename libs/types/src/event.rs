//! Event bits delivered to shared-variable partners

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// Set of pending events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Event(u32);

impl Event {
    pub const NONE: Event = Event(0);
    pub const OFFER_MATCHED: Event = Event(0x01);
    pub const OFFER_RETRACTED: Event = Event(0x02);
    pub const ACCESS_CONTROL_CHANGED: Event = Event(0x04);
    pub const SET_SUCCESS: Event = Event(0x08);
    pub const SET_FAILED: Event = Event(0x10);
    pub const USE_SUCCESS: Event = Event(0x20);
    pub const USE_FAILED: Event = Event(0x40);

    const NAMES: [(Event, &'static str); 7] = [
        (Event::OFFER_MATCHED, "OfferMatched"),
        (Event::OFFER_RETRACTED, "OfferRetracted"),
        (Event::ACCESS_CONTROL_CHANGED, "AccessControlChanged"),
        (Event::SET_SUCCESS, "SetSuccess"),
        (Event::SET_FAILED, "SetFailed"),
        (Event::USE_SUCCESS, "UseSuccess"),
        (Event::USE_FAILED, "UseFailed"),
    ];

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, other: Event) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Event) {
        self.0 |= other.0;
    }
}

impl BitOr for Event {
    type Output = Event;
    fn bitor(self, rhs: Event) -> Event {
        Event(self.0 | rhs.0)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let mut first = true;
        for (ev, name) in Self::NAMES {
            if self.contains(ev) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        let unknown = self.0 & !0x7F;
        if unknown != 0 {
            if !first {
                f.write_str("|")?;
            }
            write!(f, "0x{:X}", unknown)?;
        }
        Ok(())
    }
}
