//! Registered processor slot

use serde::Serialize;
use svar_types::event::Event;
use svar_types::ids::ApNum3;
use svar_types::partner::Partner;

/// A live, registered processor and its pending events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[repr(C)]
pub struct ProcessorSlot {
    pub partner: Partner,
    /// Raw `Event` bits
    pub events: u32,
}

impl ProcessorSlot {
    pub const EMPTY: ProcessorSlot = ProcessorSlot {
        partner: Partner::EMPTY,
        events: 0,
    };

    pub fn is_used(&self) -> bool {
        self.partner.is_present()
    }

    pub fn holds(&self, id: &ApNum3) -> bool {
        self.is_used() && self.partner.id == *id
    }

    pub fn events(&self) -> Event {
        Event::from_bits(self.events)
    }

    pub fn clear(&mut self) {
        *self = Self::EMPTY;
    }
}
