//! Events for shared-variable partners
//!
//! An event is recorded twice: in the processor slot (the bitmap returned
//! by `get_events`) and as the `EVENT` flag on the processor's side of the
//! affected row (so `get_events` can name a key). Each event also sends a
//! `NewEvent` datagram to the processor's UDP port.

use tracing::debug;
use svar_types::event::Event;
use svar_types::ids::{ApNum3, SvKey};
use svar_types::notice::{NoticeKind, Notification};
use svar_types::partner::PartnerFlags;

use crate::record::Side;
use crate::registry::Registry;

/// Queue a datagram unless the receiver has no port
pub(crate) fn notify(outbox: &mut Vec<Notification>, port: u16, kind: NoticeKind, key: SvKey) {
    if port == 0 {
        return;
    }
    let n = Notification::new(port, kind, key);
    debug!(notice = %n, "queued notification");
    outbox.push(n);
}

impl Registry {
    /// Index of the slot registered for `id`
    pub(crate) fn find_slot(&self, id: &ApNum3) -> Option<usize> {
        self.active.iter().position(|s| s.holds(id))
    }

    /// Record `event` for one side of row `idx` and wake that side up.
    pub(crate) fn fire_event(
        &mut self,
        idx: usize,
        side: Side,
        event: Event,
        outbox: &mut Vec<Notification>,
    ) {
        let key = self.offered[idx].key;
        let partner = self.offered[idx].partner_mut(side);
        if !partner.is_present() {
            return;
        }
        partner.flags.set(PartnerFlags::EVENT);
        let id = partner.id;
        let mut port = partner.port;

        if let Some(slot) = self.find_slot(&id) {
            self.active[slot].events |= event.bits();
            if port == 0 {
                port = self.active[slot].partner.port;
            }
        }
        notify(outbox, port, NoticeKind::NewEvent(event), key);
    }

    /// Add `event` for processor `proc`, and for its side of `key` if given.
    pub fn add_event(
        &mut self,
        event: Event,
        proc: &ApNum3,
        key: SvKey,
        outbox: &mut Vec<Notification>,
    ) {
        if let Some(idx) = self.find_var(key) {
            if let Some(side) = self.offered[idx].side_of(proc) {
                self.fire_event(idx, side, event, outbox);
                return;
            }
        }

        if let Some(slot) = self.find_slot(proc) {
            self.active[slot].events |= event.bits();
            let port = self.active[slot].partner.port;
            notify(outbox, port, NoticeKind::NewEvent(event), key);
        }
    }

    /// Pending events of `proc` and the first row they concern.
    pub fn get_events(&self, proc: &ApNum3) -> (SvKey, Event) {
        let events = self
            .find_slot(proc)
            .map(|slot| self.active[slot].events())
            .unwrap_or(Event::NONE);

        let key = self
            .offered
            .iter()
            .filter(|v| !v.is_free())
            .find(|v| {
                v.side_of(proc)
                    .map(|side| v.partner(side).flags.has(PartnerFlags::EVENT))
                    .unwrap_or(false)
            })
            .map(|v| v.key)
            .unwrap_or(SvKey::NONE);

        (key, events)
    }

    /// Clear every pending event of `proc`, returning what was pending.
    pub fn clear_all_events(&mut self, proc: &ApNum3) -> Event {
        let mut pending = Event::NONE;
        if let Some(slot) = self.find_slot(proc) {
            pending = self.active[slot].events();
            self.active[slot].events = 0;
        }
        for v in self.offered.iter_mut().filter(|v| !v.is_free()) {
            if let Some(side) = v.side_of(proc) {
                v.partner_mut(side).flags.clear(PartnerFlags::EVENT);
            }
        }
        pending
    }

    /// Clear the event flag of `proc` on row `key`.
    ///
    /// When no other row of `proc` has a pending event, the processor's
    /// bitmap is cleared as well.
    pub fn clear_event(&mut self, key: SvKey, proc: &ApNum3) {
        if let Some(idx) = self.find_var(key) {
            if let Some(side) = self.offered[idx].side_of(proc) {
                self.offered[idx].partner_mut(side).flags.clear(PartnerFlags::EVENT);
            }
        }
        let (next, _) = self.get_events(proc);
        if next.is_none() {
            if let Some(slot) = self.find_slot(proc) {
                self.active[slot].events = 0;
            }
        }
    }
}
