//! Offer execution logic
//!
//! Completes pending offers or creates new ones, assigns keys and queues
//! the notifications each outcome needs.

use tracing::{debug, info, warn};
use svar_types::control::SvarState;
use svar_types::event::Event;
use svar_types::ids::{ApNum3, SvKey};
use svar_types::name::VarName;
use svar_types::notice::{NoticeKind, Notification};
use svar_types::partner::{Coupling, Partner, PartnerFlags};

use crate::events::notify;
use crate::matching::compat::can_couple;
use crate::record::{OfferedVar, Side};
use crate::registry::{Registry, RegistryError, N_VARS};

impl Registry {
    /// Offer variable `name` to `to` on behalf of `from`
    ///
    /// This is the main entry point. A compatible pending offer is completed
    /// and `Coupled` returned; otherwise a new row is created and `Offered`
    /// returned.
    pub fn match_or_make(
        &mut self,
        name: &VarName,
        to: ApNum3,
        from: Partner,
        outbox: &mut Vec<Notification>,
    ) -> Result<(SvKey, Coupling), RegistryError> {
        if !from.is_present() {
            return Err(RegistryError::InvalidPartner(from.to_string()));
        }

        if let Some(idx) = self.match_pending_offer(name, to, from, outbox) {
            return Ok((self.offered[idx].key, Coupling::Coupled));
        }

        let idx = self.create_offer(name, to, from, outbox)?;
        Ok((self.offered[idx].key, Coupling::Offered))
    }

    /// Complete the first compatible pending offer, returning its row.
    pub fn match_pending_offer(
        &mut self,
        name: &VarName,
        to: ApNum3,
        from: Partner,
        outbox: &mut Vec<Notification>,
    ) -> Option<usize> {
        let idx = self.offered.iter().position(|v| {
            v.coupling() == Coupling::Offered
                && v.name.matches(name)
                && can_couple(&v.offering.id, &v.target(), &to, &from.id)
        })?;

        let row = &mut self.offered[idx];
        row.accepting = Partner::new(from.id, from.pid, from.port);
        if row.name.has_wildcard() && !name.has_wildcard() {
            row.name = *name;
        }
        if row.state() == SvarState::NotShared {
            row.set_state(SvarState::Idle);
        }
        let key = row.key;
        let offering_port = row.offering.port;

        info!(
            key = %key,
            name = %row.name,
            offering = %row.offering.id,
            accepting = %from.id,
            "offer matched"
        );

        self.fire_event(idx, Side::Offering, Event::OFFER_MATCHED, outbox);
        notify(outbox, offering_port, NoticeKind::OfferMatched, key);
        Some(idx)
    }

    /// Create a new pending offer, returning its row.
    ///
    /// Fails when all `N_VARS` rows are in use.
    pub fn create_offer(
        &mut self,
        name: &VarName,
        to: ApNum3,
        from: Partner,
        outbox: &mut Vec<Notification>,
    ) -> Result<usize, RegistryError> {
        if !from.is_present() {
            return Err(RegistryError::InvalidPartner(from.to_string()));
        }

        let Some(idx) = self.offered.iter().position(|v| v.is_free()) else {
            warn!(name = %name, from = %from.id, "variable table full");
            return Err(RegistryError::TableFull { capacity: N_VARS });
        };

        let key = self.next_key(from.pid, from.id.proc);
        let offering = Partner::new(from.id, from.pid, from.port);
        self.offered[idx] = OfferedVar::offer(key, *name, offering, to);
        debug!(key = %key, name = %name, from = %from.id, to = %to, "offer created");

        if !to.is_general() {
            if let Some(slot) = self.find_slot(&to) {
                let port = self.active[slot].partner.port;
                if port != 0 {
                    self.offered[idx].accepting.flags.set(PartnerFlags::OFFER_SENT);
                    notify(outbox, port, NoticeKind::MakeOffer, key);
                }
            }
        }
        Ok(idx)
    }
}
