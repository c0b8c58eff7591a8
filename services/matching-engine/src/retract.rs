//! Retracting offers
//!
//! Retracting one side of a coupled row leaves the other side holding an
//! `Offered` row addressed to the partner that left, so the same partner
//! can couple again later. A row with no side left is cleared.

use tracing::{info, warn};
use svar_types::control::SvarState;
use svar_types::event::Event;
use svar_types::ids::{ApNum3, SvKey};
use svar_types::notice::{NoticeKind, Notification};
use svar_types::partner::{Coupling, Partner};

use crate::events::notify;
use crate::record::Side;
use crate::registry::Registry;

impl Registry {
    /// UDP port to tell about a retract: the side's own port, or for an
    /// absent target the port it registered with.
    fn retract_port(&self, p: &Partner) -> u16 {
        if p.is_present() {
            return p.port;
        }
        if p.id.is_general() {
            return 0;
        }
        self.find_slot(&p.id)
            .map(|slot| self.active[slot].partner.port)
            .unwrap_or(0)
    }

    /// Retract `caller`'s side of `key`, returning the coupling before.
    ///
    /// A caller that is not a side of the row changes nothing.
    pub fn retract(
        &mut self,
        key: SvKey,
        caller: &ApNum3,
        outbox: &mut Vec<Notification>,
    ) -> Coupling {
        let Some(idx) = self.find_var(key) else {
            return Coupling::NoCoupling;
        };
        let before = self.offered[idx].coupling();
        let Some(side) = self.offered[idx].side_of(caller) else {
            warn!(key = %key, caller = %caller, "retract by a non-partner ignored");
            return before;
        };

        let ports = [
            self.retract_port(&self.offered[idx].offering),
            self.retract_port(&self.offered[idx].accepting),
        ];

        let row = &mut self.offered[idx];
        match side {
            Side::Offering => {
                let departed = row.offering.id;
                if before == Coupling::Coupled {
                    row.offering = row.accepting;
                    row.accepting = Partner::target(departed);
                } else {
                    row.offering.clear();
                }
            }
            Side::Accepting => {
                let departed = row.accepting.id;
                row.accepting = Partner::target(departed);
            }
        }

        let after = row.coupling();
        info!(key = %key, caller = %caller, before = ?before, after = ?after, "offer retracted");

        if after == Coupling::NoCoupling {
            row.clear();
        } else {
            row.set_state(SvarState::NotShared);
            self.fire_event(idx, Side::Offering, Event::OFFER_RETRACTED, outbox);
        }

        for port in ports {
            notify(outbox, port, NoticeKind::RetractOffer, key);
        }
        before
    }

    /// Retract every side held by process `pid`; returns the number of retracts.
    pub fn retract_all_of(&mut self, pid: u32, outbox: &mut Vec<Notification>) -> usize {
        let mut count = 0;
        for idx in 0..self.offered.len() {
            while let Some(side) = self.offered[idx].side_of_pid(pid) {
                let key = self.offered[idx].key;
                let id = self.offered[idx].partner(side).id;
                self.retract(key, &id, outbox);
                count += 1;
            }
        }
        count
    }

    /// Retract every side held by processor `id`; returns the number of retracts.
    pub fn retract_all_by(&mut self, id: &ApNum3, outbox: &mut Vec<Notification>) -> usize {
        let mut count = 0;
        for idx in 0..self.offered.len() {
            if self.offered[idx].side_of(id).is_some() {
                let key = self.offered[idx].key;
                self.retract(key, id, outbox);
                count += 1;
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svar_types::name::VarName;

    const A: ApNum3 = ApNum3 { proc: 1001, parent: 0, grand: 0 };
    const B: ApNum3 = ApNum3 { proc: 1002, parent: 0, grand: 0 };

    fn coupled(reg: &mut Registry) -> SvKey {
        let mut out = Vec::new();
        let (key, _) = reg
            .match_or_make(&VarName::new("X"), B, Partner::new(A, 10, 3001), &mut out)
            .unwrap();
        reg.match_or_make(&VarName::new("X"), A, Partner::new(B, 20, 3002), &mut out)
            .unwrap();
        key
    }

    #[test]
    fn test_offering_retract_swaps_roles() {
        let mut reg = Registry::new();
        let mut out = Vec::new();
        let key = coupled(&mut reg);

        assert_eq!(reg.retract(key, &A, &mut out), Coupling::Coupled);
        let row = reg.get_var(key).unwrap();
        assert_eq!(row.coupling(), Coupling::Offered);
        assert_eq!(row.offering.id, B);
        assert_eq!(row.target(), A);
        assert!(!row.accepting.is_present());

        assert!(out.contains(&Notification::new(3001, NoticeKind::RetractOffer, key)));
        assert!(out.contains(&Notification::new(3002, NoticeKind::RetractOffer, key)));
    }

    #[test]
    fn test_accepting_retract_keeps_offering() {
        let mut reg = Registry::new();
        let mut out = Vec::new();
        let key = coupled(&mut reg);

        assert_eq!(reg.retract(key, &B, &mut out), Coupling::Coupled);
        let row = reg.get_var(key).unwrap();
        assert_eq!(row.offering.id, A);
        assert_eq!(row.target(), B);
        assert_eq!(row.coupling(), Coupling::Offered);
    }

    #[test]
    fn test_departed_partner_can_recouple() {
        let mut reg = Registry::new();
        let mut out = Vec::new();
        let key = coupled(&mut reg);

        reg.retract(key, &B, &mut out);
        let (again, c) = reg
            .match_or_make(&VarName::new("X"), A, Partner::new(B, 21, 3003), &mut out)
            .unwrap();
        assert_eq!(c, Coupling::Coupled);
        assert_eq!(again, key);
    }

    #[test]
    fn test_retract_twice_ends_uncoupled() {
        let mut reg = Registry::new();
        let mut out = Vec::new();
        let key = coupled(&mut reg);

        reg.retract(key, &A, &mut out);
        // B now offers; its retract leaves nothing
        assert_eq!(reg.retract(key, &B, &mut out), Coupling::Offered);
        assert_eq!(reg.coupling(key), Coupling::NoCoupling);
        assert_eq!(reg.used_rows().count(), 0);

        // and a further retract is a no-op
        assert_eq!(reg.retract(key, &B, &mut out), Coupling::NoCoupling);
    }

    #[test]
    fn test_non_partner_retract_is_noop() {
        let mut reg = Registry::new();
        let mut out = Vec::new();
        let key = coupled(&mut reg);
        let before = reg.get_var(key).unwrap();

        assert_eq!(reg.retract(key, &ApNum3::single(1500), &mut out), Coupling::Coupled);
        assert_eq!(reg.get_var(key).unwrap(), before);
        assert!(out.is_empty());
    }

    #[test]
    fn test_offered_retract_notifies_registered_target() {
        let mut reg = Registry::new();
        let mut out = Vec::new();
        reg.register_processor(B, 20, 3002);
        let (key, _) = reg
            .match_or_make(&VarName::new("X"), B, Partner::new(A, 10, 0), &mut out)
            .unwrap();
        out.clear();

        assert_eq!(reg.retract(key, &A, &mut out), Coupling::Offered);
        assert_eq!(out, vec![Notification::new(3002, NoticeKind::RetractOffer, key)]);
        assert!(reg.get_var(key).is_none());
    }

    #[test]
    fn test_retract_all_of_pid() {
        let mut reg = Registry::new();
        let mut out = Vec::new();
        let k1 = coupled(&mut reg);
        let (k2, _) = reg
            .match_or_make(&VarName::new("Y"), ApNum3::GENERAL, Partner::new(A, 10, 0), &mut out)
            .unwrap();

        assert_eq!(reg.retract_all_of(10, &mut out), 2);
        assert!(reg.get_var(k2).is_none());
        let row = reg.get_var(k1).unwrap();
        assert_eq!(row.offering.id, B);
        assert_eq!(row.coupling(), Coupling::Offered);
    }

    #[test]
    fn test_retract_all_by_id_spares_same_pid() {
        let mut reg = Registry::new();
        let mut out = Vec::new();
        // two APs in one process
        let (k1, _) = reg
            .match_or_make(&VarName::new("X"), ApNum3::GENERAL, Partner::new(A, 10, 0), &mut out)
            .unwrap();
        let (k2, _) = reg
            .match_or_make(&VarName::new("Y"), ApNum3::GENERAL, Partner::new(B, 10, 0), &mut out)
            .unwrap();

        assert_eq!(reg.retract_all_by(&A, &mut out), 1);
        assert!(reg.get_var(k1).is_none());
        assert!(reg.get_var(k2).is_some());
    }
}
