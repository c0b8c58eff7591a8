//! Access control
//!
//! Control vectors and states are stored from the offering side's point of
//! view. Every check below first converts them into the caller's point of
//! view (see `OfferedVar::view`) and then only ever tests the "by me" bits,
//! so the same code serves both sides.

use tracing::{debug, warn};
use svar_types::control::{Control, SvarState};
use svar_types::event::Event;
use svar_types::ids::{ApNum3, SvKey};
use svar_types::notice::Notification;
use svar_types::partner::Coupling;

use crate::record::Side;
use crate::registry::Registry;

impl Registry {
    /// Row index and caller side, or `None` (logged) if the caller is not a side
    fn caller_row(&self, key: SvKey, caller: &ApNum3, op: &str) -> Option<(usize, Side)> {
        let idx = self.find_var(key)?;
        match self.offered[idx].side_of(caller) {
            Some(side) => Some((idx, side)),
            None => {
                warn!(key = %key, caller = %caller, op, "caller is not a partner of this variable");
                None
            }
        }
    }

    pub fn get_state(&self, key: SvKey) -> SvarState {
        self.find_var(key)
            .map(|idx| self.offered[idx].state())
            .unwrap_or(SvarState::NotShared)
    }

    /// Record a read (`used`) or a write by `caller`.
    pub fn set_state(
        &mut self,
        key: SvKey,
        caller: &ApNum3,
        used: bool,
        outbox: &mut Vec<Notification>,
    ) {
        let Some((idx, side)) = self.caller_row(key, caller, "set_state") else {
            return;
        };
        let (control, state) = self.offered[idx].view(side);

        if used {
            if state == SvarState::OfferingHasSet {
                // reading back one's own value
                return;
            }
            self.offered[idx].set_state(SvarState::Idle);
            if control.contains(Control::USE_BY_OFFERING) {
                self.fire_event(idx, side.other(), Event::USE_SUCCESS, outbox);
            }
        } else {
            let new_state = match side {
                Side::Offering => SvarState::OfferingHasSet,
                Side::Accepting => SvarState::AcceptingHasSet,
            };
            self.offered[idx].set_state(new_state);
            if control.contains(Control::SET_BY_OFFERING) {
                self.fire_event(idx, side.other(), Event::SET_SUCCESS, outbox);
            }
        }
        debug!(key = %key, caller = %caller, used, state = %self.offered[idx].state(), "state changed");
    }

    /// May `caller` read the variable now?
    pub fn may_use(
        &mut self,
        key: SvKey,
        caller: &ApNum3,
        attempt: i32,
        outbox: &mut Vec<Notification>,
    ) -> bool {
        self.may_access(key, caller, attempt, Control::USE_BY_OFFERING, Event::USE_FAILED, outbox)
    }

    /// May `caller` write the variable now?
    pub fn may_set(
        &mut self,
        key: SvKey,
        caller: &ApNum3,
        attempt: i32,
        outbox: &mut Vec<Notification>,
    ) -> bool {
        self.may_access(key, caller, attempt, Control::SET_BY_OFFERING, Event::SET_FAILED, outbox)
    }

    fn may_access(
        &mut self,
        key: SvKey,
        caller: &ApNum3,
        attempt: i32,
        by_me: Control,
        failed: Event,
        outbox: &mut Vec<Notification>,
    ) -> bool {
        let Some((idx, side)) = self.caller_row(key, caller, "may_access") else {
            return false;
        };
        let (control, state) = self.offered[idx].view(side);
        let restriction = control & state.restriction();
        if !restriction.contains(by_me) {
            return true;
        }

        if attempt == 0 {
            self.fire_event(idx, side.other(), failed, outbox);
        }
        false
    }

    /// Combined control vector seen by `caller`
    pub fn get_control(&self, key: SvKey, caller: &ApNum3) -> Control {
        match self.caller_row(key, caller, "get_control") {
            Some((idx, side)) => self.offered[idx].view(side).0,
            None => Control::NONE,
        }
    }

    /// Set `caller`'s own control vector; returns the combined vector seen by `caller`.
    pub fn set_control(
        &mut self,
        key: SvKey,
        caller: &ApNum3,
        control: Control,
        outbox: &mut Vec<Notification>,
    ) -> Control {
        let Some((idx, side)) = self.caller_row(key, caller, "set_control") else {
            return Control::NONE;
        };
        self.offered[idx].partner_mut(side).flags.set_control(control);
        if self.offered[idx].coupling() == Coupling::Coupled {
            self.fire_event(idx, side.other(), Event::ACCESS_CONTROL_CHANGED, outbox);
        }
        self.offered[idx].view(side).0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svar_types::name::VarName;
    use svar_types::notice::NoticeKind;
    use svar_types::partner::Partner;

    const A: ApNum3 = ApNum3 { proc: 1001, parent: 0, grand: 0 };
    const B: ApNum3 = ApNum3 { proc: 1002, parent: 0, grand: 0 };

    fn coupled() -> (Registry, SvKey) {
        let mut reg = Registry::new();
        let mut out = Vec::new();
        let (key, _) = reg
            .match_or_make(&VarName::new("X"), B, Partner::new(A, 10, 3001), &mut out)
            .unwrap();
        reg.match_or_make(&VarName::new("X"), A, Partner::new(B, 20, 3002), &mut out)
            .unwrap();
        (reg, key)
    }

    #[test]
    fn test_unrestricted_by_default() {
        let (mut reg, key) = coupled();
        let mut out = Vec::new();
        reg.set_state(key, &A, false, &mut out);
        assert!(reg.may_set(key, &A, 0, &mut out));
        assert!(reg.may_use(key, &B, 0, &mut out));
        assert!(out.is_empty());
    }

    #[test]
    fn test_set_by_offering_gates_second_write() {
        let (mut reg, key) = coupled();
        let mut out = Vec::new();
        assert_eq!(
            reg.set_control(key, &A, Control::SET_BY_OFFERING, &mut out),
            Control::SET_BY_OFFERING
        );
        out.clear();

        reg.set_state(key, &A, false, &mut out);
        assert_eq!(reg.get_state(key), SvarState::OfferingHasSet);
        // the peer is told that the write succeeded
        assert!(out.contains(&Notification::new(3002, NoticeKind::NewEvent(Event::SET_SUCCESS), key)));
        out.clear();

        assert!(!reg.may_set(key, &A, 0, &mut out));
        assert_eq!(out, vec![Notification::new(3002, NoticeKind::NewEvent(Event::SET_FAILED), key)]);
        out.clear();
        assert!(!reg.may_set(key, &A, 1, &mut out));
        assert!(out.is_empty(), "retries must not notify again");

        // the accepting side may read; its read makes the row idle
        assert!(reg.may_use(key, &B, 0, &mut out));
        reg.set_state(key, &B, true, &mut out);
        assert_eq!(reg.get_state(key), SvarState::Idle);
        assert!(reg.may_set(key, &A, 0, &mut out));
    }

    #[test]
    fn test_read_back_keeps_state() {
        let (mut reg, key) = coupled();
        let mut out = Vec::new();
        reg.set_control(key, &A, Control::SET_BY_OFFERING, &mut out);
        reg.set_state(key, &A, false, &mut out);
        reg.set_state(key, &A, true, &mut out);
        assert_eq!(reg.get_state(key), SvarState::OfferingHasSet);
        assert!(!reg.may_set(key, &A, 0, &mut out));
    }

    #[test]
    fn test_set_by_offering_leaves_accepting_reader_free() {
        let (mut reg, key) = coupled();
        let mut out = Vec::new();
        reg.set_control(key, &A, Control::SET_BY_OFFERING, &mut out);
        reg.set_state(key, &A, false, &mut out);
        out.clear();

        // SET_BY_OFFERING restricts writes only
        assert!(reg.may_use(key, &B, 0, &mut out));
        reg.set_state(key, &A, true, &mut out);
        assert_eq!(reg.get_state(key), SvarState::OfferingHasSet);
        assert!(reg.may_use(key, &B, 0, &mut out));
        assert!(!out.iter().any(|n| n.kind == NoticeKind::NewEvent(Event::USE_FAILED)));
    }

    #[test]
    fn test_accepting_side_uses_mirrored_view() {
        let (mut reg, key) = coupled();
        let mut out = Vec::new();
        // accepting side: "I may not use twice before the other one sets"
        reg.set_control(key, &B, Control::USE_BY_OFFERING, &mut out);
        assert_eq!(reg.get_control(key, &B), Control::USE_BY_OFFERING);
        assert_eq!(reg.get_control(key, &A), Control::USE_BY_ACCEPTING);

        reg.set_state(key, &A, false, &mut out);
        assert!(reg.may_use(key, &B, 0, &mut out));
        reg.set_state(key, &B, true, &mut out);
        assert_eq!(reg.get_state(key), SvarState::Idle);
        out.clear();
        assert!(!reg.may_use(key, &B, 0, &mut out));
        assert_eq!(out, vec![Notification::new(3001, NoticeKind::NewEvent(Event::USE_FAILED), key)]);
    }

    #[test]
    fn test_use_success_fires_for_restricted_reader() {
        let (mut reg, key) = coupled();
        let mut out = Vec::new();
        reg.set_control(key, &B, Control::USE_BY_OFFERING, &mut out);
        reg.set_state(key, &A, false, &mut out);
        out.clear();
        reg.set_state(key, &B, true, &mut out);
        assert_eq!(out, vec![Notification::new(3001, NoticeKind::NewEvent(Event::USE_SUCCESS), key)]);
    }

    #[test]
    fn test_control_change_notifies_peer() {
        let (mut reg, key) = coupled();
        let mut out = Vec::new();
        reg.set_control(key, &A, Control::ALL, &mut out);
        assert_eq!(
            out,
            vec![Notification::new(3002, NoticeKind::NewEvent(Event::ACCESS_CONTROL_CHANGED), key)]
        );
    }

    #[test]
    fn test_stranger_is_refused() {
        let (mut reg, key) = coupled();
        let mut out = Vec::new();
        let stranger = ApNum3::single(1999);
        assert!(!reg.may_use(key, &stranger, 0, &mut out));
        assert_eq!(reg.set_control(key, &stranger, Control::ALL, &mut out), Control::NONE);
        reg.set_state(key, &stranger, false, &mut out);
        assert_eq!(reg.get_state(key), SvarState::Idle);
        assert!(out.is_empty());
    }
}
