//! Signal dispatch
//!
//! Maps each request onto the registry and builds its response. One-way
//! signals produce no response. Requests that need a caller identity get a
//! neutral answer until the connection has registered.

use tracing::{debug, warn};

use svar_signals::codec::encode_record;
use svar_signals::{Signal, NO_ERROR, VALUE_ERROR};
use svar_types::control::Control;
use svar_types::event::Event;
use svar_types::ids::{ApNum3, SvKey};
use svar_types::name::is_ctl_dat_pair;
use svar_types::notice::{NoticeKind, Notification};
use svar_types::partner::{Coupling, Partner};

use crate::error::ServerError;
use crate::session::Session;
use crate::state::Shared;

/// Port of the side opposite `caller` on `key`, falling back to the
/// registration of an absent target.
fn peer_port(shared: &Shared, key: SvKey, caller: &ApNum3) -> u16 {
    let reg = &shared.registry;
    let Some(row) = reg.get_var(key) else {
        return 0;
    };
    let Some(side) = row.side_of(caller) else {
        return 0;
    };
    let peer = row.partner(side.other());
    if peer.port != 0 {
        peer.port
    } else {
        reg.get_udp_port(&peer.id)
    }
}

fn is_side(shared: &Shared, key: SvKey, caller: &ApNum3) -> bool {
    shared
        .registry
        .get_var(key)
        .and_then(|row| row.side_of(caller))
        .is_some()
}

impl Session {
    /// Handle one signal from the client.
    pub fn dispatch(&mut self, signal: Signal) -> Result<Option<Signal>, ServerError> {
        let me = self.identity();
        let reply = match signal {
            Signal::RegisterProcessor { id, evconn, progname, pid, port } => {
                let yes = self.register(id, evconn, &progname, pid, port);
                Some(Signal::YesNo { yes })
            }
            Signal::UnregisterProcessor { id } => {
                if me.map(|p| p.id) == Some(id) {
                    self.state
                        .with_shared(|s, _| s.registry.unregister_processor(&id));
                } else {
                    warn!(peer = %self.peer, id = %id, "unregister of a foreign id ignored");
                }
                None
            }
            Signal::IsRegisteredId { id } => {
                let yes = self.state.with_shared(|s, _| s.registry.is_registered(&id));
                Some(Signal::YesNo { yes })
            }
            Signal::MatchOrMake { name, to, from } => {
                let result = match me {
                    Some(partner) if partner.id == from => {
                        self.state.with_shared(|s, outbox| {
                            s.registry
                                .match_or_make(&name, to, partner, outbox)
                                .unwrap_or_else(|e| {
                                    warn!(name = %name, error = %e, "offer failed");
                                    (SvKey::NONE, Coupling::NoCoupling)
                                })
                        })
                    }
                    _ => {
                        warn!(peer = %self.peer, from = %from, "offer on behalf of another processor refused");
                        (SvKey::NONE, Coupling::NoCoupling)
                    }
                };
                Some(Signal::MatchOrMakeResult { key: result.0, coupling: result.1 })
            }
            Signal::MakeOffer { key } => {
                self.forward(me, key, NoticeKind::MakeOffer);
                None
            }
            Signal::RetractOffer { key } => {
                self.forward(me, key, NoticeKind::RetractOffer);
                None
            }
            Signal::RetractVar { key } => {
                let coupling = match me {
                    Some(p) => self
                        .state
                        .with_shared(|s, outbox| s.registry.retract(key, &p.id, outbox)),
                    None => Coupling::NoCoupling,
                };
                Some(Signal::CouplingIs { key, coupling })
            }
            Signal::GetCoupling { key } => {
                let coupling = self.state.with_shared(|s, _| s.registry.coupling(key));
                Some(Signal::CouplingIs { key, coupling })
            }
            Signal::GetState { key } => {
                let state = self.state.with_shared(|s, _| s.registry.get_state(key));
                Some(Signal::StateIs { key, state })
            }
            Signal::SetState { key, used, loc } => {
                if let Some(p) = me {
                    debug!(key = %key, used, loc = %loc, "set state");
                    self.state
                        .with_shared(|s, outbox| s.registry.set_state(key, &p.id, used, outbox));
                }
                None
            }
            Signal::GetControl { key } => {
                let control = match me {
                    Some(p) => self.state.with_shared(|s, _| s.registry.get_control(key, &p.id)),
                    None => Control::NONE,
                };
                Some(Signal::ControlIs { key, control })
            }
            Signal::SetControl { key, control } => {
                let control = match me {
                    Some(p) => self.state.with_shared(|s, outbox| {
                        s.registry.set_control(key, &p.id, control, outbox)
                    }),
                    None => Control::NONE,
                };
                Some(Signal::ControlIs { key, control })
            }
            Signal::MayUse { key, attempt } => {
                let yes = me.is_some_and(|p| {
                    self.state
                        .with_shared(|s, outbox| s.registry.may_use(key, &p.id, attempt, outbox))
                });
                Some(Signal::YesNo { yes })
            }
            Signal::MaySet { key, attempt } => {
                let yes = me.is_some_and(|p| {
                    self.state
                        .with_shared(|s, outbox| s.registry.may_set(key, &p.id, attempt, outbox))
                });
                Some(Signal::YesNo { yes })
            }
            Signal::GetValue { key } => {
                let value = self.state.with_shared(|s, _| s.values.get(&key).cloned());
                Some(match value {
                    Some(cdr_value) => Signal::ValueIs {
                        key,
                        error: NO_ERROR,
                        error_loc: String::new(),
                        cdr_value,
                    },
                    None => Signal::ValueIs {
                        key,
                        error: VALUE_ERROR,
                        error_loc: "GET_VALUE".to_string(),
                        cdr_value: Vec::new(),
                    },
                })
            }
            Signal::AssignValue { key, cdr_value } => {
                let stored = me.is_some_and(|p| {
                    self.state.with_shared(|s, _| {
                        if !is_side(s, key, &p.id) {
                            return false;
                        }
                        s.values.insert(key, cdr_value);
                        true
                    })
                });
                Some(if stored {
                    Signal::SvarAssigned { key, error: NO_ERROR, error_loc: String::new() }
                } else {
                    warn!(peer = %self.peer, key = %key, "value refused");
                    Signal::SvarAssigned {
                        key,
                        error: VALUE_ERROR,
                        error_loc: "ASSIGN_VALUE".to_string(),
                    }
                })
            }
            Signal::AssignWswsVar { key, cdr_value } => {
                if let Some(p) = me {
                    self.state.with_shared(|s, _| {
                        if is_side(s, key, &p.id) {
                            s.wsws.insert(key, cdr_value);
                        }
                    });
                }
                None
            }
            Signal::ReadWswsVar { key } => {
                let cdr_value = self
                    .state
                    .with_shared(|s, _| s.wsws.get(&key).cloned())
                    .unwrap_or_default();
                Some(Signal::WswsValueIs { cdr_value })
            }
            Signal::ReadSvarRecord { key } => {
                let row = self.state.with_shared(|s, _| s.registry.get_var(key));
                Some(Signal::SvarRecordIs { record: encode_record(row.as_ref())? })
            }
            Signal::FindOfferingId { key } => {
                let id = self.state.with_shared(|s, _| s.registry.find_offering_id(key));
                Some(Signal::OfferingIdIs { id })
            }
            Signal::GetOfferingProcs { to_proc } => {
                let procs = self
                    .state
                    .with_shared(|s, _| s.registry.offering_processors(to_proc));
                Some(Signal::OfferingProcsAre { procs })
            }
            Signal::GetOfferedVars { to_proc, from_proc } => {
                let names = self
                    .state
                    .with_shared(|s, _| s.registry.offered_variables(to_proc, from_proc));
                Some(Signal::OfferedVarsAre { names })
            }
            Signal::FindPairingKey { key } => {
                let key = self
                    .state
                    .with_shared(|s, _| s.registry.pairing_key(key, is_ctl_dat_pair));
                Some(Signal::PairingKeyIs { key })
            }
            Signal::GetEvents { id } => {
                let (key, events) = self.state.with_shared(|s, _| s.registry.get_events(&id));
                Some(Signal::EventsAre { key, events })
            }
            Signal::ClearAllEvents { id } => {
                let events = self.state.with_shared(|s, _| s.registry.clear_all_events(&id));
                Some(Signal::EventsAre { key: SvKey::NONE, events })
            }
            Signal::AddEvent { key, id, event } => {
                if event != Event::NONE {
                    self.state
                        .with_shared(|s, outbox| s.registry.add_event(event, &id, key, outbox));
                }
                None
            }
            Signal::PrintSvarDb => {
                let printout = self.state.with_shared(|s, _| s.registry.dump());
                Some(Signal::SvarDbPrinted { printout })
            }
            other @ (Signal::ValueIs { .. }
            | Signal::SvarAssigned { .. }
            | Signal::SvarRecordIs { .. }
            | Signal::YesNo { .. }
            | Signal::MatchOrMakeResult { .. }
            | Signal::OfferingIdIs { .. }
            | Signal::OfferingProcsAre { .. }
            | Signal::OfferedVarsAre { .. }
            | Signal::PairingKeyIs { .. }
            | Signal::EventsAre { .. }
            | Signal::WswsValueIs { .. }
            | Signal::SvarDbPrinted { .. }
            | Signal::StateIs { .. }
            | Signal::ControlIs { .. }
            | Signal::CouplingIs { .. }) => {
                return Err(ServerError::UnexpectedSignal(other.id()));
            }
        };
        Ok(reply)
    }

    /// Bind the connection to `id` on first registration.
    fn register(&mut self, id: ApNum3, evconn: bool, progname: &str, pid: u32, port: u16) -> bool {
        if let Some(bound) = self.identity() {
            if bound.id != id {
                warn!(
                    peer = %self.peer,
                    bound = %bound.id,
                    id = %id,
                    "connection already registered as another processor"
                );
                return false;
            }
        }
        let ok = self
            .state
            .with_shared(|s, _| s.registry.register_processor(id, pid, port));
        if ok {
            debug!(peer = %self.peer, id = %id, progname, evconn, "session bound");
            self.bind(Partner::new(id, pid, port));
        }
        ok
    }

    /// Pass an offer or retract notice on to the peer of `key`.
    fn forward(&self, me: Option<Partner>, key: SvKey, kind: NoticeKind) {
        let Some(p) = me else {
            return;
        };
        self.state.with_shared(|s, outbox| {
            let port = peer_port(s, key, &p.id);
            if port != 0 {
                outbox.push(Notification::new(port, kind, key));
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ServerState;
    use std::net::{IpAddr, Ipv4Addr};
    use svar_matching::Side;
    use svar_types::control::SvarState;
    use svar_types::name::VarName;

    const A: ApNum3 = ApNum3 { proc: 1001, parent: 0, grand: 0 };
    const B: ApNum3 = ApNum3 { proc: 1002, parent: 0, grand: 0 };

    fn state() -> ServerState {
        ServerState::new(IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap()
    }

    fn registered(state: &ServerState, id: ApNum3, pid: u32) -> Session {
        let mut s = Session::new(state.clone(), format!("test-{}", id.proc));
        let reply = s
            .dispatch(Signal::RegisterProcessor {
                id,
                evconn: false,
                progname: "test".into(),
                pid,
                port: 0,
            })
            .unwrap();
        assert_eq!(reply, Some(Signal::YesNo { yes: true }));
        s
    }

    fn state_of(s: &Session, key: SvKey) -> SvarState {
        s.state.with_shared(|shared, _| shared.registry.get_state(key))
    }

    fn side_of(s: &Session, key: SvKey, id: &ApNum3) -> Option<Side> {
        s.state
            .with_shared(|shared, _| shared.registry.get_var(key).and_then(|row| row.side_of(id)))
    }

    fn offer(s: &mut Session, name: &str, to: ApNum3, from: ApNum3) -> (SvKey, Coupling) {
        match s
            .dispatch(Signal::MatchOrMake { name: VarName::new(name), to, from })
            .unwrap()
        {
            Some(Signal::MatchOrMakeResult { key, coupling }) => (key, coupling),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_unbound_session_is_neutral() {
        let mut s = Session::new(state(), "anon".into());
        assert_eq!(
            offer(&mut s, "X", B, A),
            (SvKey::NONE, Coupling::NoCoupling)
        );
        assert_eq!(
            s.dispatch(Signal::MaySet { key: SvKey::from_raw(1), attempt: 0 }).unwrap(),
            Some(Signal::YesNo { yes: false })
        );
        assert_eq!(
            s.dispatch(Signal::RetractVar { key: SvKey::from_raw(1) }).unwrap(),
            Some(Signal::CouplingIs { key: SvKey::from_raw(1), coupling: Coupling::NoCoupling })
        );
    }

    #[test]
    fn test_offer_as_another_processor_refused() {
        let state = state();
        let _a = registered(&state, A, 10);
        let mut b = registered(&state, B, 20);
        let mut anon = Session::new(state.clone(), "anon".into());

        assert_eq!(offer(&mut anon, "X", ApNum3::GENERAL, A), (SvKey::NONE, Coupling::NoCoupling));
        assert_eq!(offer(&mut b, "Y", ApNum3::GENERAL, A), (SvKey::NONE, Coupling::NoCoupling));
        drop(anon);
        assert_eq!(state.snapshot().used_rows().count(), 0);

        // its own identity still works
        assert_eq!(offer(&mut b, "Y", ApNum3::GENERAL, B).1, Coupling::Offered);
    }

    #[test]
    fn test_offer_accept_and_value() {
        let state = state();
        let mut a = registered(&state, A, 10);
        let mut b = registered(&state, B, 20);

        let (key, c1) = offer(&mut a, "X", B, A);
        assert_eq!(c1, Coupling::Offered);
        let (key2, c2) = offer(&mut b, "X", A, B);
        assert_eq!((key2, c2), (key, Coupling::Coupled));
        assert_eq!(side_of(&b, key, &B), Some(Side::Accepting));

        // unset value
        match b.dispatch(Signal::GetValue { key }).unwrap() {
            Some(Signal::ValueIs { error, .. }) => assert_eq!(error, VALUE_ERROR),
            other => panic!("unexpected reply {:?}", other),
        }

        a.dispatch(Signal::SetState { key, used: false, loc: "write".into() })
            .unwrap();
        assert_eq!(
            a.dispatch(Signal::AssignValue { key, cdr_value: vec![1, 2, 3] }).unwrap(),
            Some(Signal::SvarAssigned { key, error: NO_ERROR, error_loc: String::new() })
        );
        assert_eq!(state_of(&a, key), SvarState::OfferingHasSet);
        assert_eq!(
            b.dispatch(Signal::GetValue { key }).unwrap(),
            Some(Signal::ValueIs {
                key,
                error: NO_ERROR,
                error_loc: String::new(),
                cdr_value: vec![1, 2, 3],
            })
        );
    }

    #[test]
    fn test_outsider_cannot_assign() {
        let state = state();
        let mut a = registered(&state, A, 10);
        let mut c = registered(&state, ApNum3::single(1500), 30);
        let (key, _) = offer(&mut a, "X", B, A);

        match c.dispatch(Signal::AssignValue { key, cdr_value: vec![9] }).unwrap() {
            Some(Signal::SvarAssigned { error, .. }) => assert_eq!(error, VALUE_ERROR),
            other => panic!("unexpected reply {:?}", other),
        }
        c.dispatch(Signal::AssignWswsVar { key, cdr_value: vec![9] }).unwrap();
        assert_eq!(
            c.dispatch(Signal::ReadWswsVar { key }).unwrap(),
            Some(Signal::WswsValueIs { cdr_value: Vec::new() })
        );
    }

    #[test]
    fn test_values_dropped_with_row() {
        let state = state();
        let mut a = registered(&state, A, 10);
        let (key, _) = offer(&mut a, "X", ApNum3::GENERAL, A);
        a.dispatch(Signal::AssignWswsVar { key, cdr_value: vec![4] }).unwrap();
        assert_eq!(
            a.dispatch(Signal::ReadWswsVar { key }).unwrap(),
            Some(Signal::WswsValueIs { cdr_value: vec![4] })
        );

        a.dispatch(Signal::RetractVar { key }).unwrap();
        assert_eq!(
            a.dispatch(Signal::ReadWswsVar { key }).unwrap(),
            Some(Signal::WswsValueIs { cdr_value: Vec::new() })
        );
    }

    #[test]
    fn test_second_identity_refused() {
        let state = state();
        let mut a = registered(&state, A, 10);
        assert_eq!(
            a.dispatch(Signal::RegisterProcessor {
                id: B,
                evconn: false,
                progname: "test".into(),
                pid: 10,
                port: 0,
            })
            .unwrap(),
            Some(Signal::YesNo { yes: false })
        );
        assert_eq!(
            a.dispatch(Signal::IsRegisteredId { id: B }).unwrap(),
            Some(Signal::YesNo { yes: false })
        );
    }

    #[test]
    fn test_response_signal_is_rejected() {
        let mut s = Session::new(state(), "anon".into());
        assert!(matches!(
            s.dispatch(Signal::YesNo { yes: true }),
            Err(ServerError::UnexpectedSignal(_))
        ));
    }

    #[test]
    fn test_record_and_queries() {
        let state = state();
        let mut a = registered(&state, A, 10);
        let (key, _) = offer(&mut a, "CTL", B, A);

        match a.dispatch(Signal::ReadSvarRecord { key }).unwrap() {
            Some(Signal::SvarRecordIs { record }) => {
                let row = svar_signals::codec::decode_record(&record).unwrap().unwrap();
                assert_eq!(row.key, key);
                assert_eq!(row.offering.id, A);
            }
            other => panic!("unexpected reply {:?}", other),
        }
        assert_eq!(
            a.dispatch(Signal::GetOfferingProcs { to_proc: B.proc }).unwrap(),
            Some(Signal::OfferingProcsAre { procs: vec![A.proc] })
        );
        assert_eq!(
            a.dispatch(Signal::FindOfferingId { key }).unwrap(),
            Some(Signal::OfferingIdIs { id: A })
        );
        match a.dispatch(Signal::PrintSvarDb).unwrap() {
            Some(Signal::SvarDbPrinted { printout }) => assert!(printout.contains("CTL")),
            other => panic!("unexpected reply {:?}", other),
        }
    }
}
