//! Blocking registry client
//!
//! `RemoteRegistry` implements `SvarStore` by exchanging signals with the
//! registry server. Each request waits for its response under the
//! configured timeout. Any transport error drops the connection; from
//! then on every call answers with a neutral value.

use std::time::Duration;
use tracing::{debug, info, warn};

use svar_matching::{wait_may_set, wait_may_use, OfferedVar, RetryPolicy, SvarStore};
use svar_types::control::{Control, SvarState};
use svar_types::event::Event;
use svar_types::ids::{ApNum, ApNum3, SvKey};
use svar_types::name::VarName;
use svar_types::partner::{Coupling, Partner};

use crate::codec::decode_record;
use crate::config::ClientConfig;
use crate::endpoint::Stream;
use crate::error::SignalError;
use crate::frame::{write_close, write_frame, RecvBuffer};
use crate::signal::{Signal, SignalId, NO_ERROR};

/// Connection to the registry server on behalf of one AP
pub struct RemoteRegistry {
    config: ClientConfig,
    me: Partner,
    conn: Option<Stream>,
    rx: RecvBuffer,
}

impl RemoteRegistry {
    /// Connect as `id`, listening for notifications on `udp_port`.
    ///
    /// A failed connection leaves the client disconnected (neutral answers).
    pub fn connect(config: ClientConfig, id: ApNum3, udp_port: u16) -> Self {
        let conn = match config.endpoint.connect(config.timeout) {
            Ok(s) => {
                info!(endpoint = %config.endpoint, id = %id, "connected to registry server");
                Some(s)
            }
            Err(e) => {
                warn!(endpoint = %config.endpoint, error = %e, "registry server unreachable");
                None
            }
        };
        Self {
            me: Partner::new(id, std::process::id(), udp_port),
            config,
            conn,
            rx: RecvBuffer::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn disconnect(&mut self, signal: &Signal, err: &SignalError) {
        warn!(%signal, error = %err, "registry server request failed; disconnecting");
        self.conn = None;
    }

    /// Send a one-way signal.
    pub fn send(&mut self, signal: Signal) -> Result<(), SignalError> {
        let timeout = self.config.timeout;
        let conn = self.conn.as_mut().ok_or(SignalError::NotConnected)?;
        if let Err(e) = write_frame(conn, &signal) {
            let e = map_io(e, timeout);
            self.disconnect(&signal, &e);
            return Err(e);
        }
        Ok(())
    }

    /// Send `signal` and wait for its response.
    pub fn request(&mut self, signal: Signal) -> Result<Signal, SignalError> {
        let Some(expected) = signal.response_id() else {
            return Err(SignalError::UnexpectedResponse {
                expected: signal.id(),
                received: signal.id(),
            });
        };
        let timeout = self.config.timeout;
        let conn = self.conn.as_mut().ok_or(SignalError::NotConnected)?;
        match exchange(conn, &mut self.rx, &signal, expected) {
            Ok(reply) => Ok(reply),
            Err(e) => {
                let e = map_io(e, timeout);
                self.disconnect(&signal, &e);
                Err(e)
            }
        }
    }

    /// Request and unpack the response, or return `neutral`.
    fn call<R>(&mut self, signal: Signal, neutral: R, unpack: impl FnOnce(Signal) -> Option<R>) -> R {
        match self.request(signal) {
            Ok(reply) => unpack(reply).unwrap_or(neutral),
            Err(_) => neutral,
        }
    }

    fn post(&mut self, signal: Signal) {
        // already logged by send()
        let _ = self.send(signal);
    }

    /// The row with `key` as the server sees it
    pub fn read_record(&mut self, key: SvKey) -> Option<OfferedVar> {
        self.call(Signal::ReadSvarRecord { key }, None, |reply| match reply {
            Signal::SvarRecordIs { record } => Some(decode_record(&record).unwrap_or_else(|e| {
                warn!(error = %e, "bad record");
                None
            })),
            _ => None,
        })
    }

    /// Write `cdr_value` to `key` once writing is allowed.
    ///
    /// Returns `false` if access was not granted within `policy` or the
    /// server refused the value.
    pub fn assign_value(&mut self, key: SvKey, cdr_value: Vec<u8>, policy: &RetryPolicy) -> bool {
        if !wait_may_set(self, key, policy) {
            return false;
        }
        self.set_state(key, false);
        self.call(Signal::AssignValue { key, cdr_value }, false, |reply| match reply {
            Signal::SvarAssigned { error, .. } => Some(error == NO_ERROR),
            _ => None,
        })
    }

    /// Read the value of `key` once reading is allowed.
    pub fn read_value(&mut self, key: SvKey, policy: &RetryPolicy) -> Option<Vec<u8>> {
        if !wait_may_use(self, key, policy) {
            return None;
        }
        let value = self.call(Signal::GetValue { key }, None, |reply| match reply {
            Signal::ValueIs { error, cdr_value, .. } if error == NO_ERROR => Some(Some(cdr_value)),
            Signal::ValueIs { error, error_loc, .. } => {
                debug!(key = %key, error, loc = %error_loc, "no value");
                None
            }
            _ => None,
        })?;
        self.set_state(key, true);
        Some(value)
    }

    /// Store a workspace-to-workspace value (no access control).
    pub fn assign_wsws(&mut self, key: SvKey, cdr_value: Vec<u8>) {
        self.post(Signal::AssignWswsVar { key, cdr_value });
    }

    pub fn read_wsws(&mut self, key: SvKey) -> Vec<u8> {
        self.call(Signal::ReadWswsVar { key }, Vec::new(), |reply| match reply {
            Signal::WswsValueIs { cdr_value } => Some(cdr_value),
            _ => None,
        })
    }

    /// Say goodbye and drop the connection.
    pub fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = write_close(&mut conn) {
                debug!(error = %e, "close frame not sent");
            }
            info!(id = %self.me.id, "disconnected from registry server");
        }
    }
}

fn map_io(err: SignalError, timeout: Duration) -> SignalError {
    match err {
        SignalError::Io(e) => SignalError::from_io(e, timeout),
        other => other,
    }
}

fn exchange(
    conn: &mut Stream,
    rx: &mut RecvBuffer,
    signal: &Signal,
    expected: SignalId,
) -> Result<Signal, SignalError> {
    write_frame(conn, signal)?;
    let reply = rx.read_frame(conn)?.ok_or(SignalError::Closed)?;
    if reply.id() != expected {
        return Err(SignalError::UnexpectedResponse {
            expected,
            received: reply.id(),
        });
    }
    Ok(reply)
}

impl Drop for RemoteRegistry {
    fn drop(&mut self) {
        self.close();
    }
}

impl SvarStore for RemoteRegistry {
    fn me(&self) -> ApNum3 {
        self.me.id
    }

    fn register(&mut self) -> bool {
        let signal = Signal::RegisterProcessor {
            id: self.me.id,
            evconn: false,
            progname: self.config.progname.clone(),
            pid: self.me.pid,
            port: self.me.port,
        };
        self.call(signal, false, |reply| match reply {
            Signal::YesNo { yes } => Some(yes),
            _ => None,
        })
    }

    fn unregister(&mut self) {
        let id = self.me.id;
        self.post(Signal::UnregisterProcessor { id });
    }

    fn is_registered(&mut self, id: ApNum3) -> bool {
        self.call(Signal::IsRegisteredId { id }, false, |reply| match reply {
            Signal::YesNo { yes } => Some(yes),
            _ => None,
        })
    }

    fn match_or_make(&mut self, name: &VarName, to: ApNum3) -> (SvKey, Coupling) {
        let signal = Signal::MatchOrMake {
            name: *name,
            to,
            from: self.me.id,
        };
        self.call(signal, (SvKey::NONE, Coupling::NoCoupling), |reply| match reply {
            Signal::MatchOrMakeResult { key, coupling } => Some((key, coupling)),
            _ => None,
        })
    }

    fn retract(&mut self, key: SvKey) -> Coupling {
        self.call(Signal::RetractVar { key }, Coupling::NoCoupling, |reply| match reply {
            Signal::CouplingIs { coupling, .. } => Some(coupling),
            _ => None,
        })
    }

    fn coupling(&mut self, key: SvKey) -> Coupling {
        self.call(Signal::GetCoupling { key }, Coupling::NoCoupling, |reply| match reply {
            Signal::CouplingIs { coupling, .. } => Some(coupling),
            _ => None,
        })
    }

    fn get_state(&mut self, key: SvKey) -> SvarState {
        self.call(Signal::GetState { key }, SvarState::NotShared, |reply| match reply {
            Signal::StateIs { state, .. } => Some(state),
            _ => None,
        })
    }

    fn set_state(&mut self, key: SvKey, used: bool) {
        self.post(Signal::SetState {
            key,
            used,
            loc: String::from(if used { "read" } else { "write" }),
        });
    }

    fn get_control(&mut self, key: SvKey) -> Control {
        self.call(Signal::GetControl { key }, Control::NONE, |reply| match reply {
            Signal::ControlIs { control, .. } => Some(control),
            _ => None,
        })
    }

    fn set_control(&mut self, key: SvKey, control: Control) -> Control {
        self.call(Signal::SetControl { key, control }, Control::NONE, |reply| match reply {
            Signal::ControlIs { control, .. } => Some(control),
            _ => None,
        })
    }

    fn may_use(&mut self, key: SvKey, attempt: i32) -> bool {
        self.call(Signal::MayUse { key, attempt }, false, |reply| match reply {
            Signal::YesNo { yes } => Some(yes),
            _ => None,
        })
    }

    fn may_set(&mut self, key: SvKey, attempt: i32) -> bool {
        self.call(Signal::MaySet { key, attempt }, false, |reply| match reply {
            Signal::YesNo { yes } => Some(yes),
            _ => None,
        })
    }

    fn get_events(&mut self) -> (SvKey, Event) {
        let id = self.me.id;
        self.call(Signal::GetEvents { id }, (SvKey::NONE, Event::NONE), |reply| match reply {
            Signal::EventsAre { key, events } => Some((key, events)),
            _ => None,
        })
    }

    fn clear_all_events(&mut self) -> Event {
        let id = self.me.id;
        self.call(Signal::ClearAllEvents { id }, Event::NONE, |reply| match reply {
            Signal::EventsAre { events, .. } => Some(events),
            _ => None,
        })
    }

    fn add_event(&mut self, event: Event, to: ApNum3, key: SvKey) {
        self.post(Signal::AddEvent { key, id: to, event });
    }

    fn offering_processors(&mut self) -> Vec<ApNum> {
        let to_proc = self.me.id.proc;
        self.call(Signal::GetOfferingProcs { to_proc }, Vec::new(), |reply| match reply {
            Signal::OfferingProcsAre { procs } => Some(procs),
            _ => None,
        })
    }

    fn offered_variables(&mut self, from_proc: ApNum) -> Vec<VarName> {
        let to_proc = self.me.id.proc;
        self.call(Signal::GetOfferedVars { to_proc, from_proc }, Vec::new(), |reply| match reply {
            Signal::OfferedVarsAre { names } => Some(names),
            _ => None,
        })
    }

    fn find_offering_id(&mut self, key: SvKey) -> ApNum3 {
        self.call(Signal::FindOfferingId { key }, ApNum3::NULL, |reply| match reply {
            Signal::OfferingIdIs { id } => Some(id),
            _ => None,
        })
    }

    fn pairing_key(&mut self, key: SvKey) -> SvKey {
        self.call(Signal::FindPairingKey { key }, SvKey::NONE, |reply| match reply {
            Signal::PairingKeyIs { key } => Some(key),
            _ => None,
        })
    }

    fn dump(&mut self) -> String {
        self.call(Signal::PrintSvarDb, String::new(), |reply| match reply {
            Signal::SvarDbPrinted { printout } => Some(printout),
            _ => None,
        })
    }
}
