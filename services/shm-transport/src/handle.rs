//! Per-process registry handle
//!
//! `SvarDb` ties together this process's identity, its UDP listener, the
//! notifier, and the mapped segment. Every operation runs under the
//! database semaphore; notifications collected meanwhile are sent after it
//! is released.
//!
//! A handle whose segment could not be opened is permanently disabled and
//! answers every call with a neutral value.

use tracing::{error, info, warn};

use svar_matching::{Registry, SvarStore};
use svar_types::control::{Control, SvarState};
use svar_types::event::Event;
use svar_types::ids::{ApNum, ApNum3, SvKey, NO_AP};
use svar_types::name::{is_ctl_dat_pair, VarName};
use svar_types::notice::{NoticeKind, Notification};
use svar_types::partner::{Coupling, Partner};

use crate::config::SvarConfig;
use crate::error::ShmError;
use crate::liveness::ProcessProbe;
use crate::segment::MappedSegment;
use crate::udp::{EventListener, UdpNotifier};

/// This process's connection to the shared variable registry
pub struct SvarDb {
    me: Partner,
    segment: Option<MappedSegment>,
    listener: Option<EventListener>,
    notifier: Option<UdpNotifier>,
}

impl SvarDb {
    /// Open the registry for `id`; on failure the handle is disabled.
    pub fn open(config: &SvarConfig, id: ApNum3) -> Self {
        match Self::try_open(config, id) {
            Ok(db) => db,
            Err(e) => {
                error!(error = %e, shm = %config.shm_name, "shared variables disabled");
                Self::disabled(id)
            }
        }
    }

    /// Open the registry for `id`, reporting why it failed.
    pub fn try_open(config: &SvarConfig, id: ApNum3) -> Result<Self, ShmError> {
        if !config.enabled {
            info!("shared variables turned off by configuration");
            return Ok(Self::disabled(id));
        }

        let listener = EventListener::bind(config.udp_bind)?;
        let me = Partner::new(id, std::process::id(), listener.port());
        let notifier = UdpNotifier::new(config.notify_host)?;
        let mut segment = MappedSegment::open(&config.shm_name)?;

        if !segment.created() {
            let mut outbox = Vec::new();
            segment.lock()?.remove_stale(&ProcessProbe, &mut outbox);
            notifier.send_all(&outbox);
        }

        info!(id = %me.id, pid = me.pid, port = me.port, "shared variable handle open");
        Ok(Self {
            me,
            segment: Some(segment),
            listener: Some(listener),
            notifier: Some(notifier),
        })
    }

    fn disabled(id: ApNum3) -> Self {
        Self {
            me: Partner::new(id, std::process::id(), 0),
            segment: None,
            listener: None,
            notifier: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.segment.is_some()
    }

    /// UDP port notifications for this process arrive on (0 if disabled)
    pub fn port(&self) -> u16 {
        self.me.port
    }

    pub fn listener(&self) -> Option<&EventListener> {
        self.listener.as_ref()
    }

    fn send(&self, outbox: &[Notification]) {
        if let Some(notifier) = &self.notifier {
            notifier.send_all(outbox);
        }
    }

    /// Run `f` on the locked registry, then send its notifications.
    fn with_registry<R>(
        &mut self,
        neutral: R,
        f: impl FnOnce(&mut Registry, &Partner, &mut Vec<Notification>) -> R,
    ) -> R {
        let Some(segment) = self.segment.as_mut() else {
            return neutral;
        };
        let mut outbox = Vec::new();
        let result = match segment.lock() {
            Ok(mut reg) => f(&mut reg, &self.me, &mut outbox),
            Err(e) => {
                warn!(error = %e, "registry lock failed");
                return neutral;
            }
        };
        self.send(&outbox);
        result
    }

    /// The peer's side of the row with `key`
    pub fn get_peer(&mut self, key: SvKey) -> Option<Partner> {
        self.with_registry(None, |reg, me, _| reg.get_peer(key, &me.id))
    }

    /// A user AP number nobody has registered
    pub fn get_unused_id(&mut self) -> ApNum {
        self.with_registry(NO_AP, |reg, _, _| reg.get_unused_id())
    }

    pub fn clear_event(&mut self, key: SvKey) {
        self.with_registry((), |reg, me, _| reg.clear_event(key, &me.id))
    }

    /// Consistent copy of the whole registry
    pub fn snapshot(&mut self) -> Option<Box<Registry>> {
        self.with_registry(None, |reg, _, _| Some(Box::new(reg.clone())))
    }

    /// Retract everything this process holds and unmap the segment.
    ///
    /// The segment itself stays; see [`SvarDb::unlink`].
    pub fn close(&mut self) {
        let Some(mut segment) = self.segment.take() else {
            return;
        };
        let pid = self.me.pid;
        let mut outbox = Vec::new();
        match segment.lock() {
            Ok(mut reg) => {
                let rows = reg.retract_all_of(pid, &mut outbox);
                let procs = reg.unregister_pid(pid);
                info!(pid, rows, procs, "shared variable handle closed");
            }
            Err(e) => warn!(error = %e, "registry lock failed on close"),
        }
        drop(segment);

        // wakes a thread blocked on our own listener
        outbox.push(Notification::new(self.me.port, NoticeKind::Disconnect, SvKey::NONE));
        self.send(&outbox);
    }

    /// Remove the segment name from the system.
    pub fn unlink(name: &str) -> Result<(), ShmError> {
        MappedSegment::unlink(name)
    }
}

impl Drop for SvarDb {
    fn drop(&mut self) {
        self.close();
    }
}

impl SvarStore for SvarDb {
    fn me(&self) -> ApNum3 {
        self.me.id
    }

    fn register(&mut self) -> bool {
        self.with_registry(false, |reg, me, _| {
            reg.register_processor(me.id, me.pid, me.port)
        })
    }

    fn unregister(&mut self) {
        self.with_registry((), |reg, me, out| {
            reg.retract_all_by(&me.id, out);
            reg.unregister_processor(&me.id);
        })
    }

    fn is_registered(&mut self, id: ApNum3) -> bool {
        self.with_registry(false, |reg, _, _| reg.is_registered(&id))
    }

    fn match_or_make(&mut self, name: &VarName, to: ApNum3) -> (SvKey, Coupling) {
        let neutral = (SvKey::NONE, Coupling::NoCoupling);
        self.with_registry(neutral, |reg, me, out| {
            reg.match_or_make(name, to, *me, out).unwrap_or_else(|e| {
                warn!(name = %name, error = %e, "offer failed");
                neutral
            })
        })
    }

    fn retract(&mut self, key: SvKey) -> Coupling {
        self.with_registry(Coupling::NoCoupling, |reg, me, out| {
            reg.retract(key, &me.id, out)
        })
    }

    fn coupling(&mut self, key: SvKey) -> Coupling {
        self.with_registry(Coupling::NoCoupling, |reg, _, _| reg.coupling(key))
    }

    fn get_state(&mut self, key: SvKey) -> SvarState {
        self.with_registry(SvarState::NotShared, |reg, _, _| reg.get_state(key))
    }

    fn set_state(&mut self, key: SvKey, used: bool) {
        self.with_registry((), |reg, me, out| reg.set_state(key, &me.id, used, out))
    }

    fn get_control(&mut self, key: SvKey) -> Control {
        self.with_registry(Control::NONE, |reg, me, _| reg.get_control(key, &me.id))
    }

    fn set_control(&mut self, key: SvKey, control: Control) -> Control {
        self.with_registry(Control::NONE, |reg, me, out| {
            reg.set_control(key, &me.id, control, out)
        })
    }

    fn may_use(&mut self, key: SvKey, attempt: i32) -> bool {
        self.with_registry(false, |reg, me, out| reg.may_use(key, &me.id, attempt, out))
    }

    fn may_set(&mut self, key: SvKey, attempt: i32) -> bool {
        self.with_registry(false, |reg, me, out| reg.may_set(key, &me.id, attempt, out))
    }

    fn get_events(&mut self) -> (SvKey, Event) {
        self.with_registry((SvKey::NONE, Event::NONE), |reg, me, _| {
            reg.get_events(&me.id)
        })
    }

    fn clear_all_events(&mut self) -> Event {
        self.with_registry(Event::NONE, |reg, me, _| reg.clear_all_events(&me.id))
    }

    fn add_event(&mut self, event: Event, to: ApNum3, key: SvKey) {
        self.with_registry((), |reg, _, out| reg.add_event(event, &to, key, out))
    }

    fn offering_processors(&mut self) -> Vec<ApNum> {
        self.with_registry(Vec::new(), |reg, me, _| reg.offering_processors(me.id.proc))
    }

    fn offered_variables(&mut self, from_proc: ApNum) -> Vec<VarName> {
        self.with_registry(Vec::new(), |reg, me, _| {
            reg.offered_variables(me.id.proc, from_proc)
        })
    }

    fn find_offering_id(&mut self, key: SvKey) -> ApNum3 {
        self.with_registry(ApNum3::NULL, |reg, _, _| reg.find_offering_id(key))
    }

    fn pairing_key(&mut self, key: SvKey) -> SvKey {
        self.with_registry(SvKey::NONE, |reg, _, _| reg.pairing_key(key, is_ctl_dat_pair))
    }

    fn dump(&mut self) -> String {
        let Some(segment) = self.segment.as_mut() else {
            return String::new();
        };
        match segment.lock_for_print() {
            Ok(reg) => reg.dump(),
            Err(e) => {
                warn!(error = %e, "registry lock failed");
                String::new()
            }
        }
    }
}
