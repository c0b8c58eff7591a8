//! Shared-memory registry lifecycle across handles
//!
//! Two handles in one test process behave like two APs: distinct ids,
//! distinct UDP ports, one shared segment.

use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use svar_matching::{wait_may_set, RetryPolicy, SvarStore};
use svar_shm::segment::MappedSegment;
use svar_shm::{SvarConfig, SvarDb};
use svar_types::control::{Control, SvarState};
use svar_types::event::Event;
use svar_types::ids::ApNum3;
use svar_types::name::VarName;
use svar_types::notice::{NoticeKind, Notification};
use svar_types::partner::{Coupling, Partner};

const A: ApNum3 = ApNum3 { proc: 1001, parent: 0, grand: 0 };
const B: ApNum3 = ApNum3 { proc: 1002, parent: 0, grand: 0 };

fn config(tag: &str) -> SvarConfig {
    static N: AtomicUsize = AtomicUsize::new(0);
    SvarConfig::new(format!(
        "/svar-it-{}-{}-{}",
        tag,
        std::process::id(),
        N.fetch_add(1, Ordering::Relaxed)
    ))
}

/// Read notifications until one of `kind` arrives
fn wait_for(db: &SvarDb, kind: NoticeKind) -> Option<Notification> {
    let listener = db.listener()?;
    for _ in 0..8 {
        match listener.recv_timeout(Duration::from_secs(2)) {
            Some(n) if n.kind == kind => return Some(n),
            Some(_) => continue,
            None => return None,
        }
    }
    None
}

#[test]
fn test_offer_accept_and_access_cycle() {
    let cfg = config("cycle");
    let mut a = SvarDb::open(&cfg, A);
    let mut b = SvarDb::open(&cfg, B);
    assert!(a.is_open() && b.is_open());
    assert!(a.register());
    assert!(b.register());
    assert!(a.is_registered(B));

    let (key, c) = a.match_or_make(&VarName::new("X"), B);
    assert_eq!(c, Coupling::Offered);
    let made = wait_for(&b, NoticeKind::MakeOffer).unwrap();
    assert_eq!(made.key, key);

    assert_eq!(b.offering_processors(), vec![A.proc]);
    assert_eq!(b.offered_variables(A.proc), vec![VarName::new("X")]);

    let (key2, c2) = b.match_or_make(&VarName::new("X"), A);
    assert_eq!((key2, c2), (key, Coupling::Coupled));
    assert_eq!(wait_for(&a, NoticeKind::OfferMatched).unwrap().key, key);
    assert_eq!(a.find_offering_id(key), A);
    assert_eq!(b.get_peer(key).map(|p| p.id), Some(A));

    // offering side writes once, then waits for the accepting side's read
    a.set_control(key, Control::SET_BY_OFFERING);
    assert!(a.may_set(key, 0));
    a.set_state(key, false);
    assert_eq!(a.get_state(key), SvarState::OfferingHasSet);
    assert!(!a.may_set(key, 1));

    assert!(b.may_use(key, 0));
    b.set_state(key, true);
    assert_eq!(b.get_state(key), SvarState::Idle);
    let policy = RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(100));
    assert!(wait_may_set(&mut a, key, &policy));

    let (ev_key, events) = b.get_events();
    assert_eq!(ev_key, key);
    assert!(events.contains(Event::ACCESS_CONTROL_CHANGED));
    assert!(!b.clear_all_events().is_empty());
    assert_eq!(b.get_events().1, Event::NONE);

    // offering side leaves: the row is demoted and offered by B
    assert_eq!(a.retract(key), Coupling::Coupled);
    assert_eq!(b.coupling(key), Coupling::Offered);
    assert_eq!(b.find_offering_id(key), B);

    assert!(a.dump().contains("Shared variables:"));

    drop(a);
    drop(b);
    SvarDb::unlink(&cfg.shm_name).unwrap();
}

#[test]
fn test_ctl_dat_pairing_key() {
    let cfg = config("pair");
    let mut a = SvarDb::open(&cfg, A);
    let mut b = SvarDb::open(&cfg, B);

    let (ctl, _) = a.match_or_make(&VarName::new("CTL"), B);
    let (dat, _) = a.match_or_make(&VarName::new("DAT"), B);
    b.match_or_make(&VarName::new("CTL"), A);
    b.match_or_make(&VarName::new("DAT"), A);

    assert_eq!(a.pairing_key(ctl), dat);
    assert_eq!(b.pairing_key(dat), ctl);

    drop(a);
    drop(b);
    SvarDb::unlink(&cfg.shm_name).unwrap();
}

#[test]
fn test_close_retracts_and_unregisters() {
    let cfg = config("close");
    let mut a = SvarDb::open(&cfg, A);
    a.register();
    let (key, _) = a.match_or_make(&VarName::new("GONE"), ApNum3::GENERAL);
    a.close();
    assert!(!a.is_open());

    let mut other = SvarDb::open(&cfg, B);
    assert!(!other.is_registered(A));
    assert_eq!(other.coupling(key), Coupling::NoCoupling);

    drop(other);
    SvarDb::unlink(&cfg.shm_name).unwrap();
}

#[test]
fn test_unregister_spares_sibling_rows() {
    let cfg = config("sibling");
    let sibling = ApNum3::single(1003);
    let mut a = SvarDb::open(&cfg, A);
    let mut c = SvarDb::open(&cfg, sibling);
    assert!(a.register());
    assert!(c.register());

    let (mine, _) = a.match_or_make(&VarName::new("X"), ApNum3::GENERAL);
    let (theirs, coupling) = c.match_or_make(&VarName::new("Z"), ApNum3::GENERAL);
    assert_eq!(coupling, Coupling::Offered);

    // same pid, different AP
    a.unregister();
    assert!(!c.is_registered(A));
    assert_eq!(c.coupling(mine), Coupling::NoCoupling);
    assert!(c.is_registered(sibling));
    assert_eq!(c.coupling(theirs), Coupling::Offered);
    assert_eq!(c.find_offering_id(theirs), sibling);

    drop(a);
    drop(c);
    SvarDb::unlink(&cfg.shm_name).unwrap();
}

#[test]
fn test_attach_reclaims_dead_processes() {
    let cfg = config("stale");

    let mut child = Command::new("true").spawn().unwrap();
    let dead_pid = child.id();
    child.wait().unwrap();

    // a process that died without cleaning up
    let key = {
        let mut seg = MappedSegment::open(&cfg.shm_name).unwrap();
        let mut reg = seg.lock().unwrap();
        let mut out = Vec::new();
        reg.register_processor(A, dead_pid, 0);
        let (key, _) = reg
            .match_or_make(&VarName::new("ORPHAN"), B, Partner::new(A, dead_pid, 0), &mut out)
            .unwrap();
        key
    };

    let mut b = SvarDb::open(&cfg, B);
    assert!(b.is_open());
    assert!(!b.is_registered(A));
    assert_eq!(b.coupling(key), Coupling::NoCoupling);
    assert!(b.snapshot().unwrap().used_rows().next().is_none());

    drop(b);
    SvarDb::unlink(&cfg.shm_name).unwrap();
}
