//! Store abstraction
//!
//! `SvarStore` is what an interpreter session talks to. The local
//! shared-memory handle and the remote client both implement it, with the
//! caller identity fixed by the store. No method fails: an unavailable
//! store answers with neutral values.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;
use svar_types::control::{Control, SvarState};
use svar_types::event::Event;
use svar_types::ids::{ApNum, ApNum3, SvKey};
use svar_types::name::VarName;
use svar_types::partner::Coupling;

/// Shared-variable operations with a fixed caller identity
pub trait SvarStore {
    /// The identity every call is made on behalf of
    fn me(&self) -> ApNum3;

    /// Register `me()` as a processor
    fn register(&mut self) -> bool;

    /// Retract everything held by `me()` and drop its registration
    fn unregister(&mut self);

    fn is_registered(&mut self, id: ApNum3) -> bool;

    /// Offer `name` to `to` (or accept an offer from `to`)
    fn match_or_make(&mut self, name: &VarName, to: ApNum3) -> (SvKey, Coupling);

    /// Retract `me()`'s side; returns the coupling before
    fn retract(&mut self, key: SvKey) -> Coupling;

    fn coupling(&mut self, key: SvKey) -> Coupling;

    fn get_state(&mut self, key: SvKey) -> SvarState;

    fn set_state(&mut self, key: SvKey, used: bool);

    fn get_control(&mut self, key: SvKey) -> Control;

    fn set_control(&mut self, key: SvKey, control: Control) -> Control;

    fn may_use(&mut self, key: SvKey, attempt: i32) -> bool;

    fn may_set(&mut self, key: SvKey, attempt: i32) -> bool;

    fn get_events(&mut self) -> (SvKey, Event);

    fn clear_all_events(&mut self) -> Event;

    fn add_event(&mut self, event: Event, to: ApNum3, key: SvKey);

    /// Processors with pending offers to `me()`
    fn offering_processors(&mut self) -> Vec<ApNum>;

    /// Pending offers from `from_proc` to `me()`
    fn offered_variables(&mut self, from_proc: ApNum) -> Vec<VarName>;

    fn find_offering_id(&mut self, key: SvKey) -> ApNum3;

    /// Key of the CTL/DAT partner variable of `key`
    fn pairing_key(&mut self, key: SvKey) -> SvKey;

    fn dump(&mut self) -> String;
}

/// Polling policy for the access-wait helpers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Pause between attempts
    pub interval: Duration,
    /// Give up after this long
    pub max_wait: Duration,
}

impl RetryPolicy {
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        Self { interval, max_wait }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(10),
            max_wait: Duration::from_secs(5),
        }
    }
}

fn wait_until<S, F>(store: &mut S, key: SvKey, policy: &RetryPolicy, mut check: F) -> bool
where
    S: SvarStore + ?Sized,
    F: FnMut(&mut S, SvKey, i32) -> bool,
{
    let start = Instant::now();
    let mut attempt = 0i32;
    loop {
        if check(store, key, attempt) {
            return true;
        }
        if start.elapsed() >= policy.max_wait {
            debug!(key = %key, attempt, "gave up waiting for access");
            return false;
        }
        attempt = attempt.saturating_add(1);
        std::thread::sleep(policy.interval);
    }
}

/// Wait until `me()` may write `key`; `false` after `policy.max_wait`.
pub fn wait_may_set<S: SvarStore + ?Sized>(store: &mut S, key: SvKey, policy: &RetryPolicy) -> bool {
    wait_until(store, key, policy, |s, k, a| s.may_set(k, a))
}

/// Wait until `me()` may read `key`; `false` after `policy.max_wait`.
pub fn wait_may_use<S: SvarStore + ?Sized>(store: &mut S, key: SvKey, policy: &RetryPolicy) -> bool {
    wait_until(store, key, policy, |s, k, a| s.may_use(k, a))
}
