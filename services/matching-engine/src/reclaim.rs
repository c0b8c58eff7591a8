//! Stale entry reclamation
//!
//! Processes may die without retracting. Whoever attaches to the registry
//! next runs `remove_stale`, which drops the registrations of dead
//! processes and retracts their sides of every row, exactly as if they
//! had retracted themselves.

use serde::Serialize;
use tracing::info;
use svar_types::notice::Notification;

use crate::registry::Registry;

/// Process liveness probe
pub trait Liveness {
    fn is_alive(&self, pid: u32) -> bool;
}

impl<F> Liveness for F
where
    F: Fn(u32) -> bool,
{
    fn is_alive(&self, pid: u32) -> bool {
        self(pid)
    }
}

/// What a reclamation pass removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReclaimReport {
    /// Processor registrations dropped
    pub processors: usize,
    /// Row sides retracted
    pub sides: usize,
}

impl ReclaimReport {
    pub fn is_empty(&self) -> bool {
        self.processors == 0 && self.sides == 0
    }
}

impl Registry {
    /// Remove everything held by processes `liveness` reports dead.
    pub fn remove_stale(
        &mut self,
        liveness: &dyn Liveness,
        outbox: &mut Vec<Notification>,
    ) -> ReclaimReport {
        let mut report = ReclaimReport::default();

        for slot in self.active.iter_mut() {
            if slot.is_used() && !liveness.is_alive(slot.partner.pid) {
                info!(id = %slot.partner.id, pid = slot.partner.pid, "dropping stale processor");
                slot.clear();
                report.processors += 1;
            }
        }

        for idx in 0..self.offered.len() {
            loop {
                let row = &self.offered[idx];
                if row.is_free() {
                    break;
                }
                let dead = [&row.offering, &row.accepting]
                    .into_iter()
                    .find(|p| p.is_present() && !liveness.is_alive(p.pid))
                    .map(|p| p.id);
                let Some(id) = dead else { break };
                let key = row.key;
                self.retract(key, &id, outbox);
                report.sides += 1;
            }
        }

        if !report.is_empty() {
            info!(
                processors = report.processors,
                sides = report.sides,
                "stale registry entries reclaimed"
            );
        }
        report
    }
}
