//! Processor registry and queries
//!
//! Registered processors, id allocation, and the read-only queries used by
//! `⎕SVQ`-style inspection and by compound variable pairs.

use tracing::{debug, info, warn};
use svar_types::ids::{ApNum, ApNum3, SvKey, AP_FIRST_USER};
use svar_types::name::VarName;
use svar_types::partner::{Coupling, Partner};

use crate::record::{OfferedVar, ProcessorSlot};
use crate::registry::Registry;

impl Registry {
    /// Register processor `id` living in process `pid` with UDP `port`.
    ///
    /// Re-registering an id refreshes its pid and port. Returns `false` when
    /// the id is invalid or every slot is taken.
    pub fn register_processor(&mut self, id: ApNum3, pid: u32, port: u16) -> bool {
        let partner = Partner::new(id, pid, port);
        if !partner.is_present() {
            warn!(id = %id, pid, "refusing to register an empty processor id");
            return false;
        }

        if let Some(slot) = self.find_slot(&id) {
            let entry = &mut self.active[slot].partner;
            entry.pid = pid;
            entry.port = port;
            debug!(id = %id, pid, port, "processor registration refreshed");
            return true;
        }

        match self.active.iter().position(|s| !s.is_used()) {
            Some(slot) => {
                self.active[slot] = ProcessorSlot {
                    partner,
                    events: 0,
                };
                info!(id = %id, pid, port, "processor registered");
                true
            }
            None => {
                warn!(id = %id, pid, "processor table full");
                false
            }
        }
    }

    /// Remove the registration of `id`; returns whether it was registered.
    pub fn unregister_processor(&mut self, id: &ApNum3) -> bool {
        match self.find_slot(id) {
            Some(slot) => {
                self.active[slot].clear();
                info!(id = %id, "processor unregistered");
                true
            }
            None => false,
        }
    }

    /// Remove every registration of process `pid`; returns how many.
    pub fn unregister_pid(&mut self, pid: u32) -> usize {
        let mut count = 0;
        for slot in self.active.iter_mut() {
            if slot.is_used() && slot.partner.pid == pid {
                slot.clear();
                count += 1;
            }
        }
        count
    }

    pub fn get_registered(&self, id: &ApNum3) -> Option<ProcessorSlot> {
        self.find_slot(id).map(|slot| self.active[slot])
    }

    pub fn is_registered(&self, id: &ApNum3) -> bool {
        self.find_slot(id).is_some()
    }

    /// True if no slot and no row side uses `id`
    pub fn is_unused_id(&self, id: &ApNum3) -> bool {
        !self.is_registered(id) && self.used_rows().all(|v| v.side_of(id).is_none())
    }

    /// Lowest free user processor number
    pub fn get_unused_id(&self) -> ApNum {
        (AP_FIRST_USER..)
            .find(|&n| self.is_unused_id(&ApNum3::single(n)))
            .unwrap_or(AP_FIRST_USER)
    }

    /// UDP port registered for `id`, 0 if none
    pub fn get_udp_port(&self, id: &ApNum3) -> u16 {
        self.get_registered(id).map(|s| s.partner.port).unwrap_or(0)
    }

    /// The other side of `key` as seen from `caller`
    pub fn get_peer(&self, key: SvKey, caller: &ApNum3) -> Option<Partner> {
        let row = self.get_var(key)?;
        let side = row.side_of(caller)?;
        let peer = *row.partner(side.other());
        peer.is_present().then_some(peer)
    }

    /// Id of the offering side of `key`, null if unknown
    pub fn find_offering_id(&self, key: SvKey) -> ApNum3 {
        self.get_var(key)
            .map(|v| v.offering.id)
            .unwrap_or(ApNum3::NULL)
    }

    /// Processors with pending offers addressed to `to_proc`, each once
    pub fn offering_processors(&self, to_proc: ApNum) -> Vec<ApNum> {
        let mut procs = Vec::new();
        for v in self.used_rows() {
            if v.coupling() == Coupling::Offered
                && v.target().proc == to_proc
                && !procs.contains(&v.offering.id.proc)
            {
                procs.push(v.offering.id.proc);
            }
        }
        procs
    }

    /// Names of pending offers from `from_proc` addressed to `to_proc`
    pub fn offered_variables(&self, to_proc: ApNum, from_proc: ApNum) -> Vec<VarName> {
        self.used_rows()
            .filter(|v| {
                v.coupling() == Coupling::Offered
                    && v.target().proc == to_proc
                    && v.offering.id.proc == from_proc
            })
            .map(|v| v.name)
            .collect()
    }

    /// Key of the variable paired with `key` by `compare`
    ///
    /// The paired variable must be shared between the same two partners.
    pub fn pairing_key(&self, key: SvKey, compare: fn(&VarName, &VarName) -> bool) -> SvKey {
        let Some(row) = self.get_var(key) else {
            return SvKey::NONE;
        };
        let same_partners = |v: &&OfferedVar| {
            (v.offering.id == row.offering.id && v.accepting.id == row.accepting.id)
                || (v.offering.id == row.accepting.id && v.accepting.id == row.offering.id)
        };
        self.used_rows()
            .filter(|v| v.key != key)
            .filter(same_partners)
            .find(|v| compare(&row.name, &v.name))
            .map(|v| v.key)
            .unwrap_or(SvKey::NONE)
    }
}
