//! Registry core
//!
//! Fixed-capacity table of shared-variable rows plus the table of
//! registered processors. The layout is `#[repr(C)]` and valid when
//! all-zero, so the same struct works on the heap and inside a
//! shared-memory segment.
//!
//! Operations are spread over several modules (`matching`, `access`,
//! `retract`, `processors`, `events`, `reclaim`, `dump`); this module holds
//! the data and the lookups they share.

use thiserror::Error;
use svar_types::ids::{ApNum, SvKey};
use svar_types::partner::Coupling;

use crate::record::{OfferedVar, ProcessorSlot};

/// Number of shared-variable rows
pub const N_VARS: usize = 64;

/// Number of processor slots
pub const N_PROCS: usize = 16;

/// The whole shared table
#[derive(Debug, Clone)]
#[repr(C)]
pub struct Registry {
    /// Key sequence; only the low 16 bits go into a key
    pub(crate) seq: u32,
    pub(crate) offered: [OfferedVar; N_VARS],
    pub(crate) active: [ProcessorSlot; N_PROCS],
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            seq: 0,
            offered: [OfferedVar::EMPTY; N_VARS],
            active: [ProcessorSlot::EMPTY; N_PROCS],
        }
    }

    /// Create an empty registry on the heap
    pub fn boxed() -> Box<Self> {
        Box::new(Self::new())
    }

    /// All rows, free ones included
    pub fn rows(&self) -> &[OfferedVar; N_VARS] {
        &self.offered
    }

    /// All processor slots, free ones included
    pub fn slots(&self) -> &[ProcessorSlot; N_PROCS] {
        &self.active
    }

    /// Rows currently in use
    pub fn used_rows(&self) -> impl Iterator<Item = &OfferedVar> {
        self.offered.iter().filter(|v| !v.is_free())
    }

    /// Index of the row with `key`
    pub fn find_var(&self, key: SvKey) -> Option<usize> {
        if key.is_none() {
            return None;
        }
        self.offered.iter().position(|v| v.key == key)
    }

    /// Copy of the row with `key`
    pub fn get_var(&self, key: SvKey) -> Option<OfferedVar> {
        self.find_var(key).map(|idx| self.offered[idx])
    }

    pub fn coupling(&self, key: SvKey) -> Coupling {
        self.find_var(key)
            .map(|idx| self.offered[idx].coupling())
            .unwrap_or(Coupling::NoCoupling)
    }

    /// Next key for an offer by `pid`/`proc`, unique among live rows.
    pub(crate) fn next_key(&mut self, pid: u32, proc: ApNum) -> SvKey {
        loop {
            self.seq = self.seq.wrapping_add(1);
            let key = SvKey::compose(pid, proc, self.seq as u16);
            if key.is_some() && self.find_var(key).is_none() {
                return key;
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Variable table full ({capacity} rows)")]
    TableFull { capacity: usize },

    #[error("Invalid offering partner: {0}")]
    InvalidPartner(String),
}
