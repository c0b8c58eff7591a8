//! Identifier types for shared-variable participants
//!
//! Processors are identified by a three-level `ApNum3` (processor, parent,
//! grandparent). Variables are identified by an opaque 64-bit `SvKey`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Auxiliary processor number
pub type ApNum = i32;

/// No processor at all
pub const NO_AP: ApNum = -1;
/// Empty id slot
pub const AP_NULL: ApNum = 0;
/// Offer target meaning "any processor"
pub const AP_GENERAL: ApNum = 0;
/// The APL interpreter itself
pub const AP_INTERPRETER: ApNum = 1000;
/// First number handed out to user processors
pub const AP_FIRST_USER: ApNum = 1001;

/// Hierarchical processor identity
///
/// An all-zero id is the null id. `proc` alone decides whether an id
/// names somebody; `parent` and `grand` qualify it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(C)]
pub struct ApNum3 {
    pub proc: ApNum,
    pub parent: ApNum,
    pub grand: ApNum,
}

impl ApNum3 {
    pub const NULL: ApNum3 = ApNum3 {
        proc: AP_NULL,
        parent: AP_NULL,
        grand: AP_NULL,
    };

    pub const GENERAL: ApNum3 = ApNum3 {
        proc: AP_GENERAL,
        parent: AP_NULL,
        grand: AP_NULL,
    };

    pub fn new(proc: ApNum, parent: ApNum, grand: ApNum) -> Self {
        Self { proc, parent, grand }
    }

    /// Id of a top-level processor (no parent)
    pub fn single(proc: ApNum) -> Self {
        Self::new(proc, AP_NULL, AP_NULL)
    }

    pub fn is_null(&self) -> bool {
        self.proc == AP_NULL
    }

    /// True for the general (untargeted) offer id
    pub fn is_general(&self) -> bool {
        self.proc == AP_GENERAL
    }
}

impl fmt::Display for ApNum3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.proc)?;
        if self.parent != AP_NULL {
            write!(f, ".{}", self.parent)?;
            if self.grand != AP_NULL {
                write!(f, ".{}", self.grand)?;
            }
        }
        Ok(())
    }
}

/// Opaque handle of one shared-variable row
///
/// Built from the offering pid, the offering processor and a per-registry
/// sequence number. `0` means "no key".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct SvKey(u64);

impl SvKey {
    pub const NONE: SvKey = SvKey(0);

    /// Assemble a key from its parts
    pub fn compose(pid: u32, proc: ApNum, seq: u16) -> Self {
        Self(((pid as u64) << 32) | (((proc as u64) & 0xFFFF) << 16) | seq as u64)
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    pub fn is_some(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for SvKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}
