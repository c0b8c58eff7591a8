//! Shared-variable names
//!
//! Names are stored as fixed-capacity code-point buffers so they can live
//! inside the shared registry. Unused positions are 0.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Capacity of a variable name in code points
pub const MAX_NAME_LEN: usize = 64;

/// ASCII star
pub const WILDCARD: u32 = '*' as u32;
/// APL star (U+22C6)
pub const APL_WILDCARD: u32 = 0x22C6;

fn is_wildcard(cp: u32) -> bool {
    cp == WILDCARD || cp == APL_WILDCARD
}

/// Fixed-capacity, NUL-padded variable name
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct VarName([u32; MAX_NAME_LEN]);

impl VarName {
    pub const EMPTY: VarName = VarName([0; MAX_NAME_LEN]);

    /// Build a name from text, truncating to `MAX_NAME_LEN` code points.
    pub fn new(text: &str) -> Self {
        let mut buf = [0u32; MAX_NAME_LEN];
        for (slot, ch) in buf.iter_mut().zip(text.chars()) {
            *slot = ch as u32;
        }
        Self(buf)
    }

    /// Build a name from raw code points, truncating to capacity.
    pub fn from_code_points(cps: &[u32]) -> Self {
        let mut buf = [0u32; MAX_NAME_LEN];
        let n = cps.len().min(MAX_NAME_LEN);
        buf[..n].copy_from_slice(&cps[..n]);
        Self(buf)
    }

    pub fn as_code_points(&self) -> &[u32; MAX_NAME_LEN] {
        &self.0
    }

    /// Number of code points before the first terminator
    pub fn len(&self) -> usize {
        self.0.iter().position(|&c| c == 0).unwrap_or(MAX_NAME_LEN)
    }

    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }

    /// The used code points
    pub fn code_points(&self) -> &[u32] {
        &self.0[..self.len()]
    }

    /// True if the name contains a wildcard code point
    pub fn has_wildcard(&self) -> bool {
        self.code_points().iter().any(|&cp| is_wildcard(cp))
    }

    /// Does a stored name match a requested one?
    pub fn matches(&self, requested: &VarName) -> bool {
        match_name(&self.0, &requested.0)
    }
}

impl Default for VarName {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Display for VarName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &cp in self.code_points() {
            let ch = char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER);
            write!(f, "{}", ch)?;
        }
        Ok(())
    }
}

impl fmt::Debug for VarName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VarName({:?})", self.to_string())
    }
}

impl From<&str> for VarName {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl Serialize for VarName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VarName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        if text.chars().count() > MAX_NAME_LEN {
            return Err(de::Error::custom("variable name too long"));
        }
        Ok(VarName::new(&text))
    }
}

/// Compare a stored name with a requested one.
///
/// A wildcard on either side at the first differing position matches the
/// rest. A terminator on the stored name before any difference matches
/// (short names), and so does equality over the full capacity.
pub fn match_name(stored: &[u32; MAX_NAME_LEN], requested: &[u32; MAX_NAME_LEN]) -> bool {
    for (&s, &r) in stored.iter().zip(requested.iter()) {
        if s != r {
            return is_wildcard(s) || is_wildcard(r);
        }
        if s == 0 {
            return true;
        }
    }
    true
}

/// True for the two halves of a CTL/DAT style pair
///
/// `CTL` pairs with `DAT`, and `Cnnn` with `Dnnn` for the same digits,
/// in either order.
pub fn is_ctl_dat_pair(a: &VarName, b: &VarName) -> bool {
    let a = a.code_points();
    let b = b.code_points();
    let ctl = [b'C' as u32, b'T' as u32, b'L' as u32];
    let dat = [b'D' as u32, b'A' as u32, b'T' as u32];
    if (a == ctl && b == dat) || (a == dat && b == ctl) {
        return true;
    }

    if a.len() < 2 || a.len() != b.len() {
        return false;
    }
    let heads = (a[0], b[0]);
    if heads != (b'C' as u32, b'D' as u32) && heads != (b'D' as u32, b'C' as u32) {
        return false;
    }
    let digits_a = &a[1..];
    let digits_b = &b[1..];
    digits_a == digits_b
        && digits_a
            .iter()
            .all(|&cp| (b'0' as u32..=b'9' as u32).contains(&cp))
}
