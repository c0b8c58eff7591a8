//! One shared-variable row
//!
//! The offering side is always the side that is present first. On an
//! `Offered` row the accepting side is absent and its id records whom the
//! offer is addressed to (`AP_GENERAL` for anybody).

use serde::Serialize;
use svar_types::control::{Control, SvarState};
use svar_types::ids::{ApNum3, SvKey};
use svar_types::name::VarName;
use svar_types::partner::{Coupling, Partner};

/// Which side of a row a caller is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Side {
    Offering,
    Accepting,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Offering => Side::Accepting,
            Side::Accepting => Side::Offering,
        }
    }
}

/// A shared-variable row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(C)]
pub struct OfferedVar {
    pub key: SvKey,
    pub offering: Partner,
    pub accepting: Partner,
    /// Raw `SvarState`; kept as a byte so any bit pattern is a valid row
    pub state: u8,
    pub name: VarName,
}

impl OfferedVar {
    pub const EMPTY: OfferedVar = OfferedVar {
        key: SvKey::NONE,
        offering: Partner::EMPTY,
        accepting: Partner::EMPTY,
        state: 0,
        name: VarName::EMPTY,
    };

    /// A fresh offer from `from` addressed to `to`
    pub fn offer(key: SvKey, name: VarName, from: Partner, to: ApNum3) -> Self {
        Self {
            key,
            offering: from,
            accepting: Partner::target(to),
            state: SvarState::NotShared.as_u8(),
            name,
        }
    }

    pub fn is_free(&self) -> bool {
        self.key.is_none()
    }

    pub fn coupling(&self) -> Coupling {
        Coupling::from_sides(&self.offering, &self.accepting)
    }

    /// Whom an `Offered` row is addressed to
    pub fn target(&self) -> ApNum3 {
        self.accepting.id
    }

    pub fn state(&self) -> SvarState {
        SvarState::from_u8(self.state)
    }

    pub fn set_state(&mut self, state: SvarState) {
        self.state = state.as_u8();
    }

    /// The side `id` occupies. Only present sides count.
    pub fn side_of(&self, id: &ApNum3) -> Option<Side> {
        if self.offering.is_present() && self.offering.id == *id {
            Some(Side::Offering)
        } else if self.accepting.is_present() && self.accepting.id == *id {
            Some(Side::Accepting)
        } else {
            None
        }
    }

    /// The side owned by process `pid`, if any
    pub fn side_of_pid(&self, pid: u32) -> Option<Side> {
        if self.offering.is_present() && self.offering.pid == pid {
            Some(Side::Offering)
        } else if self.accepting.is_present() && self.accepting.pid == pid {
            Some(Side::Accepting)
        } else {
            None
        }
    }

    pub fn partner(&self, side: Side) -> &Partner {
        match side {
            Side::Offering => &self.offering,
            Side::Accepting => &self.accepting,
        }
    }

    pub fn partner_mut(&mut self, side: Side) -> &mut Partner {
        match side {
            Side::Offering => &mut self.offering,
            Side::Accepting => &mut self.accepting,
        }
    }

    /// Control vector of both sides combined, offering point of view
    pub fn combined_control(&self) -> Control {
        self.offering.flags.control() | self.accepting.flags.control().mirror()
    }

    /// Combined control and state restriction as seen by `side`
    pub fn view(&self, side: Side) -> (Control, SvarState) {
        match side {
            Side::Offering => (self.combined_control(), self.state()),
            Side::Accepting => (self.combined_control().mirror(), self.state().mirror()),
        }
    }

    pub fn clear(&mut self) {
        *self = Self::EMPTY;
    }
}

impl Default for OfferedVar {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> OfferedVar {
        let mut v = OfferedVar::offer(
            SvKey::from_raw(1),
            VarName::new("X"),
            Partner::new(ApNum3::single(1001), 10, 0),
            ApNum3::single(1002),
        );
        v.accepting = Partner::new(ApNum3::single(1002), 11, 0);
        v
    }

    #[test]
    fn test_fresh_offer_is_offered() {
        let v = OfferedVar::offer(
            SvKey::from_raw(1),
            VarName::new("X"),
            Partner::new(ApNum3::single(1001), 10, 0),
            ApNum3::GENERAL,
        );
        assert_eq!(v.coupling(), Coupling::Offered);
        assert!(v.target().is_general());
        assert_eq!(v.state(), SvarState::NotShared);
    }

    #[test]
    fn test_side_of_ignores_target() {
        let mut v = row();
        assert_eq!(v.side_of(&ApNum3::single(1001)), Some(Side::Offering));
        assert_eq!(v.side_of(&ApNum3::single(1002)), Some(Side::Accepting));

        v.accepting = Partner::target(ApNum3::single(1002));
        assert_eq!(v.side_of(&ApNum3::single(1002)), None);
        assert_eq!(v.side_of_pid(10), Some(Side::Offering));
        assert_eq!(v.side_of_pid(11), None);
    }

    #[test]
    fn test_combined_control_mirrors_accepting_side() {
        let mut v = row();
        v.offering.flags.set_control(Control::USE_BY_OFFERING);
        // accepting side restricts its own sets
        v.accepting.flags.set_control(Control::SET_BY_OFFERING);
        let combined = v.combined_control();
        assert_eq!(combined, Control::USE_BY_OFFERING | Control::SET_BY_ACCEPTING);

        let (acc_view, _) = v.view(Side::Accepting);
        assert_eq!(acc_view, Control::USE_BY_ACCEPTING | Control::SET_BY_OFFERING);
    }

    #[test]
    fn test_clear_frees_row() {
        let mut v = row();
        assert!(!v.is_free());
        v.clear();
        assert!(v.is_free());
        assert_eq!(v.coupling(), Coupling::NoCoupling);
    }
}
