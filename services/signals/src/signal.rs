//! Signals exchanged with the registry server
//!
//! One variant per signal. Ids 0..=34 follow the established signal
//! numbering; later ids were added for the operations the registry grew
//! since.

use std::fmt;

use svar_types::control::{Control, SvarState};
use svar_types::event::Event;
use svar_types::ids::{ApNum, ApNum3, SvKey};
use svar_types::name::VarName;
use svar_types::partner::Coupling;

macro_rules! signal_ids {
    ($($variant:ident = $value:literal => $name:literal,)*) => {
        /// Numeric signal id, the first field of every frame
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u16)]
        pub enum SignalId {
            $($variant = $value,)*
        }

        impl SignalId {
            /// Every id, in numeric order
            pub const ALL: &'static [SignalId] = &[$(SignalId::$variant,)*];

            pub fn from_u16(value: u16) -> Option<Self> {
                match value {
                    $($value => Some(SignalId::$variant),)*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(SignalId::$variant => $name,)*
                }
            }
        }
    };
}

signal_ids! {
    MakeOffer = 0 => "MAKE_OFFER",
    RetractOffer = 1 => "RETRACT_OFFER",
    RetractVar = 2 => "RETRACT_VAR",
    SetState = 3 => "SET_STATE",
    SetControl = 4 => "SET_CONTROL",
    GetValue = 5 => "GET_VALUE",
    ValueIs = 6 => "VALUE_IS",
    AssignValue = 7 => "ASSIGN_VALUE",
    SvarAssigned = 8 => "SVAR_ASSIGNED",
    MayUse = 9 => "MAY_USE",
    MaySet = 10 => "MAY_SET",
    ReadSvarRecord = 11 => "READ_SVAR_RECORD",
    SvarRecordIs = 12 => "SVAR_RECORD_IS",
    IsRegisteredId = 13 => "IS_REGISTERED_ID",
    YesNo = 14 => "YES_NO",
    RegisterProcessor = 15 => "REGISTER_PROCESSOR",
    MatchOrMake = 16 => "MATCH_OR_MAKE",
    MatchOrMakeResult = 17 => "MATCH_OR_MAKE_RESULT",
    FindOfferingId = 18 => "FIND_OFFERING_ID",
    OfferingIdIs = 19 => "OFFERING_ID_IS",
    GetOfferingProcs = 20 => "GET_OFFERING_PROCS",
    OfferingProcsAre = 21 => "OFFERING_PROCS_ARE",
    GetOfferedVars = 22 => "GET_OFFERED_VARS",
    OfferedVarsAre = 23 => "OFFERED_VARS_ARE",
    FindPairingKey = 24 => "FIND_PAIRING_KEY",
    PairingKeyIs = 25 => "PAIRING_KEY_IS",
    GetEvents = 26 => "GET_EVENTS",
    ClearAllEvents = 27 => "CLEAR_ALL_EVENTS",
    EventsAre = 28 => "EVENTS_ARE",
    AddEvent = 29 => "ADD_EVENT",
    AssignWswsVar = 30 => "ASSIGN_WSWS_VAR",
    ReadWswsVar = 31 => "READ_WSWS_VAR",
    WswsValueIs = 32 => "WSWS_VALUE_IS",
    PrintSvarDb = 33 => "PRINT_SVAR_DB",
    SvarDbPrinted = 34 => "SVAR_DB_PRINTED",
    GetState = 35 => "GET_STATE",
    StateIs = 36 => "STATE_IS",
    GetControl = 37 => "GET_CONTROL",
    ControlIs = 38 => "CONTROL_IS",
    GetCoupling = 39 => "GET_COUPLING",
    CouplingIs = 40 => "COUPLING_IS",
    UnregisterProcessor = 41 => "UNREGISTER_PROCESSOR",
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error code in `VALUE_IS` / `SVAR_ASSIGNED`: no error
pub const NO_ERROR: u32 = 0;

/// Error code in `VALUE_IS`: the variable has no value
pub const VALUE_ERROR: u32 = 3;

/// A decoded signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    MakeOffer { key: SvKey },
    RetractOffer { key: SvKey },
    RetractVar { key: SvKey },
    SetState { key: SvKey, used: bool, loc: String },
    SetControl { key: SvKey, control: Control },
    GetValue { key: SvKey },
    ValueIs { key: SvKey, error: u32, error_loc: String, cdr_value: Vec<u8> },
    AssignValue { key: SvKey, cdr_value: Vec<u8> },
    SvarAssigned { key: SvKey, error: u32, error_loc: String },
    MayUse { key: SvKey, attempt: i32 },
    MaySet { key: SvKey, attempt: i32 },
    ReadSvarRecord { key: SvKey },
    /// Encoded row, empty if there is none
    SvarRecordIs { record: Vec<u8> },
    IsRegisteredId { id: ApNum3 },
    YesNo { yes: bool },
    RegisterProcessor { id: ApNum3, evconn: bool, progname: String, pid: u32, port: u16 },
    MatchOrMake { name: VarName, to: ApNum3, from: ApNum3 },
    MatchOrMakeResult { key: SvKey, coupling: Coupling },
    FindOfferingId { key: SvKey },
    OfferingIdIs { id: ApNum3 },
    GetOfferingProcs { to_proc: ApNum },
    OfferingProcsAre { procs: Vec<ApNum> },
    GetOfferedVars { to_proc: ApNum, from_proc: ApNum },
    OfferedVarsAre { names: Vec<VarName> },
    FindPairingKey { key: SvKey },
    PairingKeyIs { key: SvKey },
    GetEvents { id: ApNum3 },
    ClearAllEvents { id: ApNum3 },
    EventsAre { key: SvKey, events: Event },
    AddEvent { key: SvKey, id: ApNum3, event: Event },
    AssignWswsVar { key: SvKey, cdr_value: Vec<u8> },
    ReadWswsVar { key: SvKey },
    WswsValueIs { cdr_value: Vec<u8> },
    PrintSvarDb,
    SvarDbPrinted { printout: String },
    GetState { key: SvKey },
    StateIs { key: SvKey, state: SvarState },
    GetControl { key: SvKey },
    ControlIs { key: SvKey, control: Control },
    GetCoupling { key: SvKey },
    CouplingIs { key: SvKey, coupling: Coupling },
    UnregisterProcessor { id: ApNum3 },
}

impl Signal {
    pub fn id(&self) -> SignalId {
        match self {
            Signal::MakeOffer { .. } => SignalId::MakeOffer,
            Signal::RetractOffer { .. } => SignalId::RetractOffer,
            Signal::RetractVar { .. } => SignalId::RetractVar,
            Signal::SetState { .. } => SignalId::SetState,
            Signal::SetControl { .. } => SignalId::SetControl,
            Signal::GetValue { .. } => SignalId::GetValue,
            Signal::ValueIs { .. } => SignalId::ValueIs,
            Signal::AssignValue { .. } => SignalId::AssignValue,
            Signal::SvarAssigned { .. } => SignalId::SvarAssigned,
            Signal::MayUse { .. } => SignalId::MayUse,
            Signal::MaySet { .. } => SignalId::MaySet,
            Signal::ReadSvarRecord { .. } => SignalId::ReadSvarRecord,
            Signal::SvarRecordIs { .. } => SignalId::SvarRecordIs,
            Signal::IsRegisteredId { .. } => SignalId::IsRegisteredId,
            Signal::YesNo { .. } => SignalId::YesNo,
            Signal::RegisterProcessor { .. } => SignalId::RegisterProcessor,
            Signal::MatchOrMake { .. } => SignalId::MatchOrMake,
            Signal::MatchOrMakeResult { .. } => SignalId::MatchOrMakeResult,
            Signal::FindOfferingId { .. } => SignalId::FindOfferingId,
            Signal::OfferingIdIs { .. } => SignalId::OfferingIdIs,
            Signal::GetOfferingProcs { .. } => SignalId::GetOfferingProcs,
            Signal::OfferingProcsAre { .. } => SignalId::OfferingProcsAre,
            Signal::GetOfferedVars { .. } => SignalId::GetOfferedVars,
            Signal::OfferedVarsAre { .. } => SignalId::OfferedVarsAre,
            Signal::FindPairingKey { .. } => SignalId::FindPairingKey,
            Signal::PairingKeyIs { .. } => SignalId::PairingKeyIs,
            Signal::GetEvents { .. } => SignalId::GetEvents,
            Signal::ClearAllEvents { .. } => SignalId::ClearAllEvents,
            Signal::EventsAre { .. } => SignalId::EventsAre,
            Signal::AddEvent { .. } => SignalId::AddEvent,
            Signal::AssignWswsVar { .. } => SignalId::AssignWswsVar,
            Signal::ReadWswsVar { .. } => SignalId::ReadWswsVar,
            Signal::WswsValueIs { .. } => SignalId::WswsValueIs,
            Signal::PrintSvarDb => SignalId::PrintSvarDb,
            Signal::SvarDbPrinted { .. } => SignalId::SvarDbPrinted,
            Signal::GetState { .. } => SignalId::GetState,
            Signal::StateIs { .. } => SignalId::StateIs,
            Signal::GetControl { .. } => SignalId::GetControl,
            Signal::ControlIs { .. } => SignalId::ControlIs,
            Signal::GetCoupling { .. } => SignalId::GetCoupling,
            Signal::CouplingIs { .. } => SignalId::CouplingIs,
            Signal::UnregisterProcessor { .. } => SignalId::UnregisterProcessor,
        }
    }

    /// Id of the signal the server answers this one with, if any
    pub fn response_id(&self) -> Option<SignalId> {
        let id = match self {
            Signal::RetractVar { .. } | Signal::GetCoupling { .. } => SignalId::CouplingIs,
            Signal::GetValue { .. } => SignalId::ValueIs,
            Signal::AssignValue { .. } => SignalId::SvarAssigned,
            Signal::MayUse { .. }
            | Signal::MaySet { .. }
            | Signal::IsRegisteredId { .. }
            | Signal::RegisterProcessor { .. } => SignalId::YesNo,
            Signal::ReadSvarRecord { .. } => SignalId::SvarRecordIs,
            Signal::MatchOrMake { .. } => SignalId::MatchOrMakeResult,
            Signal::FindOfferingId { .. } => SignalId::OfferingIdIs,
            Signal::GetOfferingProcs { .. } => SignalId::OfferingProcsAre,
            Signal::GetOfferedVars { .. } => SignalId::OfferedVarsAre,
            Signal::FindPairingKey { .. } => SignalId::PairingKeyIs,
            Signal::GetEvents { .. } | Signal::ClearAllEvents { .. } => SignalId::EventsAre,
            Signal::ReadWswsVar { .. } => SignalId::WswsValueIs,
            Signal::PrintSvarDb => SignalId::SvarDbPrinted,
            Signal::GetState { .. } => SignalId::StateIs,
            Signal::GetControl { .. } | Signal::SetControl { .. } => SignalId::ControlIs,
            _ => return None,
        };
        Some(id)
    }
}

struct Bytes<'a>(&'a [u8]);

impl fmt::Display for Bytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.iter().all(|b| (b' '..=b'~').contains(b)) {
            return write!(f, "\"{}\"", String::from_utf8_lossy(self.0));
        }
        for (i, b) in self.0.iter().enumerate() {
            if i > 16 {
                return f.write_str(" ...");
            }
            write!(f, " {:02x}", b)?;
        }
        Ok(())
    }
}

fn id3(id: &ApNum3) -> String {
    format!("{}, {}, {}", id.proc, id.parent, id.grand)
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.id().name())?;
        match self {
            Signal::MakeOffer { key }
            | Signal::RetractOffer { key }
            | Signal::RetractVar { key }
            | Signal::GetValue { key }
            | Signal::ReadSvarRecord { key }
            | Signal::FindOfferingId { key }
            | Signal::FindPairingKey { key }
            | Signal::PairingKeyIs { key }
            | Signal::ReadWswsVar { key }
            | Signal::GetState { key }
            | Signal::GetControl { key }
            | Signal::GetCoupling { key } => write!(f, "{}", key)?,
            Signal::SetState { key, used, loc } => write!(f, "{}, {}, {}", key, *used as u8, Bytes(loc.as_bytes()))?,
            Signal::SetControl { key, control } | Signal::ControlIs { key, control } => {
                write!(f, "{}, 0x{:02x}", key, control.bits())?
            }
            Signal::ValueIs { key, error, error_loc, cdr_value } => write!(
                f,
                "{}, {}, {}, {}",
                key,
                error,
                Bytes(error_loc.as_bytes()),
                Bytes(cdr_value)
            )?,
            Signal::AssignValue { key, cdr_value } | Signal::AssignWswsVar { key, cdr_value } => {
                write!(f, "{}, {}", key, Bytes(cdr_value))?
            }
            Signal::SvarAssigned { key, error, error_loc } => {
                write!(f, "{}, {}, {}", key, error, Bytes(error_loc.as_bytes()))?
            }
            Signal::MayUse { key, attempt } | Signal::MaySet { key, attempt } => {
                write!(f, "{}, {}", key, attempt)?
            }
            Signal::SvarRecordIs { record } => write!(f, "{}", Bytes(record))?,
            Signal::IsRegisteredId { id }
            | Signal::OfferingIdIs { id }
            | Signal::GetEvents { id }
            | Signal::ClearAllEvents { id }
            | Signal::UnregisterProcessor { id } => f.write_str(&id3(id))?,
            Signal::YesNo { yes } => write!(f, "{}", *yes as u8)?,
            Signal::RegisterProcessor { id, evconn, progname, pid, port } => write!(
                f,
                "{}, {}, {}, {}, {}",
                id3(id),
                *evconn as u8,
                Bytes(progname.as_bytes()),
                pid,
                port
            )?,
            Signal::MatchOrMake { name, to, from } => {
                write!(f, "\"{}\", {}, {}", name, id3(to), id3(from))?
            }
            Signal::MatchOrMakeResult { key, coupling } | Signal::CouplingIs { key, coupling } => {
                write!(f, "{}, {}", key, coupling.as_u8())?
            }
            Signal::GetOfferingProcs { to_proc } => write!(f, "{}", to_proc)?,
            Signal::OfferingProcsAre { procs } => {
                let list: Vec<String> = procs.iter().map(|p| p.to_string()).collect();
                write!(f, "[{}]", list.join(" "))?
            }
            Signal::GetOfferedVars { to_proc, from_proc } => write!(f, "{}, {}", to_proc, from_proc)?,
            Signal::OfferedVarsAre { names } => {
                let list: Vec<String> = names.iter().map(|n| n.to_string()).collect();
                write!(f, "[{}]", list.join(" "))?
            }
            Signal::EventsAre { key, events } => write!(f, "{}, 0x{:08x}", key, events.bits())?,
            Signal::AddEvent { key, id, event } => {
                write!(f, "{}, {}, 0x{:08x}", key, id3(id), event.bits())?
            }
            Signal::WswsValueIs { cdr_value } => write!(f, "{}", Bytes(cdr_value))?,
            Signal::PrintSvarDb => {}
            Signal::SvarDbPrinted { printout } => write!(f, "{} bytes", printout.len())?,
            Signal::StateIs { key, state } => write!(f, "{}, 0x{:02x}", key, state.as_u8())?,
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_dense_and_ordered() {
        for (i, id) in SignalId::ALL.iter().enumerate() {
            assert_eq!(*id as u16, i as u16);
            assert_eq!(SignalId::from_u16(i as u16), Some(*id));
        }
        assert_eq!(SignalId::from_u16(SignalId::ALL.len() as u16), None);
    }

    #[test]
    fn test_established_numbering() {
        assert_eq!(SignalId::MakeOffer as u16, 0);
        assert_eq!(SignalId::RegisterProcessor as u16, 15);
        assert_eq!(SignalId::AddEvent as u16, 29);
        assert_eq!(SignalId::SvarDbPrinted as u16, 34);
        assert_eq!(SignalId::GetState as u16, 35);
    }

    #[test]
    fn test_display_form() {
        let s = Signal::MayUse { key: SvKey::from_raw(0x1234), attempt: 2 };
        assert_eq!(s.to_string(), "MAY_USE(0x0000000000001234, 2)");

        let s = Signal::MatchOrMake {
            name: VarName::new("X"),
            to: ApNum3::single(1002),
            from: ApNum3::single(1001),
        };
        assert_eq!(s.to_string(), "MATCH_OR_MAKE(\"X\", 1002, 0, 0, 1001, 0, 0)");
        assert_eq!(Signal::PrintSvarDb.to_string(), "PRINT_SVAR_DB()");

        let s = Signal::AssignValue { key: SvKey::from_raw(1), cdr_value: vec![0, 1, 0xff] };
        assert_eq!(s.to_string(), "ASSIGN_VALUE(0x0000000000000001,  00 01 ff)");
    }

    #[test]
    fn test_response_pairs() {
        let key = SvKey::from_raw(7);
        assert_eq!(Signal::GetValue { key }.response_id(), Some(SignalId::ValueIs));
        assert_eq!(Signal::RetractVar { key }.response_id(), Some(SignalId::CouplingIs));
        assert_eq!(
            Signal::SetControl { key, control: Control::NONE }.response_id(),
            Some(SignalId::ControlIs)
        );
        assert_eq!(Signal::SetState { key, used: true, loc: String::new() }.response_id(), None);
        assert_eq!(Signal::MakeOffer { key }.response_id(), None);
    }
}
