//! Signal payload codec
//!
//! A payload is the `u16` signal id followed by the signal's fields in
//! declaration order, big-endian. Keys are 8-byte, AP numbers 4-byte,
//! flags 1-byte; strings and byte blobs carry a 2-byte length prefix.
//! Variable names travel as code points, not text.

use svar_matching::OfferedVar;
use svar_types::control::{Control, SvarState};
use svar_types::errors::{WireError, WireResult};
use svar_types::event::Event;
use svar_types::ids::{ApNum, ApNum3, SvKey};
use svar_types::name::{VarName, MAX_NAME_LEN};
use svar_types::partner::{Coupling, Partner, PartnerFlags};
use svar_types::wire::{WireReader, WireWriter};

use crate::error::SignalError;
use crate::signal::{Signal, SignalId};

fn put_key(w: &mut WireWriter, key: SvKey) {
    w.put_u64(key.as_raw());
}

fn get_key(r: &mut WireReader<'_>) -> WireResult<SvKey> {
    Ok(SvKey::from_raw(r.get_u64()?))
}

fn put_id(w: &mut WireWriter, id: &ApNum3) {
    w.put_i32(id.proc);
    w.put_i32(id.parent);
    w.put_i32(id.grand);
}

fn get_id(r: &mut WireReader<'_>) -> WireResult<ApNum3> {
    Ok(ApNum3::new(r.get_i32()?, r.get_i32()?, r.get_i32()?))
}

fn get_text(r: &mut WireReader<'_>) -> WireResult<String> {
    Ok(String::from_utf8_lossy(&r.get_string()?).into_owned())
}

/// A name as a 2-byte count and that many 4-byte code points.
///
/// Trailing terminators are not sent; anything before them is, so the
/// buffer comes back exactly as it was.
fn put_name(w: &mut WireWriter, name: &VarName) {
    let cps = name.as_code_points();
    let used = cps.iter().rposition(|&c| c != 0).map_or(0, |i| i + 1);
    w.put_u16(used as u16);
    for &cp in &cps[..used] {
        w.put_u32(cp);
    }
}

fn get_name(r: &mut WireReader<'_>) -> WireResult<VarName> {
    let len = r.get_u16()? as usize;
    if len > MAX_NAME_LEN {
        return Err(WireError::NameTooLong { len });
    }
    let mut cps = [0u32; MAX_NAME_LEN];
    for cp in cps.iter_mut().take(len) {
        *cp = r.get_u32()?;
    }
    Ok(VarName::from_code_points(&cps))
}

/// AP numbers packed as consecutive 4-byte values in one string field
fn put_procs(w: &mut WireWriter, procs: &[ApNum]) -> WireResult<()> {
    let mut inner = WireWriter::with_capacity(procs.len() * 4);
    for p in procs {
        inner.put_i32(*p);
    }
    w.put_string(inner.as_bytes())
}

fn get_procs(r: &mut WireReader<'_>) -> WireResult<Vec<ApNum>> {
    let bytes = r.get_string()?;
    let mut inner = WireReader::new(&bytes);
    let mut procs = Vec::with_capacity(bytes.len() / 4);
    while inner.remaining() > 0 {
        procs.push(inner.get_i32()?);
    }
    Ok(procs)
}

/// A 2-byte name count followed by the names
fn put_names(w: &mut WireWriter, names: &[VarName]) -> WireResult<()> {
    let count = u16::try_from(names.len())
        .map_err(|_| WireError::StringTooLong { len: names.len() })?;
    w.put_u16(count);
    for name in names {
        put_name(w, name);
    }
    Ok(())
}

fn get_names(r: &mut WireReader<'_>) -> WireResult<Vec<VarName>> {
    let count = r.get_u16()? as usize;
    let mut names = Vec::with_capacity(count.min(r.remaining() / 2));
    for _ in 0..count {
        names.push(get_name(r)?);
    }
    Ok(names)
}

impl Signal {
    /// Encode id and fields (without the frame length).
    pub fn encode(&self) -> Result<Vec<u8>, SignalError> {
        let mut w = WireWriter::with_capacity(32);
        w.put_u16(self.id() as u16);
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
            | Signal::GetCoupling { key } => put_key(&mut w, *key),
            Signal::SetState { key, used, loc } => {
                put_key(&mut w, *key);
                w.put_u8(*used as u8);
                w.put_string(loc.as_bytes())?;
            }
            Signal::SetControl { key, control } | Signal::ControlIs { key, control } => {
                put_key(&mut w, *key);
                w.put_u8(control.bits());
            }
            Signal::ValueIs { key, error, error_loc, cdr_value } => {
                put_key(&mut w, *key);
                w.put_u32(*error);
                w.put_string(error_loc.as_bytes())?;
                w.put_string(cdr_value)?;
            }
            Signal::AssignValue { key, cdr_value } | Signal::AssignWswsVar { key, cdr_value } => {
                put_key(&mut w, *key);
                w.put_string(cdr_value)?;
            }
            Signal::SvarAssigned { key, error, error_loc } => {
                put_key(&mut w, *key);
                w.put_u32(*error);
                w.put_string(error_loc.as_bytes())?;
            }
            Signal::MayUse { key, attempt } | Signal::MaySet { key, attempt } => {
                put_key(&mut w, *key);
                w.put_i32(*attempt);
            }
            Signal::SvarRecordIs { record } => w.put_string(record)?,
            Signal::IsRegisteredId { id }
            | Signal::OfferingIdIs { id }
            | Signal::GetEvents { id }
            | Signal::ClearAllEvents { id }
            | Signal::UnregisterProcessor { id } => put_id(&mut w, id),
            Signal::YesNo { yes } => w.put_u8(*yes as u8),
            Signal::RegisterProcessor { id, evconn, progname, pid, port } => {
                put_id(&mut w, id);
                w.put_u8(*evconn as u8);
                w.put_string(progname.as_bytes())?;
                w.put_u32(*pid);
                w.put_u16(*port);
            }
            Signal::MatchOrMake { name, to, from } => {
                put_name(&mut w, name);
                put_id(&mut w, to);
                put_id(&mut w, from);
            }
            Signal::MatchOrMakeResult { key, coupling } | Signal::CouplingIs { key, coupling } => {
                put_key(&mut w, *key);
                w.put_u8(coupling.as_u8());
            }
            Signal::GetOfferingProcs { to_proc } => w.put_i32(*to_proc),
            Signal::OfferingProcsAre { procs } => put_procs(&mut w, procs)?,
            Signal::GetOfferedVars { to_proc, from_proc } => {
                w.put_i32(*to_proc);
                w.put_i32(*from_proc);
            }
            Signal::OfferedVarsAre { names } => put_names(&mut w, names)?,
            Signal::EventsAre { key, events } => {
                put_key(&mut w, *key);
                w.put_u32(events.bits());
            }
            Signal::AddEvent { key, id, event } => {
                put_key(&mut w, *key);
                put_id(&mut w, id);
                w.put_u32(event.bits());
            }
            Signal::WswsValueIs { cdr_value } => w.put_string(cdr_value)?,
            Signal::PrintSvarDb => {}
            Signal::SvarDbPrinted { printout } => w.put_string(printout.as_bytes())?,
            Signal::StateIs { key, state } => {
                put_key(&mut w, *key);
                w.put_u8(state.as_u8());
            }
        }
        Ok(w.into_bytes())
    }

    /// Decode a payload produced by [`Signal::encode`].
    ///
    /// Bytes after the last field are ignored.
    pub fn decode(payload: &[u8]) -> Result<Signal, SignalError> {
        let mut r = WireReader::new(payload);
        let raw = r.get_u16()?;
        let id = SignalId::from_u16(raw).ok_or(SignalError::UnknownSignal(raw))?;
        let r = &mut r;

        let signal = match id {
            SignalId::MakeOffer => Signal::MakeOffer { key: get_key(r)? },
            SignalId::RetractOffer => Signal::RetractOffer { key: get_key(r)? },
            SignalId::RetractVar => Signal::RetractVar { key: get_key(r)? },
            SignalId::SetState => Signal::SetState {
                key: get_key(r)?,
                used: r.get_u8()? != 0,
                loc: get_text(r)?,
            },
            SignalId::SetControl => Signal::SetControl {
                key: get_key(r)?,
                control: Control::from_bits(r.get_u8()?),
            },
            SignalId::GetValue => Signal::GetValue { key: get_key(r)? },
            SignalId::ValueIs => Signal::ValueIs {
                key: get_key(r)?,
                error: r.get_u32()?,
                error_loc: get_text(r)?,
                cdr_value: r.get_string()?,
            },
            SignalId::AssignValue => Signal::AssignValue {
                key: get_key(r)?,
                cdr_value: r.get_string()?,
            },
            SignalId::SvarAssigned => Signal::SvarAssigned {
                key: get_key(r)?,
                error: r.get_u32()?,
                error_loc: get_text(r)?,
            },
            SignalId::MayUse => Signal::MayUse {
                key: get_key(r)?,
                attempt: r.get_i32()?,
            },
            SignalId::MaySet => Signal::MaySet {
                key: get_key(r)?,
                attempt: r.get_i32()?,
            },
            SignalId::ReadSvarRecord => Signal::ReadSvarRecord { key: get_key(r)? },
            SignalId::SvarRecordIs => Signal::SvarRecordIs { record: r.get_string()? },
            SignalId::IsRegisteredId => Signal::IsRegisteredId { id: get_id(r)? },
            SignalId::YesNo => Signal::YesNo { yes: r.get_u8()? != 0 },
            SignalId::RegisterProcessor => Signal::RegisterProcessor {
                id: get_id(r)?,
                evconn: r.get_u8()? != 0,
                progname: get_text(r)?,
                pid: r.get_u32()?,
                port: r.get_u16()?,
            },
            SignalId::MatchOrMake => Signal::MatchOrMake {
                name: get_name(r)?,
                to: get_id(r)?,
                from: get_id(r)?,
            },
            SignalId::MatchOrMakeResult => Signal::MatchOrMakeResult {
                key: get_key(r)?,
                coupling: Coupling::from_u8(r.get_u8()?),
            },
            SignalId::FindOfferingId => Signal::FindOfferingId { key: get_key(r)? },
            SignalId::OfferingIdIs => Signal::OfferingIdIs { id: get_id(r)? },
            SignalId::GetOfferingProcs => Signal::GetOfferingProcs { to_proc: r.get_i32()? },
            SignalId::OfferingProcsAre => Signal::OfferingProcsAre { procs: get_procs(r)? },
            SignalId::GetOfferedVars => Signal::GetOfferedVars {
                to_proc: r.get_i32()?,
                from_proc: r.get_i32()?,
            },
            SignalId::OfferedVarsAre => Signal::OfferedVarsAre { names: get_names(r)? },
            SignalId::FindPairingKey => Signal::FindPairingKey { key: get_key(r)? },
            SignalId::PairingKeyIs => Signal::PairingKeyIs { key: get_key(r)? },
            SignalId::GetEvents => Signal::GetEvents { id: get_id(r)? },
            SignalId::ClearAllEvents => Signal::ClearAllEvents { id: get_id(r)? },
            SignalId::EventsAre => Signal::EventsAre {
                key: get_key(r)?,
                events: Event::from_bits(r.get_u32()?),
            },
            SignalId::AddEvent => Signal::AddEvent {
                key: get_key(r)?,
                id: get_id(r)?,
                event: Event::from_bits(r.get_u32()?),
            },
            SignalId::AssignWswsVar => Signal::AssignWswsVar {
                key: get_key(r)?,
                cdr_value: r.get_string()?,
            },
            SignalId::ReadWswsVar => Signal::ReadWswsVar { key: get_key(r)? },
            SignalId::WswsValueIs => Signal::WswsValueIs { cdr_value: r.get_string()? },
            SignalId::PrintSvarDb => Signal::PrintSvarDb,
            SignalId::SvarDbPrinted => Signal::SvarDbPrinted { printout: get_text(r)? },
            SignalId::GetState => Signal::GetState { key: get_key(r)? },
            SignalId::StateIs => Signal::StateIs {
                key: get_key(r)?,
                state: SvarState::from_u8(r.get_u8()?),
            },
            SignalId::GetControl => Signal::GetControl { key: get_key(r)? },
            SignalId::ControlIs => Signal::ControlIs {
                key: get_key(r)?,
                control: Control::from_bits(r.get_u8()?),
            },
            SignalId::GetCoupling => Signal::GetCoupling { key: get_key(r)? },
            SignalId::CouplingIs => Signal::CouplingIs {
                key: get_key(r)?,
                coupling: Coupling::from_u8(r.get_u8()?),
            },
            SignalId::UnregisterProcessor => Signal::UnregisterProcessor { id: get_id(r)? },
        };
        Ok(signal)
    }
}

fn put_partner(w: &mut WireWriter, p: &Partner) {
    put_id(w, &p.id);
    w.put_u32(p.pid);
    w.put_u16(p.port);
    w.put_u16(p.flags.bits());
}

fn get_partner(r: &mut WireReader<'_>) -> WireResult<Partner> {
    let id = get_id(r)?;
    let pid = r.get_u32()?;
    let port = r.get_u16()?;
    let flags = PartnerFlags::from_bits(r.get_u16()?);
    let mut p = Partner::new(id, pid, port);
    p.flags = flags;
    Ok(p)
}

/// Encode a row for `SVAR_RECORD_IS`; `None` encodes as empty.
pub fn encode_record(row: Option<&OfferedVar>) -> Result<Vec<u8>, SignalError> {
    let Some(row) = row else {
        return Ok(Vec::new());
    };
    let mut w = WireWriter::with_capacity(64);
    put_key(&mut w, row.key);
    put_partner(&mut w, &row.offering);
    put_partner(&mut w, &row.accepting);
    w.put_u8(row.state);
    put_name(&mut w, &row.name);
    Ok(w.into_bytes())
}

/// Decode an `SVAR_RECORD_IS` record; empty means no such row.
pub fn decode_record(bytes: &[u8]) -> Result<Option<OfferedVar>, SignalError> {
    if bytes.is_empty() {
        return Ok(None);
    }
    let mut r = WireReader::new(bytes);
    let key = get_key(&mut r)?;
    let offering = get_partner(&mut r)?;
    let accepting = get_partner(&mut r)?;
    let state = r.get_u8()?;
    let name = get_name(&mut r)?;
    Ok(Some(OfferedVar {
        key,
        offering,
        accepting,
        state,
        name,
    }))
}
