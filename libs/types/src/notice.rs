//! UDP notification datagram
//!
//! Notifications are hints: a receiver re-reads the registry instead of
//! trusting the payload. Layout (big-endian, 14 bytes):
//!
//! ```text
//! [u16 tag][u64 key][u32 event]
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{WireError, WireResult};
use crate::event::Event;
use crate::ids::SvKey;
use crate::wire::{WireReader, WireWriter};

/// Size of an encoded notification
pub const NOTICE_LEN: usize = 14;

/// What happened to a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoticeKind {
    MakeOffer,
    OfferMatched,
    RetractOffer,
    NewEvent(Event),
    Disconnect,
}

impl NoticeKind {
    pub fn tag(&self) -> u16 {
        match self {
            NoticeKind::MakeOffer => 0,
            NoticeKind::OfferMatched => 1,
            NoticeKind::RetractOffer => 2,
            NoticeKind::NewEvent(_) => 3,
            NoticeKind::Disconnect => 4,
        }
    }
}

/// A notification addressed to one UDP port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Notification {
    /// Receiver port (not part of the datagram)
    pub port: u16,
    pub kind: NoticeKind,
    pub key: SvKey,
}

impl Notification {
    pub fn new(port: u16, kind: NoticeKind, key: SvKey) -> Self {
        Self { port, kind, key }
    }

    pub fn encode(&self) -> [u8; NOTICE_LEN] {
        let event = match self.kind {
            NoticeKind::NewEvent(ev) => ev.bits(),
            _ => 0,
        };
        let mut w = WireWriter::with_capacity(NOTICE_LEN);
        w.put_u16(self.kind.tag());
        w.put_u64(self.key.as_raw());
        w.put_u32(event);

        let mut out = [0u8; NOTICE_LEN];
        out.copy_from_slice(w.as_bytes());
        out
    }

    /// Decode a received datagram; `port` is the receiving port.
    pub fn decode(port: u16, data: &[u8]) -> WireResult<Self> {
        if data.len() != NOTICE_LEN {
            return Err(WireError::BadDatagram {
                expected: NOTICE_LEN,
                actual: data.len(),
            });
        }
        let mut r = WireReader::new(data);
        let tag = r.get_u16()?;
        let key = SvKey::from_raw(r.get_u64()?);
        let event = r.get_u32()?;
        let kind = match tag {
            0 => NoticeKind::MakeOffer,
            1 => NoticeKind::OfferMatched,
            2 => NoticeKind::RetractOffer,
            3 => NoticeKind::NewEvent(Event::from_bits(event)),
            4 => NoticeKind::Disconnect,
            other => return Err(WireError::UnknownTag(other)),
        };
        Ok(Self { port, kind, key })
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            NoticeKind::NewEvent(ev) => write!(f, "NewEvent({}) key {} -> :{}", ev, self.key, self.port),
            kind => write!(f, "{:?} key {} -> :{}", kind, self.key, self.port),
        }
    }
}
