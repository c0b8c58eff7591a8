//! Length-prefixed framing
//!
//! ```text
//! [u32 length][u16 signal id][fields ...]
//! ```
//!
//! The length counts the payload only. A zero length is an orderly close.

use std::io::{self, Read, Write};
use tracing::debug;

use crate::error::SignalError;
use crate::signal::Signal;

/// Largest accepted payload
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Initial receive buffer size; enough for any signal without blobs
pub const INITIAL_RECV_BUFFER: usize = 2 * std::mem::size_of::<Signal>();

/// Prefix `payload` with its length.
pub fn frame_bytes(payload: &[u8]) -> Result<Vec<u8>, SignalError> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(SignalError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Encode and send one signal.
pub fn write_frame<W: Write>(w: &mut W, signal: &Signal) -> Result<(), SignalError> {
    let bytes = frame_bytes(&signal.encode()?)?;
    w.write_all(&bytes)?;
    w.flush()?;
    debug!(%signal, "signal sent");
    Ok(())
}

/// Tell the peer we are done.
pub fn write_close<W: Write>(w: &mut W) -> io::Result<()> {
    w.write_all(&0u32.to_be_bytes())?;
    w.flush()
}

fn read_exact_or_eof<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<bool, SignalError> {
    let mut off = 0usize;
    while off < buf.len() {
        match r.read(&mut buf[off..]) {
            Ok(0) if off == 0 => return Ok(false),
            Ok(0) => return Err(SignalError::Closed),
            Ok(n) => off += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(SignalError::Io(e)),
        }
    }
    Ok(true)
}

/// Reusable receive buffer; grows for large frames and stays grown
#[derive(Debug)]
pub struct RecvBuffer {
    buf: Vec<u8>,
}

impl RecvBuffer {
    pub fn new() -> Self {
        Self {
            buf: vec![0; INITIAL_RECV_BUFFER],
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Read the next signal; `None` on orderly close or end of stream.
    pub fn read_frame<R: Read>(&mut self, r: &mut R) -> Result<Option<Signal>, SignalError> {
        let mut header = [0u8; 4];
        if !read_exact_or_eof(r, &mut header)? {
            return Ok(None);
        }
        let len = u32::from_be_bytes(header) as usize;
        if len == 0 {
            return Ok(None);
        }
        if len > MAX_FRAME_LEN {
            return Err(SignalError::FrameTooLarge {
                len,
                max: MAX_FRAME_LEN,
            });
        }
        if len > self.buf.len() {
            self.buf.resize(len, 0);
        }
        if !read_exact_or_eof(r, &mut self.buf[..len])? {
            return Err(SignalError::Closed);
        }
        let signal = Signal::decode(&self.buf[..len])?;
        debug!(%signal, "signal received");
        Ok(Some(signal))
    }
}

impl Default for RecvBuffer {
    fn default() -> Self {
        Self::new()
    }
}
