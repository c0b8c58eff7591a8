//! Async framing for the server side

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::SignalError;
use crate::frame::{frame_bytes, MAX_FRAME_LEN};
use crate::signal::Signal;

/// Read the next signal; `None` on orderly close or end of stream.
///
/// `buf` is reused between calls and grows to the largest frame seen.
pub async fn read_frame<R>(r: &mut R, buf: &mut Vec<u8>) -> Result<Option<Signal>, SignalError>
where
    R: AsyncRead + Unpin,
{
    let len = match r.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len == 0 {
        return Ok(None);
    }
    if len > MAX_FRAME_LEN {
        return Err(SignalError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }
    if len > buf.len() {
        buf.resize(len, 0);
    }
    match r.read_exact(&mut buf[..len]).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(SignalError::Closed),
        Err(e) => return Err(e.into()),
    }
    let signal = Signal::decode(&buf[..len])?;
    debug!(%signal, "signal received");
    Ok(Some(signal))
}

/// Encode and send one signal.
pub async fn write_frame<W>(w: &mut W, signal: &Signal) -> Result<(), SignalError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = frame_bytes(&signal.encode()?)?;
    w.write_all(&bytes).await?;
    w.flush().await?;
    debug!(%signal, "signal sent");
    Ok(())
}
