//! Big-endian field codecs
//!
//! Every integer travels in network byte order with a fixed width of
//! 1, 2, 3, 4, 6 or 8 bytes. Byte strings carry a 2-byte length prefix.
//! Hex fields use the unsigned encoding; they only differ when printed.

use crate::errors::{WireError, WireResult};

/// Largest byte string a 2-byte length prefix can describe
pub const MAX_WIRE_STRING: usize = u16::MAX as usize;

/// Growable big-endian output buffer
#[derive(Debug, Default, Clone)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Write the low `width` bytes of `value`, most significant first.
    fn put_uint(&mut self, value: u64, width: usize) {
        let bytes = value.to_be_bytes();
        self.buf.extend_from_slice(&bytes[8 - width..]);
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.put_uint(v as u64, 2);
    }

    pub fn put_u24(&mut self, v: u32) {
        self.put_uint(v as u64, 3);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.put_uint(v as u64, 4);
    }

    pub fn put_u48(&mut self, v: u64) {
        self.put_uint(v, 6);
    }

    pub fn put_u64(&mut self, v: u64) {
        self.put_uint(v, 8);
    }

    pub fn put_i8(&mut self, v: i8) {
        self.put_uint(v as u8 as u64, 1);
    }

    pub fn put_i16(&mut self, v: i16) {
        self.put_uint(v as u16 as u64, 2);
    }

    pub fn put_i24(&mut self, v: i32) {
        self.put_uint(v as u32 as u64, 3);
    }

    pub fn put_i32(&mut self, v: i32) {
        self.put_uint(v as u32 as u64, 4);
    }

    pub fn put_i48(&mut self, v: i64) {
        self.put_uint(v as u64, 6);
    }

    pub fn put_i64(&mut self, v: i64) {
        self.put_uint(v as u64, 8);
    }

    /// Write a byte string with its 2-byte length prefix.
    pub fn put_string(&mut self, s: &[u8]) -> WireResult<()> {
        if s.len() > MAX_WIRE_STRING {
            return Err(WireError::StringTooLong { len: s.len() });
        }
        self.put_u16(s.len() as u16);
        self.buf.extend_from_slice(s);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a big-endian input slice
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not consumed yet
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> WireResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(WireError::Truncated {
                needed: n,
                available: self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn get_uint(&mut self, width: usize) -> WireResult<u64> {
        let bytes = self.take(width)?;
        Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
    }

    /// Read `width` bytes and sign-extend from bit `8 * width - 1`.
    fn get_int(&mut self, width: usize) -> WireResult<i64> {
        let raw = self.get_uint(width)?;
        let shift = 64 - 8 * width as u32;
        Ok(((raw << shift) as i64) >> shift)
    }

    pub fn get_u8(&mut self) -> WireResult<u8> {
        Ok(self.get_uint(1)? as u8)
    }

    pub fn get_u16(&mut self) -> WireResult<u16> {
        Ok(self.get_uint(2)? as u16)
    }

    pub fn get_u24(&mut self) -> WireResult<u32> {
        Ok(self.get_uint(3)? as u32)
    }

    pub fn get_u32(&mut self) -> WireResult<u32> {
        Ok(self.get_uint(4)? as u32)
    }

    pub fn get_u48(&mut self) -> WireResult<u64> {
        self.get_uint(6)
    }

    pub fn get_u64(&mut self) -> WireResult<u64> {
        self.get_uint(8)
    }

    pub fn get_i8(&mut self) -> WireResult<i8> {
        Ok(self.get_int(1)? as i8)
    }

    pub fn get_i16(&mut self) -> WireResult<i16> {
        Ok(self.get_int(2)? as i16)
    }

    pub fn get_i24(&mut self) -> WireResult<i32> {
        Ok(self.get_int(3)? as i32)
    }

    pub fn get_i32(&mut self) -> WireResult<i32> {
        Ok(self.get_int(4)? as i32)
    }

    pub fn get_i48(&mut self) -> WireResult<i64> {
        self.get_int(6)
    }

    pub fn get_i64(&mut self) -> WireResult<i64> {
        self.get_int(8)
    }

    /// Read a byte string with its 2-byte length prefix.
    pub fn get_string(&mut self) -> WireResult<Vec<u8>> {
        let len = self.get_u16()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}
