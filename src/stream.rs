// ═══════════════════════════════════════════════════════════
// Primitive codec: the byte-level layer under every other codec
// ═══════════════════════════════════════════════════════════
//
// Wire encoding of the primitives:
//
//   bool     [1 byte]   0x00 = false, anything else = true
//   int32    [1 byte]   length tag, always 4
//            [4 bytes]  value, little-endian
//   string   [int32]    byte length
//            [N bytes]  raw bytes, no terminator
//   bytes    [int32]    byte length
//            [N bytes]  raw bytes
//
// The int32 tag is checked on read. A wrong tag is not an error: the read
// yields 0 having consumed only the tag byte, so a misaligned stream usually
// fails a few reads later instead of right here.
//
// The decoder carries a "bad" flag. Once any read runs past the end, every
// later read fails too, no matter how much data seems to be left.
//
// ═══════════════════════════════════════════════════════════

use tracing::{debug, warn};

use crate::error::{Error, Result};

const INT32_TAG: u8 = 4;

// ── Encoder ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self { Encoder { buf: Vec::new() } }

    pub fn finish(self) -> Vec<u8> { self.buf }

    pub fn len(&self) -> usize { self.buf.len() }

    pub fn is_empty(&self) -> bool { self.buf.is_empty() }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Untagged bytes, used for the file header only.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.write_u8(if v { 1 } else { 0 });
    }

    pub fn write_int32(&mut self, v: u32) {
        self.buf.push(INT32_TAG);
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.write_int32(v as u32);
    }

    pub fn write_string(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_int32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_vec<T, F: FnMut(&mut Self, &T)>(&mut self, items: &[T], mut f: F) {
        self.write_int32(items.len() as u32);
        for item in items { f(self, item); }
    }
}

// ── Decoder ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    bad: bool,
    deferred: Option<Error>,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Decoder { data, pos: 0, bad: false, deferred: None }
    }

    pub fn position(&self) -> usize { self.pos }

    pub fn remaining(&self) -> usize { self.data.len() - self.pos }

    pub fn is_bad(&self) -> bool { self.bad }

    /// Remember a failure that must fail the whole read even though decoding
    /// carries on. Only the first one is kept.
    pub fn defer(&mut self, err: Error) {
        if self.deferred.is_none() {
            self.deferred = Some(err);
        }
    }

    pub fn take_deferred(&mut self) -> Option<Error> {
        self.deferred.take()
    }

    fn exhausted(&mut self) -> Error {
        if !self.bad {
            warn!("bytecode stream exhausted at offset {}", self.pos);
        }
        self.bad = true;
        Error::StreamExhausted
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        if self.bad || self.pos >= self.data.len() {
            return Err(self.exhausted());
        }
        let v = self.data[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn read_raw(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.bad || n > self.remaining() {
            return Err(self.exhausted());
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_int32(&mut self) -> Result<u32> {
        let tag = self.read_u8()?;
        if tag != INT32_TAG {
            debug!("int32 tag mismatch at offset {}: {}", self.pos - 1, tag);
            return Ok(0);
        }
        let b = self.read_raw(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_int32()? as i32)
    }

    /// A zero-length string comes back as `None`, not as an empty string.
    /// Callers that accept empty strings use `unwrap_or_default()`.
    pub fn read_string(&mut self) -> Result<Option<String>> {
        let len = self.read_int32()? as usize;
        if len == 0 {
            return Ok(None);
        }
        let bytes = self.read_raw(len)?;
        String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|_| Error::InvalidString)
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_int32()? as usize;
        Ok(self.read_raw(len)?.to_vec())
    }

    pub fn read_vec<T, F: FnMut(&mut Self) -> Result<T>>(&mut self, mut f: F) -> Result<Vec<T>> {
        let count = self.read_int32()? as usize;
        let mut v = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count { v.push(f(self)?); }
        Ok(v)
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
