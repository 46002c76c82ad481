//! Binary codec primitives.
//!
//! [`PacketReader`] is a cursor over a borrowed byte slice and
//! [`PacketWriter`] appends to an owned buffer. Every `read_*` has a matching
//! `write_*`, and all fixed-width numbers are big-endian.
//!
//! VarInts carry 7 payload bits per byte, lowest group first, with bit 7 as
//! the continuation flag:
//!
//! ```text
//! 300 = 0b1_0010_1100  ->  [1010_1100] [0000_0010]
//!                            ^ more      ^ last
//! ```

use crate::error::CodecError;
use crate::nbt;
use crate::types::{FixedBitSet, NbtBlob, Position, Uuid};

/// Maximum encoded width of a 32-bit VarInt.
pub const MAX_VAR_INT_BYTES: usize = 5;

/// Maximum encoded width of a 64-bit VarLong.
pub const MAX_VAR_LONG_BYTES: usize = 10;

/// Number of bytes `value` occupies when VarInt-encoded.
pub fn var_int_len(value: i32) -> usize {
    let mut value = value as u32;
    let mut len = 1;
    while value & !0x7F != 0 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Decode a VarInt at the start of `buf` without requiring it to be complete.
///
/// Returns `Ok(None)` when `buf` ends before a terminating byte and fewer than
/// [`MAX_VAR_INT_BYTES`] bytes have been seen, otherwise the value and the
/// number of bytes it spans.
pub fn peek_var_int(buf: &[u8]) -> Result<Option<(i32, usize)>, CodecError> {
    let mut value: u32 = 0;
    for (i, &byte) in buf.iter().take(MAX_VAR_INT_BYTES).enumerate() {
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value as i32, i + 1)));
        }
    }
    if buf.len() >= MAX_VAR_INT_BYTES {
        Err(CodecError::MalformedVarInt {
            max_bytes: MAX_VAR_INT_BYTES,
        })
    } else {
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Cursor-based reader over an in-memory packet body.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    /// Start reading at the beginning of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Whether every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::TruncatedPayload {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_length(&mut self) -> Result<usize, CodecError> {
        let len = self.read_var_int()?;
        usize::try_from(len).map_err(|_| CodecError::NegativeLength(len))
    }

    /// Read a boolean; any non-zero byte is `true`.
    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_u8()? != 0)
    }

    /// Read a signed byte.
    pub fn read_i8(&mut self) -> Result<i8, CodecError> {
        Ok(i8::from_be_bytes(self.take_array()?))
    }

    /// Read an unsigned byte.
    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    /// Read a big-endian `i16`.
    pub fn read_i16(&mut self) -> Result<i16, CodecError> {
        Ok(i16::from_be_bytes(self.take_array()?))
    }

    /// Read a big-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    /// Read a big-endian `i32`.
    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    /// Read a big-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    /// Read a big-endian `i64`.
    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    /// Read a big-endian `u64`.
    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.take_array()?))
    }

    /// Read a big-endian IEEE-754 `f32`.
    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_be_bytes(self.take_array()?))
    }

    /// Read a big-endian IEEE-754 `f64`.
    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        Ok(f64::from_be_bytes(self.take_array()?))
    }

    /// Read a VarInt of at most five bytes.
    pub fn read_var_int(&mut self) -> Result<i32, CodecError> {
        let mut value: u32 = 0;
        for i in 0..MAX_VAR_INT_BYTES {
            let byte = self.read_u8()?;
            value |= u32::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value as i32);
            }
        }
        Err(CodecError::MalformedVarInt {
            max_bytes: MAX_VAR_INT_BYTES,
        })
    }

    /// Read a VarLong of at most ten bytes.
    pub fn read_var_long(&mut self) -> Result<i64, CodecError> {
        let mut value: u64 = 0;
        for i in 0..MAX_VAR_LONG_BYTES {
            let byte = self.read_u8()?;
            value |= u64::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value as i64);
            }
        }
        Err(CodecError::MalformedVarInt {
            max_bytes: MAX_VAR_LONG_BYTES,
        })
    }

    /// Read a VarInt-length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let len = self.read_length()?;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    /// Read a UUID as its high then low 64-bit halves.
    pub fn read_uuid(&mut self) -> Result<Uuid, CodecError> {
        let high = self.read_u64()?;
        let low = self.read_u64()?;
        Ok(Uuid::from_u64_pair(high, low))
    }

    /// Read a packed block position.
    pub fn read_position(&mut self) -> Result<Position, CodecError> {
        Ok(Position::from_packed(self.read_i64()?))
    }

    /// Read a bit set of `len_bits` bits.
    pub fn read_bit_set(&mut self, len_bits: usize) -> Result<FixedBitSet, CodecError> {
        let bytes = self.take(FixedBitSet::byte_len(len_bits))?;
        Ok(FixedBitSet::from_bytes(len_bits, bytes))
    }

    /// Read exactly `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, CodecError> {
        Ok(self.take(n)?.to_vec())
    }

    /// Read a VarInt-length-prefixed raw byte block.
    pub fn read_prefixed_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.read_length()?;
        self.read_bytes(len)
    }

    /// Read every byte that is left.
    pub fn read_remaining(&mut self) -> Vec<u8> {
        let rest = self.buf[self.pos..].to_vec();
        self.pos = self.buf.len();
        rest
    }

    /// Read one nameless network-NBT tag as an opaque blob.
    pub fn read_nbt(&mut self) -> Result<NbtBlob, CodecError> {
        let len = nbt::measure(&self.buf[self.pos..])?;
        Ok(NbtBlob(self.read_bytes(len)?))
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Append-only writer producing a packet body.
#[derive(Debug, Clone, Default)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty writer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// View the written bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the writer, returning its buffer.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    /// Write a boolean as `0x00` or `0x01`.
    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    /// Write a signed byte.
    pub fn write_i8(&mut self, value: i8) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write an unsigned byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Write a big-endian `i16`.
    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a big-endian `u16`.
    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a big-endian `i32`.
    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a big-endian `u32`.
    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a big-endian `i64`.
    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a big-endian `u64`.
    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a big-endian IEEE-754 `f32`.
    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a big-endian IEEE-754 `f64`.
    pub fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a VarInt (one to five bytes).
    pub fn write_var_int(&mut self, value: i32) {
        let mut value = value as u32;
        loop {
            if value & !0x7F == 0 {
                self.buf.push(value as u8);
                return;
            }
            self.buf.push((value & 0x7F) as u8 | 0x80);
            value >>= 7;
        }
    }

    /// Write a VarLong (one to ten bytes).
    pub fn write_var_long(&mut self, value: i64) {
        let mut value = value as u64;
        loop {
            if value & !0x7F == 0 {
                self.buf.push(value as u8);
                return;
            }
            self.buf.push((value & 0x7F) as u8 | 0x80);
            value >>= 7;
        }
    }

    /// Write a VarInt-length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) {
        self.write_var_int(value.len() as i32);
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// Write a UUID as its high then low 64-bit halves.
    pub fn write_uuid(&mut self, value: Uuid) {
        let (high, low) = value.as_u64_pair();
        self.write_u64(high);
        self.write_u64(low);
    }

    /// Write a packed block position.
    pub fn write_position(&mut self, value: Position) {
        self.write_i64(value.to_packed());
    }

    /// Write a bit set's bytes.
    pub fn write_bit_set(&mut self, value: &FixedBitSet) {
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// Write raw bytes without a prefix.
    pub fn write_bytes(&mut self, value: &[u8]) {
        self.buf.extend_from_slice(value);
    }

    /// Write a VarInt-length-prefixed raw byte block.
    pub fn write_prefixed_bytes(&mut self, value: &[u8]) {
        self.write_var_int(value.len() as i32);
        self.buf.extend_from_slice(value);
    }

    /// Write an opaque NBT blob verbatim.
    pub fn write_nbt(&mut self, value: &NbtBlob) {
        self.buf.extend_from_slice(value.as_bytes());
    }
}
