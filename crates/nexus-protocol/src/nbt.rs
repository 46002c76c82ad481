//! Extent measurement for network NBT.
//!
//! Since protocol 764 the root tag is sent without a name: one type byte
//! followed directly by the payload. A lone `TAG_End` (0x00) stands for "no
//! data". Nothing here interprets tag content; the walk only establishes how
//! many bytes the tree occupies so it can be carried as an opaque blob.

use crate::error::CodecError;

/// Deepest compound/list nesting accepted before the blob is rejected.
pub const MAX_DEPTH: usize = 512;

const TAG_END: u8 = 0;
const TAG_BYTE: u8 = 1;
const TAG_SHORT: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_LONG: u8 = 4;
const TAG_FLOAT: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_BYTE_ARRAY: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_LIST: u8 = 9;
const TAG_COMPOUND: u8 = 10;
const TAG_INT_ARRAY: u8 = 11;
const TAG_LONG_ARRAY: u8 = 12;

/// Return the number of bytes the nameless root tag at the start of `buf` spans.
pub fn measure(buf: &[u8]) -> Result<usize, CodecError> {
    let mut walker = Walker { buf, pos: 0 };
    let tag = walker.u8()?;
    if tag != TAG_END {
        walker.payload(tag, 0)?;
    }
    Ok(walker.pos)
}

struct Walker<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Walker<'_> {
    fn skip(&mut self, n: usize) -> Result<(), CodecError> {
        let remaining = self.buf.len() - self.pos;
        if remaining < n {
            return Err(CodecError::TruncatedPayload {
                needed: n,
                remaining,
            });
        }
        self.pos += n;
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        let byte = *self.buf.get(self.pos).ok_or(CodecError::TruncatedPayload {
            needed: 1,
            remaining: 0,
        })?;
        self.pos += 1;
        Ok(byte)
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        let start = self.pos;
        self.skip(2)?;
        Ok(u16::from_be_bytes([self.buf[start], self.buf[start + 1]]))
    }

    fn length(&mut self) -> Result<usize, CodecError> {
        let start = self.pos;
        self.skip(4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.buf[start..start + 4]);
        let len = i32::from_be_bytes(raw);
        usize::try_from(len).map_err(|_| CodecError::NegativeLength(len))
    }

    fn array(&mut self, element_size: usize) -> Result<(), CodecError> {
        let len = self.length()?;
        let bytes = len
            .checked_mul(element_size)
            .ok_or(CodecError::MalformedNbt("array length overflows"))?;
        self.skip(bytes)
    }

    fn payload(&mut self, tag: u8, depth: usize) -> Result<(), CodecError> {
        if depth > MAX_DEPTH {
            return Err(CodecError::MalformedNbt("nesting too deep"));
        }
        match tag {
            TAG_BYTE => self.skip(1),
            TAG_SHORT => self.skip(2),
            TAG_INT | TAG_FLOAT => self.skip(4),
            TAG_LONG | TAG_DOUBLE => self.skip(8),
            TAG_BYTE_ARRAY => self.array(1),
            TAG_INT_ARRAY => self.array(4),
            TAG_LONG_ARRAY => self.array(8),
            TAG_STRING => {
                let len = self.u16()? as usize;
                self.skip(len)
            }
            TAG_LIST => {
                let element = self.u8()?;
                let len = self.length()?;
                if element == TAG_END {
                    return if len == 0 {
                        Ok(())
                    } else {
                        Err(CodecError::MalformedNbt("non-empty list of TAG_End"))
                    };
                }
                for _ in 0..len {
                    self.payload(element, depth + 1)?;
                }
                Ok(())
            }
            TAG_COMPOUND => loop {
                let child = self.u8()?;
                if child == TAG_END {
                    return Ok(());
                }
                let name_len = self.u16()? as usize;
                self.skip(name_len)?;
                self.payload(child, depth + 1)?;
            },
            _ => Err(CodecError::MalformedNbt("unknown tag type")),
        }
    }
}
