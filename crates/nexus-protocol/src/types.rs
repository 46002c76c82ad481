//! Composite wire types that sit beside the plain integers and strings.

pub use uuid::Uuid;

/// A block position packed into a single 64-bit value.
///
/// ```text
/// +----------------+----------------+-------------+
/// |  x (26 bits)   |  z (26 bits)   | y (12 bits) |
/// +----------------+----------------+-------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    /// X coordinate, 26-bit signed range.
    pub x: i32,
    /// Y coordinate, 12-bit signed range.
    pub y: i32,
    /// Z coordinate, 26-bit signed range.
    pub z: i32,
}

impl Position {
    /// Create a position from its three coordinates.
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Pack into the 64-bit wire representation.
    pub fn to_packed(self) -> i64 {
        ((self.x as i64 & 0x3FF_FFFF) << 38) | ((self.z as i64 & 0x3FF_FFFF) << 12) | (self.y as i64 & 0xFFF)
    }

    /// Unpack from the 64-bit wire representation, sign-extending each component.
    pub fn from_packed(value: i64) -> Self {
        Self {
            x: (value >> 38) as i32,
            y: ((value << 52) >> 52) as i32,
            z: ((value << 26) >> 38) as i32,
        }
    }
}

/// A bit set with a length fixed by the schema.
///
/// Occupies `ceil(len_bits / 8)` bytes on the wire. Bit `i` lives in byte
/// `i / 8` at bit position `i % 8`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FixedBitSet {
    len_bits: usize,
    bytes: Vec<u8>,
}

impl FixedBitSet {
    /// Create an all-clear bit set of the given length.
    pub fn new(len_bits: usize) -> Self {
        Self {
            len_bits,
            bytes: vec![0; Self::byte_len(len_bits)],
        }
    }

    /// Rebuild a bit set from its wire bytes. Bits past `len_bits` are cleared.
    pub fn from_bytes(len_bits: usize, bytes: &[u8]) -> Self {
        let mut set = Self::new(len_bits);
        let n = set.bytes.len().min(bytes.len());
        set.bytes[..n].copy_from_slice(&bytes[..n]);
        set.clear_padding();
        set
    }

    /// Number of bytes a bit set of `len_bits` occupies on the wire.
    pub fn byte_len(len_bits: usize) -> usize {
        len_bits.div_ceil(8)
    }

    /// Declared length in bits.
    pub fn len(&self) -> usize {
        self.len_bits
    }

    /// Whether the set was declared with zero bits.
    pub fn is_empty(&self) -> bool {
        self.len_bits == 0
    }

    /// Read bit `index`. Out-of-range indices read as `false`.
    pub fn get(&self, index: usize) -> bool {
        index < self.len_bits && self.bytes[index / 8] & (1 << (index % 8)) != 0
    }

    /// Set or clear bit `index`. Out-of-range indices are ignored.
    pub fn set(&mut self, index: usize, value: bool) {
        if index >= self.len_bits {
            return;
        }
        let mask = 1 << (index % 8);
        if value {
            self.bytes[index / 8] |= mask;
        } else {
            self.bytes[index / 8] &= !mask;
        }
    }

    /// Indices of all set bits, ascending.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len_bits).filter(|&i| self.get(i))
    }

    /// The wire bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn clear_padding(&mut self) {
        let used = self.len_bits % 8;
        if used != 0
            && let Some(last) = self.bytes.last_mut()
        {
            *last &= (1u8 << used) - 1;
        }
    }
}

/// An NBT payload kept as raw bytes.
///
/// The codec only walks the tag tree to find where it ends; the content is
/// never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NbtBlob(pub Vec<u8>);

impl NbtBlob {
    /// The empty blob: a single `TAG_End`.
    pub fn empty() -> Self {
        Self(vec![0])
    }

    /// Raw bytes as they appear on the wire.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Default for NbtBlob {
    fn default() -> Self {
        Self::empty()
    }
}
