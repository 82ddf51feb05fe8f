//! Bounds-checked access to message octets.
//!
//! Every other module reads message data through [`ByteCursor`] or the
//! [`BitReader`] built atop it. Neither ever panics on short data: all
//! accessors check the requested range first and return [`OutOfBounds`]
//! if it isn’t fully available.

use std::fmt;


//------------ OutOfBounds ---------------------------------------------------

/// An access would have read past the end of the data.
///
/// The offset is absolute, i.e., relative to the start of the message the
/// cursor was originally created for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error(
    "access of {width} octets at offset {offset} exceeds data ending at {end}"
)]
pub struct OutOfBounds {
    /// The absolute offset of the attempted access.
    pub offset: usize,

    /// The number of octets requested.
    pub width: usize,

    /// The absolute offset of the end of the available data.
    pub end: usize,
}


//------------ ByteCursor ----------------------------------------------------

/// A read-only, position-aware view over message octets.
///
/// The cursor doesn’t own the data. It remembers where its first octet
/// lives within the original message so that positions reported by
/// decoders are always absolute, even for cursors over sub-ranges.
///
/// All offsets taken by the accessor methods are relative to the start of
/// the cursor.
#[derive(Clone, Copy)]
pub struct ByteCursor<'a> {
    /// The data.
    data: &'a [u8],

    /// The absolute position of the first octet of `data`.
    base: usize,
}

impl<'a> ByteCursor<'a> {
    /// Creates a cursor over a complete message.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    /// Creates a cursor over data that starts at `base` in its message.
    pub fn with_base(data: &'a [u8], base: usize) -> Self {
        ByteCursor { data, base }
    }

    /// Returns the number of octets available.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns whether there are no octets at all.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the absolute position of the first octet.
    pub fn base(&self) -> usize {
        self.base
    }

    /// Returns the absolute position for a relative offset.
    pub fn abs(&self, offset: usize) -> usize {
        self.base.saturating_add(offset)
    }

    /// Returns the absolute position just past the last octet.
    pub fn end(&self) -> usize {
        self.abs(self.data.len())
    }

    /// Returns the complete underlying data.
    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    /// Returns the number of octets left starting at `offset`.
    ///
    /// Returns zero if `offset` is beyond the end.
    pub fn remaining(&self, offset: usize) -> usize {
        self.data.len().saturating_sub(offset)
    }

    /// Produces the error for a failed access.
    fn oob(&self, offset: usize, width: usize) -> OutOfBounds {
        OutOfBounds {
            offset: self.abs(offset),
            width,
            end: self.end(),
        }
    }

    /// Returns `len` octets starting at `offset`.
    pub fn bytes(
        &self, offset: usize, len: usize
    ) -> Result<&'a [u8], OutOfBounds> {
        let end = offset.checked_add(len).ok_or_else(|| {
            self.oob(offset, len)
        })?;
        self.data.get(offset..end).ok_or_else(|| self.oob(offset, len))
    }

    /// Returns an array of `N` octets starting at `offset`.
    fn array<const N: usize>(
        &self, offset: usize
    ) -> Result<[u8; N], OutOfBounds> {
        let mut res = [0u8; N];
        res.copy_from_slice(self.bytes(offset, N)?);
        Ok(res)
    }

    /// Reads the octet at `offset`.
    pub fn read_u8(&self, offset: usize) -> Result<u8, OutOfBounds> {
        self.data.get(offset).copied().ok_or_else(|| self.oob(offset, 1))
    }

    /// Reads a big-endian 16 bit integer starting at `offset`.
    pub fn read_u16(&self, offset: usize) -> Result<u16, OutOfBounds> {
        self.array(offset).map(u16::from_be_bytes)
    }

    /// Reads a big-endian 24 bit integer starting at `offset`.
    pub fn read_u24(&self, offset: usize) -> Result<u32, OutOfBounds> {
        let [a, b, c] = self.array(offset)?;
        Ok(u32::from_be_bytes([0, a, b, c]))
    }

    /// Reads a big-endian 32 bit integer starting at `offset`.
    pub fn read_u32(&self, offset: usize) -> Result<u32, OutOfBounds> {
        self.array(offset).map(u32::from_be_bytes)
    }

    /// Returns a cursor over `len` octets starting at `offset`.
    ///
    /// The new cursor keeps reporting absolute positions.
    pub fn subrange(
        &self, offset: usize, len: usize
    ) -> Result<ByteCursor<'a>, OutOfBounds> {
        let data = self.bytes(offset, len)?;
        Ok(ByteCursor::with_base(data, self.abs(offset)))
    }

    /// Returns a cursor over everything starting at `offset`.
    pub fn tail(&self, offset: usize) -> Result<ByteCursor<'a>, OutOfBounds> {
        self.subrange(offset, self.remaining(offset))
    }
}

impl fmt::Debug for ByteCursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ByteCursor")
            .field("base", &self.base)
            .field("len", &self.data.len())
            .finish()
    }
}


//------------ BitReader -----------------------------------------------------

/// Reads bit fields most-significant bit first.
///
/// Used for protocols whose headers pack fields across octet boundaries.
/// Like the cursor it is built on, it never reads past the data.
#[derive(Clone, Debug)]
pub struct BitReader<'a> {
    cursor: ByteCursor<'a>,

    /// The position of the next bit to read, counted from the start.
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(cursor: ByteCursor<'a>) -> Self {
        BitReader { cursor, bit_pos: 0 }
    }

    /// Reads `count` bits, at most 32, as an unsigned integer.
    pub fn read_bits(&mut self, count: u8) -> Result<u32, OutOfBounds> {
        debug_assert!(count <= 32);
        let count = usize::from(count);
        let end = self.bit_pos + count;
        if end > self.cursor.len() * 8 {
            return Err(OutOfBounds {
                offset: self.cursor.abs(self.bit_pos / 8),
                width: count.div_ceil(8),
                end: self.cursor.end(),
            })
        }
        let mut res = 0u32;
        for pos in self.bit_pos..end {
            let octet = self.cursor.read_u8(pos / 8)?;
            let bit = (octet >> (7 - (pos % 8))) & 1;
            res = (res << 1) | u32::from(bit);
        }
        self.bit_pos = end;
        Ok(res)
    }

    /// Reads a single bit as a flag.
    pub fn read_flag(&mut self) -> Result<bool, OutOfBounds> {
        self.read_bits(1).map(|bit| bit != 0)
    }

    /// Skips to the start of the next octet unless already aligned.
    pub fn align(&mut self) {
        self.bit_pos = self.bit_pos.div_ceil(8) * 8;
    }

    /// Returns whether the reader sits on an octet boundary.
    pub fn is_aligned(&self) -> bool {
        self.bit_pos % 8 == 0
    }

    /// Returns the position of the next bit, counted from the start.
    pub fn bit_position(&self) -> usize {
        self.bit_pos
    }

    /// Returns the offset of the octet containing the next bit.
    pub fn octet_offset(&self) -> usize {
        self.bit_pos / 8
    }

    /// Returns the number of complete octets consumed so far.
    pub fn consumed_octets(&self) -> usize {
        self.bit_pos.div_ceil(8)
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use proptest::prelude::*;
    use super::*;

    #[test]
    fn read_integers() {
        let data = b"\x01\x02\x03\x04\x05";
        let cursor = ByteCursor::new(data);
        assert_eq!(cursor.read_u8(0).unwrap(), 1);
        assert_eq!(cursor.read_u16(1).unwrap(), 0x0203);
        assert_eq!(cursor.read_u24(2).unwrap(), 0x030405);
        assert_eq!(cursor.read_u32(1).unwrap(), 0x02030405);
        assert!(cursor.read_u32(2).is_err());
        assert!(cursor.read_u8(5).is_err());
        assert!(cursor.read_u16(usize::MAX).is_err());
    }

    #[test]
    fn subrange_keeps_absolute_positions() {
        let data = b"abcdefgh";
        let cursor = ByteCursor::new(data);
        let sub = cursor.subrange(2, 4).unwrap();
        assert_eq!(sub.as_slice(), b"cdef");
        assert_eq!(sub.base(), 2);
        let subsub = sub.subrange(1, 2).unwrap();
        assert_eq!(subsub.abs(0), 3);
        let err = subsub.read_u8(2).unwrap_err();
        assert_eq!(err, OutOfBounds { offset: 5, width: 1, end: 5 });
        assert!(cursor.subrange(6, 3).is_err());
        assert!(cursor.subrange(usize::MAX, 2).is_err());
        assert_eq!(cursor.tail(8).unwrap().len(), 0);
        assert!(cursor.tail(9).is_err());
    }

    #[test]
    fn bits() {
        let data = [0b1011_0001, 0b0100_0000];
        let mut reader = BitReader::new(ByteCursor::new(&data));
        assert!(reader.read_flag().unwrap());
        assert_eq!(reader.read_bits(3).unwrap(), 0b011);
        assert_eq!(reader.read_bits(6).unwrap(), 0b0001_01);
        assert!(!reader.is_aligned());
        reader.align();
        assert_eq!(reader.octet_offset(), 2);
        assert!(reader.read_bits(1).is_err());
    }

    proptest! {
        #[test]
        fn never_reads_past_end(
            data in proptest::collection::vec(any::<u8>(), 0..16),
            offset in 0usize..24,
            len in 0usize..24,
        ) {
            let cursor = ByteCursor::new(&data);
            let fits = offset + 4 <= data.len();
            prop_assert_eq!(cursor.read_u32(offset).is_ok(), fits);
            prop_assert_eq!(
                cursor.read_u16(offset).is_ok(), offset + 2 <= data.len()
            );
            prop_assert_eq!(
                cursor.subrange(offset, len).is_ok(),
                offset + len <= data.len()
            );
            prop_assert_eq!(
                cursor.remaining(offset), data.len().saturating_sub(offset)
            );
        }
    }
}
