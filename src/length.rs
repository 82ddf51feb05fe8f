//! The length octets.
//!
//! The [`Length`] is re-exported at the top level. Within the crate it is
//! used by the TLV reader, the reassembler framing and the encoders.

use smallvec::SmallVec;
use crate::cursor::ByteCursor;
use crate::decode::DecodeError;
use crate::mode::Mode;


//------------ Length -------------------------------------------------------

/// The length of the content of an encoded value.
///
/// A first octet below 0x80 is the length itself. 0x80 marks an
/// indefinite length: the content runs until an end-of-contents value.
/// Other first octets give the number of octets following it that hold the
/// big-endian length.
///
/// We accept up to four following octets. DER additionally demands the
/// shortest possible encoding.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Length {
    Definite(usize),
    Indefinite,
}

impl Length {
    /// The maximum number of octets following a long-form first octet.
    pub const MAX_LONG_OCTETS: usize = 4;

    /// Returns the length if it is definite.
    pub fn definite(self) -> Option<usize> {
        match self {
            Length::Definite(len) => Some(len),
            Length::Indefinite => None,
        }
    }

    /// Returns whether the length is definite and zero.
    pub fn is_zero(self) -> bool {
        self.definite() == Some(0)
    }

    /// Reads the length octets starting at `offset`.
    ///
    /// Returns the length and the offset of the first content octet.
    ///
    /// Whether an indefinite length is acceptable depends on the value it
    /// belongs to, so this is left to the caller.
    pub fn read(
        cursor: &ByteCursor, offset: usize, mode: Mode,
    ) -> Result<(Self, usize), DecodeError> {
        let start = cursor.abs(offset);
        let len = match cursor.read_u8(offset)? {
            // Bit 7 clear: single.
            n if (n & 0x80) == 0 => {
                return Ok((Length::Definite(usize::from(n)), offset + 1))
            }

            // 0x80: indefinite.
            0x80 => return Ok((Length::Indefinite, offset + 1)),

            // 0xFF: illegal.
            0xFF => {
                return Err(DecodeError::malformed_length(
                    "illegal length octets", start
                ))
            }

            // anything else: clear left bit, number of octets.
            n => usize::from(n & 0x7F)
        };
        if len > Self::MAX_LONG_OCTETS {
            return Err(DecodeError::unsupported(
                "length octets exceed four octets", start
            ))
        }
        let octets = cursor.bytes(offset + 1, len).map_err(|_| {
            DecodeError::malformed_length(
                "length octets run past end of data", start
            )
        })?;
        if mode.is_restricted() {
            // There is a shorter encoding if the first length octet is
            // zero or if a single octet would have done.
            let first = octets.first().copied().unwrap_or(0);
            if first == 0 || (first < 0x80 && len == 1) {
                return Err(DecodeError::malformed_length(
                    "illegal length in DER", start
                ))
            }
        }
        let res = octets.iter().fold(0u64, |res, octet| {
            (res << 8) | u64::from(*octet)
        });
        let res = usize::try_from(res).map_err(|_| {
            DecodeError::malformed_length("excessive length", start)
        })?;
        Ok((Length::Definite(res), offset + 1 + len))
    }

    /// Returns the number of octets the encoded length occupies.
    pub fn encoded_len(self) -> usize {
        match self {
            Length::Definite(len) if len > 0x7F => 1 + significant_octets(len),
            _ => 1,
        }
    }

    /// Appends the minimal encoding of the length to `target`.
    pub fn append_encoded(self, target: &mut Vec<u8>) {
        match self {
            Length::Definite(len) if len > 0x7F => {
                let count = significant_octets(len);
                // A usize has at most 16 octets, so count fits the low bits.
                target.push(0x80 | count as u8);
                let octets = len.to_be_bytes();
                target.extend_from_slice(&octets[octets.len() - count..]);
            }
            Length::Definite(len) => target.push(len as u8),
            Length::Indefinite => target.push(0x80),
        }
    }
}

/// Returns the number of octets needed for `len` without leading zeros.
fn significant_octets(len: usize) -> usize {
    let bits = usize::BITS - len.leading_zeros();
    bits.div_ceil(8).max(1) as usize
}


//------------ encode_length -------------------------------------------------

/// Returns the minimal BER encoding of a definite length.
pub fn encode_length(len: usize) -> SmallVec<[u8; 9]> {
    let mut res = Vec::with_capacity(9);
    Length::Definite(len).append_encoded(&mut res);
    SmallVec::from_vec(res)
}


//============ Tests =========================================================
