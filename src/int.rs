//! BER encoded integers.
//!
//! In BER, an INTEGER is encoded as a primitive value with the content
//! octets providing a variable-length, big-endian, two’s complement byte
//! sequence of that integer. Thus, the most-significant bit of the first
//! octet serves as the sign bit.

use bytes::Bytes;
use crate::decode::DecodeError;
use crate::mode::Mode;


//------------ Integer -------------------------------------------------------

/// A decoded INTEGER or ENUMERATED value.
///
/// Values that fit into an `i64` are converted. Anything longer, such as
/// certificate serial numbers, is kept as its content octets.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Integer {
    Small(i64),
    Big(Bytes),
}

impl Integer {
    /// Decodes the content octets of an integer.
    ///
    /// The content must not be empty. In restricted mode, it must also be
    /// encoded in the smallest possible number of octets.
    pub fn from_content(
        content: &[u8], mode: Mode, pos: usize
    ) -> Result<Self, DecodeError> {
        check_head(content, mode, pos)?;
        if content.len() <= 8 {
            Ok(Integer::Small(i64_from_octets(content)))
        }
        else if minimal_len(content) <= 8 {
            // Redundant leading octets in BER: strip them off.
            let start = content.len() - minimal_len(content);
            Ok(Integer::Small(i64_from_octets(&content[start..])))
        }
        else {
            Ok(Integer::Big(Bytes::copy_from_slice(content)))
        }
    }

    /// Returns the value if it fits into an `i64`.
    pub fn to_i64(&self) -> Option<i64> {
        match *self {
            Integer::Small(value) => Some(value),
            Integer::Big(_) => None,
        }
    }

    /// Returns whether the value is negative.
    pub fn is_negative(&self) -> bool {
        match *self {
            Integer::Small(value) => value < 0,
            Integer::Big(ref octets) => {
                octets.first().map(|x| x & 0x80 != 0).unwrap_or(false)
            }
        }
    }
}


//------------ Helper Functions ----------------------------------------------

/// Checks that an integer is started correctly.
///
/// Specifically, checks that there is at least one octet and, in restricted
/// mode, that the first nine bits of a multi-octet integer are not all the
/// same.
fn check_head(
    content: &[u8], mode: Mode, pos: usize
) -> Result<(), DecodeError> {
    match (content.first(), content.get(1).map(|x| x & 0x80 != 0)) {
        (None, _) => {
            Err(DecodeError::malformed("empty integer", pos))
        }
        (Some(0), Some(false)) | (Some(0xFF), Some(true))
            if mode.is_restricted() =>
        {
            Err(DecodeError::malformed("non-minimal integer in DER", pos))
        }
        _ => Ok(())
    }
}

/// Returns the number of octets in the shortest encoding of the value.
fn minimal_len(content: &[u8]) -> usize {
    let mut len = content.len();
    let mut idx = 0;
    while len > 1 {
        let (Some(&first), Some(&second)) = (
            content.get(idx), content.get(idx + 1)
        ) else {
            break
        };
        let redundant = (first == 0 && second & 0x80 == 0)
            || (first == 0xFF && second & 0x80 != 0);
        if !redundant {
            break
        }
        idx += 1;
        len -= 1;
    }
    len
}

/// Converts at most eight octets of two’s complement into an `i64`.
fn i64_from_octets(content: &[u8]) -> i64 {
    debug_assert!(content.len() <= 8);
    let init: i64 = match content.first() {
        Some(first) if first & 0x80 != 0 => -1,
        _ => 0,
    };
    content.iter().fold(init, |res, octet| (res << 8) | i64::from(*octet))
}

/// Decodes an integer that must be non-negative and fit into a `u32`.
pub fn u32_from_content(
    content: &[u8], mode: Mode, pos: usize
) -> Result<u32, DecodeError> {
    match Integer::from_content(content, mode, pos)? {
        Integer::Small(value) => {
            u32::try_from(value).map_err(|_| {
                DecodeError::malformed("integer out of range", pos)
            })
        }
        Integer::Big(_) => {
            Err(DecodeError::malformed("integer out of range", pos))
        }
    }
}


//============ Tests =========================================================
