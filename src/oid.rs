//! ASN.1 Object Identifiers.
//!
//! This module contains the [`Oid`] type that implements object identifiers,
//! a construct used by ASN.1 to uniquely identify all sorts of things. In
//! dissected data, they mostly serve as the discriminator that selects the
//! decoder for an embedded value. The type is also re-exported at the
//! top-level.

use std::{fmt, str};
use bytes::Bytes;
use smallvec::SmallVec;
use crate::decode::DecodeError;


//------------ Oid -----------------------------------------------------------

/// An object identifer.
///
/// Object identifiers are globally unique, hierarchical values that are used
/// to identify objects or their type. When written, they are presented as a
/// sequence of integers separated by dots such as ‘1.3.6.1.5.5.7.1’.
///
/// Values of this type keep a single object identifer in its BER encoding.
/// The encoding is checked when the value is created, so every component
/// of an `Oid` is known to fit into a `u64`.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Oid(Bytes);

impl Oid {
    /// Creates an object identifier from the content octets of a value.
    ///
    /// The content must not be empty, the last octet must terminate a
    /// subidentifier, and no subidentifier may start with a padding octet
    /// of `0x80`.
    pub fn from_content(
        content: &[u8], pos: usize
    ) -> Result<Self, DecodeError> {
        check_content(content, pos)?;
        Ok(Oid(Bytes::copy_from_slice(content)))
    }

    /// Returns the content octets of the object identifier.
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Returns an iterator over the components of the identifier.
    ///
    /// The first subidentifier of the encoding produces two components.
    pub fn iter(&self) -> Iter {
        Iter::new(self.0.as_ref())
    }

    /// Returns all components in a vector.
    pub fn components(&self) -> SmallVec<[u64; 12]> {
        self.iter().collect()
    }

    /// Returns whether `self` starts with all components of `prefix`.
    pub fn starts_with(&self, prefix: &Oid) -> bool {
        let mut own = self.iter();
        prefix.iter().all(|item| own.next() == Some(item))
    }
}

impl AsRef<[u8]> for Oid {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}


//--- FromStr

impl str::FromStr for Oid {
    type Err = OidParseError;

    /// Parses an identifier in ‘dot integer’ notation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut components = s.split('.');
        let (first, second) = match (components.next(), components.next()) {
            (Some(first), Some(second)) => (first, second),
            _ => return Err(OidParseError("at least two components required"))
        };
        let first = parse_component(first)?;
        if first > 2 {
            return Err(OidParseError(
                "first component can only be 0, 1, or 2"
            ))
        }
        let second = parse_component(second)?;
        if first < 2 && second >= 40 {
            return Err(OidParseError(
                "second component for 0. and 1. must be less than 40"
            ))
        }
        let combined = second.checked_add(40 * first).ok_or(
            OidParseError("component too large")
        )?;
        let mut res = Vec::new();
        append_subidentifier(combined, &mut res);
        for item in components {
            append_subidentifier(parse_component(item)?, &mut res);
        }
        Ok(Oid(res.into()))
    }
}

fn parse_component(s: &str) -> Result<u64, OidParseError> {
    if s.is_empty() || !s.bytes().all(|ch| ch.is_ascii_digit()) {
        return Err(OidParseError("only integer components allowed"))
    }
    s.parse().map_err(|_| OidParseError("component too large"))
}

fn append_subidentifier(value: u64, target: &mut Vec<u8>) {
    let mut shift = (63 - value.max(1).leading_zeros()) / 7 * 7;
    while shift > 0 {
        target.push(((value >> shift) & 0x7F) as u8 | 0x80);
        shift -= 7;
    }
    target.push((value & 0x7F) as u8);
}


//--- Display and Debug

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut components = self.iter();
        if let Some(first) = components.next() {
            write!(f, "{first}")?;
        }
        for component in components {
            write!(f, ".{component}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Oid({self})")
    }
}


//------------ Helper Functions ----------------------------------------------

/// Checks the content octets of an object identifier.
///
/// This is also used for RELATIVE-OID values which share the encoding of
/// their subidentifiers.
pub fn check_content(content: &[u8], pos: usize) -> Result<(), DecodeError> {
    let last = match content.last() {
        Some(last) => *last,
        None => {
            return Err(DecodeError::malformed("empty object identifier", pos))
        }
    };
    if last & 0x80 != 0 {
        return Err(DecodeError::malformed(
            "last octet of object identifier has bit 8 set", pos
        ))
    }
    let mut start = true;
    let mut octets = 0;
    for (idx, &octet) in content.iter().enumerate() {
        if start && octet == 0x80 {
            return Err(DecodeError::malformed(
                "padded subidentifier in object identifier", pos + idx
            ))
        }
        octets += 1;
        // 64 bits need ten octets with a single bit in the first one.
        if octets > 10 || (octets == 10 && content[idx + 1 - 10] > 0x81) {
            return Err(DecodeError::malformed(
                "object identifier component too large", pos + idx
            ))
        }
        start = octet & 0x80 == 0;
        if start {
            octets = 0;
        }
    }
    Ok(())
}


//------------ Iter ----------------------------------------------------------

/// An iterator over the components of an object identifier.
pub struct Iter<'a> {
    /// The remainder of the object identifier’s encoded octets.
    slice: &'a [u8],

    /// Whether the next subidentifier is the first one.
    first: bool,

    /// The second component if it has been split off the first.
    pending: Option<u64>,
}

impl<'a> Iter<'a> {
    fn new(slice: &'a [u8]) -> Self {
        Iter { slice, first: true, pending: None }
    }

    fn next_subidentifier(&mut self) -> Option<u64> {
        let end = self.slice.iter().position(|ch| ch & 0x80 == 0)?;
        let (head, tail) = self.slice.split_at(end + 1);
        self.slice = tail;
        Some(head.iter().fold(0u64, |res, ch| {
            res.wrapping_shl(7) | u64::from(ch & 0x7F)
        }))
    }
}

impl Iterator for Iter<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(second) = self.pending.take() {
            return Some(second)
        }
        let value = self.next_subidentifier()?;
        if !self.first {
            return Some(value)
        }
        self.first = false;
        let (first, second) = match value {
            0..=39 => (0, value),
            40..=79 => (1, value - 40),
            _ => (2, value - 80),
        };
        self.pending = Some(second);
        Some(first)
    }
}


//------------ OidParseError -------------------------------------------------

/// A string did not contain an object identifier in dotted notation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct OidParseError(&'static str);


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        let oid = Oid::from_content(
            b"\x2A\x86\x48\x86\xF7\x0D\x01\x01\x0B", 0
        ).unwrap();
        assert_eq!(oid.to_string(), "1.2.840.113549.1.1.11");
        let oid = Oid::from_content(b"\x88\x37\x03", 0).unwrap();
        assert_eq!(oid.to_string(), "2.999.3");
        let oid = Oid::from_content(b"\x00", 0).unwrap();
        assert_eq!(oid.to_string(), "0.0");
    }

    #[test]
    fn malformed_content() {
        assert!(Oid::from_content(b"", 3).is_err());
        assert!(Oid::from_content(b"\x2A\x86", 3).is_err());
        assert!(Oid::from_content(b"\x2A\x80\x01", 3).is_err());
        assert_eq!(
            Oid::from_content(b"\x2A\x80\x01", 3).unwrap_err().pos(), 4
        );
        assert!(Oid::from_content(
            b"\x2A\x81\xFF\xFF\xFF\xFF\xFF\xFF\xFF\xFF\x7F", 0
        ).is_ok());
        assert!(Oid::from_content(
            b"\x2A\x82\x80\x80\x80\x80\x80\x80\x80\x80\x00", 0
        ).is_err());
    }

    #[test]
    fn from_str() {
        let oid: Oid = "1.2.840.10003.5.10".parse().unwrap();
        assert_eq!(oid.as_slice(), b"\x2A\x86\x48\xCE\x13\x05\x0A");
        assert_eq!(oid.to_string(), "1.2.840.10003.5.10");
        let oid: Oid = "2.999.3".parse().unwrap();
        assert_eq!(oid.as_slice(), b"\x88\x37\x03");
        assert!("1".parse::<Oid>().is_err());
        assert!("3.1".parse::<Oid>().is_err());
        assert!("1.40".parse::<Oid>().is_err());
        assert!("1.2.x".parse::<Oid>().is_err());
        assert!("1.2.".parse::<Oid>().is_err());
    }

    #[test]
    fn prefix() {
        let base: Oid = "1.2.840.10003.5".parse().unwrap();
        let marc: Oid = "1.2.840.10003.5.10".parse().unwrap();
        assert!(marc.starts_with(&base));
        assert!(!base.starts_with(&marc));
        assert_eq!(
            marc.components().as_slice(), &[1, 2, 840, 10003, 5, 10]
        );
    }
}
