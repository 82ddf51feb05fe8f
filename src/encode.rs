//! Encoding data in BER.
//!
//! The dissector mostly reads data. Encoding is needed to canonicalize
//! header fields that take part in message authentication and to build
//! test and fuzzing input. All functions here produce definite-length
//! values with minimal length octets, i.e., their output is valid DER if
//! the content is.

use crate::ident::{Ident, Tag};
use crate::length::Length;
use crate::oid::Oid;

pub use crate::length::encode_length;


//------------ Values --------------------------------------------------------

/// Encodes a complete value from its identifier and content octets.
pub fn tlv(ident: Ident, content: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(
        ident.encoded_len() + Length::Definite(content.len()).encoded_len()
            + content.len()
    );
    append_tlv(ident, content, &mut res);
    res
}

/// Appends a complete value to `target`.
pub fn append_tlv(ident: Ident, content: &[u8], target: &mut Vec<u8>) {
    ident.append_encoded(target);
    Length::Definite(content.len()).append_encoded(target);
    target.extend_from_slice(content);
}

/// Encodes a primitive value.
pub fn primitive(tag: Tag, content: &[u8]) -> Vec<u8> {
    tlv(Ident::primitive(tag), content)
}

/// Encodes a constructed value from already encoded values.
pub fn constructed(tag: Tag, values: &[&[u8]]) -> Vec<u8> {
    tlv(Ident::constructed(tag), &values.concat())
}

/// Encodes a SEQUENCE.
pub fn sequence(values: &[&[u8]]) -> Vec<u8> {
    constructed(Tag::SEQUENCE, values)
}

/// Encodes an explicitly tagged value with a context specific tag.
pub fn explicit(number: u32, value: &[u8]) -> Vec<u8> {
    tlv(Ident::constructed(Tag::ctx(number)), value)
}

pub fn boolean(value: bool) -> Vec<u8> {
    primitive(Tag::BOOLEAN, if value { b"\xFF" } else { b"\x00" })
}

pub fn null() -> Vec<u8> {
    primitive(Tag::NULL, b"")
}

pub fn integer(value: i64) -> Vec<u8> {
    primitive(Tag::INTEGER, &integer_content(value))
}

pub fn octet_string(content: &[u8]) -> Vec<u8> {
    primitive(Tag::OCTET_STRING, content)
}

pub fn oid(oid: &Oid) -> Vec<u8> {
    primitive(Tag::OID, oid.as_slice())
}

/// Returns the minimal two’s complement content octets for an integer.
pub fn integer_content(value: i64) -> Vec<u8> {
    let octets = value.to_be_bytes();
    let mut start = 0;
    while start < octets.len() - 1 {
        let (first, second) = (octets[start], octets[start + 1]);
        if (first == 0 && second & 0x80 == 0)
            || (first == 0xFF && second & 0x80 != 0)
        {
            start += 1;
        }
        else {
            break
        }
    }
    octets[start..].to_vec()
}


//------------ nested --------------------------------------------------------

/// Wraps `inner` into `levels` constructed values of identifier `ident`.
///
/// The headers are computed from the inside out and the result assembled
/// in a single pass, so even very deep nesting is cheap to produce.
pub fn nested(ident: Ident, inner: Vec<u8>, levels: usize) -> Vec<u8> {
    let mut headers = Vec::with_capacity(levels);
    let mut len = inner.len();
    for _ in 0..levels {
        let mut header = Vec::new();
        ident.append_encoded(&mut header);
        Length::Definite(len).append_encoded(&mut header);
        len += header.len();
        headers.push(header);
    }
    let mut res = Vec::with_capacity(len);
    for header in headers.iter().rev() {
        res.extend_from_slice(header);
    }
    res.extend_from_slice(&inner);
    res
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn simple_values() {
        assert_eq!(integer(0), b"\x02\x01\x00");
        assert_eq!(integer(127), b"\x02\x01\x7F");
        assert_eq!(integer(128), b"\x02\x02\x00\x80");
        assert_eq!(integer(-128), b"\x02\x01\x80");
        assert_eq!(integer(-129), b"\x02\x02\xFF\x7F");
        assert_eq!(boolean(true), b"\x01\x01\xFF");
        assert_eq!(null(), b"\x05\x00");
        assert_eq!(
            sequence(&[&integer(1), &null()]),
            b"\x30\x05\x02\x01\x01\x05\x00"
        );
        assert_eq!(explicit(3, &null()), b"\xA3\x02\x05\x00");
        let oid_value: Oid = "1.2.840".parse().unwrap();
        assert_eq!(oid(&oid_value), b"\x06\x03\x2A\x86\x48");
    }

    #[test]
    fn long_content() {
        let res = octet_string(&[0u8; 300]);
        assert_eq!(&res[..4], b"\x04\x82\x01\x2C");
        assert_eq!(res.len(), 304);
    }

    #[test]
    fn nesting() {
        let res = nested(Ident::constructed(Tag::SEQUENCE), null(), 2);
        assert_eq!(res, b"\x30\x04\x30\x02\x05\x00");
        let deep = nested(Ident::constructed(Tag::SEQUENCE), null(), 200);
        assert_eq!(&deep[..2], b"\x30\x82");
        assert_eq!(&deep[deep.len() - 2..], b"\x05\x00");
    }
}
