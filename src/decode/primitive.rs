//! Decoding primitive values.
//!
//! This is a private module. The relevant items are re-exported by the
//! parent.

use bytes::Bytes;
use crate::cursor::ByteCursor;
use crate::ident::Tag;
use crate::int::Integer;
use crate::oid::{self, Oid};
use crate::string::CharSet;
use crate::time::Time;
use super::context::DecodeContext;
use super::error::DecodeError;
use super::node::NodeValue;
use super::tlv::Tlv;


//------------ PrimitiveKind -------------------------------------------------

/// The kinds of primitive values we know how to decode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PrimitiveKind {
    Boolean,
    Integer,
    Enumerated,
    BitString,
    OctetString,
    Null,
    Oid,
    RelativeOid,
    Real,
    Text(CharSet),
    UtcTime,
    GeneralizedTime,
}

impl PrimitiveKind {
    /// Returns the kind for a universal tag.
    pub fn for_tag(tag: Tag) -> Option<Self> {
        match tag {
            Tag::BOOLEAN => Some(PrimitiveKind::Boolean),
            Tag::INTEGER => Some(PrimitiveKind::Integer),
            Tag::ENUMERATED => Some(PrimitiveKind::Enumerated),
            Tag::BIT_STRING => Some(PrimitiveKind::BitString),
            Tag::OCTET_STRING => Some(PrimitiveKind::OctetString),
            Tag::NULL => Some(PrimitiveKind::Null),
            Tag::OID => Some(PrimitiveKind::Oid),
            Tag::RELATIVE_OID => Some(PrimitiveKind::RelativeOid),
            Tag::REAL => Some(PrimitiveKind::Real),
            Tag::UTC_TIME => Some(PrimitiveKind::UtcTime),
            Tag::GENERALIZED_TIME => Some(PrimitiveKind::GeneralizedTime),
            tag => CharSet::for_tag(tag).map(PrimitiveKind::Text)
        }
    }

    /// Returns the universal tag of values of this kind.
    pub const fn natural_tag(self) -> Tag {
        match self {
            PrimitiveKind::Boolean => Tag::BOOLEAN,
            PrimitiveKind::Integer => Tag::INTEGER,
            PrimitiveKind::Enumerated => Tag::ENUMERATED,
            PrimitiveKind::BitString => Tag::BIT_STRING,
            PrimitiveKind::OctetString => Tag::OCTET_STRING,
            PrimitiveKind::Null => Tag::NULL,
            PrimitiveKind::Oid => Tag::OID,
            PrimitiveKind::RelativeOid => Tag::RELATIVE_OID,
            PrimitiveKind::Real => Tag::REAL,
            PrimitiveKind::Text(CharSet::Utf8) => Tag::UTF8_STRING,
            PrimitiveKind::Text(CharSet::Numeric) => Tag::NUMERIC_STRING,
            PrimitiveKind::Text(CharSet::Printable) => Tag::PRINTABLE_STRING,
            PrimitiveKind::Text(CharSet::Ia5) => Tag::IA5_STRING,
            PrimitiveKind::Text(CharSet::Visible) => Tag::VISIBLE_STRING,
            PrimitiveKind::Text(CharSet::General) => Tag::GENERAL_STRING,
            PrimitiveKind::Text(CharSet::Bmp) => Tag::BMP_STRING,
            PrimitiveKind::UtcTime => Tag::UTC_TIME,
            PrimitiveKind::GeneralizedTime => Tag::GENERALIZED_TIME,
        }
    }

    /// Returns whether BER allows the constructed form for this kind.
    fn is_string(self) -> bool {
        matches!(
            self,
            PrimitiveKind::BitString | PrimitiveKind::OctetString
                | PrimitiveKind::Text(_)
        )
    }
}


//------------ read_primitive ------------------------------------------------

/// Decodes the value of `tlv` as a primitive of the given kind.
///
/// In BER, string kinds may also be encoded in constructed form. Their
/// segments are then collected into a single value.
pub fn read_primitive(
    kind: PrimitiveKind, tlv: &Tlv, ctx: &mut DecodeContext
) -> Result<NodeValue, DecodeError> {
    let pos = tlv.pos();
    if !tlv.ident().is_constructed() {
        return decode_content(kind, tlv.content().as_slice(), ctx, pos)
    }
    if !kind.is_string() {
        return Err(DecodeError::malformed("expected primitive value", pos))
    }
    if ctx.mode().is_restricted() {
        return Err(DecodeError::malformed(
            "constructed string in DER", pos
        ))
    }
    let segment_tag = kind.natural_tag();
    let mut content = Vec::new();
    let mut unused = 0;
    collect_segments(
        tlv.content(), segment_tag, kind, &mut content, &mut unused, ctx
    )?;
    if kind == PrimitiveKind::BitString {
        return Ok(NodeValue::BitString { unused, bits: content.into() })
    }
    decode_content(kind, &content, ctx, pos)
}

/// Appends the content of all segments of a constructed string.
fn collect_segments(
    cursor: ByteCursor,
    segment_tag: Tag,
    kind: PrimitiveKind,
    target: &mut Vec<u8>,
    unused: &mut u8,
    ctx: &mut DecodeContext,
) -> Result<(), DecodeError> {
    let mut offset = 0;
    while offset < cursor.len() {
        let segment = Tlv::read(&cursor, offset, ctx.mode())?;
        if segment.ident().tag() != segment_tag {
            return Err(DecodeError::malformed(
                "unexpected segment in constructed string", segment.pos()
            ))
        }
        if *unused != 0 {
            return Err(DecodeError::malformed(
                "unused bits in inner bit string segment", segment.pos()
            ))
        }
        if segment.ident().is_constructed() {
            ctx.enter(segment.pos(), |ctx| {
                collect_segments(
                    segment.content(), segment_tag, kind, target, unused, ctx
                )
            })??;
        }
        else if kind == PrimitiveKind::BitString {
            if let NodeValue::BitString { unused: seg_unused, bits } =
                bit_string(segment.content().as_slice(), ctx, segment.pos())?
            {
                *unused = seg_unused;
                target.extend_from_slice(&bits);
            }
        }
        else {
            target.extend_from_slice(segment.content().as_slice());
        }
        offset = segment.end();
    }
    Ok(())
}

/// Decodes primitive content octets.
fn decode_content(
    kind: PrimitiveKind, content: &[u8], ctx: &DecodeContext, pos: usize
) -> Result<NodeValue, DecodeError> {
    let mode = ctx.mode();
    match kind {
        PrimitiveKind::Boolean => {
            match *content {
                [0] => Ok(NodeValue::Boolean(false)),
                [0xFF] => Ok(NodeValue::Boolean(true)),
                [_] if mode.is_restricted() => {
                    Err(DecodeError::malformed("invalid boolean in DER", pos))
                }
                [_] => Ok(NodeValue::Boolean(true)),
                _ => Err(DecodeError::malformed("invalid boolean", pos))
            }
        }
        PrimitiveKind::Integer | PrimitiveKind::Enumerated => {
            Integer::from_content(content, mode, pos).map(NodeValue::Integer)
        }
        PrimitiveKind::BitString => bit_string(content, ctx, pos),
        PrimitiveKind::OctetString | PrimitiveKind::Real => {
            Ok(NodeValue::Bytes(Bytes::copy_from_slice(content)))
        }
        PrimitiveKind::Null => {
            if content.is_empty() {
                Ok(NodeValue::Null)
            }
            else {
                Err(DecodeError::malformed("invalid NULL value", pos))
            }
        }
        PrimitiveKind::Oid => {
            Oid::from_content(content, pos).map(NodeValue::Oid)
        }
        PrimitiveKind::RelativeOid => {
            oid::check_content(content, pos)?;
            Ok(NodeValue::Bytes(Bytes::copy_from_slice(content)))
        }
        PrimitiveKind::Text(charset) => {
            charset.check(content).map_err(|err| {
                DecodeError::malformed(
                    format!("invalid character in string: {err}"),
                    pos
                )
            })?;
            Ok(NodeValue::Text(charset.decode_lossy(content).into_owned()))
        }
        PrimitiveKind::UtcTime => {
            Time::parse_utc(content, mode, pos).map(NodeValue::Time)
        }
        PrimitiveKind::GeneralizedTime => {
            Time::parse_generalized(content, mode, pos).map(NodeValue::Time)
        }
    }
}

fn bit_string(
    content: &[u8], ctx: &DecodeContext, pos: usize
) -> Result<NodeValue, DecodeError> {
    let (unused, bits) = match content.split_first() {
        Some((&unused, bits)) => (unused, bits),
        None => {
            return Err(DecodeError::malformed("empty bit string", pos))
        }
    };
    if unused > 7 || (bits.is_empty() && unused != 0) {
        return Err(DecodeError::malformed("invalid bit string", pos))
    }
    if ctx.mode().is_restricted() && unused > 0 {
        let mask = (1u8 << unused) - 1;
        if bits.last().map(|x| x & mask != 0).unwrap_or(false) {
            return Err(DecodeError::malformed(
                "non-zero unused bits in DER", pos
            ))
        }
    }
    Ok(NodeValue::BitString { unused, bits: Bytes::copy_from_slice(bits) })
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use crate::decode::ErrorKind;
    use crate::mode::Mode;
    use crate::registry::Registry;
    use super::*;

    fn decode(
        kind: PrimitiveKind, data: &[u8], mode: Mode
    ) -> Result<NodeValue, DecodeError> {
        let registry = Registry::new();
        let mut ctx = DecodeContext::new(&registry, mode);
        let cursor = ByteCursor::new(data);
        let tlv = Tlv::read(&cursor, 0, mode)?;
        read_primitive(kind, &tlv, &mut ctx)
    }

    #[test]
    fn booleans() {
        let kind = PrimitiveKind::Boolean;
        assert_eq!(
            decode(kind, b"\x01\x01\xFF", Mode::Der).unwrap(),
            NodeValue::Boolean(true)
        );
        assert_eq!(
            decode(kind, b"\x01\x01\x01", Mode::Ber).unwrap(),
            NodeValue::Boolean(true)
        );
        assert!(decode(kind, b"\x01\x01\x01", Mode::Der).is_err());
        assert!(decode(kind, b"\x01\x02\x00\x00", Mode::Ber).is_err());
    }

    #[test]
    fn octet_strings() {
        assert_eq!(
            decode(PrimitiveKind::OctetString, b"\x04\x03\x01\x02\x03", Mode::Der)
                .unwrap(),
            NodeValue::Bytes(Bytes::from_static(b"\x01\x02\x03"))
        );
        let cons = b"\x24\x80\x04\x01\x01\x24\x04\x04\x02\x02\x03\x00\x00";
        assert_eq!(
            decode(PrimitiveKind::OctetString, cons, Mode::Ber).unwrap(),
            NodeValue::Bytes(Bytes::from_static(b"\x01\x02\x03"))
        );
        let definite = b"\x24\x07\x04\x01\x01\x04\x02\x02\x03";
        assert_eq!(
            decode(PrimitiveKind::OctetString, definite, Mode::Der)
                .unwrap_err().kind(),
            ErrorKind::MalformedValue
        );
        assert!(
            decode(PrimitiveKind::OctetString, b"\x24\x03\x02\x01\x01", Mode::Ber)
                .is_err()
        );
    }

    #[test]
    fn bit_strings() {
        let kind = PrimitiveKind::BitString;
        assert_eq!(
            decode(kind, b"\x03\x02\x04\xF0", Mode::Der).unwrap(),
            NodeValue::BitString { unused: 4, bits: Bytes::from_static(b"\xF0") }
        );
        assert!(decode(kind, b"\x03\x02\x04\xF8", Mode::Der).is_err());
        assert!(decode(kind, b"\x03\x02\x04\xF8", Mode::Ber).is_ok());
        assert!(decode(kind, b"\x03\x00", Mode::Ber).is_err());
        assert!(decode(kind, b"\x03\x01\x01", Mode::Ber).is_err());
        assert!(decode(kind, b"\x03\x02\x08\x00", Mode::Ber).is_err());
        let cons = b"\x23\x08\x03\x02\x00\xAA\x03\x02\x01\xFE";
        assert_eq!(
            decode(kind, cons, Mode::Ber).unwrap(),
            NodeValue::BitString {
                unused: 1, bits: Bytes::from_static(b"\xAA\xFE")
            }
        );
    }

    #[test]
    fn misc() {
        assert_eq!(
            decode(PrimitiveKind::Null, b"\x05\x00", Mode::Der).unwrap(),
            NodeValue::Null
        );
        assert!(decode(PrimitiveKind::Null, b"\x05\x01\x00", Mode::Der).is_err());
        assert_eq!(
            decode(
                PrimitiveKind::Text(CharSet::Printable), b"\x13\x02hi",
                Mode::Der
            ).unwrap(),
            NodeValue::Text("hi".into())
        );
        assert!(
            decode(
                PrimitiveKind::Text(CharSet::Printable), b"\x13\x02h@",
                Mode::Der
            ).is_err()
        );
        assert!(matches!(
            decode(
                PrimitiveKind::GeneralizedTime, b"\x18\x0F20240101000000Z",
                Mode::Der
            ).unwrap(),
            NodeValue::Time(_)
        ));
        assert!(
            decode(PrimitiveKind::Integer, b"\x22\x01\x00", Mode::Ber).is_err()
        );
    }

    #[test]
    fn kinds_and_tags() {
        for tag in [
            Tag::BOOLEAN, Tag::INTEGER, Tag::OCTET_STRING, Tag::OID,
            Tag::IA5_STRING, Tag::UTC_TIME,
        ] {
            assert_eq!(PrimitiveKind::for_tag(tag).unwrap().natural_tag(), tag);
        }
        assert_eq!(PrimitiveKind::for_tag(Tag::SEQUENCE), None);
    }
}
