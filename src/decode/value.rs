//! Decoding values without a type description.
//!
//! This is a private module. The relevant items are re-exported by the
//! parent.
//!
//! The walker in this module decodes any BER data into a tree, naming each
//! node after its tag. Universal primitive values are converted into their
//! natural representation, everything else primitive is kept as octets.

use bytes::Bytes;
use crate::cursor::ByteCursor;
use crate::ident::Class;
use super::context::DecodeContext;
use super::error::{DecodeError, ErrorKind, Severity};
use super::node::{DecodedNode, NodeValue};
use super::primitive::{read_primitive, PrimitiveKind};
use super::tlv::Tlv;


//------------ decode_ber ----------------------------------------------------

/// Decodes the single value contained in `cursor`.
///
/// If the value doesn’t cover all of the data, a trailing data warning is
/// attached. If not even the header of the value can be read, the whole
/// data is returned as an opaque node with the error attached.
pub fn decode_ber(cursor: ByteCursor, ctx: &mut DecodeContext) -> DecodedNode {
    match Tlv::read(&cursor, 0, ctx.mode()) {
        Ok(tlv) => {
            let mut node = decode_generic(&tlv, ctx);
            check_trailing(&cursor, tlv.end(), &mut node);
            node
        }
        Err(err) => invalid_node(&cursor, err),
    }
}

/// Decodes a value without knowing its type.
pub fn decode_generic(tlv: &Tlv, ctx: &mut DecodeContext) -> DecodedNode {
    let tag = tlv.ident().tag();
    let mut node = DecodedNode::new(tag.to_string(), tlv.range()).with_tag(tag);
    let kind = match tag.class() {
        Class::Universal => PrimitiveKind::for_tag(tag),
        _ => None
    };
    match kind {
        Some(kind) => {
            match read_primitive(kind, tlv, ctx) {
                Ok(value) => node.set_value(value),
                Err(err) => {
                    if !tlv.ident().is_constructed() {
                        node.set_value(raw_value(tlv))
                    }
                    node.annotate(err)
                }
            }
        }
        None if tlv.ident().is_constructed() => {
            let res = ctx.enter(tlv.pos(), |ctx| {
                decode_elements(tlv.content(), ctx, &mut node)
            });
            if let Err(err) = res {
                node.annotate(err)
            }
        }
        None => node.set_value(raw_value(tlv))
    }
    node
}

/// Decodes all values in `cursor` and attaches them to `parent`.
///
/// Decoding stops at the first value whose header can’t be read. The
/// error is then attached to the parent and whatever has been decoded so
/// far is kept.
pub fn decode_elements(
    cursor: ByteCursor, ctx: &mut DecodeContext, parent: &mut DecodedNode
) {
    let mut offset = 0;
    while offset < cursor.len() {
        match Tlv::read(&cursor, offset, ctx.mode()) {
            Ok(tlv) => {
                parent.push_child(decode_generic(&tlv, ctx));
                offset = tlv.end();
            }
            Err(err) => {
                parent.annotate(err);
                return
            }
        }
    }
}


//------------ Helpers -------------------------------------------------------

/// Returns the content octets of a value as a node value.
pub(super) fn raw_value(tlv: &Tlv) -> NodeValue {
    NodeValue::Bytes(Bytes::copy_from_slice(tlv.content().as_slice()))
}

/// Creates a node for data that couldn’t be decoded at all.
pub(super) fn invalid_node(cursor: &ByteCursor, err: DecodeError) -> DecodedNode {
    let mut node = DecodedNode::new(
        "invalid", cursor.base()..cursor.end()
    ).with_value(NodeValue::Bytes(Bytes::copy_from_slice(cursor.as_slice())));
    node.annotate(err);
    node
}

/// Attaches a trailing data warning if `end` isn’t the end of the data.
pub(super) fn check_trailing(
    cursor: &ByteCursor, end: usize, node: &mut DecodedNode
) {
    if end < cursor.len() {
        node.annotate_with(
            Severity::Warning,
            DecodeError::new(
                ErrorKind::TrailingData,
                format!("{} octets of trailing data", cursor.len() - end),
                cursor.abs(end)
            )
        )
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use crate::decode::FatalError;
    use crate::encode;
    use crate::ident::{Ident, Tag};
    use crate::mode::Mode;
    use crate::registry::Registry;
    use super::*;

    fn decode(data: &[u8], mode: Mode) -> DecodedNode {
        let registry = Registry::new();
        let mut ctx = DecodeContext::new(&registry, mode);
        decode_ber(ByteCursor::new(data), &mut ctx)
    }

    #[test]
    fn octet_string() {
        let node = decode(b"\x04\x03\x01\x02\x03", Mode::Ber);
        assert_eq!(node.tag(), Some(Tag::OCTET_STRING));
        assert_eq!(node.name(), "OCTET STRING");
        assert_eq!(node.value().as_bytes(), Some(b"\x01\x02\x03".as_ref()));
        assert_eq!(node.range(), 0..5);
        assert!(node.all_annotations().next().is_none());
    }

    #[test]
    fn nested_values() {
        let data = b"\x30\x0D\x02\x01\x05\xA0\x03\x01\x01\xFF\x13\x03abc";
        let node = decode(data, Mode::Der);
        assert_eq!(node.children().len(), 3);
        assert_eq!(node.children()[0].value().as_i64(), Some(5));
        assert_eq!(node.children()[1].name(), "[0]");
        assert_eq!(
            node.children()[1].children()[0].value(),
            &NodeValue::Boolean(true)
        );
        assert_eq!(node.children()[2].value().as_text(), Some("abc"));
        assert!(node.ranges_nest());
        assert_eq!(node.error_count(), 0);
    }

    #[test]
    fn partial_results() {
        // The second element claims more octets than there are.
        let data = b"\x30\x06\x02\x01\x05\x04\x05\x00";
        let node = decode(data, Mode::Ber);
        assert_eq!(node.children().len(), 1);
        assert!(node.has_annotation(ErrorKind::MalformedLength));

        // A bad primitive doesn’t stop its siblings.
        let data = b"\x30\x06\x05\x01\x00\x02\x01\x07";
        let node = decode(data, Mode::Ber);
        assert_eq!(node.children().len(), 2);
        assert!(node.children()[0].has_annotation(ErrorKind::MalformedValue));
        assert_eq!(node.children()[1].value().as_i64(), Some(7));
    }

    #[test]
    fn trailing_and_invalid() {
        let node = decode(b"\x05\x00\x05\x00", Mode::Ber);
        assert!(node.has_annotation(ErrorKind::TrailingData));
        assert_eq!(node.error_count(), 0);

        let node = decode(b"\x1F\x81", Mode::Ber);
        assert_eq!(node.name(), "invalid");
        assert!(node.has_annotation(ErrorKind::MalformedTag));
    }

    #[test]
    fn indefinite_length() {
        let data = b"\x30\x80\x02\x01\x01\x30\x80\x05\x00\x00\x00\x00\x00";
        let node = decode(data, Mode::Ber);
        assert_eq!(node.range(), 0..13);
        assert_eq!(node.children().len(), 2);
        assert_eq!(node.children()[1].range(), 5..11);
        assert!(node.ranges_nest());
        assert_eq!(node.error_count(), 0);

        let node = decode(data, Mode::Der);
        assert_eq!(node.name(), "invalid");
        assert!(node.has_annotation(ErrorKind::MalformedLength));
    }

    #[test]
    fn recursion_limit() {
        const LEVELS: usize = 10_000;
        let data = encode::nested(
            Ident::constructed(Tag::SEQUENCE),
            encode::tlv(Ident::primitive(Tag::NULL), b""),
            LEVELS
        );
        let registry = Registry::new();
        let mut ctx = DecodeContext::new(&registry, Mode::Ber)
            .with_max_depth(100);
        let node = decode_ber(ByteCursor::new(&data), &mut ctx);
        assert!(node.has_annotation(ErrorKind::RecursionLimitExceeded));
        assert!(matches!(
            ctx.fatal(),
            Some(FatalError::RecursionLimitExceeded { limit: 100, .. })
        ));
        assert_eq!(node.iter().count(), 101);
    }
}
