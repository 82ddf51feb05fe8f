//! Decoding values according to a type description.
//!
//! This is a private module. The relevant items are re-exported by the
//! parent.
//!
//! Types are described by tables of [`Field`]s. A field names a value,
//! optionally gives the tag it is expected with, says whether it has to be
//! present, and how its content is to be decoded. Since all of this is
//! plain data, protocol modules describe their messages as constants which
//! are then interpreted by [`decode_structure`].
//!
//! Tags given for a field replace the natural tag of its decoder, i.e.,
//! they are implicit. Explicit tagging is expressed through
//! [`FieldDecoder::Explicit`] wrapping the inner field. A tagged
//! [`FieldDecoder::Choice`] is always treated as explicitly tagged.

use std::fmt;
use bytes::Bytes;
use crate::cursor::ByteCursor;
use crate::ident::{Ident, Tag};
use crate::oid::Oid;
use crate::registry::Discriminator;
use super::context::DecodeContext;
use super::error::{DecodeError, ErrorKind, Severity};
use super::node::{DecodedNode, NodeValue, SummaryValue};
use super::primitive::{read_primitive, PrimitiveKind};
use super::tlv::Tlv;
use super::value::{check_trailing, decode_generic, invalid_node, raw_value};


//------------ Field ---------------------------------------------------------

/// The description of one value within a type.
#[derive(Clone, Copy, Debug)]
pub struct Field {
    /// The name of the node created for the value.
    pub name: &'static str,

    /// The tag replacing the natural tag of the decoder.
    pub tag: Option<Tag>,

    pub presence: Presence,
    pub decoder: FieldDecoder,

    /// Whether the value selects the decoder of a sibling dispatch field.
    pub key: bool,

    /// The key of a summary field to produce from the value.
    pub summary: Option<&'static str>,
}

impl Field {
    pub const fn new(name: &'static str, decoder: FieldDecoder) -> Self {
        Field {
            name,
            tag: None,
            presence: Presence::Mandatory,
            decoder,
            key: false,
            summary: None,
        }
    }

    /// Creates a field of a primitive kind.
    pub const fn primitive(name: &'static str, kind: PrimitiveKind) -> Self {
        Self::new(name, FieldDecoder::Primitive(kind))
    }

    /// Creates a context specific, explicitly tagged field.
    pub const fn explicit(
        name: &'static str, number: u32, inner: &'static Field
    ) -> Self {
        Field {
            tag: Some(Tag::ctx(number)),
            ..Self::new(name, FieldDecoder::Explicit(inner))
        }
    }

    /// Returns the same field under a different name.
    pub const fn named(self, name: &'static str) -> Self {
        Field { name, ..self }
    }

    /// Replaces the tag of the field.
    pub const fn tagged(self, tag: Tag) -> Self {
        Field { tag: Some(tag), ..self }
    }

    /// Replaces the tag with a context specific tag.
    pub const fn ctx(self, number: u32) -> Self {
        self.tagged(Tag::ctx(number))
    }

    pub const fn optional(self) -> Self {
        Field { presence: Presence::Optional, ..self }
    }

    pub const fn default(self, value: DefaultValue) -> Self {
        Field { presence: Presence::Default(value), ..self }
    }

    pub const fn key(self) -> Self {
        Field { key: true, ..self }
    }

    pub const fn summary(self, key: &'static str) -> Self {
        Field { summary: Some(key), ..self }
    }

    /// Returns whether a value with this identifier is for this field.
    pub fn matches(&self, ident: Ident) -> bool {
        if let Some(tag) = self.tag {
            return ident.tag() == tag
        }
        match self.decoder {
            FieldDecoder::Primitive(kind) => ident.tag() == kind.natural_tag(),
            FieldDecoder::Sequence(_) | FieldDecoder::SequenceOf(_) => {
                ident.tag() == Tag::SEQUENCE
            }
            FieldDecoder::Set(_) | FieldDecoder::SetOf(_) => {
                ident.tag() == Tag::SET
            }
            FieldDecoder::Choice(alternatives) => {
                alternatives.iter().any(|item| item.matches(ident))
            }
            FieldDecoder::Explicit(_) | FieldDecoder::Any
                | FieldDecoder::Dispatch(_) | FieldDecoder::Custom(_) => true,
        }
    }
}


//------------ Presence ------------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Presence {
    Mandatory,
    Optional,

    /// The field may be absent in which case it has the given value.
    Default(DefaultValue),
}


//------------ DefaultValue --------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DefaultValue {
    Boolean(bool),
    Integer(i64),
}

impl DefaultValue {
    fn is_value(self, value: &NodeValue) -> bool {
        match (self, value) {
            (DefaultValue::Boolean(left), NodeValue::Boolean(right)) => {
                left == *right
            }
            (DefaultValue::Integer(left), value) => {
                value.as_i64() == Some(left)
            }
            _ => false
        }
    }
}


//------------ FieldDecoder --------------------------------------------------

/// How the content of a field is decoded.
#[derive(Clone, Copy)]
pub enum FieldDecoder {
    Primitive(PrimitiveKind),

    /// A constructed value wrapping exactly one inner value.
    Explicit(&'static Field),

    Sequence(&'static [Field]),
    Set(&'static [Field]),
    SequenceOf(&'static Field),
    SetOf(&'static Field),

    /// Exactly one of the alternatives, selected by tag.
    Choice(&'static [Field]),

    /// Any value, decoded without type information.
    Any,

    /// The value is decoded through the registry.
    ///
    /// The decoder is selected by the value of the sibling field marked as
    /// key, within the given namespace for numeric keys. If the field has
    /// a tag, the decoder receives the content octets. Otherwise, it
    /// receives the complete encoded value.
    Dispatch(&'static str),

    /// A decoder function for things tables can’t express.
    Custom(CustomDecoder),
}

/// A function decoding a complete value.
pub type CustomDecoder = fn(&Tlv, &mut DecodeContext) -> DecodedNode;

impl fmt::Debug for FieldDecoder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FieldDecoder::Primitive(kind) => write!(f, "Primitive({kind:?})"),
            FieldDecoder::Explicit(inner) => {
                write!(f, "Explicit({})", inner.name)
            }
            FieldDecoder::Sequence(fields) => {
                write!(f, "Sequence({} fields)", fields.len())
            }
            FieldDecoder::Set(fields) => {
                write!(f, "Set({} fields)", fields.len())
            }
            FieldDecoder::SequenceOf(item) => {
                write!(f, "SequenceOf({})", item.name)
            }
            FieldDecoder::SetOf(item) => write!(f, "SetOf({})", item.name),
            FieldDecoder::Choice(alternatives) => {
                write!(f, "Choice({} alternatives)", alternatives.len())
            }
            FieldDecoder::Any => f.write_str("Any"),
            FieldDecoder::Dispatch(namespace) => {
                write!(f, "Dispatch({namespace})")
            }
            FieldDecoder::Custom(_) => f.write_str("Custom"),
        }
    }
}


//------------ Key -----------------------------------------------------------

/// The value of a key field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Key {
    Oid(Oid),
    Number(i64),
}

impl Key {
    fn from_value(value: &NodeValue) -> Option<Self> {
        match *value {
            NodeValue::Oid(ref oid) => Some(Key::Oid(oid.clone())),
            ref value => value.as_i64().map(Key::Number),
        }
    }

    pub fn discriminator(&self, namespace: &'static str) -> Discriminator {
        match *self {
            Key::Oid(ref oid) => Discriminator::oid(oid),
            Key::Number(value) => Discriminator::number(namespace, value),
        }
    }
}


//------------ decode_structure ----------------------------------------------

/// Decodes the single value in `cursor` as described by `field`.
pub fn decode_structure(
    field: &Field, cursor: ByteCursor, ctx: &mut DecodeContext
) -> DecodedNode {
    let tlv = match Tlv::read(&cursor, 0, ctx.mode()) {
        Ok(tlv) => tlv,
        Err(err) => return invalid_node(&cursor, err),
    };
    let mut node = if field.matches(tlv.ident()) {
        decode_field(field, &tlv, ctx, None).0
    }
    else {
        unexpected(&tlv, ctx, field.name)
    };
    check_trailing(&cursor, tlv.end(), &mut node);
    node
}

/// Decodes a value known to be for `field`.
///
/// Returns the node and, if the field is a key field, the key.
pub fn decode_field(
    field: &Field, tlv: &Tlv, ctx: &mut DecodeContext, key: Option<&Key>,
) -> (DecodedNode, Option<Key>) {
    let ident = tlv.ident();
    let mut node = DecodedNode::new(field.name, tlv.range())
        .with_tag(ident.tag());
    match field.decoder {
        FieldDecoder::Primitive(kind) => {
            match read_primitive(kind, tlv, ctx) {
                Ok(value) => node.set_value(value),
                Err(err) => {
                    node.set_value(raw_value(tlv));
                    node.annotate(err);
                }
            }
        }
        FieldDecoder::Choice(alternatives) if field.tag.is_some() => {
            decode_explicit(tlv, ctx, &mut node, false, |inner, ctx| {
                decode_choice(field.name, alternatives, inner, ctx, key)
            });
        }
        FieldDecoder::Explicit(inner_field) => {
            decode_explicit(tlv, ctx, &mut node, true, |inner, ctx| {
                if inner_field.matches(inner.ident()) {
                    decode_field(inner_field, inner, ctx, key).0
                }
                else {
                    unexpected(inner, ctx, inner_field.name)
                }
            });
        }
        FieldDecoder::Choice(alternatives) => {
            let choice = decode_choice(field.name, alternatives, tlv, ctx, key);
            node.push_child(choice);
        }
        FieldDecoder::Sequence(fields) | FieldDecoder::Set(fields) => {
            let ordered = matches!(field.decoder, FieldDecoder::Sequence(_));
            if require_constructed(tlv, &mut node) {
                let res = ctx.enter(tlv.pos(), |ctx| {
                    decode_fields(fields, tlv.content(), ctx, &mut node, ordered)
                });
                if let Err(err) = res {
                    node.annotate(err)
                }
            }
        }
        FieldDecoder::SequenceOf(item) | FieldDecoder::SetOf(item) => {
            if require_constructed(tlv, &mut node) {
                let res = ctx.enter(tlv.pos(), |ctx| {
                    decode_items(item, tlv.content(), ctx, &mut node)
                });
                if let Err(err) = res {
                    node.annotate(err)
                }
            }
        }
        FieldDecoder::Any => {
            node = decode_generic(tlv, ctx);
            node.set_name(field.name);
        }
        FieldDecoder::Dispatch(namespace) => {
            // An untagged field is an open type and the decoder gets the
            // whole value. Otherwise the tag only wraps the embedded data.
            let content = match field.tag {
                Some(_) => tlv.content(),
                None => tlv.value(),
            };
            let child = match key {
                Some(key) => {
                    ctx.dispatch(&key.discriminator(namespace), content)
                }
                None => {
                    let mut child = DecodedNode::new(
                        "opaque", content.base()..content.end()
                    ).with_value(NodeValue::Bytes(
                        Bytes::copy_from_slice(content.as_slice())
                    ));
                    child.annotate(DecodeError::new(
                        ErrorKind::UnknownDiscriminator,
                        "no type identifier for embedded value",
                        content.base()
                    ));
                    child
                }
            };
            node.push_child(child);
        }
        FieldDecoder::Custom(op) => {
            node = op(tlv, ctx);
            node.set_name(field.name);
        }
    }

    if let Presence::Default(value) = field.presence {
        if ctx.mode().is_restricted() && value.is_value(node.value()) {
            node.annotate_with(
                Severity::Warning,
                DecodeError::malformed(
                    "DEFAULT value explicitly encoded in DER", tlv.pos()
                )
            );
        }
    }
    if let Some(summary) = field.summary {
        add_summary(summary, node.value(), ctx);
    }
    let key = if field.key { Key::from_value(node.value()) } else { None };
    (node, key)
}

/// Decodes the single value wrapped in an explicit tag.
///
/// If `flatten` is set, the inner node takes the place of `node`, keeping
/// the name, tag and range of the outer value. Otherwise it becomes a
/// child of `node`.
fn decode_explicit(
    tlv: &Tlv,
    ctx: &mut DecodeContext,
    node: &mut DecodedNode,
    flatten: bool,
    op: impl FnOnce(&Tlv, &mut DecodeContext) -> DecodedNode,
) {
    if !require_constructed(tlv, node) {
        return
    }
    let content = tlv.content();
    let inner = match Tlv::read(&content, 0, ctx.mode()) {
        Ok(inner) => inner,
        Err(err) => {
            node.annotate(err);
            return
        }
    };
    match ctx.enter(tlv.pos(), |ctx| op(&inner, ctx)) {
        Ok(mut inner_node) if flatten => {
            inner_node.set_name(node.name().to_owned());
            inner_node.set_range(node.range());
            inner_node.set_tag(node.tag());
            *node = inner_node;
        }
        Ok(inner_node) => node.push_child(inner_node),
        Err(err) => node.annotate(err)
    }
    check_trailing(&content, inner.end(), node);
}

fn decode_choice(
    name: &'static str,
    alternatives: &'static [Field],
    tlv: &Tlv,
    ctx: &mut DecodeContext,
    key: Option<&Key>,
) -> DecodedNode {
    match alternatives.iter().find(|item| item.matches(tlv.ident())) {
        Some(field) => decode_field(field, tlv, ctx, key).0,
        None => unexpected(tlv, ctx, name),
    }
}

/// Decodes the fields of a SEQUENCE or SET.
fn decode_fields(
    fields: &'static [Field],
    content: ByteCursor,
    ctx: &mut DecodeContext,
    node: &mut DecodedNode,
    ordered: bool,
) {
    let mut key = None;
    let mut next = 0;
    let mut seen = vec![false; fields.len()];
    let mut offset = 0;
    while offset < content.len() {
        let tlv = match Tlv::read(&content, offset, ctx.mode()) {
            Ok(tlv) => tlv,
            Err(err) => {
                node.annotate(err);
                break
            }
        };
        offset = tlv.end();
        let found = if ordered {
            find_ordered(fields, &mut next, tlv.ident())
        }
        else {
            find_unordered(fields, &seen, tlv.ident())
        };
        match found {
            Found::Field(idx) => {
                seen[idx] = true;
                let (child, child_key) = decode_field(
                    &fields[idx], &tlv, ctx, key.as_ref()
                );
                if child_key.is_some() {
                    key = child_key
                }
                node.push_child(child);
            }
            Found::Unexpected(name) => {
                node.push_child(unexpected(&tlv, ctx, name));
            }
            Found::Trailing => {
                let mut child = decode_generic(&tlv, ctx);
                child.annotate_with(
                    Severity::Warning,
                    DecodeError::new(
                        ErrorKind::TrailingData,
                        "unexpected extra value", tlv.pos()
                    )
                );
                node.push_child(child);
            }
        }
    }
    for (field, seen) in fields.iter().zip(seen) {
        if !seen && field.presence == Presence::Mandatory {
            node.annotate(DecodeError::new(
                ErrorKind::MissingField,
                format!("missing {}", field.name),
                content.end()
            ));
        }
    }
}

enum Found {
    Field(usize),
    Unexpected(&'static str),
    Trailing,
}

fn find_ordered(fields: &[Field], next: &mut usize, ident: Ident) -> Found {
    let found = fields.iter().enumerate().skip(*next).find(|(_, field)| {
        field.matches(ident)
    });
    if let Some((idx, _)) = found {
        *next = idx + 1;
        return Found::Field(idx)
    }
    match fields.iter().skip(*next).find(|field| {
        field.presence == Presence::Mandatory
    }) {
        Some(field) => Found::Unexpected(field.name),
        None => Found::Trailing,
    }
}

fn find_unordered(fields: &[Field], seen: &[bool], ident: Ident) -> Found {
    match fields.iter().zip(seen).position(|(field, seen)| {
        !seen && field.matches(ident)
    }) {
        Some(idx) => Found::Field(idx),
        None => Found::Trailing,
    }
}

/// Decodes the items of a SEQUENCE OF or SET OF.
fn decode_items(
    item: &'static Field,
    content: ByteCursor,
    ctx: &mut DecodeContext,
    node: &mut DecodedNode,
) {
    let mut offset = 0;
    while offset < content.len() {
        let tlv = match Tlv::read(&content, offset, ctx.mode()) {
            Ok(tlv) => tlv,
            Err(err) => {
                node.annotate(err);
                break
            }
        };
        offset = tlv.end();
        let child = if item.matches(tlv.ident()) {
            decode_field(item, &tlv, ctx, None).0
        }
        else {
            unexpected(&tlv, ctx, item.name)
        };
        node.push_child(child);
    }
}

/// Decodes a value that isn’t what was expected.
fn unexpected(
    tlv: &Tlv, ctx: &mut DecodeContext, expected: &'static str
) -> DecodedNode {
    let mut node = decode_generic(tlv, ctx);
    node.annotate(DecodeError::new(
        ErrorKind::UnexpectedTag,
        format!("unexpected {} where {} was expected", tlv.ident().tag(), expected),
        tlv.pos()
    ));
    node
}

fn require_constructed(tlv: &Tlv, node: &mut DecodedNode) -> bool {
    if tlv.ident().is_constructed() {
        true
    }
    else {
        node.set_value(raw_value(tlv));
        node.annotate(DecodeError::malformed(
            "expected constructed value", tlv.pos()
        ));
        false
    }
}

fn add_summary(key: &'static str, value: &NodeValue, ctx: &mut DecodeContext) {
    let value = match *value {
        NodeValue::Boolean(value) => SummaryValue::Bool(value),
        NodeValue::Unsigned(value) => SummaryValue::Unsigned(value),
        NodeValue::Text(ref text) => SummaryValue::Text(text.clone()),
        NodeValue::Oid(ref oid) => SummaryValue::Text(oid.to_string()),
        NodeValue::Time(ref time) => SummaryValue::Text(time.to_string()),
        ref value => match value.as_i64() {
            Some(value) => SummaryValue::Integer(value),
            None => return,
        }
    };
    ctx.add_summary(key, value)
}


//============ Tests =========================================================
