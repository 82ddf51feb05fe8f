//! Decoding BER encoded data into a tree.
//!
//! The entry points are [`decode_ber`] for data without a type description
//! and [`decode_structure`] for data described by a table of [`Field`]s.
//! Both never fail. Problems are attached to the nodes of the returned
//! [`DecodedNode`] tree as [`Annotation`]s while resource guards are
//! recorded as a [`FatalError`] in the [`DecodeContext`].

pub use self::context::DecodeContext;
pub use self::error::{
    Annotation, DecodeError, ErrorKind, FatalError, Severity
};
pub use self::node::{
    DecodedNode, NodeValue, SummaryField, SummaryValue
};
pub use self::primitive::{read_primitive, PrimitiveKind};
pub use self::structured::{
    decode_field, decode_structure, CustomDecoder, DefaultValue, Field,
    FieldDecoder, Key, Presence,
};
pub use self::tlv::Tlv;
pub use self::value::{decode_ber, decode_elements, decode_generic};

mod context;
mod error;
mod node;
mod primitive;
mod structured;
mod tlv;
mod value;
