//! Defensive decoding of protocol messages.
//!
//! This crate turns untrusted octets into a tree of [`DecodedNode`]s,
//! annotated with everything that is wrong with them. Decoding never
//! panics and never gives up on a message early unless continuing would
//! exhaust resources: problems are attached to the node they were found
//! in and decoding carries on with the next value.
//!
//! The building blocks are:
//!
//! * the generic and table driven decoders for data in Basic Encoding
//!   Rules in [`decode`],
//! * the [`Reassembler`] splitting a byte stream into messages,
//! * the [`SequenceTracker`] checking the sequence numbers of segmented
//!   link layer channels, with [`rlc`] as its main user,
//! * the [`directory`] decoder for ISO 2709 records such as MARC, and
//! * the [`Registry`] mapping discriminators found in messages to the
//!   decoders for embedded values.
//!
//! The protocols built from these live in [`proto`]. A [`Session`] ties
//! it all together for decoding a whole capture.

pub use self::config::Config;
pub use self::cursor::{BitReader, ByteCursor, OutOfBounds};
pub use self::decode::{
    DecodeContext, DecodeError, DecodedNode, ErrorKind, FatalError,
    NodeValue, Severity, SummaryField, SummaryValue,
};
pub use self::ident::{Class, Ident, Tag};
pub use self::int::Integer;
pub use self::length::Length;
pub use self::message::{
    ChannelKey, ChannelType, Chunk, ConnectionId, Direction, Message,
};
pub use self::mode::Mode;
pub use self::oid::Oid;
pub use self::proto::Protocol;
pub use self::reassembly::{Reassembler, ReassemblyState};
pub use self::registry::{Decoder, Discriminator, Registry};
pub use self::sequence::{SequenceStatus, SequenceTracker};
pub use self::session::{Dissection, Session};

pub mod config;
pub mod crypto;
pub mod cursor;
pub mod decode;
pub mod directory;
pub mod encode;
pub mod ident;
pub mod int;
pub mod message;
pub mod mode;
pub mod oid;
pub mod proto;
pub mod reassembly;
pub mod registry;
pub mod rlc;
pub mod sequence;
pub mod session;
pub mod string;
pub mod time;

mod length;
