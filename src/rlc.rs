//! LTE Radio Link Control PDUs.
//!
//! RLC headers pack their fields across octet boundaries, so they are
//! read through a [`BitReader`]. Each field becomes a node whose range
//! covers the octets the field is the first to touch. Fields sharing an
//! octet with an earlier field get an empty range at the end of that
//! octet, which keeps sibling ranges from overlapping.
//!
//! Decoding only looks at a single PDU. Sequence numbers and framing
//! information are tracked across PDUs through [`track`] and a
//! [`SequenceTracker`].

use std::fmt;
use tracing::trace;
use crate::cursor::{BitReader, ByteCursor};
use crate::decode::{
    DecodeContext, DecodeError, DecodedNode, NodeValue, Severity,
};
use crate::message::ChannelKey;
use crate::sequence::{Observation, SequenceTracker};


//------------ RlcMode -------------------------------------------------------

/// The RLC mode of a logical channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RlcMode {
    /// Unacknowledged mode with 5 bit sequence numbers.
    Um5,

    /// Unacknowledged mode with 10 bit sequence numbers.
    Um10,

    /// Acknowledged mode.
    Am,
}

impl RlcMode {
    /// Returns the width of sequence numbers in bits.
    pub fn sn_width(self) -> u8 {
        match self {
            RlcMode::Um5 => 5,
            RlcMode::Um10 | RlcMode::Am => 10,
        }
    }
}

impl fmt::Display for RlcMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            RlcMode::Um5 => "UM (5 bit SN)",
            RlcMode::Um10 => "UM (10 bit SN)",
            RlcMode::Am => "AM",
        })
    }
}


//------------ RlcPdu --------------------------------------------------------

/// The values of a PDU needed beyond decoding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RlcPdu {
    Data {
        sn: u32,

        /// The two bit framing info.
        framing: u8,

        /// The segment offset and last segment flag of a resegmented PDU.
        segment: Option<(u16, bool)>,
    },
    Status {
        ack_sn: u32,
        nacks: Vec<Nack>,
    },
}

impl RlcPdu {
    /// Returns whether the data field starts with the rest of an SDU.
    pub fn starts_with_continuation(&self) -> bool {
        matches!(*self, RlcPdu::Data { framing, .. } if framing & 0b10 != 0)
    }

    /// Returns whether the data field ends with an incomplete SDU.
    pub fn ends_incomplete(&self) -> bool {
        matches!(*self, RlcPdu::Data { framing, .. } if framing & 0b01 != 0)
    }
}

/// A negative acknowledgement in a STATUS PDU.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Nack {
    pub sn: u32,

    /// The first and last octet of a missing portion.
    pub segment: Option<(u16, u16)>,
}


//------------ decode_pdu ----------------------------------------------------

/// Decodes a single RLC PDU.
///
/// Returns the tree and, if the header could be read completely, the
/// values needed for sequence tracking.
pub fn decode_pdu(
    cursor: ByteCursor, mode: RlcMode, ctx: &mut DecodeContext
) -> (DecodedNode, Option<RlcPdu>) {
    let mut node = DecodedNode::new(
        match mode {
            RlcMode::Um5 | RlcMode::Um10 => "UMD PDU",
            RlcMode::Am => "AMD PDU",
        },
        cursor.base()..cursor.end()
    );
    let mut bits = Bits::new(cursor);
    let res = match mode {
        RlcMode::Um5 | RlcMode::Um10 => {
            decode_um(&mut bits, mode, &mut node, ctx)
        }
        RlcMode::Am => {
            match bits.peek_flag() {
                Ok(false) => {
                    node.set_name("STATUS PDU");
                    decode_status(&mut bits, &mut node, ctx)
                }
                Ok(true) => decode_am(&mut bits, &mut node, ctx),
                Err(err) => Err(err),
            }
        }
    };
    match res {
        Ok(pdu) => (node, Some(pdu)),
        Err(err) => {
            node.annotate(err);
            (node, None)
        }
    }
}

fn decode_um(
    bits: &mut Bits,
    mode: RlcMode,
    node: &mut DecodedNode,
    ctx: &mut DecodeContext,
) -> Result<RlcPdu, DecodeError> {
    if mode == RlcMode::Um10 {
        let reserved = bits.read("reserved", 3, node)?;
        if reserved != 0 {
            reserved_warning(bits, node);
        }
    }
    let framing = bits.read("framing info", 2, node)? as u8;
    let extension = bits.read_flag("extension", node)?;
    let sn = bits.read("sequence number", mode.sn_width(), node)?;
    ctx.add_summary("rlc.sn", sn);
    decode_data_field(bits, extension, node)?;
    Ok(RlcPdu::Data { sn, framing, segment: None })
}

fn decode_am(
    bits: &mut Bits,
    node: &mut DecodedNode,
    ctx: &mut DecodeContext,
) -> Result<RlcPdu, DecodeError> {
    bits.read_flag("data/control", node)?;
    let resegmented = bits.read_flag("resegmentation flag", node)?;
    if resegmented {
        node.set_name("AMD PDU segment");
    }
    bits.read_flag("polling", node)?;
    let framing = bits.read("framing info", 2, node)? as u8;
    let extension = bits.read_flag("extension", node)?;
    let sn = bits.read("sequence number", 10, node)?;
    ctx.add_summary("rlc.sn", sn);
    let segment = if resegmented {
        let last = bits.read_flag("last segment flag", node)?;
        let offset = bits.read("segment offset", 15, node)? as u16;
        Some((offset, last))
    }
    else {
        None
    };
    decode_data_field(bits, extension, node)?;
    Ok(RlcPdu::Data { sn, framing, segment })
}

fn decode_status(
    bits: &mut Bits,
    node: &mut DecodedNode,
    ctx: &mut DecodeContext,
) -> Result<RlcPdu, DecodeError> {
    bits.read_flag("data/control", node)?;
    let cpt = bits.read("control PDU type", 3, node)?;
    if cpt != 0 {
        return Err(DecodeError::unsupported(
            format!("unknown control PDU type {cpt}"), bits.cursor.base()
        ))
    }
    let ack_sn = bits.read("ACK_SN", 10, node)?;
    ctx.add_summary("rlc.ack_sn", ack_sn);
    let mut more = bits.read_flag("extension 1", node)?;
    let mut nacks = Vec::new();
    while more {
        let start = bits.covered;
        let mut nack_node = DecodedNode::new("NACK", 0..0);
        let res = decode_nack(bits, &mut nack_node);
        nack_node.set_range(
            bits.cursor.abs(start)..bits.cursor.abs(bits.covered)
        );
        node.push_child(nack_node);
        let (nack, next) = res?;
        nacks.push(nack);
        more = next;
    }
    Ok(RlcPdu::Status { ack_sn, nacks })
}

fn decode_nack(
    bits: &mut Bits, node: &mut DecodedNode
) -> Result<(Nack, bool), DecodeError> {
    let sn = bits.read("NACK_SN", 10, node)?;
    let more = bits.read_flag("extension 1", node)?;
    let segment = if bits.read_flag("extension 2", node)? {
        let start = bits.read("SOstart", 15, node)? as u16;
        let end = bits.read("SOend", 15, node)? as u16;
        Some((start, end))
    }
    else {
        None
    };
    Ok((Nack { sn, segment }, more))
}

/// Decodes the length indicators and the data field elements.
fn decode_data_field(
    bits: &mut Bits, mut extension: bool, node: &mut DecodedNode
) -> Result<(), DecodeError> {
    let mut indicators = Vec::new();
    while extension {
        extension = bits.read_flag("extension", node)?;
        let li = bits.read("length indicator", 11, node)?;
        if li == 0 {
            // Zero is reserved. Still better to go on decoding.
            if let Some(child) = node.children_mut().last_mut() {
                child.annotate(DecodeError::malformed(
                    "length indicator of zero", bits.cursor.base()
                ));
            }
        }
        indicators.push(li as usize);
    }
    if indicators.len() % 2 == 1 {
        bits.read("padding", 4, node)?;
    }
    let start = bits.covered;
    let cursor = bits.cursor;
    let mut data = DecodedNode::new(
        "data field", cursor.abs(start)..cursor.end()
    );
    let mut offset = start;
    for li in indicators {
        if li > cursor.remaining(offset) {
            data.annotate(DecodeError::malformed_length(
                format!(
                    "length indicator {} exceeds remaining {} octets",
                    li, cursor.remaining(offset)
                ),
                cursor.abs(offset)
            ));
            node.push_child(data);
            return Ok(())
        }
        data.push_child(element(cursor, offset, li));
        offset += li;
    }
    if cursor.remaining(offset) == 0 {
        data.annotate(DecodeError::malformed(
            "empty data field element", cursor.abs(offset)
        ));
    }
    else {
        data.push_child(element(cursor, offset, cursor.remaining(offset)));
    }
    node.push_child(data);
    Ok(())
}

fn element(cursor: ByteCursor, offset: usize, len: usize) -> DecodedNode {
    let value = cursor.bytes(offset, len).map(|octets| {
        NodeValue::Bytes(octets.to_vec().into())
    }).unwrap_or(NodeValue::Constructed);
    DecodedNode::new(
        "data field element", cursor.abs(offset)..cursor.abs(offset + len)
    ).with_value(value)
}

fn reserved_warning(bits: &Bits, node: &mut DecodedNode) {
    node.annotate_with(Severity::Warning, DecodeError::malformed(
        "reserved bits set", bits.cursor.base()
    ));
}


//------------ track ---------------------------------------------------------

/// Feeds a decoded PDU to the sequence tracker and annotates the result.
///
/// Data PDUs are checked against the previous PDU of their channel. The
/// ACK_SN of a STATUS PDU is checked against what was sent in the
/// opposite direction.
pub fn track(
    pdu: &RlcPdu,
    tracker: &mut SequenceTracker,
    key: ChannelKey,
    message_ref: u64,
    retransmission: bool,
    node: &mut DecodedNode,
) {
    let pos = node.range().start;
    let err = match *pdu {
        RlcPdu::Data { sn, .. } => {
            let report = tracker.observe(
                key,
                Observation::new(sn, message_ref)
                    .with_retransmission(retransmission)
                    .with_segments(
                        pdu.starts_with_continuation(), pdu.ends_incomplete()
                    )
            );
            report.to_error(pos)
        }
        RlcPdu::Status { ack_sn, .. } => {
            tracker.check_ack(&key, ack_sn).to_error(pos)
        }
    };
    if let Some(err) = err {
        trace!("{}: {}", key, err);
        node.annotate(err)
    }
}


//------------ Bits ----------------------------------------------------------

/// Reads bit fields and creates their nodes.
struct Bits<'a> {
    cursor: ByteCursor<'a>,
    reader: BitReader<'a>,

    /// The number of octets already covered by field nodes.
    covered: usize,
}

impl<'a> Bits<'a> {
    fn new(cursor: ByteCursor<'a>) -> Self {
        Bits { cursor, reader: BitReader::new(cursor), covered: 0 }
    }

    fn peek_flag(&self) -> Result<bool, DecodeError> {
        Ok(self.cursor.read_u8(0)? & 0x80 != 0)
    }

    fn read(
        &mut self, name: &'static str, count: u8, parent: &mut DecodedNode
    ) -> Result<u32, DecodeError> {
        let value = self.reader.read_bits(count)?;
        let start = self.covered;
        let end = self.reader.bit_position().div_ceil(8).max(start);
        self.covered = end;
        parent.push_child(
            DecodedNode::new(
                name, self.cursor.abs(start)..self.cursor.abs(end)
            ).with_value(NodeValue::Unsigned(value.into()))
        );
        Ok(value)
    }

    fn read_flag(
        &mut self, name: &'static str, parent: &mut DecodedNode
    ) -> Result<bool, DecodeError> {
        self.read(name, 1, parent).map(|value| value != 0)
    }
}


//============ Tests =========================================================
