//! Directory-based records.
//!
//! Records in the ISO 2709 format, best known as MARC, don’t tag their
//! fields inline. Instead, a fixed-size leader is followed by a directory
//! of entries giving tag, length and starting position of each field
//! within a data area that follows the directory. All numbers are
//! encoded as ASCII digits.
//!
//! ```text
//! +--------+-----------------------+----+------------------------+----+
//! | leader | entry | entry | ...   | FT | field FT | field FT ...| RT |
//! +--------+-----------------------+----+------------------------+----+
//!  0      24                      base-1 base               record length
//! ```
//!
//! Since every number in such a record is declared by the data itself,
//! all of them are checked against the actual data before use. A broken
//! directory entry only affects its own field.

use std::borrow::Cow;
use bytes::Bytes;
use tracing::debug;
use crate::cursor::ByteCursor;
use crate::decode::{
    DecodeContext, DecodeError, DecodedNode, ErrorKind, FatalError,
    NodeValue, Severity,
};
use crate::registry::Decoder;


//------------ Constants -----------------------------------------------------

/// The length of the leader.
pub const LEADER_LEN: usize = 24;

/// The octet terminating the directory and each field.
pub const FIELD_TERMINATOR: u8 = 0x1E;

/// The octet terminating a record.
pub const RECORD_TERMINATOR: u8 = 0x1D;

/// The octet starting a subfield.
pub const SUBFIELD_DELIMITER: u8 = 0x1F;


//------------ Leader --------------------------------------------------------

/// The structural values of a record leader.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Leader {
    pub record_length: usize,
    pub coding_scheme: u8,
    pub indicator_count: usize,
    pub subfield_code_length: usize,
    pub base_address: usize,
    pub length_of_length: usize,
    pub length_of_start: usize,
    pub length_of_implementation: usize,
}

impl Leader {
    /// Returns the number of octets in a directory entry.
    pub fn entry_width(&self) -> usize {
        3 + self.length_of_length + self.length_of_start
            + self.length_of_implementation
    }

    /// Returns whether text is encoded in UTF-8.
    pub fn is_utf8(&self) -> bool {
        self.coding_scheme == b'a'
    }
}


//------------ DirectoryEntry ------------------------------------------------

/// One entry of the directory as declared by the record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DirectoryEntry {
    pub tag: [u8; 3],
    pub length: usize,
    pub start: usize,
}

impl DirectoryEntry {
    /// Returns whether the entry is for a control field.
    ///
    /// Control fields have tags 001 to 009 and carry no indicators or
    /// subfields.
    pub fn is_control_field(&self) -> bool {
        self.tag[0] == b'0' && self.tag[1] == b'0' && self.tag[2] != b'0'
            && self.tag[2].is_ascii_digit()
    }

    pub fn tag_str(&self) -> Cow<str> {
        String::from_utf8_lossy(&self.tag)
    }
}


//------------ DirectoryDecoder ----------------------------------------------

/// A registry decoder for directory-based records.
#[derive(Clone, Copy, Debug)]
pub struct DirectoryDecoder {
    max_record_size: usize,
}

impl DirectoryDecoder {
    /// The maximum record size used unless configured otherwise.
    ///
    /// This is the largest length five digits can declare.
    pub const DEFAULT_MAX_RECORD_SIZE: usize = 99_999;

    pub fn new(max_record_size: usize) -> Self {
        DirectoryDecoder { max_record_size }
    }
}

impl Default for DirectoryDecoder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_RECORD_SIZE)
    }
}

impl Decoder for DirectoryDecoder {
    fn decode(
        &self, cursor: ByteCursor, ctx: &mut DecodeContext
    ) -> DecodedNode {
        decode_record(cursor, ctx, self.max_record_size)
    }
}


//------------ decode_record -------------------------------------------------

/// Decodes the record in `cursor`.
///
/// If the record declares a length different from the data available, the
/// error is attached to the returned top node. Records longer than the
/// data are not decoded any further. A declared length above
/// `max_record_size` is also recorded as a fatal condition in `ctx`.
pub fn decode_record(
    cursor: ByteCursor, ctx: &mut DecodeContext, max_record_size: usize
) -> DecodedNode {
    let mut record = DecodedNode::new("record", cursor.base()..cursor.end());
    let record_length = match digits(&cursor, 0, 5) {
        Ok(len) => len,
        Err(err) => {
            record.set_value(raw(cursor.as_slice()));
            record.annotate(err);
            return record
        }
    };
    if record_length > max_record_size {
        let err = FatalError::DeclaredSizeExceedsMaximum {
            declared: record_length as u64,
            maximum: max_record_size as u64,
            pos: cursor.base(),
        };
        ctx.set_fatal(err.clone());
        record.annotate(err.into());
        return record
    }
    if record_length > cursor.len() {
        debug!(
            "record declares {} octets but only {} are available",
            record_length, cursor.len()
        );
        record.annotate(DecodeError::new(
            ErrorKind::InvalidLength,
            format!(
                "record length of {} exceeds available {} octets",
                record_length, cursor.len()
            ),
            cursor.base()
        ));
        return record
    }
    if record_length < cursor.len() {
        record.annotate_with(Severity::Warning, DecodeError::new(
            ErrorKind::TrailingData,
            format!("{} octets after record", cursor.len() - record_length),
            cursor.abs(record_length)
        ));
    }
    if record_length < LEADER_LEN + 1 {
        record.annotate(DecodeError::new(
            ErrorKind::InvalidLength,
            format!("record length {record_length} too short for leader"),
            cursor.base()
        ));
        return record
    }
    let data = match cursor.subrange(0, record_length) {
        Ok(data) => data,
        Err(err) => {
            record.annotate(err.into());
            return record
        }
    };
    record.set_range(data.base()..data.end());

    let leader = match decode_leader(&data, &mut record, ctx) {
        Some(leader) => leader,
        None => return record,
    };
    if leader.base_address < LEADER_LEN + 1
        || leader.base_address > record_length
    {
        record.annotate(DecodeError::new(
            ErrorKind::InvalidLength,
            format!("invalid base address {}", leader.base_address),
            data.abs(12)
        ));
        return record
    }
    if !leader.is_utf8() {
        record.annotate_with(Severity::Note, DecodeError::unsupported(
            "text in MARC-8 or other non-UTF-8 coding shown lossily",
            data.abs(9)
        ));
    }
    let (mut directory, entries) = decode_directory(&data, &leader);
    let fields = decode_fields(&data, &leader, &entries, &mut directory);
    record.push_child(directory);
    record.push_child(fields);
    if data.read_u8(record_length - 1).ok() != Some(RECORD_TERMINATOR) {
        record.annotate_with(Severity::Warning, DecodeError::malformed(
            "missing record terminator", data.abs(record_length - 1)
        ));
    }
    ctx.add_summary("marc.fields", entries.len() as u64);
    record
}

/// Decodes the leader and adds its node to `record`.
///
/// Returns `None` if any of the structural values is broken.
fn decode_leader(
    data: &ByteCursor, record: &mut DecodedNode, ctx: &mut DecodeContext
) -> Option<Leader> {
    let mut node = DecodedNode::new("leader", data.base()..data.abs(LEADER_LEN));
    let mut broken = false;
    let mut number = |
        name: &'static str, offset: usize, len: usize, node: &mut DecodedNode
    | {
        let mut child = DecodedNode::new(
            name, data.abs(offset)..data.abs(offset + len)
        );
        let res = match digits(data, offset, len) {
            Ok(value) => {
                child.set_value(NodeValue::Unsigned(value as u64));
                value
            }
            Err(err) => {
                if let Ok(octets) = data.bytes(offset, len) {
                    child.set_value(raw(octets))
                }
                child.annotate(err);
                broken = true;
                0
            }
        };
        node.push_child(child);
        res
    };
    let record_length = number("record length", 0, 5, &mut node);
    let text = |name: &'static str, offset: usize, node: &mut DecodedNode| {
        let octet = data.read_u8(offset).unwrap_or(b' ');
        node.push_child(
            DecodedNode::new(name, data.abs(offset)..data.abs(offset + 1))
                .with_value(NodeValue::Text(char::from(octet).to_string()))
        );
        octet
    };
    text("record status", 5, &mut node);
    let record_type = text("type of record", 6, &mut node);
    text("bibliographic level", 7, &mut node);
    text("type of control", 8, &mut node);
    let coding_scheme = text("character coding scheme", 9, &mut node);
    let indicator_count = number("indicator count", 10, 1, &mut node);
    let subfield_code_length = number("subfield code length", 11, 1, &mut node);
    let base_address = number("base address of data", 12, 5, &mut node);
    text("encoding level", 17, &mut node);
    text("descriptive cataloging form", 18, &mut node);
    text("multipart resource record level", 19, &mut node);
    let length_of_length = number("length of field length", 20, 1, &mut node);
    let length_of_start = number(
        "length of starting character position", 21, 1, &mut node
    );
    let length_of_implementation = number(
        "length of implementation-defined portion", 22, 1, &mut node
    );
    record.push_child(node);
    ctx.add_summary("marc.record_type", char::from(record_type).to_string());
    if broken {
        return None
    }
    Some(Leader {
        record_length,
        coding_scheme,
        indicator_count,
        subfield_code_length,
        base_address,
        length_of_length,
        length_of_start,
        length_of_implementation,
    })
}

/// Decodes the directory.
///
/// Returns the directory node and the entries that can safely be used.
fn decode_directory(
    data: &ByteCursor, leader: &Leader
) -> (DecodedNode, Vec<(usize, DirectoryEntry)>) {
    let width = leader.entry_width();
    let dir_len = leader.base_address - LEADER_LEN - 1;
    let count = dir_len / width;
    let mut node = DecodedNode::new(
        "directory", data.abs(LEADER_LEN)..data.abs(leader.base_address)
    );
    if dir_len % width != 0 {
        node.annotate_with(Severity::Warning, DecodeError::new(
            ErrorKind::InvalidLength,
            format!("directory length {dir_len} not a multiple of {width}"),
            data.abs(LEADER_LEN)
        ));
    }
    if data.read_u8(leader.base_address - 1).ok() != Some(FIELD_TERMINATOR) {
        node.annotate_with(Severity::Warning, DecodeError::malformed(
            "missing directory terminator", data.abs(leader.base_address - 1)
        ));
    }
    let region_len = leader.record_length - leader.base_address;
    let mut res = Vec::with_capacity(count);
    for idx in 0..count {
        let offset = LEADER_LEN + idx * width;
        let mut entry_node = DecodedNode::new(
            "entry", data.abs(offset)..data.abs(offset + width)
        );
        match read_entry(data, offset, leader) {
            Ok(entry) => {
                entry_node.set_name(format!("entry {}", entry.tag_str()));
                entry_node.push_child(
                    DecodedNode::new("tag", data.abs(offset)..data.abs(offset + 3))
                        .with_value(NodeValue::Text(entry.tag_str().into_owned()))
                );
                entry_node.push_child(
                    DecodedNode::new(
                        "length",
                        data.abs(offset + 3)
                            ..data.abs(offset + 3 + leader.length_of_length)
                    ).with_value(NodeValue::Unsigned(entry.length as u64))
                );
                let start_offset = offset + 3 + leader.length_of_length;
                entry_node.push_child(
                    DecodedNode::new(
                        "start",
                        data.abs(start_offset)
                            ..data.abs(start_offset + leader.length_of_start)
                    ).with_value(NodeValue::Unsigned(entry.start as u64))
                );
                match entry.start.checked_add(entry.length) {
                    Some(end) if end <= region_len => {
                        res.push((idx, entry))
                    }
                    _ => {
                        entry_node.annotate(DecodeError::new(
                            ErrorKind::OutOfBounds,
                            format!(
                                "field at {} with length {} exceeds data \
                                 area of {} octets",
                                entry.start, entry.length, region_len
                            ),
                            data.abs(offset)
                        ));
                    }
                }
            }
            Err(err) => entry_node.annotate(err),
        }
        node.push_child(entry_node);
    }
    (node, res)
}

fn read_entry(
    data: &ByteCursor, offset: usize, leader: &Leader
) -> Result<DirectoryEntry, DecodeError> {
    let mut tag = [0u8; 3];
    tag.copy_from_slice(data.bytes(offset, 3)?);
    let length = digits(data, offset + 3, leader.length_of_length)?;
    let start = digits(
        data, offset + 3 + leader.length_of_length, leader.length_of_start
    )?;
    Ok(DirectoryEntry { tag, length, start })
}

/// Decodes the fields referenced by the directory.
///
/// Fields are added in the order of their position so that their ranges
/// can’t overlap. A field overlapping its predecessor is reported on its
/// entry in `directory` and skipped.
fn decode_fields(
    data: &ByteCursor,
    leader: &Leader,
    entries: &[(usize, DirectoryEntry)],
    directory: &mut DecodedNode,
) -> DecodedNode {
    let area = match data.subrange(
        leader.base_address, leader.record_length - leader.base_address
    ) {
        Ok(area) => area,
        Err(err) => {
            let mut node = DecodedNode::new("data", data.end()..data.end());
            node.annotate(err.into());
            return node
        }
    };
    let mut node = DecodedNode::new("data", area.base()..area.end());
    let mut sorted: Vec<_> = entries.to_vec();
    sorted.sort_by_key(|(_, entry)| entry.start);
    let mut last_end = 0;
    let mut overlapping = Vec::new();
    for (idx, entry) in sorted {
        if entry.start < last_end {
            overlapping.push((idx, entry.start));
            continue
        }
        last_end = entry.start + entry.length;
        // Bounds have been checked with the directory.
        let content = match area.subrange(entry.start, entry.length) {
            Ok(content) => content,
            Err(err) => {
                node.annotate(err.into());
                continue
            }
        };
        node.push_child(decode_field(&entry, content, leader));
    }
    for (idx, start) in overlapping {
        if let Some(entry) = directory.children_mut().get_mut(idx) {
            entry.annotate(DecodeError::malformed(
                "field overlaps the preceding field", area.abs(start)
            ));
        }
    }
    node
}

fn decode_field(
    entry: &DirectoryEntry, content: ByteCursor, leader: &Leader
) -> DecodedNode {
    let mut node = DecodedNode::new(
        entry.tag_str().into_owned(), content.base()..content.end()
    );
    let slice = content.as_slice();
    let body = match slice.split_last() {
        Some((&FIELD_TERMINATOR, body)) => body,
        _ => {
            node.annotate_with(Severity::Warning, DecodeError::malformed(
                "missing field terminator",
                content.abs(slice.len().saturating_sub(1))
            ));
            slice
        }
    };
    if entry.is_control_field() {
        node.set_value(text(body, leader));
        return node
    }

    let indicators = body.len().min(leader.indicator_count);
    if indicators < leader.indicator_count {
        node.annotate(DecodeError::new(
            ErrorKind::OutOfBounds, "field too short for indicators",
            content.base()
        ));
    }
    node.push_child(
        DecodedNode::new("indicators", content.base()..content.abs(indicators))
            .with_value(text(&body[..indicators], leader))
    );

    let code_len = leader.subfield_code_length.saturating_sub(1);
    let mut offset = indicators;
    for (idx, piece) in body[indicators..].split(|octet| {
        *octet == SUBFIELD_DELIMITER
    }).enumerate() {
        let piece_start = offset;
        offset += piece.len() + 1;
        if idx == 0 {
            if !piece.is_empty() {
                node.annotate_with(Severity::Warning, DecodeError::malformed(
                    "data before first subfield", content.abs(piece_start)
                ));
            }
            continue
        }
        // The delimiter precedes the piece.
        let start = piece_start - 1;
        let end = piece_start + piece.len();
        let mut subfield = DecodedNode::new(
            "subfield", content.abs(start)..content.abs(end)
        );
        if piece.len() < code_len {
            subfield.set_value(raw(piece));
            subfield.annotate(DecodeError::new(
                ErrorKind::OutOfBounds, "subfield too short for its code",
                content.abs(start)
            ));
        }
        else {
            let (code, value) = piece.split_at(code_len);
            subfield.set_name(
                format!("${}", String::from_utf8_lossy(code))
            );
            subfield.set_value(text(value, leader));
        }
        node.push_child(subfield);
    }
    node
}


//------------ Helpers -------------------------------------------------------

/// Reads a number encoded as `len` ASCII digits.
fn digits(
    cursor: &ByteCursor, offset: usize, len: usize
) -> Result<usize, DecodeError> {
    let octets = cursor.bytes(offset, len)?;
    if len == 0 {
        return Ok(0)
    }
    octets.iter().enumerate().try_fold(0usize, |res, (idx, octet)| {
        if !octet.is_ascii_digit() {
            return Err(DecodeError::new(
                ErrorKind::InvalidNumericField,
                format!("expected digit, found 0x{octet:02x}"),
                cursor.abs(offset + idx)
            ))
        }
        res.checked_mul(10)
            .and_then(|res| res.checked_add(usize::from(octet - b'0')))
            .ok_or_else(|| DecodeError::new(
                ErrorKind::InvalidNumericField, "number too large",
                cursor.abs(offset)
            ))
    })
}

fn text(octets: &[u8], leader: &Leader) -> NodeValue {
    if leader.is_utf8() {
        NodeValue::Text(String::from_utf8_lossy(octets).into_owned())
    }
    else {
        // Anything but UTF-8 is shown as Latin-1 which keeps ASCII intact.
        NodeValue::Text(octets.iter().map(|&octet| char::from(octet)).collect())
    }
}

fn raw(octets: &[u8]) -> NodeValue {
    NodeValue::Bytes(Bytes::copy_from_slice(octets))
}


//============ Tests =========================================================
