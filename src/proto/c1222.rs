//! ANSI C12.22, the protocol of utility meters.
//!
//! A message is an ACSE association request: a sequence of context tagged
//! header elements followed by the user information, which carries the
//! EPSEM. The EPSEM starts with a control octet, optionally followed by an
//! ED class, and then contains a list of length-prefixed services ending
//! with a zero length.
//!
//! Depending on the security mode of the EPSEM, the services may be
//! authenticated or encrypted. If the decode context carries a crypto
//! context, the authentication context is assembled from the cleartext
//! header elements and handed to the verifier together with the
//! ciphertext and MAC.

use std::ops::Range;
use bytes::Bytes;
use crate::crypto::{ApTitle, AuthContext, CryptoContext};
use crate::cursor::ByteCursor;
use crate::decode::{
    decode_generic, decode_structure, DecodeContext, DecodeError, DecodedNode,
    ErrorKind, Field, FieldDecoder, NodeValue, PrimitiveKind, Severity, Tlv,
};
use crate::ident::{Ident, Tag};
use crate::length::Length;
use crate::mode::Mode;


//------------ ACSE ----------------------------------------------------------

const OID: Field = Field::primitive("oid", PrimitiveKind::Oid);
const INTEGER: Field = Field::primitive("integer", PrimitiveKind::Integer);

const AP_TITLES: &[Field] = &[
    Field::primitive("universal", PrimitiveKind::Oid),
    Field::primitive("relative", PrimitiveKind::RelativeOid),
];

const AP_TITLE: Field = Field::new("ap-title", FieldDecoder::Choice(AP_TITLES));

const ACSE_FIELDS: &[Field] = &[
    Field::primitive("protocol-version", PrimitiveKind::BitString)
        .ctx(0).optional(),
    Field::explicit("application-context", 1, &OID).optional(),
    Field::explicit("called-AP-title", 2, &AP_TITLE).optional(),
    Field::explicit("called-AE-qualifier", 3, &INTEGER).optional(),
    Field::explicit("called-AP-invocation-id", 4, &INTEGER).optional(),
    Field::explicit("called-AE-invocation-id", 5, &INTEGER).optional(),
    Field::explicit("calling-AP-title", 6, &AP_TITLE).optional(),
    Field::explicit("calling-AE-qualifier", 7, &INTEGER).optional(),
    Field::explicit("calling-AP-invocation-id", 8, &INTEGER).optional(),
    Field::explicit("calling-AE-invocation-id", 9, &INTEGER).optional(),
    Field::primitive("mechanism-name", PrimitiveKind::Oid).ctx(11).optional(),
    Field::new(
        "calling-authentication-value",
        FieldDecoder::Custom(authentication_value)
    ).ctx(12).optional(),
    Field::new("user-information", FieldDecoder::Custom(user_information))
        .ctx(30),
];

pub const ACSE: Field = Field::new(
    "C12.22 ACSE", FieldDecoder::Sequence(ACSE_FIELDS)
).tagged(Tag::application(0));

/// Decodes the authentication value, labelling key id and IV.
fn authentication_value(tlv: &Tlv, ctx: &mut DecodeContext) -> DecodedNode {
    let mut node = decode_generic(tlv, ctx);
    label_authentication(&mut node);
    node
}

fn label_authentication(node: &mut DecodedNode) {
    if matches!(node.value(), NodeValue::Bytes(_)) {
        if node.tag() == Some(Tag::ctx(0)) {
            node.set_name("key-id")
        }
        else if node.tag() == Some(Tag::ctx(1)) {
            node.set_name("iv")
        }
    }
    node.children_mut().iter_mut().for_each(label_authentication)
}

/// Produces the shell of the user information.
///
/// The EPSEM inside can only be decoded once the header elements are
/// known, so this happens in [`decode_message`].
fn user_information(tlv: &Tlv, _: &mut DecodeContext) -> DecodedNode {
    DecodedNode::new("user-information", tlv.range())
}


//------------ decode_message ------------------------------------------------

/// Decodes a C12.22 message.
pub fn decode_message(
    cursor: ByteCursor, ctx: &mut DecodeContext
) -> DecodedNode {
    let mut node = decode_structure(&ACSE, cursor, ctx);
    let header = Header::from_node(&node);
    if let Some(title) = header.auth.called_ap_title.as_ref() {
        ctx.add_summary("c1222.called_ap_title", title.to_string());
    }
    if let Some(title) = header.auth.calling_ap_title.as_ref() {
        ctx.add_summary("c1222.calling_ap_title", title.to_string());
    }

    let info = match node.children_mut().iter_mut().find(|child| {
        child.name() == "user-information"
    }) {
        Some(info) => info,
        None => return node,
    };
    match locate_epsem(&cursor, info.range(), ctx.mode()) {
        Ok(epsem) => {
            let epsem = decode_epsem(epsem, &header, ctx);
            info.push_child(epsem);
        }
        Err(err) => info.annotate(err)
    }
    node
}

/// Finds the EPSEM octets within the user information.
///
/// The user information is an EXTERNAL whose encoding is octet-aligned.
fn locate_epsem<'a>(
    cursor: &ByteCursor<'a>, range: Range<usize>, mode: Mode
) -> Result<ByteCursor<'a>, DecodeError> {
    let info = Tlv::read(cursor, range.start - cursor.base(), mode)?;
    let content = info.content();
    let external = Tlv::read(&content, 0, mode)?;
    if external.ident() != Ident::constructed(Tag::EXTERNAL) {
        return Err(DecodeError::new(
            ErrorKind::UnexpectedTag,
            "user information is not an EXTERNAL", external.pos()
        ))
    }
    let content = external.content();
    let mut offset = 0;
    while offset < content.len() {
        let item = Tlv::read(&content, offset, mode)?;
        if item.ident() == Ident::primitive(Tag::ctx(1)) {
            return Ok(item.content())
        }
        offset = item.end();
    }
    Err(DecodeError::new(
        ErrorKind::MissingField, "missing octet-aligned EPSEM", content.end()
    ))
}


//------------ Header --------------------------------------------------------

/// The header elements needed for processing the EPSEM.
#[derive(Clone, Debug, Default)]
struct Header {
    auth: AuthContext,
    key_id: Option<u32>,
}

impl Header {
    fn from_node(node: &DecodedNode) -> Self {
        Header {
            auth: AuthContext {
                called_ap_title: ap_title(node, "called-AP-title"),
                called_ap_invocation_id: integer(
                    node, "called-AP-invocation-id"
                ),
                calling_ap_title: ap_title(node, "calling-AP-title"),
                calling_ae_qualifier: integer(node, "calling-AE-qualifier"),
                calling_ap_invocation_id: integer(
                    node, "calling-AP-invocation-id"
                ),
            },
            key_id: node.child("calling-authentication-value").and_then(|auth| {
                let octets = auth.find("key-id")?.value().as_bytes()?;
                if octets.len() > 4 {
                    return None
                }
                Some(octets.iter().fold(0u32, |res, x| (res << 8) | u32::from(*x)))
            }),
        }
    }
}

fn ap_title(node: &DecodedNode, name: &str) -> Option<ApTitle> {
    let title = node.child(name)?.children().first()?;
    match *title.value() {
        NodeValue::Oid(ref oid) => Some(ApTitle::Absolute(oid.clone())),
        NodeValue::Bytes(ref content) if title.name() == "relative" => {
            Some(ApTitle::Relative(content.clone()))
        }
        _ => None
    }
}

fn integer(node: &DecodedNode, name: &str) -> Option<i64> {
    node.child(name)?.value().as_i64()
}


//------------ EPSEM ---------------------------------------------------------

/// The length of the MAC at the end of a protected EPSEM.
pub const MAC_LEN: usize = 4;

/// The security mode of an EPSEM.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SecurityMode {
    Cleartext,
    CleartextWithAuthentication,
    CiphertextWithAuthentication,
    Reserved,
}

impl SecurityMode {
    pub fn from_control(control: u8) -> Self {
        match (control >> 2) & 0x03 {
            0 => SecurityMode::Cleartext,
            1 => SecurityMode::CleartextWithAuthentication,
            2 => SecurityMode::CiphertextWithAuthentication,
            _ => SecurityMode::Reserved,
        }
    }

    fn has_mac(self) -> bool {
        matches!(
            self,
            SecurityMode::CleartextWithAuthentication
                | SecurityMode::CiphertextWithAuthentication
        )
    }
}

const CONTROL_FLAGS: &[(&str, u8)] = &[
    ("reserved", 0x80),
    ("recovery-session", 0x40),
    ("proxy-service-used", 0x20),
    ("ed-class-included", 0x10),
    ("security-mode", 0x0C),
    ("response-control", 0x03),
];

fn decode_epsem(
    cursor: ByteCursor, header: &Header, ctx: &mut DecodeContext
) -> DecodedNode {
    let mut node = DecodedNode::new("EPSEM", cursor.base()..cursor.end());
    if let Err(err) = decode_epsem_content(cursor, header, ctx, &mut node) {
        node.annotate(err)
    }
    node
}

fn decode_epsem_content(
    cursor: ByteCursor,
    header: &Header,
    ctx: &mut DecodeContext,
    node: &mut DecodedNode,
) -> Result<(), DecodeError> {
    let control = cursor.read_u8(0)?;
    let mut control_node = DecodedNode::new(
        "control", cursor.abs(0)..cursor.abs(1)
    ).with_value(NodeValue::Unsigned(control.into()));
    for (idx, &(name, mask)) in CONTROL_FLAGS.iter().enumerate() {
        // Only the first flag covers the octet so siblings don't overlap.
        let range = if idx == 0 {
            cursor.abs(0)..cursor.abs(1)
        }
        else {
            cursor.abs(1)..cursor.abs(1)
        };
        let value = (control & mask) >> mask.trailing_zeros();
        control_node.push_child(
            DecodedNode::new(name, range)
                .with_value(NodeValue::Unsigned(value.into()))
        );
    }
    node.push_child(control_node);

    let mode = SecurityMode::from_control(control);
    ctx.add_summary("c1222.security_mode", u32::from((control >> 2) & 0x03));

    let mut offset = 1;
    if control & 0x10 != 0 {
        let ed_class = cursor.read_u32(offset)?;
        node.push_child(
            DecodedNode::new(
                "ed-class", cursor.abs(offset)..cursor.abs(offset + 4)
            ).with_value(NodeValue::Bytes(
                Bytes::copy_from_slice(&ed_class.to_be_bytes())
            ))
        );
        offset += 4;
    }

    let body_end = if mode.has_mac() {
        cursor.len().checked_sub(MAC_LEN).filter(|end| *end >= offset)
            .ok_or_else(|| {
                DecodeError::new(
                    ErrorKind::InvalidLength,
                    "EPSEM too short for its MAC", cursor.abs(offset)
                )
            })?
    }
    else {
        cursor.len()
    };
    let body = cursor.subrange(offset, body_end - offset)?;

    match mode {
        SecurityMode::Cleartext => {
            decode_services(body, node);
        }
        SecurityMode::CleartextWithAuthentication => {
            decode_services(body, node);
            let mac = cursor.tail(body_end)?;
            let cleartext = cursor.bytes(0, body_end)?;
            let verification = match ctx.crypto() {
                Some(crypto) => verify(crypto, header, cleartext, &[], mac),
                None => None
            };
            push_mac(mac, verification.as_ref(), ctx, node);
        }
        SecurityMode::CiphertextWithAuthentication => {
            let mac = cursor.tail(body_end)?;
            let cleartext = cursor.bytes(0, offset)?;
            let verification = match ctx.crypto() {
                Some(crypto) => {
                    verify(crypto, header, cleartext, body.as_slice(), mac)
                }
                None => None
            };
            node.push_child(encrypted_services(body, verification.as_ref()));
            push_mac(mac, verification.as_ref(), ctx, node);
        }
        SecurityMode::Reserved => {
            node.push_child(
                DecodedNode::new("data", body.base()..body.end())
                    .with_value(NodeValue::Bytes(
                        Bytes::copy_from_slice(body.as_slice())
                    ))
            );
            return Err(DecodeError::unsupported(
                "reserved security mode", cursor.base()
            ))
        }
    }
    Ok(())
}


//------------ Verification --------------------------------------------------

/// The result of handing protected content to the verifier.
enum Verified {
    Done(crate::crypto::Verification),
    NoKey(u32),
}

fn verify(
    crypto: &CryptoContext,
    header: &Header,
    cleartext: &[u8],
    ciphertext: &[u8],
    mac: ByteCursor,
) -> Option<Verified> {
    let key_id = header.key_id.unwrap_or(0);
    let key = match crypto.key(key_id) {
        Some(key) => key,
        None => return Some(Verified::NoKey(key_id))
    };
    let context = header.auth.assemble(cleartext);
    Some(Verified::Done(crypto.verifier().verify_and_decrypt(
        &context, key, ciphertext, mac.as_slice()
    )))
}

fn push_mac(
    mac: ByteCursor,
    verification: Option<&Verified>,
    ctx: &mut DecodeContext,
    node: &mut DecodedNode,
) {
    let mut mac_node = DecodedNode::new("mac", mac.base()..mac.end())
        .with_value(NodeValue::Bytes(Bytes::copy_from_slice(mac.as_slice())));
    match verification {
        Some(Verified::Done(res)) => {
            ctx.add_summary("c1222.authenticated", res.authenticated);
            if !res.authenticated {
                mac_node.annotate(DecodeError::new(
                    ErrorKind::Authentication,
                    "message authentication failed", mac.base()
                ))
            }
        }
        Some(Verified::NoKey(key_id)) => {
            mac_node.annotate_with(
                Severity::Warning,
                DecodeError::new(
                    ErrorKind::Authentication,
                    format!("no key with id {key_id}"), mac.base()
                )
            )
        }
        None => { }
    }
    node.push_child(mac_node)
}

fn encrypted_services(
    body: ByteCursor, verification: Option<&Verified>
) -> DecodedNode {
    let range = body.base()..body.end();
    let plaintext = match verification {
        Some(Verified::Done(res)) => res.plaintext.as_ref(),
        _ => None
    };
    let plaintext = match plaintext {
        Some(plaintext) => plaintext,
        None => {
            return DecodedNode::new("encrypted services", range).with_value(
                NodeValue::Bytes(Bytes::copy_from_slice(body.as_slice()))
            )
        }
    };
    let mut node = DecodedNode::new("decrypted services", range)
        .with_value(NodeValue::Bytes(plaintext.clone()));
    if plaintext.len() == body.len() {
        decode_services(
            ByteCursor::with_base(plaintext.as_ref(), body.base()), &mut node
        );
    }
    else {
        node.annotate(DecodeError::new(
            ErrorKind::InvalidLength,
            format!(
                "plaintext of {} octets for {} octets of ciphertext",
                plaintext.len(), body.len()
            ),
            body.base()
        ))
    }
    node
}


//------------ Services ------------------------------------------------------

/// Decodes the list of services.
///
/// Each service is preceded by its length in BER form. A length of zero
/// ends the list.
fn decode_services(cursor: ByteCursor, node: &mut DecodedNode) {
    let mut offset = 0;
    loop {
        if offset >= cursor.len() {
            node.annotate_with(
                Severity::Warning,
                DecodeError::malformed(
                    "missing end of services", cursor.end()
                )
            );
            return
        }
        match decode_service(cursor, offset, node) {
            Ok(Some(end)) => offset = end,
            Ok(None) => break,
            Err(err) => {
                node.annotate(err);
                return
            }
        }
    }
    offset += 1;
    if offset < cursor.len() {
        node.annotate(DecodeError::new(
            ErrorKind::TrailingData,
            format!("{} octets after end of services", cursor.len() - offset),
            cursor.abs(offset)
        ));
    }
}

/// Decodes the service at `offset`.
///
/// Returns the offset of the next service or `None` at the end of the
/// list.
fn decode_service(
    cursor: ByteCursor, offset: usize, parent: &mut DecodedNode
) -> Result<Option<usize>, DecodeError> {
    let (len, start) = match Length::read(&cursor, offset, Mode::Ber)? {
        (Length::Definite(0), end) => {
            parent.push_child(DecodedNode::new(
                "end of services", cursor.abs(offset)..cursor.abs(end)
            ));
            return Ok(None)
        }
        (Length::Definite(len), start) => (len, start),
        (Length::Indefinite, _) => {
            return Err(DecodeError::malformed_length(
                "indefinite service length", cursor.abs(offset)
            ))
        }
    };
    let data = cursor.subrange(start, len).map_err(|_| {
        DecodeError::new(
            ErrorKind::InvalidLength,
            format!("service of {len} octets exceeds EPSEM"),
            cursor.abs(offset)
        )
    })?;
    let code = data.read_u8(0)?;
    let mut node = DecodedNode::new(
        service_name(code).unwrap_or("unknown service"),
        cursor.abs(offset)..data.end()
    );
    node.push_child(
        DecodedNode::new("length", cursor.abs(offset)..cursor.abs(start))
            .with_value(NodeValue::Unsigned(len as u64))
    );
    node.push_child(
        DecodedNode::new("code", data.abs(0)..data.abs(1))
            .with_value(NodeValue::Unsigned(code.into()))
    );
    if let Err(err) = decode_parts(data, service_parts(code), &mut node) {
        node.annotate(err)
    }
    parent.push_child(node);
    Ok(Some(start + len))
}

fn service_name(code: u8) -> Option<&'static str> {
    Some(match code {
        0x00 => "ok",
        0x01 => "error",
        0x02 => "service not supported",
        0x03 => "insufficient security clearance",
        0x04 => "operation not possible",
        0x05 => "inappropriate action requested",
        0x06 => "device busy",
        0x07 => "data not ready",
        0x08 => "data locked",
        0x09 => "renegotiate request",
        0x0A => "invalid service sequence state",
        0x0B => "security mechanism error",
        0x0C => "unknown application title",
        0x0D => "network time-out",
        0x0E => "network not reachable",
        0x0F => "request too large",
        0x10 => "response too large",
        0x11 => "segmentation not possible",
        0x12 => "segmentation error",
        0x20 => "identify",
        0x21 => "terminate",
        0x22 => "disconnect",
        0x24 => "deregister",
        0x25 => "resolve",
        0x26 => "trace",
        0x27 => "register",
        0x30 => "full read",
        0x3E => "default read",
        0x3F => "partial read",
        0x40 => "full write",
        0x4E => "default write",
        0x4F => "partial write",
        0x50 => "logon",
        0x51 => "security",
        0x52 => "logoff",
        0x70 => "wait",
        _ => return None
    })
}

/// A field within the data of a request.
#[derive(Clone, Copy, Debug)]
enum Part {
    U8(&'static str),
    U16(&'static str),
    U24(&'static str),
    U32(&'static str),
    Text(&'static str, usize),

    /// Table data of the length given by the preceding `count` field,
    /// followed by its checksum.
    Table,
}

fn service_parts(code: u8) -> &'static [Part] {
    match code {
        0x30 => &[Part::U16("table-id")],
        0x3F => &[
            Part::U16("table-id"), Part::U24("offset"), Part::U16("count")
        ],
        0x40 => &[Part::U16("table-id"), Part::U16("count"), Part::Table],
        0x4F => &[
            Part::U16("table-id"), Part::U24("offset"), Part::U16("count"),
            Part::Table
        ],
        0x50 => &[
            Part::U16("user-id"), Part::Text("user", 10),
            Part::U32("session-idle-timeout")
        ],
        0x51 => &[Part::Text("password", 20)],
        0x70 => &[Part::U8("time")],
        _ => &[]
    }
}

/// Decodes the data of a service after its code.
///
/// Data not described by `parts` is added as a single node.
fn decode_parts(
    data: ByteCursor, parts: &[Part], node: &mut DecodedNode
) -> Result<(), DecodeError> {
    let mut offset = 1;
    let mut count = 0;
    for part in parts {
        let (name, width, value): (&str, usize, u64) = match *part {
            Part::U8(name) => (name, 1, data.read_u8(offset)?.into()),
            Part::U16(name) => (name, 2, data.read_u16(offset)?.into()),
            Part::U24(name) => (name, 3, data.read_u24(offset)?.into()),
            Part::U32(name) => (name, 4, data.read_u32(offset)?.into()),
            Part::Text(name, len) => {
                let text = data.bytes(offset, len)?;
                node.push_child(
                    DecodedNode::new(
                        name, data.abs(offset)..data.abs(offset + len)
                    ).with_value(NodeValue::Text(
                        String::from_utf8_lossy(text)
                            .trim_end_matches(['\0', ' '])
                            .into()
                    ))
                );
                offset += len;
                continue
            }
            Part::Table => {
                offset = decode_table_data(data, offset, count, node)?;
                continue
            }
        };
        if name == "count" {
            count = value as usize;
        }
        node.push_child(
            DecodedNode::new(name, data.abs(offset)..data.abs(offset + width))
                .with_value(NodeValue::Unsigned(value))
        );
        offset += width;
    }
    if offset < data.len() {
        node.push_child(
            DecodedNode::new("data", data.abs(offset)..data.end())
                .with_value(NodeValue::Bytes(
                    Bytes::copy_from_slice(data.bytes(offset, data.len() - offset)?)
                ))
        );
    }
    Ok(())
}

/// Decodes table data and checks its checksum.
///
/// The checksum is the two’s complement of the sum of the data octets.
fn decode_table_data(
    data: ByteCursor, offset: usize, count: usize, node: &mut DecodedNode
) -> Result<usize, DecodeError> {
    let table = data.bytes(offset, count)?;
    node.push_child(
        DecodedNode::new("table-data", data.abs(offset)..data.abs(offset + count))
            .with_value(NodeValue::Bytes(Bytes::copy_from_slice(table)))
    );
    let offset = offset + count;
    let checksum = data.read_u8(offset)?;
    let mut checksum_node = DecodedNode::new(
        "checksum", data.abs(offset)..data.abs(offset + 1)
    ).with_value(NodeValue::Unsigned(checksum.into()));
    let sum = table.iter().fold(checksum, |sum, x| sum.wrapping_add(*x));
    if sum != 0 {
        checksum_node.annotate(DecodeError::malformed(
            "table data checksum mismatch", data.abs(offset)
        ))
    }
    node.push_child(checksum_node);
    Ok(offset + 1)
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use parking_lot::Mutex;
    use crate::crypto::{KeyStore, Verification, Verifier};
    use crate::decode::SummaryValue;
    use crate::encode;
    use crate::registry::Registry;
    use super::*;

    fn header_elements() -> Vec<u8> {
        [
            encode::explicit(1, &encode::oid(
                &"2.16.124.113620.1.22".parse().unwrap()
            )),
            encode::explicit(2, &encode::oid(
                &"2.16.124.113620.1.22.0".parse().unwrap()
            )),
            encode::explicit(6, &encode::primitive(
                Tag::RELATIVE_OID, b"\x81\x05"
            )),
            encode::explicit(7, &encode::integer(4)),
            encode::explicit(8, &encode::integer(300)),
            encode::explicit(12, &encode::explicit(1, &[
                encode::primitive(Tag::ctx(0), b"\x02"),
                encode::primitive(Tag::ctx(1), b"\x0a\x0b\x0c\x0d"),
            ].concat())),
        ].concat()
    }

    fn message(epsem: &[u8]) -> Vec<u8> {
        let info = encode::tlv(
            Ident::constructed(Tag::ctx(30)),
            &encode::constructed(Tag::EXTERNAL, &[
                &encode::primitive(Tag::ctx(1), epsem)
            ])
        );
        encode::tlv(
            Ident::constructed(Tag::application(0)),
            &[header_elements(), info].concat()
        )
    }

    fn auth_context() -> AuthContext {
        AuthContext {
            called_ap_title: Some(ApTitle::Absolute(
                "2.16.124.113620.1.22.0".parse().unwrap()
            )),
            called_ap_invocation_id: None,
            calling_ap_title: Some(ApTitle::Relative(
                Bytes::from_static(b"\x81\x05")
            )),
            calling_ae_qualifier: Some(4),
            calling_ap_invocation_id: Some(300),
        }
    }

    /// A verifier that inverts the ciphertext and accepts one MAC.
    #[derive(Default)]
    struct TestVerifier {
        contexts: Mutex<Vec<Vec<u8>>>,
    }

    impl Verifier for TestVerifier {
        fn verify_and_decrypt(
            &self, context: &[u8], key: &[u8], ciphertext: &[u8], mac: &[u8]
        ) -> Verification {
            self.contexts.lock().push(context.to_vec());
            Verification {
                plaintext: Some(ciphertext.iter().map(|x| !x).collect()),
                authenticated: key == b"key" && mac == b"\x01\x02\x03\x04",
            }
        }
    }

    #[test]
    fn cleartext_read() {
        // Full read of table 7, then the end of services.
        let data = message(b"\x80\x03\x30\x00\x07\x00");
        let registry = Registry::new();
        let mut ctx = DecodeContext::new(&registry, Mode::Ber);
        let node = decode_message(ByteCursor::new(&data), &mut ctx);
        assert_eq!(node.error_count(), 0, "{node}");
        assert!(node.ranges_nest(), "{node}");
        assert_eq!(
            node.path(&["calling-authentication-value"]).unwrap()
                .find("key-id").unwrap().value().as_bytes(),
            Some(&b"\x02"[..])
        );
        let epsem = node.path(&["user-information", "EPSEM"]).unwrap();
        assert_eq!(
            epsem.path(&["full read", "table-id"]).unwrap().value().as_i64(),
            Some(7)
        );
        assert!(epsem.child("end of services").is_some());
        let summary = ctx.summary();
        assert_eq!(summary[0].key, "c1222.called_ap_title");
        assert_eq!(
            summary[0].value,
            SummaryValue::Text("2.16.124.113620.1.22.0".into())
        );
        assert_eq!(
            summary[1].value, SummaryValue::Text(".8105".into())
        );
        assert_eq!(summary[2].key, "c1222.security_mode");
        assert_eq!(summary[2].value, SummaryValue::Unsigned(0));
    }

    #[test]
    fn encrypted_services() {
        let services = b"\x01\x52\x00";
        let mut epsem = vec![0x98, 0xde, 0xad, 0xbe, 0xef];
        epsem.extend(services.iter().map(|x| !x));
        epsem.extend_from_slice(b"\x01\x02\x03\x04");
        let data = message(&epsem);

        let verifier = TestVerifier::default();
        let mut keys = KeyStore::new();
        keys.insert(2, &b"key"[..]);
        let registry = Registry::new();
        let mut ctx = DecodeContext::new(&registry, Mode::Ber)
            .with_crypto(CryptoContext::new(&verifier, &keys));
        let node = decode_message(ByteCursor::new(&data), &mut ctx);
        assert_eq!(node.error_count(), 0, "{node}");
        assert!(node.ranges_nest(), "{node}");
        let epsem = node.path(&["user-information", "EPSEM"]).unwrap();
        assert!(epsem.path(&["decrypted services", "logoff"]).is_some());
        assert_eq!(
            epsem.child("ed-class").unwrap().value().as_bytes(),
            Some(&b"\xde\xad\xbe\xef"[..])
        );
        assert!(ctx.summary().iter().any(|item| {
            item.key == "c1222.authenticated"
                && item.value == SummaryValue::Bool(true)
        }));
        assert_eq!(
            verifier.contexts.lock().as_slice(),
            [auth_context().assemble(b"\x98\xde\xad\xbe\xef")]
        );
    }

    #[test]
    fn failed_authentication() {
        let data = message(b"\x84\x01\x21\x00\x09\x09\x09\x09");
        let verifier = TestVerifier::default();
        let mut keys = KeyStore::new();
        keys.insert(2, &b"key"[..]);
        let registry = Registry::new();
        let mut ctx = DecodeContext::new(&registry, Mode::Ber)
            .with_crypto(CryptoContext::new(&verifier, &keys));
        let node = decode_message(ByteCursor::new(&data), &mut ctx);
        let mac = node.find("mac").unwrap();
        assert!(mac.has_annotation(ErrorKind::Authentication));
        assert!(node.find("terminate").is_some());
        assert_eq!(
            verifier.contexts.lock()[0],
            auth_context().assemble(b"\x84\x01\x21\x00")
        );
    }

    #[test]
    fn missing_key() {
        let data = message(b"\x84\x00\x09\x09\x09\x09");
        let verifier = TestVerifier::default();
        let keys = KeyStore::new();
        let registry = Registry::new();
        let mut ctx = DecodeContext::new(&registry, Mode::Ber)
            .with_crypto(CryptoContext::new(&verifier, &keys));
        let node = decode_message(ByteCursor::new(&data), &mut ctx);
        assert_eq!(node.error_count(), 0, "{node}");
        assert!(node.find("mac").unwrap().has_annotation(
            ErrorKind::Authentication
        ));
        assert!(verifier.contexts.lock().is_empty());
    }

    #[test]
    fn write_checksum() {
        // Full write of two octets to table 3 with a bad checksum.
        let data = message(
            b"\x80\x08\x40\x00\x03\x00\x02\x10\x20\x00\x00"
        );
        let registry = Registry::new();
        let mut ctx = DecodeContext::new(&registry, Mode::Ber);
        let node = decode_message(ByteCursor::new(&data), &mut ctx);
        let write = node.find("full write").unwrap();
        assert_eq!(
            write.child("table-data").unwrap().value().as_bytes(),
            Some(&b"\x10\x20"[..])
        );
        assert!(write.child("checksum").unwrap().has_annotation(
            ErrorKind::MalformedValue
        ));
    }

    #[test]
    fn broken_services() {
        let registry = Registry::new();
        let mut ctx = DecodeContext::new(&registry, Mode::Ber);

        let data = message(b"\x80\x05\x30\x00");
        let node = decode_message(ByteCursor::new(&data), &mut ctx);
        assert!(node.has_annotation(ErrorKind::InvalidLength));

        let data = message(b"\x80\x01\x00");
        let node = decode_message(ByteCursor::new(&data), &mut ctx);
        assert!(node.find("ok").is_some());
        assert!(node.find("EPSEM").unwrap().annotations().iter().any(|item| {
            item.severity() == Severity::Warning
        }));

        let data = message(b"\x88\x00");
        let node = decode_message(ByteCursor::new(&data), &mut ctx);
        assert!(node.has_annotation(ErrorKind::InvalidLength));
    }
}
