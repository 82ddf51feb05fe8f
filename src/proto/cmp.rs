//! The Certificate Management Protocol.
//!
//! Messages are carried over HTTP, identified by the media type
//! `application/pkixcmp`, or over TCP with a small transport header in
//! front of each message. Both the legacy header and the version 10 header
//! are understood.
//!
//! Messages may contain other messages, either in a `nested` body or in
//! the `origPKIMessage` general info. Both are decoded recursively and
//! are bounded by the depth limit of the decode context.

use crate::cursor::ByteCursor;
use crate::decode::{
    decode_field, decode_generic, decode_structure, DecodeContext,
    DecodeError, DecodedNode, ErrorKind, Field, FieldDecoder, NodeValue,
    PrimitiveKind, Tlv,
};
use crate::registry::{Discriminator, Registry};
use crate::string::CharSet;
use super::pkix::{
    ALGORITHM_IDENTIFIER, ATTRIBUTE, CERTIFICATE, CERTIFICATES, EXTENSIONS,
    GENERAL_NAME, NAME, PUBLIC_KEY_INFO,
};


//------------ Registration --------------------------------------------------

pub const MEDIA_TYPE: &str = "application/pkixcmp";

/// The namespace for the general info types.
pub const INFO_TYPE_NAMESPACE: &str = "cmp.itav";

pub fn register(registry: &mut Registry) {
    registry.register(Discriminator::media_type(MEDIA_TYPE), decode_message);
    for &(oid, decoder) in INFO_TYPES {
        registry.register(Discriminator::Oid(oid.into()), decoder);
    }
}

type InfoDecoder = fn(ByteCursor, &mut DecodeContext) -> DecodedNode;

/// The general info values we know about, by the dotted info type.
const INFO_TYPES: &[(&str, InfoDecoder)] = &[
    ("1.3.6.1.5.5.7.4.1", ca_prot_enc_cert),
    ("1.3.6.1.5.5.7.4.4", preferred_symm_alg),
    ("1.3.6.1.5.5.7.4.13", implicit_confirm),
    ("1.3.6.1.5.5.7.4.14", confirm_wait_time),
    ("1.3.6.1.5.5.7.4.15", orig_pki_message),
    ("1.3.6.1.5.5.7.4.16", supp_lang_tags),
];

fn ca_prot_enc_cert(cursor: ByteCursor, ctx: &mut DecodeContext) -> DecodedNode {
    decode_structure(&CERTIFICATE.named("caProtEncCert"), cursor, ctx)
}

fn preferred_symm_alg(
    cursor: ByteCursor, ctx: &mut DecodeContext
) -> DecodedNode {
    decode_structure(
        &ALGORITHM_IDENTIFIER.named("preferredSymmAlg"), cursor, ctx
    )
}

fn implicit_confirm(cursor: ByteCursor, ctx: &mut DecodeContext) -> DecodedNode {
    decode_structure(&IMPLICIT_CONFIRM, cursor, ctx)
}

fn confirm_wait_time(
    cursor: ByteCursor, ctx: &mut DecodeContext
) -> DecodedNode {
    decode_structure(&CONFIRM_WAIT_TIME, cursor, ctx)
}

fn orig_pki_message(cursor: ByteCursor, ctx: &mut DecodeContext) -> DecodedNode {
    decode_structure(&ORIG_PKI_MESSAGE, cursor, ctx)
}

fn supp_lang_tags(cursor: ByteCursor, ctx: &mut DecodeContext) -> DecodedNode {
    decode_structure(&SUPP_LANG_TAGS, cursor, ctx)
}

const IMPLICIT_CONFIRM: Field = Field::primitive(
    "implicitConfirm", PrimitiveKind::Null
);
const CONFIRM_WAIT_TIME: Field = Field::primitive(
    "confirmWaitTime", PrimitiveKind::GeneralizedTime
);
const ORIG_PKI_MESSAGE: Field = Field::new(
    "origPKIMessage", FieldDecoder::SequenceOf(&PKI_MESSAGE)
);
const SUPP_LANG_TAGS: Field = Field::new(
    "suppLangTags", FieldDecoder::SequenceOf(&UTF8_STRING)
);


//------------ Common types --------------------------------------------------

const INTEGER: Field = Field::primitive("integer", PrimitiveKind::Integer);
const UTF8_STRING: Field = Field::primitive(
    "text", PrimitiveKind::Text(CharSet::Utf8)
);

const FREE_TEXT: Field = Field::new(
    "freeText", FieldDecoder::SequenceOf(&UTF8_STRING)
);

const STATUS_INFO_FIELDS: &[Field] = &[
    Field::primitive("status", PrimitiveKind::Integer).summary("cmp.status"),
    FREE_TEXT.named("statusString").optional(),
    Field::primitive("failInfo", PrimitiveKind::BitString).optional(),
];

const STATUS_INFO: Field = Field::new(
    "statusInfo", FieldDecoder::Sequence(STATUS_INFO_FIELDS)
);

const INFO_TYPE_AND_VALUE_FIELDS: &[Field] = &[
    Field::primitive("infoType", PrimitiveKind::Oid).key(),
    Field::new("infoValue", FieldDecoder::Dispatch(INFO_TYPE_NAMESPACE))
        .optional(),
];

const INFO_TYPE_AND_VALUE: Field = Field::new(
    "infoTypeAndValue", FieldDecoder::Sequence(INFO_TYPE_AND_VALUE_FIELDS)
);

const CERT_ID_FIELDS: &[Field] = &[
    GENERAL_NAME.named("issuer"),
    Field::primitive("serialNumber", PrimitiveKind::Integer),
];

const CERT_ID: Field = Field::new("certId", FieldDecoder::Sequence(CERT_ID_FIELDS));

const ANY_VALUE: Field = Field::new("value", FieldDecoder::Any);


//------------ PKIHeader -----------------------------------------------------

const GENERALIZED_TIME: Field = Field::primitive(
    "time", PrimitiveKind::GeneralizedTime
);
const OCTET_STRING: Field = Field::primitive(
    "octets", PrimitiveKind::OctetString
);
const GENERAL_INFO: Field = Field::new(
    "generalInfo", FieldDecoder::SequenceOf(&INFO_TYPE_AND_VALUE)
);

const HEADER_FIELDS: &[Field] = &[
    Field::primitive("pvno", PrimitiveKind::Integer).summary("cmp.pvno"),
    GENERAL_NAME.named("sender"),
    GENERAL_NAME.named("recipient"),
    Field::explicit("messageTime", 0, &GENERALIZED_TIME).optional(),
    Field::explicit("protectionAlg", 1, &ALGORITHM_IDENTIFIER).optional(),
    Field::explicit("senderKID", 2, &OCTET_STRING).optional(),
    Field::explicit("recipKID", 3, &OCTET_STRING).optional(),
    Field::explicit("transactionID", 4, &OCTET_STRING).optional(),
    Field::explicit("senderNonce", 5, &OCTET_STRING).optional(),
    Field::explicit("recipNonce", 6, &OCTET_STRING).optional(),
    Field::explicit("freeText", 7, &FREE_TEXT).optional(),
    Field::explicit("generalInfo", 8, &GENERAL_INFO).optional(),
];


//------------ Certificate requests ------------------------------------------

const CONTROLS: Field = Field::new("controls", FieldDecoder::SequenceOf(&ATTRIBUTE));

const CERT_TEMPLATE_FIELDS: &[Field] = &[
    Field::primitive("version", PrimitiveKind::Integer).ctx(0).optional(),
    Field::primitive("serialNumber", PrimitiveKind::Integer).ctx(1).optional(),
    ALGORITHM_IDENTIFIER.named("signingAlg").ctx(2).optional(),
    Field::explicit("issuer", 3, &NAME).optional(),
    Field::new("validity", FieldDecoder::Any).ctx(4).optional(),
    Field::explicit("subject", 5, &NAME).optional(),
    PUBLIC_KEY_INFO.named("publicKey").ctx(6).optional(),
    Field::primitive("issuerUID", PrimitiveKind::BitString).ctx(7).optional(),
    Field::primitive("subjectUID", PrimitiveKind::BitString).ctx(8).optional(),
    EXTENSIONS.ctx(9).optional(),
];

const CERT_TEMPLATE: Field = Field::new(
    "certTemplate", FieldDecoder::Sequence(CERT_TEMPLATE_FIELDS)
);

const CERT_REQUEST_FIELDS: &[Field] = &[
    Field::primitive("certReqId", PrimitiveKind::Integer),
    CERT_TEMPLATE,
    CONTROLS.optional(),
];

const PROOF_OF_POSSESSION: &[Field] = &[
    Field::primitive("raVerified", PrimitiveKind::Null).ctx(0),
    Field::new("signature", FieldDecoder::Any).ctx(1),
    Field::new("keyEncipherment", FieldDecoder::Any).ctx(2),
    Field::new("keyAgreement", FieldDecoder::Any).ctx(3),
];

const CERT_REQ_MSG_FIELDS: &[Field] = &[
    Field::new("certReq", FieldDecoder::Sequence(CERT_REQUEST_FIELDS)),
    Field::new("popo", FieldDecoder::Choice(PROOF_OF_POSSESSION)).optional(),
    CONTROLS.named("regInfo").optional(),
];

const CERT_REQ_MSG: Field = Field::new(
    "certReqMsg", FieldDecoder::Sequence(CERT_REQ_MSG_FIELDS)
);

const CERT_REQ_MESSAGES: Field = Field::new(
    "certReqMessages", FieldDecoder::SequenceOf(&CERT_REQ_MSG)
);

const CERTIFICATION_REQUEST_FIELDS: &[Field] = &[
    Field::new("certificationRequestInfo", FieldDecoder::Any),
    ALGORITHM_IDENTIFIER.named("signatureAlgorithm"),
    Field::primitive("signature", PrimitiveKind::BitString),
];

const CERTIFICATION_REQUEST: Field = Field::new(
    "certificationRequest",
    FieldDecoder::Sequence(CERTIFICATION_REQUEST_FIELDS)
);


//------------ Certificate responses -----------------------------------------

const ENCRYPTED_VALUE: Field = Field::new("encryptedValue", FieldDecoder::Any);

const CERT_OR_ENC_CERT: &[Field] = &[
    Field::explicit("certificate", 0, &CERTIFICATE),
    Field::explicit("encryptedCert", 1, &ENCRYPTED_VALUE),
];

const CERTIFIED_KEY_PAIR_FIELDS: &[Field] = &[
    Field::new("certOrEncCert", FieldDecoder::Choice(CERT_OR_ENC_CERT)),
    Field::explicit("privateKey", 0, &ENCRYPTED_VALUE).optional(),
    Field::explicit("publicationInfo", 1, &ANY_VALUE).optional(),
];

const CERTIFIED_KEY_PAIR: Field = Field::new(
    "certifiedKeyPair", FieldDecoder::Sequence(CERTIFIED_KEY_PAIR_FIELDS)
);

const CERT_RESPONSE_FIELDS: &[Field] = &[
    Field::primitive("certReqId", PrimitiveKind::Integer),
    STATUS_INFO.named("status"),
    CERTIFIED_KEY_PAIR.optional(),
    Field::primitive("rspInfo", PrimitiveKind::OctetString).optional(),
];

const CERT_RESPONSE: Field = Field::new(
    "certResponse", FieldDecoder::Sequence(CERT_RESPONSE_FIELDS)
);

const CERT_REP_MESSAGE_FIELDS: &[Field] = &[
    Field::explicit("caPubs", 1, &CERTIFICATES).optional(),
    Field::new("response", FieldDecoder::SequenceOf(&CERT_RESPONSE)),
];

const CERT_REP_MESSAGE: Field = Field::new(
    "certRepMessage", FieldDecoder::Sequence(CERT_REP_MESSAGE_FIELDS)
);


//------------ Other bodies --------------------------------------------------

const CHALLENGE_FIELDS: &[Field] = &[
    ALGORITHM_IDENTIFIER.named("owf").optional(),
    Field::primitive("witness", PrimitiveKind::OctetString),
    Field::primitive("challenge", PrimitiveKind::OctetString),
];

const CHALLENGE: Field = Field::new(
    "challenge", FieldDecoder::Sequence(CHALLENGE_FIELDS)
);

const KEY_REC_REP_FIELDS: &[Field] = &[
    STATUS_INFO.named("status"),
    Field::explicit("newSigCert", 0, &CERTIFICATE).optional(),
    Field::explicit("caCerts", 1, &CERTIFICATES).optional(),
    Field::explicit("keyPairHist", 2, &KEY_PAIR_HIST).optional(),
];

const KEY_PAIR_HIST: Field = Field::new(
    "keyPairHist", FieldDecoder::SequenceOf(&CERTIFIED_KEY_PAIR)
);

const REV_DETAILS_FIELDS: &[Field] = &[
    CERT_TEMPLATE.named("certDetails"),
    EXTENSIONS.named("crlEntryDetails").optional(),
];

const REV_DETAILS: Field = Field::new(
    "revDetails", FieldDecoder::Sequence(REV_DETAILS_FIELDS)
);

const CERT_IDS: Field = Field::new("revCerts", FieldDecoder::SequenceOf(&CERT_ID));
const CRLS: Field = Field::new("crls", FieldDecoder::SequenceOf(&ANY_VALUE));

const REV_REP_FIELDS: &[Field] = &[
    Field::new("status", FieldDecoder::SequenceOf(&STATUS_INFO)),
    Field::explicit("revCerts", 0, &CERT_IDS).optional(),
    Field::explicit("crls", 1, &CRLS).optional(),
];

const CA_KEY_UPD_ANN_FIELDS: &[Field] = &[
    CERTIFICATE.named("oldWithNew"),
    CERTIFICATE.named("newWithOld"),
    CERTIFICATE.named("newWithNew"),
];

const REV_ANN_FIELDS: &[Field] = &[
    Field::primitive("status", PrimitiveKind::Integer),
    CERT_ID,
    Field::primitive("willBeRevokedAt", PrimitiveKind::GeneralizedTime),
    Field::primitive("badSinceDate", PrimitiveKind::GeneralizedTime),
    EXTENSIONS.named("crlDetails").optional(),
];

const ERROR_MSG_FIELDS: &[Field] = &[
    STATUS_INFO.named("pKIStatusInfo"),
    Field::primitive("errorCode", PrimitiveKind::Integer).optional(),
    FREE_TEXT.named("errorDetails").optional(),
];

const CERT_STATUS_FIELDS: &[Field] = &[
    Field::primitive("certHash", PrimitiveKind::OctetString),
    Field::primitive("certReqId", PrimitiveKind::Integer),
    STATUS_INFO.optional(),
];

const CERT_STATUS: Field = Field::new(
    "certStatus", FieldDecoder::Sequence(CERT_STATUS_FIELDS)
);

const POLL_REQ_FIELDS: &[Field] = &[
    Field::primitive("certReqId", PrimitiveKind::Integer),
];

const POLL_REP_FIELDS: &[Field] = &[
    Field::primitive("certReqId", PrimitiveKind::Integer),
    Field::primitive("checkAfter", PrimitiveKind::Integer),
    FREE_TEXT.named("reason").optional(),
];

const POLL_REQ: Field = Field::new("pollReq", FieldDecoder::Sequence(POLL_REQ_FIELDS));
const POLL_REP: Field = Field::new("pollRep", FieldDecoder::Sequence(POLL_REP_FIELDS));

const POPODEC_KEY_CHALL: Field = Field::new(
    "popdecc", FieldDecoder::SequenceOf(&CHALLENGE)
);
const POPODEC_KEY_RESP: Field = Field::new(
    "popdecr", FieldDecoder::SequenceOf(&INTEGER)
);
const KEY_REC_REP: Field = Field::new(
    "krp", FieldDecoder::Sequence(KEY_REC_REP_FIELDS)
);
const REV_REQ: Field = Field::new("rr", FieldDecoder::SequenceOf(&REV_DETAILS));
const REV_REP: Field = Field::new("rp", FieldDecoder::Sequence(REV_REP_FIELDS));
const CA_KEY_UPD_ANN: Field = Field::new(
    "ckuann", FieldDecoder::Sequence(CA_KEY_UPD_ANN_FIELDS)
);
const REV_ANN: Field = Field::new("rann", FieldDecoder::Sequence(REV_ANN_FIELDS));
const PKI_CONFIRM: Field = Field::primitive("pkiconf", PrimitiveKind::Null);
const NESTED: Field = Field::new("nested", FieldDecoder::Custom(nested_messages));
const GEN_MSG: Field = Field::new(
    "genm", FieldDecoder::SequenceOf(&INFO_TYPE_AND_VALUE)
);
const ERROR_MSG: Field = Field::new(
    "error", FieldDecoder::Sequence(ERROR_MSG_FIELDS)
);
const CERT_CONFIRM: Field = Field::new(
    "certConf", FieldDecoder::SequenceOf(&CERT_STATUS)
);
const POLL_REQS: Field = Field::new("pollReq", FieldDecoder::SequenceOf(&POLL_REQ));
const POLL_REPS: Field = Field::new("pollRep", FieldDecoder::SequenceOf(&POLL_REP));


//------------ PKIBody and PKIMessage ----------------------------------------

/// The body alternatives, in the order of their tag numbers.
const BODIES: &[Field] = &[
    Field::explicit("ir", 0, &CERT_REQ_MESSAGES),
    Field::explicit("ip", 1, &CERT_REP_MESSAGE),
    Field::explicit("cr", 2, &CERT_REQ_MESSAGES),
    Field::explicit("cp", 3, &CERT_REP_MESSAGE),
    Field::explicit("p10cr", 4, &CERTIFICATION_REQUEST),
    Field::explicit("popdecc", 5, &POPODEC_KEY_CHALL),
    Field::explicit("popdecr", 6, &POPODEC_KEY_RESP),
    Field::explicit("kur", 7, &CERT_REQ_MESSAGES),
    Field::explicit("kup", 8, &CERT_REP_MESSAGE),
    Field::explicit("krr", 9, &CERT_REQ_MESSAGES),
    Field::explicit("krp", 10, &KEY_REC_REP),
    Field::explicit("rr", 11, &REV_REQ),
    Field::explicit("rp", 12, &REV_REP),
    Field::explicit("ccr", 13, &CERT_REQ_MESSAGES),
    Field::explicit("ccp", 14, &CERT_REP_MESSAGE),
    Field::explicit("ckuann", 15, &CA_KEY_UPD_ANN),
    Field::explicit("cann", 16, &CERTIFICATE),
    Field::explicit("rann", 17, &REV_ANN),
    Field::explicit("crlann", 18, &CRLS),
    Field::explicit("pkiconf", 19, &PKI_CONFIRM),
    Field::explicit("nested", 20, &NESTED),
    Field::explicit("genm", 21, &GEN_MSG),
    Field::explicit("genp", 22, &GEN_MSG),
    Field::explicit("error", 23, &ERROR_MSG),
    Field::explicit("certConf", 24, &CERT_CONFIRM),
    Field::explicit("pollReq", 25, &POLL_REQS),
    Field::explicit("pollRep", 26, &POLL_REPS),
];

const PROTECTION: Field = Field::primitive(
    "protection", PrimitiveKind::BitString
);

const PKI_MESSAGE_FIELDS: &[Field] = &[
    Field::new("header", FieldDecoder::Sequence(HEADER_FIELDS)),
    Field::new("body", FieldDecoder::Choice(BODIES)),
    Field::explicit("protection", 0, &PROTECTION).optional(),
    Field::explicit("extraCerts", 1, &CERTIFICATES).optional(),
];

pub const PKI_MESSAGE: Field = Field::new(
    "PKIMessage", FieldDecoder::Sequence(PKI_MESSAGE_FIELDS)
);

const PKI_MESSAGES: Field = Field::new(
    "PKIMessages", FieldDecoder::SequenceOf(&PKI_MESSAGE)
);

fn nested_messages(tlv: &Tlv, ctx: &mut DecodeContext) -> DecodedNode {
    if PKI_MESSAGES.matches(tlv.ident()) {
        decode_field(&PKI_MESSAGES, tlv, ctx, None).0
    }
    else {
        let mut node = decode_generic(tlv, ctx);
        node.annotate(DecodeError::malformed(
            "nested messages must be a SEQUENCE", tlv.pos()
        ));
        node
    }
}

/// Decodes a single PKIMessage.
pub fn decode_message(
    cursor: ByteCursor, ctx: &mut DecodeContext
) -> DecodedNode {
    let node = decode_structure(&PKI_MESSAGE, cursor, ctx);
    if let Some(body) = node.child("body").and_then(|body| {
        body.children().first()
    }) {
        ctx.add_summary("cmp.type", body.name());
    }
    node
}


//------------ TCP transport -------------------------------------------------

/// The message types of the TCP transport.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TcpMessageType {
    PkiMsg,
    PollRep,
    PollReq,
    NegPollRep,
    PartialMsgRep,
    FinalMsgRep,
    ErrorMsgRep,
}

impl TcpMessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TcpMessageType::PkiMsg),
            1 => Some(TcpMessageType::PollRep),
            2 => Some(TcpMessageType::PollReq),
            3 => Some(TcpMessageType::NegPollRep),
            4 => Some(TcpMessageType::PartialMsgRep),
            5 => Some(TcpMessageType::FinalMsgRep),
            6 => Some(TcpMessageType::ErrorMsgRep),
            _ => None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TcpMessageType::PkiMsg => "pkiMsg",
            TcpMessageType::PollRep => "pollRep",
            TcpMessageType::PollReq => "pollReq",
            TcpMessageType::NegPollRep => "negPollRep",
            TcpMessageType::PartialMsgRep => "partialMsgRep",
            TcpMessageType::FinalMsgRep => "finalMsgRep",
            TcpMessageType::ErrorMsgRep => "errorMsgRep",
        }
    }
}

/// The value of the first header octet announcing the version 10 header.
pub const TCP_VERSION: u8 = 10;

/// Decodes a TCP transport message after the length prefix.
///
/// In the legacy format the first octet is the message type. In the
/// newer format it is the version, followed by a flags and a message type
/// octet. Since legacy types are all smaller than ten, the two are told
/// apart by that first octet.
pub fn decode_tcp_message(
    cursor: ByteCursor, ctx: &mut DecodeContext
) -> DecodedNode {
    let mut node = DecodedNode::new(
        "CMP TCP message", cursor.base()..cursor.end()
    );
    if let Err(err) = decode_tcp_header(cursor, ctx, &mut node) {
        node.annotate(err)
    }
    node
}

fn decode_tcp_header(
    cursor: ByteCursor, ctx: &mut DecodeContext, node: &mut DecodedNode
) -> Result<(), DecodeError> {
    let first = cursor.read_u8(0)?;
    let type_offset = if first < TCP_VERSION {
        0
    }
    else {
        node.push_child(octet_node("version", &cursor, 0, first.into()));
        if first != TCP_VERSION {
            return Err(DecodeError::unsupported(
                format!("unknown transport version {first}"), cursor.base()
            ))
        }
        let flags = cursor.read_u8(1)?;
        node.push_child(octet_node("flags", &cursor, 1, flags.into()));
        2
    };
    let msg_type = cursor.read_u8(type_offset)?;
    node.push_child(
        octet_node("type", &cursor, type_offset, msg_type.into())
    );
    let mut offset = type_offset + 1;
    let msg_type = match TcpMessageType::from_u8(msg_type) {
        Some(msg_type) => msg_type,
        None => {
            return Err(DecodeError::unsupported(
                format!("unknown message type {msg_type}"),
                cursor.abs(type_offset)
            ))
        }
    };
    ctx.add_summary("cmp.tcp_type", msg_type.name());
    match msg_type {
        TcpMessageType::PollReq => {
            read_u32_field("pollRef", &cursor, &mut offset, node)?;
        }
        TcpMessageType::PollRep => {
            read_u32_field("pollRef", &cursor, &mut offset, node)?;
            read_u32_field("checkAfter", &cursor, &mut offset, node)?;
        }
        TcpMessageType::NegPollRep => { }
        TcpMessageType::PartialMsgRep => {
            read_u32_field("nextPollRef", &cursor, &mut offset, node)?;
            read_u32_field("checkAfter", &cursor, &mut offset, node)?;
            node.push_child(decode_message(cursor.tail(offset)?, ctx));
            offset = cursor.len();
        }
        TcpMessageType::PkiMsg | TcpMessageType::FinalMsgRep
            | TcpMessageType::ErrorMsgRep
        => {
            node.push_child(decode_message(cursor.tail(offset)?, ctx));
            offset = cursor.len();
        }
    }
    if offset < cursor.len() {
        return Err(DecodeError::new(
            ErrorKind::TrailingData,
            format!("{} octets of trailing data", cursor.len() - offset),
            cursor.abs(offset)
        ))
    }
    Ok(())
}

fn octet_node(
    name: &'static str, cursor: &ByteCursor, offset: usize, value: u64
) -> DecodedNode {
    DecodedNode::new(name, cursor.abs(offset)..cursor.abs(offset + 1))
        .with_value(NodeValue::Unsigned(value))
}

fn read_u32_field(
    name: &'static str,
    cursor: &ByteCursor,
    offset: &mut usize,
    node: &mut DecodedNode,
) -> Result<(), DecodeError> {
    let value = cursor.read_u32(*offset)?;
    node.push_child(
        DecodedNode::new(name, cursor.abs(*offset)..cursor.abs(*offset + 4))
            .with_value(NodeValue::Unsigned(value.into()))
    );
    *offset += 4;
    Ok(())
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use crate::decode::SummaryValue;
    use crate::encode;
    use crate::ident::Tag;
    use crate::mode::Mode;
    use super::*;

    fn registry() -> Registry {
        let mut res = Registry::new();
        register(&mut res);
        res
    }

    fn header() -> Vec<u8> {
        encode::sequence(&[
            &encode::integer(2),
            &encode::primitive(Tag::ctx(2), b"ee.example"),
            &encode::primitive(Tag::ctx(2), b"ca.example"),
            &encode::explicit(4, &encode::octet_string(b"\x01\x02\x03\x04")),
        ])
    }

    fn message(body: &[u8]) -> Vec<u8> {
        encode::sequence(&[&header(), body])
    }

    fn subject() -> Vec<u8> {
        encode::sequence(&[
            &encode::constructed(Tag::SET, &[
                &encode::sequence(&[
                    &encode::oid(&"2.5.4.3".parse().unwrap()),
                    &encode::primitive(Tag::UTF8_STRING, b"ee"),
                ])
            ])
        ])
    }

    fn decode(data: &[u8]) -> (DecodedNode, Vec<crate::decode::SummaryField>) {
        let registry = registry();
        let mut ctx = DecodeContext::new(&registry, Mode::Der);
        let node = decode_message(ByteCursor::new(data), &mut ctx);
        (node, ctx.finish().0)
    }

    #[test]
    fn initialization_request() {
        let request = encode::sequence(&[
            &encode::sequence(&[
                &encode::integer(0),
                &encode::sequence(&[&encode::explicit(5, &subject())]),
            ])
        ]);
        let data = message(&encode::explicit(0, &encode::sequence(&[&request])));
        let (node, summary) = decode(&data);
        assert_eq!(node.error_count(), 0, "{node}");
        assert!(node.ranges_nest());
        assert_eq!(
            node.path(&["header", "transactionID"]).unwrap().value().as_bytes(),
            Some(&b"\x01\x02\x03\x04"[..])
        );
        assert!(node.path(&[
            "body", "ir", "certReqMsg", "certReq", "certTemplate", "subject"
        ]).is_some());
        assert_eq!(summary[0].key, "cmp.pvno");
        assert_eq!(summary[0].value, SummaryValue::Integer(2));
        assert_eq!(summary[1].key, "cmp.type");
        assert_eq!(summary[1].value, SummaryValue::Text("ir".into()));
    }

    #[test]
    fn nested_message() {
        let inner = message(&encode::explicit(19, &encode::null()));
        let data = message(&encode::explicit(20, &encode::sequence(&[&inner])));
        let (node, summary) = decode(&data);
        assert_eq!(node.error_count(), 0, "{node}");
        assert_eq!(
            node.path(&["body", "nested", "PKIMessage", "body", "pkiconf"])
                .unwrap().value(),
            &NodeValue::Null
        );
        assert!(summary.iter().any(|item| {
            item.key == "cmp.type"
                && item.value == SummaryValue::Text("nested".into())
        }));
    }

    #[test]
    fn general_info_dispatch() {
        let body = encode::explicit(21, &encode::sequence(&[
            &encode::sequence(&[
                &encode::oid(&"1.3.6.1.5.5.7.4.13".parse().unwrap()),
                &encode::null(),
            ]),
            &encode::sequence(&[
                &encode::oid(&"1.2.3.4".parse().unwrap()),
                &encode::integer(5),
            ]),
        ]));
        let (node, _) = decode(&message(&body));
        assert_eq!(node.error_count(), 0, "{node}");
        let genm = node.path(&["body", "genm"]).unwrap();
        assert_eq!(
            genm.children()[0].path(&["infoValue", "implicitConfirm"])
                .unwrap().value(),
            &NodeValue::Null
        );
        assert!(genm.children()[1].has_annotation(
            ErrorKind::UnknownDiscriminator
        ));
    }

    #[test]
    fn error_message() {
        let body = encode::explicit(23, &encode::sequence(&[
            &encode::sequence(&[&encode::integer(2)]),
            &encode::integer(42),
        ]));
        let (node, summary) = decode(&message(&body));
        assert_eq!(node.error_count(), 0, "{node}");
        assert!(summary.iter().any(|item| {
            item.key == "cmp.status" && item.value == SummaryValue::Integer(2)
        }));
        assert_eq!(
            node.path(&["body", "error", "errorCode"]).unwrap().value().as_i64(),
            Some(42)
        );
    }

    #[test]
    fn missing_body() {
        let (node, _) = decode(&encode::sequence(&[&header()]));
        assert!(node.has_annotation(ErrorKind::MissingField));
    }

    #[test]
    fn tcp_legacy() {
        let mut data = vec![0];
        data.extend_from_slice(&message(&encode::explicit(19, &encode::null())));
        let registry = registry();
        let mut ctx = DecodeContext::new(&registry, Mode::Der);
        let node = decode_tcp_message(ByteCursor::new(&data), &mut ctx);
        assert_eq!(node.error_count(), 0, "{node}");
        assert_eq!(node.child("type").unwrap().value().as_i64(), Some(0));
        assert!(node.child("version").is_none());
        assert_eq!(node.child("PKIMessage").unwrap().range(), 1..data.len());
    }

    #[test]
    fn tcp_poll_reply() {
        let data = [
            10, 0, 1,
            0, 0, 0, 7,
            0, 0, 0, 60,
        ];
        let registry = registry();
        let mut ctx = DecodeContext::new(&registry, Mode::Der);
        let node = decode_tcp_message(ByteCursor::new(&data), &mut ctx);
        assert_eq!(node.error_count(), 0, "{node}");
        assert_eq!(node.child("pollRef").unwrap().value().as_i64(), Some(7));
        assert_eq!(node.child("checkAfter").unwrap().range(), 7..11);
        assert_eq!(
            ctx.summary()[0].value, SummaryValue::Text("pollRep".into())
        );
    }

    #[test]
    fn tcp_bad_headers() {
        let registry = registry();
        let mut ctx = DecodeContext::new(&registry, Mode::Der);
        let node = decode_tcp_message(ByteCursor::new(&[9]), &mut ctx);
        assert!(node.has_annotation(ErrorKind::Unsupported));
        let node = decode_tcp_message(ByteCursor::new(&[11, 0, 0]), &mut ctx);
        assert!(node.has_annotation(ErrorKind::Unsupported));
        let node = decode_tcp_message(ByteCursor::new(&[2, 0, 0]), &mut ctx);
        assert!(node.has_annotation(ErrorKind::OutOfBounds));
        let node = decode_tcp_message(
            ByteCursor::new(&[3, 0]), &mut ctx
        );
        assert!(node.has_annotation(ErrorKind::TrailingData));
    }
}
