//! Kerberos V5.
//!
//! All messages are application tagged SEQUENCEs with explicitly tagged
//! fields. Pre-authentication data is dispatched on its type through the
//! `krb5.padata` namespace of the registry.
//!
//! Over TCP, each message is preceded by a four octet length whose most
//! significant bit is reserved. The reassembler strips that prefix, so the
//! decoder here always sees exactly one message.

use crate::cursor::ByteCursor;
use crate::decode::{
    decode_structure, DecodeContext, DecodedNode, Field, FieldDecoder,
    PrimitiveKind,
};
use crate::ident::Tag;
use crate::registry::{Discriminator, Registry};
use crate::string::CharSet;


//------------ Registration --------------------------------------------------

/// The namespace for pre-authentication data types.
pub const PADATA_NAMESPACE: &str = "krb5.padata";

pub const PA_TGS_REQ: i64 = 1;
pub const PA_ENC_TIMESTAMP: i64 = 2;
pub const PA_ETYPE_INFO2: i64 = 19;
pub const PA_PAC_REQUEST: i64 = 128;

pub fn register(registry: &mut Registry) {
    registry.register(
        Discriminator::number(PADATA_NAMESPACE, PA_TGS_REQ), tgs_req_padata
    );
    registry.register(
        Discriminator::number(PADATA_NAMESPACE, PA_ENC_TIMESTAMP),
        enc_timestamp
    );
    registry.register(
        Discriminator::number(PADATA_NAMESPACE, PA_ETYPE_INFO2), etype_info2
    );
    registry.register(
        Discriminator::number(PADATA_NAMESPACE, PA_PAC_REQUEST), pac_request
    );
}

fn tgs_req_padata(cursor: ByteCursor, ctx: &mut DecodeContext) -> DecodedNode {
    decode_structure(&AP_REQ.named("PA-TGS-REQ"), cursor, ctx)
}

fn enc_timestamp(cursor: ByteCursor, ctx: &mut DecodeContext) -> DecodedNode {
    decode_structure(&ENCRYPTED_DATA.named("PA-ENC-TIMESTAMP"), cursor, ctx)
}

fn etype_info2(cursor: ByteCursor, ctx: &mut DecodeContext) -> DecodedNode {
    decode_structure(&ETYPE_INFO2, cursor, ctx)
}

fn pac_request(cursor: ByteCursor, ctx: &mut DecodeContext) -> DecodedNode {
    decode_structure(&PAC_REQUEST, cursor, ctx)
}


//------------ Basic types ---------------------------------------------------

const INT32: Field = Field::primitive("int32", PrimitiveKind::Integer);
const KERBEROS_STRING: Field = Field::primitive(
    "string", PrimitiveKind::Text(CharSet::General)
);
const KERBEROS_TIME: Field = Field::primitive(
    "time", PrimitiveKind::GeneralizedTime
);
const OCTET_STRING: Field = Field::primitive(
    "octets", PrimitiveKind::OctetString
);
const FLAGS: Field = Field::primitive("flags", PrimitiveKind::BitString);
const PVNO: Field = Field::primitive("pvno", PrimitiveKind::Integer);
const MSG_TYPE: Field = Field::primitive("msg-type", PrimitiveKind::Integer);

const NAME_STRINGS: Field = Field::new(
    "name-string", FieldDecoder::SequenceOf(&KERBEROS_STRING)
);

const PRINCIPAL_NAME_FIELDS: &[Field] = &[
    Field::explicit("name-type", 0, &INT32),
    Field::explicit("name-string", 1, &NAME_STRINGS),
];

const PRINCIPAL_NAME: Field = Field::new(
    "PrincipalName", FieldDecoder::Sequence(PRINCIPAL_NAME_FIELDS)
);

const ENCRYPTED_DATA_FIELDS: &[Field] = &[
    Field::explicit("etype", 0, &INT32),
    Field::explicit("kvno", 1, &INT32).optional(),
    Field::explicit("cipher", 2, &OCTET_STRING),
];

const ENCRYPTED_DATA: Field = Field::new(
    "EncryptedData", FieldDecoder::Sequence(ENCRYPTED_DATA_FIELDS)
);

const HOST_ADDRESS_FIELDS: &[Field] = &[
    Field::explicit("addr-type", 0, &INT32),
    Field::explicit("address", 1, &OCTET_STRING),
];

const HOST_ADDRESS: Field = Field::new(
    "HostAddress", FieldDecoder::Sequence(HOST_ADDRESS_FIELDS)
);

const HOST_ADDRESSES: Field = Field::new(
    "HostAddresses", FieldDecoder::SequenceOf(&HOST_ADDRESS)
);

const CHECKSUM_FIELDS: &[Field] = &[
    Field::explicit("cksumtype", 0, &INT32),
    Field::explicit("checksum", 1, &OCTET_STRING),
];

const CHECKSUM: Field = Field::new(
    "Checksum", FieldDecoder::Sequence(CHECKSUM_FIELDS)
);


//------------ Ticket --------------------------------------------------------

const TICKET_FIELDS: &[Field] = &[
    Field::explicit("tkt-vno", 0, &PVNO),
    Field::explicit("realm", 1, &KERBEROS_STRING),
    Field::explicit("sname", 2, &PRINCIPAL_NAME),
    Field::explicit("enc-part", 3, &ENCRYPTED_DATA),
];

const TICKET_SEQUENCE: Field = Field::new(
    "Ticket", FieldDecoder::Sequence(TICKET_FIELDS)
);

const TICKET: Field = Field::new(
    "Ticket", FieldDecoder::Explicit(&TICKET_SEQUENCE)
).tagged(Tag::application(1));

const TICKETS: Field = Field::new("tickets", FieldDecoder::SequenceOf(&TICKET));


//------------ Pre-authentication --------------------------------------------

const PADATA_VALUE: Field = Field::new(
    "padata-value", FieldDecoder::Dispatch(PADATA_NAMESPACE)
).tagged(Tag::OCTET_STRING);

const PA_DATA_FIELDS: &[Field] = &[
    Field::explicit("padata-type", 1, &INT32).key(),
    Field::explicit("padata-value", 2, &PADATA_VALUE),
];

const PA_DATA: Field = Field::new("PA-DATA", FieldDecoder::Sequence(PA_DATA_FIELDS));

const PADATA: Field = Field::new("padata", FieldDecoder::SequenceOf(&PA_DATA));

const ETYPE_INFO2_ENTRY_FIELDS: &[Field] = &[
    Field::explicit("etype", 0, &INT32),
    Field::explicit("salt", 1, &KERBEROS_STRING).optional(),
    Field::explicit("s2kparams", 2, &OCTET_STRING).optional(),
];

const ETYPE_INFO2_ENTRY: Field = Field::new(
    "ETYPE-INFO2-ENTRY", FieldDecoder::Sequence(ETYPE_INFO2_ENTRY_FIELDS)
);

const ETYPE_INFO2: Field = Field::new(
    "ETYPE-INFO2", FieldDecoder::SequenceOf(&ETYPE_INFO2_ENTRY)
);

const INCLUDE_PAC: Field = Field::primitive("include-pac", PrimitiveKind::Boolean);

const PAC_REQUEST_FIELDS: &[Field] = &[
    Field::explicit("include-pac", 0, &INCLUDE_PAC),
];

const PAC_REQUEST: Field = Field::new(
    "PA-PAC-REQUEST", FieldDecoder::Sequence(PAC_REQUEST_FIELDS)
);


//------------ KDC exchanges -------------------------------------------------

const ETYPES: Field = Field::new("etype", FieldDecoder::SequenceOf(&INT32));

const KDC_REQ_BODY_FIELDS: &[Field] = &[
    Field::explicit("kdc-options", 0, &FLAGS),
    Field::explicit("cname", 1, &PRINCIPAL_NAME).optional(),
    Field::explicit("realm", 2, &KERBEROS_STRING).summary("krb5.realm"),
    Field::explicit("sname", 3, &PRINCIPAL_NAME).optional(),
    Field::explicit("from", 4, &KERBEROS_TIME).optional(),
    Field::explicit("till", 5, &KERBEROS_TIME),
    Field::explicit("rtime", 6, &KERBEROS_TIME).optional(),
    Field::explicit("nonce", 7, &INT32),
    Field::explicit("etype", 8, &ETYPES),
    Field::explicit("addresses", 9, &HOST_ADDRESSES).optional(),
    Field::explicit("enc-authorization-data", 10, &ENCRYPTED_DATA).optional(),
    Field::explicit("additional-tickets", 11, &TICKETS).optional(),
];

const KDC_REQ_BODY: Field = Field::new(
    "KDC-REQ-BODY", FieldDecoder::Sequence(KDC_REQ_BODY_FIELDS)
);

const KDC_REQ_FIELDS: &[Field] = &[
    Field::explicit("pvno", 1, &PVNO),
    Field::explicit("msg-type", 2, &MSG_TYPE).summary("krb5.msg_type"),
    Field::explicit("padata", 3, &PADATA).optional(),
    Field::explicit("req-body", 4, &KDC_REQ_BODY),
];

const KDC_REQ: Field = Field::new("KDC-REQ", FieldDecoder::Sequence(KDC_REQ_FIELDS));

const KDC_REP_FIELDS: &[Field] = &[
    Field::explicit("pvno", 0, &PVNO),
    Field::explicit("msg-type", 1, &MSG_TYPE).summary("krb5.msg_type"),
    Field::explicit("padata", 2, &PADATA).optional(),
    Field::explicit("crealm", 3, &KERBEROS_STRING).summary("krb5.realm"),
    Field::explicit("cname", 4, &PRINCIPAL_NAME),
    Field::explicit("ticket", 5, &TICKET),
    Field::explicit("enc-part", 6, &ENCRYPTED_DATA),
];

const KDC_REP: Field = Field::new("KDC-REP", FieldDecoder::Sequence(KDC_REP_FIELDS));


//------------ Client/server exchanges ---------------------------------------

const AP_REQ_FIELDS: &[Field] = &[
    Field::explicit("pvno", 0, &PVNO),
    Field::explicit("msg-type", 1, &MSG_TYPE).summary("krb5.msg_type"),
    Field::explicit("ap-options", 2, &FLAGS),
    Field::explicit("ticket", 3, &TICKET),
    Field::explicit("authenticator", 4, &ENCRYPTED_DATA),
];

const AP_REQ_SEQUENCE: Field = Field::new(
    "AP-REQ", FieldDecoder::Sequence(AP_REQ_FIELDS)
);

const AP_REQ: Field = Field::new(
    "AP-REQ", FieldDecoder::Explicit(&AP_REQ_SEQUENCE)
).tagged(Tag::application(14));

const AP_REP_FIELDS: &[Field] = &[
    Field::explicit("pvno", 0, &PVNO),
    Field::explicit("msg-type", 1, &MSG_TYPE).summary("krb5.msg_type"),
    Field::explicit("enc-part", 2, &ENCRYPTED_DATA),
];

const AP_REP: Field = Field::new("AP-REP", FieldDecoder::Sequence(AP_REP_FIELDS));

const KRB_SAFE_BODY_FIELDS: &[Field] = &[
    Field::explicit("user-data", 0, &OCTET_STRING),
    Field::explicit("timestamp", 1, &KERBEROS_TIME).optional(),
    Field::explicit("usec", 2, &INT32).optional(),
    Field::explicit("seq-number", 3, &INT32).optional(),
    Field::explicit("s-address", 4, &HOST_ADDRESS),
    Field::explicit("r-address", 5, &HOST_ADDRESS).optional(),
];

const KRB_SAFE_BODY: Field = Field::new(
    "KRB-SAFE-BODY", FieldDecoder::Sequence(KRB_SAFE_BODY_FIELDS)
);

const KRB_SAFE_FIELDS: &[Field] = &[
    Field::explicit("pvno", 0, &PVNO),
    Field::explicit("msg-type", 1, &MSG_TYPE).summary("krb5.msg_type"),
    Field::explicit("safe-body", 2, &KRB_SAFE_BODY),
    Field::explicit("cksum", 3, &CHECKSUM),
];

const KRB_SAFE: Field = Field::new(
    "KRB-SAFE", FieldDecoder::Sequence(KRB_SAFE_FIELDS)
);

const KRB_PRIV_FIELDS: &[Field] = &[
    Field::explicit("pvno", 0, &PVNO),
    Field::explicit("msg-type", 1, &MSG_TYPE).summary("krb5.msg_type"),
    Field::explicit("enc-part", 3, &ENCRYPTED_DATA),
];

const KRB_PRIV: Field = Field::new(
    "KRB-PRIV", FieldDecoder::Sequence(KRB_PRIV_FIELDS)
);

const KRB_CRED_FIELDS: &[Field] = &[
    Field::explicit("pvno", 0, &PVNO),
    Field::explicit("msg-type", 1, &MSG_TYPE).summary("krb5.msg_type"),
    Field::explicit("tickets", 2, &TICKETS),
    Field::explicit("enc-part", 3, &ENCRYPTED_DATA),
];

const KRB_CRED: Field = Field::new(
    "KRB-CRED", FieldDecoder::Sequence(KRB_CRED_FIELDS)
);


//------------ KRB-ERROR -----------------------------------------------------

const ERROR_CODE: Field = Field::primitive("error-code", PrimitiveKind::Integer);

const KRB_ERROR_FIELDS: &[Field] = &[
    Field::explicit("pvno", 0, &PVNO),
    Field::explicit("msg-type", 1, &MSG_TYPE).summary("krb5.msg_type"),
    Field::explicit("ctime", 2, &KERBEROS_TIME).optional(),
    Field::explicit("cusec", 3, &INT32).optional(),
    Field::explicit("stime", 4, &KERBEROS_TIME),
    Field::explicit("susec", 5, &INT32),
    Field::explicit("error-code", 6, &ERROR_CODE).summary("krb5.error_code"),
    Field::explicit("crealm", 7, &KERBEROS_STRING).optional(),
    Field::explicit("cname", 8, &PRINCIPAL_NAME).optional(),
    Field::explicit("realm", 9, &KERBEROS_STRING).summary("krb5.realm"),
    Field::explicit("sname", 10, &PRINCIPAL_NAME),
    Field::explicit("e-text", 11, &KERBEROS_STRING).optional(),
    Field::explicit("e-data", 12, &OCTET_STRING).optional(),
];

const KRB_ERROR: Field = Field::new(
    "KRB-ERROR", FieldDecoder::Sequence(KRB_ERROR_FIELDS)
);


//------------ Messages ------------------------------------------------------

const fn application(
    name: &'static str, number: u32, inner: &'static Field
) -> Field {
    Field::new(name, FieldDecoder::Explicit(inner))
        .tagged(Tag::application(number))
}

const MESSAGES: &[Field] = &[
    application("AS-REQ", 10, &KDC_REQ),
    application("AS-REP", 11, &KDC_REP),
    application("TGS-REQ", 12, &KDC_REQ),
    application("TGS-REP", 13, &KDC_REP),
    AP_REQ,
    application("AP-REP", 15, &AP_REP),
    application("KRB-SAFE", 20, &KRB_SAFE),
    application("KRB-PRIV", 21, &KRB_PRIV),
    application("KRB-CRED", 22, &KRB_CRED),
    application("KRB-ERROR", 30, &KRB_ERROR),
];

pub const MESSAGE: Field = Field::new(
    "Kerberos", FieldDecoder::Choice(MESSAGES)
);

/// Decodes a single Kerberos message.
pub fn decode_message(
    cursor: ByteCursor, ctx: &mut DecodeContext
) -> DecodedNode {
    decode_structure(&MESSAGE, cursor, ctx)
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use crate::decode::{ErrorKind, NodeValue, SummaryField, SummaryValue};
    use crate::encode;
    use crate::ident::Ident;
    use crate::mode::Mode;
    use super::*;

    fn app(number: u32, value: &[u8]) -> Vec<u8> {
        encode::tlv(Ident::constructed(Tag::application(number)), value)
    }

    fn general_string(value: &str) -> Vec<u8> {
        encode::primitive(Tag::GENERAL_STRING, value.as_bytes())
    }

    fn principal(names: &[&str]) -> Vec<u8> {
        let names: Vec<_> = names.iter().map(|name| {
            general_string(name)
        }).collect();
        let names: Vec<&[u8]> = names.iter().map(Vec::as_slice).collect();
        encode::sequence(&[
            &encode::explicit(0, &encode::integer(1)),
            &encode::explicit(1, &encode::sequence(&names)),
        ])
    }

    fn encrypted(etype: i64) -> Vec<u8> {
        encode::sequence(&[
            &encode::explicit(0, &encode::integer(etype)),
            &encode::explicit(2, &encode::octet_string(b"\xde\xad\xbe\xef")),
        ])
    }

    fn padata(padata_type: i64, value: &[u8]) -> Vec<u8> {
        encode::sequence(&[
            &encode::explicit(1, &encode::integer(padata_type)),
            &encode::explicit(2, &encode::octet_string(value)),
        ])
    }

    fn as_req(padata: &[&[u8]]) -> Vec<u8> {
        let time = encode::primitive(
            Tag::GENERALIZED_TIME, b"20370913024805Z"
        );
        let body = encode::sequence(&[
            &encode::explicit(0, &encode::primitive(
                Tag::BIT_STRING, b"\x00\x50\x80\x00\x10"
            )),
            &encode::explicit(1, &principal(&["alice"])),
            &encode::explicit(2, &general_string("EXAMPLE.ORG")),
            &encode::explicit(3, &principal(&["krbtgt", "EXAMPLE.ORG"])),
            &encode::explicit(5, &time),
            &encode::explicit(7, &encode::integer(12345)),
            &encode::explicit(8, &encode::sequence(&[
                &encode::integer(18), &encode::integer(17)
            ])),
        ]);
        app(10, &encode::sequence(&[
            &encode::explicit(1, &encode::integer(5)),
            &encode::explicit(2, &encode::integer(10)),
            &encode::explicit(3, &encode::sequence(padata)),
            &encode::explicit(4, &body),
        ]))
    }

    fn decode(data: &[u8]) -> (DecodedNode, Vec<SummaryField>) {
        let mut registry = Registry::new();
        register(&mut registry);
        let mut ctx = DecodeContext::new(&registry, Mode::Der);
        let node = decode_message(ByteCursor::new(data), &mut ctx);
        (node, ctx.finish().0)
    }

    #[test]
    fn as_request() {
        let pac = encode::sequence(&[
            &encode::explicit(0, &encode::boolean(true))
        ]);
        let data = as_req(&[
            &padata(PA_ENC_TIMESTAMP, &encrypted(18)),
            &padata(PA_PAC_REQUEST, &pac),
        ]);
        let (node, summary) = decode(&data);
        assert_eq!(node.error_count(), 0, "{node}");
        assert!(node.ranges_nest());
        let req = node.child("AS-REQ").unwrap();
        assert_eq!(
            req.path(&["req-body", "sname", "name-string"]).unwrap()
                .children().len(),
            2
        );
        let padata = req.child("padata").unwrap().children();
        assert_eq!(
            padata[0].path(&[
                "padata-value", "PA-ENC-TIMESTAMP", "etype"
            ]).unwrap().value().as_i64(),
            Some(18)
        );
        assert_eq!(
            padata[1].path(&[
                "padata-value", "PA-PAC-REQUEST", "include-pac"
            ]).unwrap().value(),
            &NodeValue::Boolean(true)
        );
        assert_eq!(
            summary,
            [
                SummaryField {
                    key: "krb5.msg_type", value: SummaryValue::Integer(10)
                },
                SummaryField {
                    key: "krb5.realm",
                    value: SummaryValue::Text("EXAMPLE.ORG".into())
                },
            ]
        );
    }

    #[test]
    fn unknown_padata() {
        let data = as_req(&[&padata(136, b"\x30\x00")]);
        let (node, _) = decode(&data);
        assert_eq!(node.error_count(), 0, "{node}");
        let value = node.find("padata-value").unwrap();
        assert_eq!(value.children()[0].name(), "opaque");
        assert!(value.has_annotation(ErrorKind::UnknownDiscriminator));
    }

    #[test]
    fn krb_error() {
        let time = encode::primitive(
            Tag::GENERALIZED_TIME, b"20240101120000Z"
        );
        let data = app(30, &encode::sequence(&[
            &encode::explicit(0, &encode::integer(5)),
            &encode::explicit(1, &encode::integer(30)),
            &encode::explicit(4, &time),
            &encode::explicit(5, &encode::integer(0)),
            &encode::explicit(6, &encode::integer(25)),
            &encode::explicit(9, &general_string("EXAMPLE.ORG")),
            &encode::explicit(10, &principal(&["krbtgt", "EXAMPLE.ORG"])),
        ]));
        let (node, summary) = decode(&data);
        assert_eq!(node.error_count(), 0, "{node}");
        assert!(summary.contains(&SummaryField {
            key: "krb5.error_code", value: SummaryValue::Integer(25)
        }));
    }

    #[test]
    fn ap_request_with_ticket() {
        let ticket = app(1, &encode::sequence(&[
            &encode::explicit(0, &encode::integer(5)),
            &encode::explicit(1, &general_string("EXAMPLE.ORG")),
            &encode::explicit(2, &principal(&["host", "server"])),
            &encode::explicit(3, &encrypted(18)),
        ]));
        let data = app(14, &encode::sequence(&[
            &encode::explicit(0, &encode::integer(5)),
            &encode::explicit(1, &encode::integer(14)),
            &encode::explicit(2, &encode::primitive(
                Tag::BIT_STRING, b"\x00\x00\x00\x00\x00"
            )),
            &encode::explicit(3, &ticket),
            &encode::explicit(4, &encrypted(18)),
        ]));
        let (node, _) = decode(&data);
        assert_eq!(node.error_count(), 0, "{node}");
        assert_eq!(
            node.path(&["AP-REQ", "ticket", "realm"]).unwrap().value()
                .as_text(),
            Some("EXAMPLE.ORG")
        );
    }

    #[test]
    fn missing_request_body() {
        let data = app(10, &encode::sequence(&[
            &encode::explicit(1, &encode::integer(5)),
            &encode::explicit(2, &encode::integer(10)),
        ]));
        let (node, _) = decode(&data);
        assert!(node.has_annotation(ErrorKind::MissingField));
    }

    #[test]
    fn not_kerberos() {
        let (node, _) = decode(&encode::sequence(&[]));
        assert!(node.has_annotation(ErrorKind::UnexpectedTag));
    }
}
