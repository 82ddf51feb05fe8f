//! Types from the Internet X.509 PKI shared by several protocols.
//!
//! Only the outer structure is described. Attribute values, algorithm
//! parameters and extension values are decoded generically.

use crate::decode::{DefaultValue, Field, FieldDecoder, PrimitiveKind};
use crate::string::CharSet;


//------------ AlgorithmIdentifier -------------------------------------------

const ALGORITHM_FIELDS: &[Field] = &[
    Field::primitive("algorithm", PrimitiveKind::Oid),
    Field::new("parameters", FieldDecoder::Any).optional(),
];

pub const ALGORITHM_IDENTIFIER: Field = Field::new(
    "algorithm", FieldDecoder::Sequence(ALGORITHM_FIELDS)
);


//------------ Name ----------------------------------------------------------

const ATTRIBUTE_FIELDS: &[Field] = &[
    Field::primitive("type", PrimitiveKind::Oid),
    Field::new("value", FieldDecoder::Any),
];

pub const ATTRIBUTE: Field = Field::new(
    "attribute", FieldDecoder::Sequence(ATTRIBUTE_FIELDS)
);

const RDN: Field = Field::new("rdn", FieldDecoder::SetOf(&ATTRIBUTE));

/// A distinguished name in its only form, the RDN sequence.
pub const NAME: Field = Field::new("name", FieldDecoder::SequenceOf(&RDN));


//------------ GeneralName ---------------------------------------------------

const GENERAL_NAMES: &[Field] = &[
    Field::new("otherName", FieldDecoder::Any).ctx(0),
    Field::primitive("rfc822Name", PrimitiveKind::Text(CharSet::Ia5)).ctx(1),
    Field::primitive("dNSName", PrimitiveKind::Text(CharSet::Ia5)).ctx(2),
    Field::new("x400Address", FieldDecoder::Any).ctx(3),
    Field::explicit("directoryName", 4, &NAME),
    Field::new("ediPartyName", FieldDecoder::Any).ctx(5),
    Field::primitive(
        "uniformResourceIdentifier", PrimitiveKind::Text(CharSet::Ia5)
    ).ctx(6),
    Field::primitive("iPAddress", PrimitiveKind::OctetString).ctx(7),
    Field::primitive("registeredID", PrimitiveKind::Oid).ctx(8),
];

pub const GENERAL_NAME: Field = Field::new(
    "generalName", FieldDecoder::Choice(GENERAL_NAMES)
);


//------------ Extensions ----------------------------------------------------

const EXTENSION_FIELDS: &[Field] = &[
    Field::primitive("extnID", PrimitiveKind::Oid),
    Field::primitive("critical", PrimitiveKind::Boolean)
        .default(DefaultValue::Boolean(false)),
    Field::primitive("extnValue", PrimitiveKind::OctetString),
];

const EXTENSION: Field = Field::new(
    "extension", FieldDecoder::Sequence(EXTENSION_FIELDS)
);

pub const EXTENSIONS: Field = Field::new(
    "extensions", FieldDecoder::SequenceOf(&EXTENSION)
);


//------------ Certificate ---------------------------------------------------

const TIMES: &[Field] = &[
    Field::primitive("utcTime", PrimitiveKind::UtcTime),
    Field::primitive("generalTime", PrimitiveKind::GeneralizedTime),
];

const VALIDITY_FIELDS: &[Field] = &[
    Field::new("notBefore", FieldDecoder::Choice(TIMES)),
    Field::new("notAfter", FieldDecoder::Choice(TIMES)),
];

const PUBLIC_KEY_INFO_FIELDS: &[Field] = &[
    ALGORITHM_IDENTIFIER,
    Field::primitive("subjectPublicKey", PrimitiveKind::BitString),
];

pub const PUBLIC_KEY_INFO: Field = Field::new(
    "subjectPublicKeyInfo", FieldDecoder::Sequence(PUBLIC_KEY_INFO_FIELDS)
);

const VERSION: Field = Field::primitive("version", PrimitiveKind::Integer);

const TBS_CERTIFICATE_FIELDS: &[Field] = &[
    Field::explicit("version", 0, &VERSION)
        .default(DefaultValue::Integer(0)),
    Field::primitive("serialNumber", PrimitiveKind::Integer),
    ALGORITHM_IDENTIFIER.named("signature"),
    NAME.named("issuer"),
    Field::new("validity", FieldDecoder::Sequence(VALIDITY_FIELDS)),
    NAME.named("subject"),
    PUBLIC_KEY_INFO,
    Field::primitive("issuerUniqueID", PrimitiveKind::BitString)
        .ctx(1).optional(),
    Field::primitive("subjectUniqueID", PrimitiveKind::BitString)
        .ctx(2).optional(),
    Field::explicit("extensions", 3, &EXTENSIONS).optional(),
];

const CERTIFICATE_FIELDS: &[Field] = &[
    Field::new("tbsCertificate", FieldDecoder::Sequence(TBS_CERTIFICATE_FIELDS)),
    ALGORITHM_IDENTIFIER.named("signatureAlgorithm"),
    Field::primitive("signatureValue", PrimitiveKind::BitString),
];

pub const CERTIFICATE: Field = Field::new(
    "certificate", FieldDecoder::Sequence(CERTIFICATE_FIELDS)
);

pub const CERTIFICATES: Field = Field::new(
    "certificates", FieldDecoder::SequenceOf(&CERTIFICATE)
);


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use crate::cursor::ByteCursor;
    use crate::decode::{decode_structure, DecodeContext, NodeValue};
    use crate::encode;
    use crate::ident::Tag;
    use crate::mode::Mode;
    use crate::registry::Registry;
    use super::*;

    fn name(common_name: &str) -> Vec<u8> {
        encode::sequence(&[
            &encode::constructed(Tag::SET, &[
                &encode::sequence(&[
                    &encode::oid(&"2.5.4.3".parse().unwrap()),
                    &encode::primitive(
                        Tag::UTF8_STRING, common_name.as_bytes()
                    ),
                ])
            ])
        ])
    }

    #[test]
    fn certificate() {
        let algorithm = encode::sequence(&[
            &encode::oid(&"1.2.840.113549.1.1.11".parse().unwrap()),
            &encode::null(),
        ]);
        let time = encode::primitive(Tag::UTC_TIME, b"240101000000Z");
        let data = encode::sequence(&[
            &encode::sequence(&[
                &encode::explicit(0, &encode::integer(2)),
                &encode::integer(12),
                &algorithm,
                &name("issuer"),
                &encode::sequence(&[&time, &time]),
                &name("subject"),
                &encode::sequence(&[
                    &algorithm,
                    &encode::primitive(Tag::BIT_STRING, b"\x00\x01\x02"),
                ]),
            ]),
            &algorithm,
            &encode::primitive(Tag::BIT_STRING, b"\x00\xAA"),
        ]);
        let registry = Registry::new();
        let mut ctx = DecodeContext::new(&registry, Mode::Der);
        let node = decode_structure(
            &CERTIFICATE, ByteCursor::new(&data), &mut ctx
        );
        assert_eq!(node.error_count(), 0, "{node}");
        assert!(node.ranges_nest());
        let tbs = node.child("tbsCertificate").unwrap();
        assert_eq!(tbs.child("serialNumber").unwrap().value().as_i64(), Some(12));
        assert_eq!(
            tbs.path(&["subject", "rdn", "attribute", "value"]).unwrap()
                .value(),
            &NodeValue::Text("subject".into())
        );
    }

    #[test]
    fn general_name() {
        let registry = Registry::new();
        let mut ctx = DecodeContext::new(&registry, Mode::Der);
        let data = encode::explicit(4, &name("ca"));
        let node = decode_structure(
            &GENERAL_NAME, ByteCursor::new(&data), &mut ctx
        );
        assert_eq!(node.error_count(), 0, "{node}");
        assert!(node.path(&["directoryName", "rdn"]).is_some());

        let data = encode::primitive(Tag::ctx(2), b"example.org");
        let node = decode_structure(
            &GENERAL_NAME, ByteCursor::new(&data), &mut ctx
        );
        assert_eq!(
            node.child("dNSName").unwrap().value().as_text(),
            Some("example.org")
        );
    }
}
