//! Z39.50 information retrieval.
//!
//! The protocol data units are a CHOICE of implicitly tagged SEQUENCEs.
//! Records travel as EXTERNALs identified by their record syntax, which is
//! used to look up the decoder for the embedded record. MARC21 and UNIMARC
//! records go to the directory decoder.

use crate::cursor::ByteCursor;
use crate::decode::{
    decode_field, decode_generic, decode_structure, DecodeContext,
    DecodeError, DecodedNode, ErrorKind, Field, FieldDecoder, PrimitiveKind,
    Tlv,
};
use crate::directory::DirectoryDecoder;
use crate::ident::Tag;
use crate::registry::{Discriminator, Registry};
use crate::string::CharSet;


//------------ Registration --------------------------------------------------

/// The namespace for numeric EXTERNAL references.
pub const EXTERNAL_NAMESPACE: &str = "z3950.external";

pub const MARC21: &str = "1.2.840.10003.5.10";
pub const UNIMARC: &str = "1.2.840.10003.5.1";
pub const SUTRS: &str = "1.2.840.10003.5.101";

pub fn register(registry: &mut Registry, max_record_size: usize) {
    let directory = DirectoryDecoder::new(max_record_size);
    registry.register(Discriminator::Oid(MARC21.into()), directory);
    registry.register(Discriminator::Oid(UNIMARC.into()), directory);
    registry.register(Discriminator::Oid(SUTRS.into()), sutrs);
}

fn sutrs(cursor: ByteCursor, ctx: &mut DecodeContext) -> DecodedNode {
    decode_structure(&INTERNATIONAL_STRING.named("SUTRS"), cursor, ctx)
}


//------------ Basic types ---------------------------------------------------

const INTERNATIONAL_STRING: Field = Field::primitive(
    "string", PrimitiveKind::Text(CharSet::General)
);
const OCTET_STRING: Field = Field::primitive(
    "octets", PrimitiveKind::OctetString
);
const ANY: Field = Field::new("value", FieldDecoder::Any);

const REFERENCE_ID: Field = Field::primitive(
    "referenceId", PrimitiveKind::OctetString
).ctx(2).optional();

const OTHER_INFO: Field = Field::new("otherInfo", FieldDecoder::Any)
    .ctx(201).optional();

const DATABASE_NAME: Field = INTERNATIONAL_STRING.named("databaseName")
    .ctx(105);

const RESULT_SET_ID: Field = INTERNATIONAL_STRING.named("resultSetId").ctx(31);


//------------ EXTERNAL ------------------------------------------------------

const EXTERNAL_ENCODINGS: &[Field] = &[
    Field::explicit("single-ASN1-type", 0, &EXTERNAL_VALUE),
    Field::new("octet-aligned", FieldDecoder::Dispatch(EXTERNAL_NAMESPACE))
        .ctx(1),
    Field::primitive("arbitrary", PrimitiveKind::BitString).ctx(2),
];

const EXTERNAL_VALUE: Field = Field::new(
    "value", FieldDecoder::Dispatch(EXTERNAL_NAMESPACE)
);

const EXTERNAL_FIELDS: &[Field] = &[
    Field::primitive("direct-reference", PrimitiveKind::Oid)
        .optional().key().summary("z3950.record_syntax"),
    Field::primitive("indirect-reference", PrimitiveKind::Integer)
        .optional().key(),
    Field::primitive(
        "data-value-descriptor", PrimitiveKind::Text(CharSet::Visible)
    ).tagged(Tag::OBJECT_DESCRIPTOR).optional(),
    Field::new("encoding", FieldDecoder::Choice(EXTERNAL_ENCODINGS)),
];

pub const EXTERNAL: Field = Field::new(
    "EXTERNAL", FieldDecoder::Sequence(EXTERNAL_FIELDS)
).tagged(Tag::EXTERNAL);


//------------ Init ----------------------------------------------------------

const INIT_REQUEST_FIELDS: &[Field] = &[
    REFERENCE_ID,
    Field::primitive("protocolVersion", PrimitiveKind::BitString).ctx(3),
    Field::primitive("options", PrimitiveKind::BitString).ctx(4),
    Field::primitive("preferredMessageSize", PrimitiveKind::Integer).ctx(5),
    Field::primitive("exceptionalRecordSize", PrimitiveKind::Integer).ctx(6),
    Field::explicit("idAuthentication", 7, &ANY).optional(),
    INTERNATIONAL_STRING.named("implementationId").ctx(110).optional(),
    INTERNATIONAL_STRING.named("implementationName").ctx(111).optional(),
    INTERNATIONAL_STRING.named("implementationVersion").ctx(112).optional(),
    Field::explicit("userInformationField", 11, &EXTERNAL).optional(),
    OTHER_INFO,
];

const INIT_RESPONSE_FIELDS: &[Field] = &[
    REFERENCE_ID,
    Field::primitive("protocolVersion", PrimitiveKind::BitString).ctx(3),
    Field::primitive("options", PrimitiveKind::BitString).ctx(4),
    Field::primitive("preferredMessageSize", PrimitiveKind::Integer).ctx(5),
    Field::primitive("exceptionalRecordSize", PrimitiveKind::Integer).ctx(6),
    Field::primitive("result", PrimitiveKind::Boolean).ctx(12),
    INTERNATIONAL_STRING.named("implementationId").ctx(110).optional(),
    INTERNATIONAL_STRING.named("implementationName").ctx(111).optional(),
    INTERNATIONAL_STRING.named("implementationVersion").ctx(112).optional(),
    Field::explicit("userInformationField", 11, &EXTERNAL).optional(),
    OTHER_INFO,
];


//------------ Queries -------------------------------------------------------

const ATTRIBUTE_VALUES: &[Field] = &[
    Field::primitive("numeric", PrimitiveKind::Integer).ctx(121),
    Field::new("complex", FieldDecoder::Any).ctx(224),
];

const ATTRIBUTE_ELEMENT_FIELDS: &[Field] = &[
    Field::primitive("attributeSet", PrimitiveKind::Oid).ctx(1).optional(),
    Field::primitive("attributeType", PrimitiveKind::Integer).ctx(120),
    Field::new("attributeValue", FieldDecoder::Choice(ATTRIBUTE_VALUES)),
];

const ATTRIBUTE_ELEMENT: Field = Field::new(
    "attributeElement", FieldDecoder::Sequence(ATTRIBUTE_ELEMENT_FIELDS)
);

const ATTRIBUTE_LIST: Field = Field::new(
    "attributes", FieldDecoder::SequenceOf(&ATTRIBUTE_ELEMENT)
).ctx(44);

const TERMS: &[Field] = &[
    Field::primitive("general", PrimitiveKind::OctetString).ctx(45),
    Field::primitive("numeric", PrimitiveKind::Integer).ctx(215),
    INTERNATIONAL_STRING.named("characterString").ctx(216),
    Field::primitive("oid", PrimitiveKind::Oid).ctx(217),
    Field::primitive("dateTime", PrimitiveKind::GeneralizedTime).ctx(218),
    EXTERNAL.named("external").ctx(219),
    Field::new("integerAndUnit", FieldDecoder::Any).ctx(220),
    Field::primitive("null", PrimitiveKind::Null).ctx(221),
];

const ATTRIBUTES_PLUS_TERM_FIELDS: &[Field] = &[
    ATTRIBUTE_LIST,
    Field::new("term", FieldDecoder::Choice(TERMS)),
];

const OPERANDS: &[Field] = &[
    Field::new(
        "attrTerm", FieldDecoder::Sequence(ATTRIBUTES_PLUS_TERM_FIELDS)
    ).ctx(102),
    RESULT_SET_ID,
    Field::new("resultAttr", FieldDecoder::Any).ctx(214),
];

const OPERAND: Field = Field::new("operand", FieldDecoder::Choice(OPERANDS));

const OPERATORS: &[Field] = &[
    Field::primitive("and", PrimitiveKind::Null).ctx(0),
    Field::primitive("or", PrimitiveKind::Null).ctx(1),
    Field::primitive("and-not", PrimitiveKind::Null).ctx(2),
    Field::new("prox", FieldDecoder::Any).ctx(3),
];

const RPN_RPN_OP_FIELDS: &[Field] = &[
    Field::new("rpn1", FieldDecoder::Custom(rpn_structure)),
    Field::new("rpn2", FieldDecoder::Custom(rpn_structure)),
    Field::new("op", FieldDecoder::Choice(OPERATORS)).ctx(46),
];

const RPN_STRUCTURES: &[Field] = &[
    Field::explicit("op", 0, &OPERAND),
    Field::new("rpnRpnOp", FieldDecoder::Sequence(RPN_RPN_OP_FIELDS)).ctx(1),
];

const RPN_STRUCTURE: Field = Field::new(
    "rpn", FieldDecoder::Choice(RPN_STRUCTURES)
);

/// Decodes an RPN structure nested in an operation.
fn rpn_structure(tlv: &Tlv, ctx: &mut DecodeContext) -> DecodedNode {
    if RPN_STRUCTURE.matches(tlv.ident()) {
        decode_field(&RPN_STRUCTURE, tlv, ctx, None).0
    }
    else {
        let mut node = decode_generic(tlv, ctx);
        node.annotate(DecodeError::new(
            ErrorKind::UnexpectedTag,
            format!("unexpected {} where rpn was expected", tlv.ident().tag()),
            tlv.pos()
        ));
        node
    }
}

const RPN_QUERY_FIELDS: &[Field] = &[
    Field::primitive("attributeSet", PrimitiveKind::Oid),
    RPN_STRUCTURE,
];

const QUERIES: &[Field] = &[
    Field::explicit("type-0", 0, &ANY),
    Field::new("type-1", FieldDecoder::Sequence(RPN_QUERY_FIELDS)).ctx(1),
    Field::explicit("type-2", 2, &OCTET_STRING),
    Field::explicit("type-100", 100, &OCTET_STRING),
    Field::new("type-101", FieldDecoder::Sequence(RPN_QUERY_FIELDS)).ctx(101),
    Field::explicit("type-102", 102, &OCTET_STRING),
];


//------------ Search --------------------------------------------------------

const ELEMENT_SET_NAMES: &[Field] = &[
    INTERNATIONAL_STRING.named("genericElementSetName").ctx(0),
    Field::new("databaseSpecific", FieldDecoder::Any).ctx(1),
];

const ELEMENT_SET_NAME: Field = Field::new(
    "elementSetNames", FieldDecoder::Choice(ELEMENT_SET_NAMES)
);

const SEARCH_REQUEST_FIELDS: &[Field] = &[
    REFERENCE_ID,
    Field::primitive("smallSetUpperBound", PrimitiveKind::Integer).ctx(13),
    Field::primitive("largeSetLowerBound", PrimitiveKind::Integer).ctx(14),
    Field::primitive("mediumSetPresentNumber", PrimitiveKind::Integer).ctx(15),
    Field::primitive("replaceIndicator", PrimitiveKind::Boolean).ctx(16),
    INTERNATIONAL_STRING.named("resultSetName").ctx(17),
    Field::new("databaseNames", FieldDecoder::SequenceOf(&DATABASE_NAME))
        .ctx(18),
    Field::explicit("smallSetElementSetNames", 100, &ELEMENT_SET_NAME)
        .optional(),
    Field::explicit("mediumSetElementSetNames", 101, &ELEMENT_SET_NAME)
        .optional(),
    Field::primitive("preferredRecordSyntax", PrimitiveKind::Oid)
        .ctx(104).optional(),
    Field::new("query", FieldDecoder::Choice(QUERIES)).ctx(21),
    Field::new("additionalSearchInfo", FieldDecoder::Any).ctx(203).optional(),
    OTHER_INFO,
];


//------------ Records -------------------------------------------------------

const DIAG_INFO: &[Field] = &[
    Field::primitive("v2Addinfo", PrimitiveKind::Text(CharSet::Visible)),
    INTERNATIONAL_STRING.named("v3Addinfo"),
];

const DEFAULT_DIAG_FORMAT_FIELDS: &[Field] = &[
    Field::primitive("diagnosticSetId", PrimitiveKind::Oid),
    Field::primitive("condition", PrimitiveKind::Integer)
        .summary("z3950.diagnostic"),
    Field::new("addinfo", FieldDecoder::Choice(DIAG_INFO)),
];

const DEFAULT_DIAG_FORMAT: Field = Field::new(
    "defaultFormat", FieldDecoder::Sequence(DEFAULT_DIAG_FORMAT_FIELDS)
);

const DIAG_RECS: &[Field] = &[
    DEFAULT_DIAG_FORMAT,
    EXTERNAL.named("externallyDefined"),
];

const DIAG_REC: Field = Field::new("diagRec", FieldDecoder::Choice(DIAG_RECS));

const RECORD_KINDS: &[Field] = &[
    Field::explicit("retrievalRecord", 1, &EXTERNAL),
    Field::explicit("surrogateDiagnostic", 2, &DIAG_REC),
    Field::new("startingFragment", FieldDecoder::Any).ctx(3),
    Field::new("intermediateFragment", FieldDecoder::Any).ctx(4),
    Field::new("finalFragment", FieldDecoder::Any).ctx(5),
];

const NAME_PLUS_RECORD_FIELDS: &[Field] = &[
    INTERNATIONAL_STRING.named("name").ctx(0).optional(),
    Field::new("record", FieldDecoder::Choice(RECORD_KINDS)).ctx(1),
];

const NAME_PLUS_RECORD: Field = Field::new(
    "namePlusRecord", FieldDecoder::Sequence(NAME_PLUS_RECORD_FIELDS)
);

const RECORDS: &[Field] = &[
    Field::new("responseRecords", FieldDecoder::SequenceOf(&NAME_PLUS_RECORD))
        .ctx(28),
    DEFAULT_DIAG_FORMAT.named("nonSurrogateDiagnostic").ctx(130),
    Field::new("multipleNonSurDiagnostics", FieldDecoder::SequenceOf(&DIAG_REC))
        .ctx(205),
];

const SEARCH_RESPONSE_FIELDS: &[Field] = &[
    REFERENCE_ID,
    Field::primitive("resultCount", PrimitiveKind::Integer).ctx(23)
        .summary("z3950.result_count"),
    Field::primitive("numberOfRecordsReturned", PrimitiveKind::Integer)
        .ctx(24),
    Field::primitive("nextResultSetPosition", PrimitiveKind::Integer).ctx(25),
    Field::primitive("searchStatus", PrimitiveKind::Boolean).ctx(22),
    Field::primitive("resultSetStatus", PrimitiveKind::Integer)
        .ctx(26).optional(),
    Field::primitive("presentStatus", PrimitiveKind::Integer)
        .ctx(27).optional(),
    Field::new("records", FieldDecoder::Choice(RECORDS)).optional(),
    Field::new("additionalSearchInfo", FieldDecoder::Any).ctx(203).optional(),
    OTHER_INFO,
];


//------------ Present -------------------------------------------------------

const RECORD_COMPOSITIONS: &[Field] = &[
    Field::explicit("simple", 19, &ELEMENT_SET_NAME),
    Field::new("complex", FieldDecoder::Any).ctx(209),
];

const PRESENT_REQUEST_FIELDS: &[Field] = &[
    REFERENCE_ID,
    RESULT_SET_ID,
    Field::primitive("resultSetStartPoint", PrimitiveKind::Integer).ctx(30),
    Field::primitive("numberOfRecordsRequested", PrimitiveKind::Integer)
        .ctx(29),
    Field::new("additionalRanges", FieldDecoder::Any).ctx(212).optional(),
    Field::new("recordComposition", FieldDecoder::Choice(RECORD_COMPOSITIONS))
        .optional(),
    Field::primitive("preferredRecordSyntax", PrimitiveKind::Oid)
        .ctx(104).optional(),
    Field::primitive("maxSegmentCount", PrimitiveKind::Integer)
        .ctx(204).optional(),
    Field::primitive("maxRecordSize", PrimitiveKind::Integer)
        .ctx(206).optional(),
    Field::primitive("maxSegmentSize", PrimitiveKind::Integer)
        .ctx(207).optional(),
    OTHER_INFO,
];

const PRESENT_RESPONSE_FIELDS: &[Field] = &[
    REFERENCE_ID,
    Field::primitive("numberOfRecordsReturned", PrimitiveKind::Integer)
        .ctx(24),
    Field::primitive("nextResultSetPosition", PrimitiveKind::Integer).ctx(25),
    Field::primitive("presentStatus", PrimitiveKind::Integer).ctx(27),
    Field::new("records", FieldDecoder::Choice(RECORDS)).optional(),
    OTHER_INFO,
];


//------------ Close ---------------------------------------------------------

const CLOSE_FIELDS: &[Field] = &[
    REFERENCE_ID,
    Field::primitive("closeReason", PrimitiveKind::Integer).ctx(211)
        .summary("z3950.close_reason"),
    INTERNATIONAL_STRING.named("diagnosticInformation").ctx(3).optional(),
    Field::primitive("resourceReportFormat", PrimitiveKind::Oid)
        .ctx(4).optional(),
    Field::explicit("resourceReport", 5, &EXTERNAL).optional(),
    OTHER_INFO,
];


//------------ PDU -----------------------------------------------------------

const fn sequence(
    name: &'static str, number: u32, fields: &'static [Field]
) -> Field {
    Field::new(name, FieldDecoder::Sequence(fields)).ctx(number)
}

const fn any(name: &'static str, number: u32) -> Field {
    Field::new(name, FieldDecoder::Any).ctx(number)
}

const PDUS: &[Field] = &[
    sequence("initRequest", 20, INIT_REQUEST_FIELDS),
    sequence("initResponse", 21, INIT_RESPONSE_FIELDS),
    sequence("searchRequest", 22, SEARCH_REQUEST_FIELDS),
    sequence("searchResponse", 23, SEARCH_RESPONSE_FIELDS),
    sequence("presentRequest", 24, PRESENT_REQUEST_FIELDS),
    sequence("presentResponse", 25, PRESENT_RESPONSE_FIELDS),
    any("deleteResultSetRequest", 26),
    any("deleteResultSetResponse", 27),
    any("accessControlRequest", 28),
    any("accessControlResponse", 29),
    any("resourceControlRequest", 30),
    any("resourceControlResponse", 31),
    any("triggerResourceControlRequest", 32),
    any("resourceReportRequest", 33),
    any("resourceReportResponse", 34),
    any("scanRequest", 35),
    any("scanResponse", 36),
    any("sortRequest", 43),
    any("sortResponse", 44),
    any("segmentRequest", 45),
    any("extendedServicesRequest", 46),
    any("extendedServicesResponse", 47),
    sequence("close", 48, CLOSE_FIELDS),
];

pub const PDU: Field = Field::new("Z39.50 PDU", FieldDecoder::Choice(PDUS));

/// Decodes a single Z39.50 PDU.
pub fn decode_pdu(cursor: ByteCursor, ctx: &mut DecodeContext) -> DecodedNode {
    let node = decode_structure(&PDU, cursor, ctx);
    if let Some(pdu) = node.children().first() {
        if PDUS.iter().any(|field| field.name == pdu.name()) {
            ctx.add_summary("z3950.pdu", pdu.name());
        }
    }
    node
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use crate::decode::{NodeValue, SummaryField, SummaryValue};
    use crate::directory::{FIELD_TERMINATOR, LEADER_LEN, RECORD_TERMINATOR};
    use crate::encode;
    use crate::ident::Ident;
    use crate::mode::Mode;
    use super::*;

    fn implicit(number: u32, values: &[&[u8]]) -> Vec<u8> {
        encode::tlv(Ident::constructed(Tag::ctx(number)), &values.concat())
    }

    fn integer(number: u32, value: i64) -> Vec<u8> {
        encode::primitive(Tag::ctx(number), &encode::integer_content(value))
    }

    /// A MARC record with a single control field.
    fn marc_record() -> Vec<u8> {
        let mut directory = b"001000700000".to_vec();
        directory.push(FIELD_TERMINATOR);
        let mut area = b"ocm123".to_vec();
        area.push(FIELD_TERMINATOR);
        area.push(RECORD_TERMINATOR);
        let base = LEADER_LEN + directory.len();
        let mut res = format!(
            "{:05}nam a22{:05}   4500", base + area.len(), base
        ).into_bytes();
        res.extend_from_slice(&directory);
        res.extend_from_slice(&area);
        res
    }

    fn external(oid: &str, record: &[u8]) -> Vec<u8> {
        encode::constructed(Tag::EXTERNAL, &[
            &encode::oid(&oid.parse().unwrap()),
            &encode::primitive(Tag::ctx(1), record),
        ])
    }

    fn search_response(records: &[&[u8]]) -> Vec<u8> {
        implicit(23, &[
            &integer(23, 42),
            &integer(24, records.len() as i64),
            &integer(25, 2),
            &encode::primitive(Tag::ctx(22), b"\xff"),
            &implicit(28, records),
        ])
    }

    fn decode(data: &[u8]) -> (DecodedNode, Vec<SummaryField>) {
        let mut registry = Registry::new();
        register(&mut registry, 10_000);
        let mut ctx = DecodeContext::new(&registry, Mode::Ber);
        let node = decode_pdu(ByteCursor::new(data), &mut ctx);
        (node, ctx.finish().0)
    }

    #[test]
    fn search_response_with_marc() {
        let record = encode::sequence(&[
            &encode::primitive(Tag::ctx(0), b"Default"),
            &encode::explicit(1, &encode::explicit(
                1, &external(MARC21, &marc_record())
            )),
        ]);
        let (node, summary) = decode(&search_response(&[&record]));
        assert_eq!(node.error_count(), 0, "{node}");
        assert!(node.ranges_nest());
        let record = node.path(&[
            "searchResponse", "records", "responseRecords", "namePlusRecord",
            "record", "retrievalRecord", "encoding", "octet-aligned", "record"
        ]).unwrap();
        assert_eq!(
            record.path(&["data", "001"]).unwrap().value().as_text(),
            Some("ocm123")
        );
        assert_eq!(
            summary.iter().map(|item| item.key).collect::<Vec<_>>(),
            [
                "z3950.result_count", "z3950.record_syntax",
                "marc.record_type", "marc.fields", "z3950.pdu"
            ]
        );
        assert_eq!(summary[0].value, SummaryValue::Integer(42));
        assert_eq!(summary[1].value, SummaryValue::Text(MARC21.into()));
    }

    #[test]
    fn unknown_record_syntax() {
        let record = encode::sequence(&[
            &encode::explicit(1, &encode::explicit(
                1, &external("1.2.840.10003.5.109.10", b"<record/>")
            )),
        ]);
        let (node, _) = decode(&search_response(&[&record]));
        assert_eq!(node.error_count(), 0, "{node}");
        let aligned = node.find("octet-aligned").unwrap();
        assert_eq!(
            aligned.children()[0].value(),
            &NodeValue::Bytes(b"<record/>"[..].into())
        );
        assert!(aligned.has_annotation(ErrorKind::UnknownDiscriminator));
    }

    #[test]
    fn search_request_with_query() {
        let term = |value: &[u8]| implicit(102, &[
            &implicit(44, &[&encode::sequence(&[
                &integer(120, 1),
                &integer(121, 4),
            ])]),
            &encode::primitive(Tag::ctx(45), value),
        ]);
        let rpn = implicit(1, &[
            &encode::explicit(0, &term(b"rust")),
            &encode::explicit(0, &term(b"ber")),
            &encode::explicit(46, &encode::primitive(Tag::ctx(0), b"")),
        ]);
        let data = implicit(22, &[
            &integer(13, 0),
            &integer(14, 1),
            &integer(15, 0),
            &encode::primitive(Tag::ctx(16), b"\xff"),
            &encode::primitive(Tag::ctx(17), b"default"),
            &implicit(18, &[&encode::primitive(Tag::ctx(105), b"books")]),
            &encode::explicit(21, &implicit(1, &[
                &encode::oid(&"1.2.840.10003.3.1".parse().unwrap()),
                &rpn,
            ])),
        ]);
        let (node, summary) = decode(&data);
        assert_eq!(node.error_count(), 0, "{node}");
        let query = node.path(&["searchRequest", "query", "type-1"]).unwrap();
        let op = query.path(&["rpn", "rpnRpnOp"]).unwrap();
        assert_eq!(
            op.path(&["rpn1", "op", "attrTerm", "term", "general"]).unwrap()
                .value().as_bytes(),
            Some(&b"rust"[..])
        );
        assert!(op.path(&["op", "and"]).is_some());
        assert_eq!(
            summary,
            [SummaryField {
                key: "z3950.pdu",
                value: SummaryValue::Text("searchRequest".into())
            }]
        );
    }

    #[test]
    fn other_pdus() {
        let (node, summary) = decode(&implicit(35, &[&encode::null()]));
        assert_eq!(node.error_count(), 0, "{node}");
        assert!(node.child("scanRequest").is_some());
        assert_eq!(summary[0].value, SummaryValue::Text("scanRequest".into()));

        let (node, _) = decode(&implicit(40, &[]));
        assert!(node.has_annotation(ErrorKind::UnexpectedTag));
    }
}
