//! The identifier octets of a BER encoded value.
//!
//! The identifier carries the tag of a value and whether it is constructed.
//! Tag numbers above 30 use the multi-octet form.

use std::fmt;
use crate::cursor::ByteCursor;
use crate::decode::DecodeError;
use crate::mode::Mode;


//------------ Class ---------------------------------------------------------

/// The class of a tag.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Class {
    Universal,
    Application,
    Context,
    Private,
}

impl Class {
    const fn from_u8(octet: u8) -> Self {
        match octet {
            0x00..=0x3F => Self::Universal,
            0x40..=0x7F => Self::Application,
            0x80..=0xBF => Self::Context,
            0xC0..=0xFF => Self::Private
        }
    }

    const fn into_u8(self) -> u8 {
        match self {
            Self::Universal => 0x00,
            Self::Application => 0x40,
            Self::Context => 0x80,
            Self::Private => 0xC0,
        }
    }
}


//------------ Tag -----------------------------------------------------------

/// The tag of a value.
///
/// In ASN.1, tags are used to identify the type of a value. Tags consist of
/// one of four classes, represented by the [`Class`] enum, and a number
/// within this class.
///
/// # Limitations
///
/// We only support tag numbers that fit into a `u32`. This should be more
/// than enough in practice.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Tag {
    class: Class,
    number: u32,
}

impl Tag {
    /// Creates a tag from a class and number.
    pub const fn new(class: Class, number: u32) -> Self {
        Tag { class, number }
    }

    /// Creates a new tag in class “context dependent” with the given number.
    pub const fn ctx(number: u32) -> Self {
        Self::new(Class::Context, number)
    }

    /// Creates a new tag in class “application” with the given number.
    pub const fn application(number: u32) -> Self {
        Self::new(Class::Application, number)
    }

    /// Returns the class of the tag.
    pub const fn class(self) -> Class {
        self.class
    }

    /// Returns the number of the tag.
    pub const fn number(self) -> u32 {
        self.number
    }

    /// Returns whether the tag is the end-of-contents marker.
    pub const fn is_end_of_contents(self) -> bool {
        matches!(self.class, Class::Universal) && self.number == 0
    }
}

/// Universal tags used by the decoders.
///
/// The numbers are assigned in clause 8.4 of ITU-T X.690. SEQUENCE and SET
/// are shared with SEQUENCE OF and SET OF.
impl Tag {
    pub const END_OF_CONTENTS: Self = Self::universal(0);
    pub const BOOLEAN: Self = Self::universal(1);
    pub const INTEGER: Self = Self::universal(2);
    pub const BIT_STRING: Self = Self::universal(3);
    pub const OCTET_STRING: Self = Self::universal(4);
    pub const NULL: Self = Self::universal(5);
    pub const OID: Self = Self::universal(6);
    pub const OBJECT_DESCRIPTOR: Self = Self::universal(7);
    pub const EXTERNAL: Self = Self::universal(8);
    pub const REAL: Self = Self::universal(9);
    pub const ENUMERATED: Self = Self::universal(10);
    pub const UTF8_STRING: Self = Self::universal(12);
    pub const RELATIVE_OID: Self = Self::universal(13);
    pub const SEQUENCE: Self = Self::universal(16);
    pub const SET: Self = Self::universal(17);
    pub const NUMERIC_STRING: Self = Self::universal(18);
    pub const PRINTABLE_STRING: Self = Self::universal(19);
    pub const TELETEX_STRING: Self = Self::universal(20);
    pub const IA5_STRING: Self = Self::universal(22);
    pub const UTC_TIME: Self = Self::universal(23);
    pub const GENERALIZED_TIME: Self = Self::universal(24);
    pub const GRAPHIC_STRING: Self = Self::universal(25);
    pub const VISIBLE_STRING: Self = Self::universal(26);
    pub const GENERAL_STRING: Self = Self::universal(27);
    pub const UNIVERSAL_STRING: Self = Self::universal(28);
    pub const BMP_STRING: Self = Self::universal(30);

    const fn universal(number: u32) -> Self {
        Self::new(Class::Universal, number)
    }

    /// Returns the ASN.1 type name for a universal tag number.
    fn universal_name(number: u32) -> Option<&'static str> {
        UNIVERSAL_NAMES.iter().find_map(|&(item, name)| {
            (item == number).then_some(name)
        })
    }
}

const UNIVERSAL_NAMES: &[(u32, &str)] = &[
    (0, "end-of-contents"), (1, "BOOLEAN"), (2, "INTEGER"), (3, "BIT STRING"),
    (4, "OCTET STRING"), (5, "NULL"), (6, "OBJECT IDENTIFIER"),
    (7, "ObjectDescriptor"), (8, "EXTERNAL"), (9, "REAL"), (10, "ENUMERATED"),
    (12, "UTF8String"), (13, "RELATIVE-OID"), (16, "SEQUENCE"), (17, "SET"),
    (18, "NumericString"), (19, "PrintableString"), (20, "TeletexString"),
    (22, "IA5String"), (23, "UTCTime"), (24, "GeneralizedTime"),
    (25, "GraphicString"), (26, "VisibleString"), (27, "GeneralString"),
    (28, "UniversalString"), (30, "BMPString"),
];

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let number = self.number;
        match self.class {
            Class::Universal => match Self::universal_name(number) {
                Some(name) => f.write_str(name),
                None => write!(f, "[UNIVERSAL {number}]"),
            }
            Class::Application => write!(f, "[APPLICATION {number}]"),
            Class::Context => write!(f, "[{number}]"),
            Class::Private => write!(f, "[PRIVATE {number}]"),
        }
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Tag({})", self)
    }
}


//------------ Ident ---------------------------------------------------------

/// The identifier octets: a tag plus the constructed flag.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Ident {
    tag: Tag,
    constructed: bool,
}

impl Ident {
    /// The identifier of the end-of-contents marker.
    pub const END_OF_CONTENTS: Self = Self::new(Tag::END_OF_CONTENTS, false);

    pub const fn new(tag: Tag, constructed: bool) -> Self {
        Ident { tag, constructed }
    }

    /// Creates the identifier of a primitive value.
    pub const fn primitive(tag: Tag) -> Self {
        Self::new(tag, false)
    }

    /// Creates the identifier of a constructed value.
    pub const fn constructed(tag: Tag) -> Self {
        Self::new(tag, true)
    }

    pub const fn tag(self) -> Tag {
        self.tag
    }

    pub const fn class(self) -> Class {
        self.tag.class
    }

    pub const fn number(self) -> u32 {
        self.tag.number
    }

    /// Returns whether the value is to be a constructed value.
    pub const fn is_constructed(self) -> bool {
        self.constructed
    }

    /// Reads the identifier octets starting at `offset`.
    ///
    /// Returns the identifier and the offset of the first octet after it.
    ///
    /// Multi-octet tag numbers are accepted as long as they fit into a
    /// `u32`. In restricted mode, they also have to use the shortest
    /// possible form.
    pub fn read(
        cursor: &ByteCursor, offset: usize, mode: Mode,
    ) -> Result<(Self, usize), DecodeError> {
        let start = cursor.abs(offset);
        let first = cursor.read_u8(offset)?;
        let class = Class::from_u8(first);
        let constructed = first & 0x20 != 0;

        // If we have a single octet tag, we can already return.
        if (first & 0x1f) < 0x1f {
            return Ok((
                Self::new(Tag::new(class, u32::from(first & 0x1f)), constructed),
                offset + 1
            ))
        }

        // Work your way through the multi-octet tags.
        let mut number = 0u32;
        let mut pos = offset + 1;
        loop {
            let octet = cursor.read_u8(pos).map_err(|_| {
                DecodeError::malformed_tag(
                    "tag octets run past end of data", start
                )
            })?;
            if pos == offset + 1 && octet == 0x80 && mode.is_restricted() {
                return Err(DecodeError::malformed_tag(
                    "tag number with leading zero octet", start
                ))
            }
            if number > (u32::MAX >> 7) {
                return Err(DecodeError::malformed_tag(
                    "tag numbers above 32 bits not supported", start
                ))
            }
            number = (number << 7) | u32::from(octet & 0x7F);
            pos += 1;
            if octet & 0x80 == 0 {
                break
            }
        }
        if number < 0x1f && mode.is_restricted() {
            return Err(DecodeError::malformed_tag(
                "low tag number in multi-octet form", start
            ))
        }
        Ok((Self::new(Tag::new(class, number), constructed), pos))
    }

    /// Appends the encoded identifier octets to `target`.
    pub fn append_encoded(self, target: &mut Vec<u8>) {
        let first = if self.constructed {
            self.tag.class.into_u8() | 0x20
        }
        else {
            self.tag.class.into_u8()
        };
        let number = self.tag.number;
        if number <= 0x1e {
            // five bits but not all of them one (so not 0x1f)
            target.push(first | number as u8);
            return
        }
        target.push(first | 0x1f);

        // Base 128, most significant group first, all but the last with
        // bit 8 set.
        let mut groups = [0u8; 5];
        let mut len = 0;
        let mut rest = number;
        loop {
            groups[len] = (rest & 0x7F) as u8;
            len += 1;
            rest >>= 7;
            if rest == 0 {
                break
            }
        }
        for idx in (0..len).rev() {
            if idx == 0 {
                target.push(groups[idx]);
            }
            else {
                target.push(groups[idx] | 0x80);
            }
        }
    }

    /// Returns the number of octets of the encoded form.
    pub fn encoded_len(self) -> usize {
        match self.tag.number {
            0..=0x1e => 1,
            0x1f..=0x7f => 2,
            0x80..=0x3fff => 3,
            0x4000..=0x1f_ffff => 4,
            0x20_0000..=0x0fff_ffff => 5,
            _ => 6
        }
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::decode::ErrorKind;

    fn read(data: &[u8], mode: Mode) -> Result<(Ident, usize), DecodeError> {
        Ident::read(&ByteCursor::new(data), 0, mode)
    }

    #[test]
    fn single_octet_tags() {
        let (ident, next) = read(b"\x04\x03", Mode::Ber).unwrap();
        assert_eq!(ident.tag(), Tag::OCTET_STRING);
        assert!(!ident.is_constructed());
        assert_eq!(next, 1);

        let (ident, _) = read(b"\x30", Mode::Ber).unwrap();
        assert_eq!(ident.tag(), Tag::SEQUENCE);
        assert!(ident.is_constructed());

        let (ident, _) = read(b"\xa3", Mode::Ber).unwrap();
        assert_eq!(ident.class(), Class::Context);
        assert_eq!(ident.number(), 3);

        let (ident, _) = read(b"\x7e", Mode::Ber).unwrap();
        assert_eq!(ident.tag(), Tag::application(30));
        assert!(ident.is_constructed());
    }

    #[test]
    fn multi_octet_tags() {
        let (ident, next) = read(b"\x9f\x1f", Mode::Der).unwrap();
        assert_eq!(ident.tag(), Tag::ctx(0x1f));
        assert_eq!(next, 2);

        let (ident, next) = read(b"\x5f\x81\x00", Mode::Der).unwrap();
        assert_eq!(ident.tag(), Tag::application(0x80));
        assert_eq!(next, 3);

        let (ident, _) = read(b"\x1f\x8f\xff\xff\xff\x7f", Mode::Ber).unwrap();
        assert_eq!(ident.number(), u32::MAX);
    }

    #[test]
    fn tag_failures() {
        assert_eq!(
            read(b"", Mode::Ber).unwrap_err().kind(), ErrorKind::OutOfBounds
        );
        assert_eq!(
            read(b"\x1f\x81", Mode::Ber).unwrap_err().kind(),
            ErrorKind::MalformedTag
        );
        assert_eq!(
            read(b"\x1f\x90\x80\x80\x80\x00", Mode::Ber).unwrap_err().kind(),
            ErrorKind::MalformedTag
        );

        // Non-minimal forms are fine in BER but not in DER.
        assert!(read(b"\x1f\x80\x21", Mode::Ber).is_ok());
        assert!(read(b"\x1f\x80\x21", Mode::Der).is_err());
        assert!(read(b"\x1f\x05", Mode::Ber).is_ok());
        assert!(read(b"\x1f\x05", Mode::Der).is_err());
    }

    #[test]
    fn encode() {
        fn step(ident: Ident, res: &[u8]) {
            let mut vec = Vec::new();
            ident.append_encoded(&mut vec);
            assert_eq!(vec.as_slice(), res, "{:?}", ident);
            assert_eq!(ident.encoded_len(), res.len());
            let (back, next) = read(res, Mode::Der).unwrap();
            assert_eq!(back, ident);
            assert_eq!(next, res.len());
        }

        step(Ident::primitive(Tag::INTEGER), b"\x02");
        step(Ident::constructed(Tag::SEQUENCE), b"\x30");
        step(Ident::constructed(Tag::ctx(30)), b"\xbe");
        step(Ident::primitive(Tag::ctx(31)), b"\x9f\x1f");
        step(Ident::constructed(Tag::application(0x80)), b"\x7f\x81\x00");
        step(Ident::primitive(Tag::ctx(0x4000)), b"\x9f\x81\x80\x00");
    }

    #[test]
    fn display() {
        assert_eq!(Tag::SEQUENCE.to_string(), "SEQUENCE");
        assert_eq!(Tag::ctx(3).to_string(), "[3]");
        assert_eq!(Tag::application(30).to_string(), "[APPLICATION 30]");
    }
}
