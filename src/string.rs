//! Character strings.
//!
//! ASN.1 has a whole zoo of character string types. They are all encoded
//! like an OCTET STRING but restrict the set of characters that may appear
//! in the content. This module provides a [`CharSet`] describing these
//! restrictions and the conversion of content into Rust strings.

use std::{char, fmt};
use std::borrow::Cow;
use crate::ident::Tag;


//------------ CharSet -------------------------------------------------------

/// The character set of a character string type.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CharSet {
    /// UTF8String: any valid UTF-8.
    Utf8,

    /// NumericString: the digits and the space character.
    Numeric,

    /// PrintableString: a subset of ASCII.
    ///
    /// This allows the letters `A` to `Z` and `a` to `z`, the digits, the
    /// space character, and the symbols `'`, `(`, `)`, `+`, `,`, `-`, `.`,
    /// `/`, `:`, `=`, and `?`.
    Printable,

    /// IA5String: all of ASCII.
    Ia5,

    /// VisibleString: ASCII without control characters.
    Visible,

    /// GeneralString and friends: any octets, shown as Latin-1.
    General,

    /// BMPString: UCS-2 in big-endian order.
    Bmp,
}

impl CharSet {
    /// Returns the character set for a universal tag.
    pub fn for_tag(tag: Tag) -> Option<Self> {
        match tag {
            Tag::UTF8_STRING => Some(CharSet::Utf8),
            Tag::NUMERIC_STRING => Some(CharSet::Numeric),
            Tag::PRINTABLE_STRING => Some(CharSet::Printable),
            Tag::IA5_STRING => Some(CharSet::Ia5),
            Tag::VISIBLE_STRING | Tag::OBJECT_DESCRIPTOR => {
                Some(CharSet::Visible)
            }
            Tag::GENERAL_STRING | Tag::GRAPHIC_STRING
                | Tag::TELETEX_STRING => Some(CharSet::General),
            Tag::BMP_STRING => Some(CharSet::Bmp),
            _ => None
        }
    }

    /// Checks that all octets of `slice` are allowed.
    ///
    /// On failure, the error contains the index of the first offending
    /// octet.
    pub fn check(self, slice: &[u8]) -> Result<(), CharSetError> {
        let bad = match self {
            CharSet::Utf8 => {
                return std::str::from_utf8(slice).map(|_| ()).map_err(|err| {
                    CharSetError(err.valid_up_to())
                })
            }
            CharSet::Numeric => {
                slice.iter().position(|&x| !(x.is_ascii_digit() || x == b' '))
            }
            CharSet::Printable => {
                slice.iter().position(|&x| !is_printable(x))
            }
            CharSet::Ia5 => slice.iter().position(|x| !x.is_ascii()),
            CharSet::Visible => {
                slice.iter().position(|&x| !(0x20..0x7F).contains(&x))
            }
            CharSet::General => None,
            CharSet::Bmp => {
                if slice.len() % 2 != 0 {
                    Some(slice.len() - 1)
                }
                else {
                    slice.chunks(2).position(|pair| {
                        (0xD8..0xE0).contains(&pair[0])
                    }).map(|idx| idx * 2)
                }
            }
        };
        match bad {
            Some(idx) => Err(CharSetError(idx)),
            None => Ok(())
        }
    }

    /// Converts the content into a string, replacing what can’t be shown.
    pub fn decode_lossy(self, slice: &[u8]) -> Cow<str> {
        match self {
            CharSet::General => {
                Cow::Owned(slice.iter().map(|&x| char::from(x)).collect())
            }
            CharSet::Bmp => {
                Cow::Owned(
                    slice.chunks(2).map(|pair| {
                        let unit = match *pair {
                            [high, low] => u32::from(high) << 8 | u32::from(low),
                            _ => 0xFFFD,
                        };
                        char::from_u32(unit).unwrap_or(
                            char::REPLACEMENT_CHARACTER
                        )
                    }).collect()
                )
            }
            _ => String::from_utf8_lossy(slice)
        }
    }
}

fn is_printable(x: u8) -> bool {
    x.is_ascii_alphanumeric() || // A-Z a-z 0-9
    x == b' ' || x == b'\'' || x == b'(' || x == b')' ||
    x == b'+' || x == b',' || x == b'-' || x == b'.' ||
    x == b'/' || x == b':' || x == b'=' || x == b'?'
}


//------------ CharSetError --------------------------------------------------

/// A string contained characters outside its character set.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CharSetError(pub usize);

impl fmt::Display for CharSetError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid character at index {}", self.0)
    }
}

impl std::error::Error for CharSetError { }


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn printable() {
        assert!(CharSet::Printable.check(b"Hello World (1+1=2)?").is_ok());
        assert_eq!(
            CharSet::Printable.check(b"foo@bar"), Err(CharSetError(3))
        );
    }

    #[test]
    fn numeric_and_ascii() {
        assert!(CharSet::Numeric.check(b"0123 456").is_ok());
        assert!(CharSet::Numeric.check(b"12a").is_err());
        assert!(CharSet::Ia5.check(b"a@b.c\n").is_ok());
        assert!(CharSet::Ia5.check(b"\xC3\xA4").is_err());
        assert!(CharSet::Visible.check(b"a@b.c").is_ok());
        assert!(CharSet::Visible.check(b"a\n").is_err());
    }

    #[test]
    fn utf8_and_bmp() {
        assert!(CharSet::Utf8.check("grün".as_bytes()).is_ok());
        assert_eq!(CharSet::Utf8.check(b"ab\xFF"), Err(CharSetError(2)));
        assert!(CharSet::Bmp.check(b"\x00A\x00B").is_ok());
        assert!(CharSet::Bmp.check(b"\x00A\x00").is_err());
        assert!(CharSet::Bmp.check(b"\xD8\x00").is_err());
        assert_eq!(CharSet::Bmp.decode_lossy(b"\x00A\x00\xFC"), "Aü");
        assert_eq!(CharSet::General.decode_lossy(b"gr\xFCn"), "grün");
    }

    #[test]
    fn tags() {
        assert_eq!(
            CharSet::for_tag(Tag::PRINTABLE_STRING), Some(CharSet::Printable)
        );
        assert_eq!(CharSet::for_tag(Tag::OCTET_STRING), None);
    }
}
