//! Reading a single tag-length-value triple.
//!
//! This is a private module. Its public content is being re-exported by the
//! parent module.

use std::ops::Range;
use crate::cursor::ByteCursor;
use crate::ident::Ident;
use crate::length::Length;
use crate::mode::Mode;
use super::error::DecodeError;


//------------ Tlv -----------------------------------------------------------

/// The location of one encoded value.
///
/// A `Tlv` doesn’t decode the content. It only knows where the value
/// starts and ends and provides a cursor over its content octets.
#[derive(Clone, Copy, Debug)]
pub struct Tlv<'a> {
    ident: Ident,
    length: Length,

    /// The offset of the identifier octets in the enclosing cursor.
    start: usize,

    /// The offset just past the value, including any end-of-contents.
    end: usize,

    /// The content octets, without any end-of-contents marker.
    content: ByteCursor<'a>,

    /// The complete encoded value.
    value: ByteCursor<'a>,
}

impl<'a> Tlv<'a> {
    /// Reads the value starting at `offset` in `cursor`.
    ///
    /// The value must end within the cursor. For values of indefinite
    /// length, the end-of-contents marker is located by walking over the
    /// nested values. Only constructed values in BER may use indefinite
    /// length.
    pub fn read(
        cursor: &ByteCursor<'a>, offset: usize, mode: Mode
    ) -> Result<Self, DecodeError> {
        let pos = cursor.abs(offset);
        let (ident, content_start) = Ident::read(cursor, offset, mode)?;
        if ident == Ident::END_OF_CONTENTS {
            return Err(DecodeError::malformed(
                "unexpected end-of-contents", pos
            ))
        }
        let (length, content_start) = Length::read(
            cursor, content_start, mode
        )?;
        match length {
            Length::Definite(len) => {
                let content = cursor.subrange(content_start, len).map_err(|_| {
                    DecodeError::malformed_length(
                        "value runs past end of enclosing data", pos
                    )
                })?;
                let end = content_start + len;
                Ok(Tlv {
                    ident, length, start: offset, end, content,
                    value: cursor.subrange(offset, end - offset)?,
                })
            }
            Length::Indefinite => {
                if !ident.is_constructed() {
                    return Err(DecodeError::malformed_length(
                        "indefinite length primitive value", pos
                    ))
                }
                if !mode.allows_indefinite() {
                    return Err(DecodeError::malformed_length(
                        "indefinite length in DER", pos
                    ))
                }
                let content_end = find_end_of_contents(
                    cursor, content_start, mode
                )?;
                let content = cursor.subrange(
                    content_start, content_end - content_start
                )?;
                let end = content_end + 2;
                Ok(Tlv {
                    ident, length, start: offset, end, content,
                    value: cursor.subrange(offset, end - offset)?,
                })
            }
        }
    }

    pub fn ident(&self) -> Ident {
        self.ident
    }

    pub fn length(&self) -> Length {
        self.length
    }

    /// Returns the offset of the value in the cursor it was read from.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Returns the offset of whatever follows the value.
    pub fn end(&self) -> usize {
        self.end
    }

    pub fn content(&self) -> ByteCursor<'a> {
        self.content
    }

    /// Returns a cursor over the complete encoding of the value.
    pub fn value(&self) -> ByteCursor<'a> {
        self.value
    }

    /// Returns the absolute position of the first identifier octet.
    pub fn pos(&self) -> usize {
        self.content.base() - (self.header_len())
    }

    /// Returns the absolute range of the complete value.
    pub fn range(&self) -> Range<usize> {
        self.pos()..self.pos() + (self.end - self.start)
    }

    /// Returns the number of identifier and length octets.
    fn header_len(&self) -> usize {
        let trailer = match self.length {
            Length::Definite(_) => 0,
            Length::Indefinite => 2,
        };
        (self.end - self.start) - self.content.len() - trailer
    }
}


//------------ find_end_of_contents ------------------------------------------

/// Finds the end-of-contents marker closing a value of indefinite length.
///
/// Returns the offset of the marker. Nested values of indefinite length are
/// tracked with a counter rather than recursion so that deep nesting can’t
/// exhaust the stack.
fn find_end_of_contents(
    cursor: &ByteCursor, mut offset: usize, mode: Mode
) -> Result<usize, DecodeError> {
    let mut open = 1usize;
    loop {
        let pos = cursor.abs(offset);
        if cursor.remaining(offset) == 0 {
            return Err(DecodeError::malformed_length(
                "missing end-of-contents", pos
            ))
        }
        let (ident, next) = Ident::read(cursor, offset, mode)?;
        let (length, next) = Length::read(cursor, next, mode)?;
        if ident == Ident::END_OF_CONTENTS {
            if !length.is_zero() {
                return Err(DecodeError::malformed(
                    "end-of-contents with non-zero length", pos
                ))
            }
            open -= 1;
            if open == 0 {
                return Ok(offset)
            }
            offset = next;
            continue
        }
        match length {
            Length::Definite(len) => {
                if cursor.remaining(next) < len {
                    return Err(DecodeError::malformed_length(
                        "value runs past end of enclosing data", pos
                    ))
                }
                offset = next + len;
            }
            Length::Indefinite => {
                if !ident.is_constructed() {
                    return Err(DecodeError::malformed_length(
                        "indefinite length primitive value", pos
                    ))
                }
                open += 1;
                offset = next;
            }
        }
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use crate::decode::ErrorKind;
    use crate::ident::Tag;
    use super::*;

    #[test]
    fn definite() {
        let data = b"\xFF\x04\x03\x01\x02\x03\x05\x00";
        let cursor = ByteCursor::new(data);
        let tlv = Tlv::read(&cursor, 1, Mode::Der).unwrap();
        assert_eq!(tlv.ident().tag(), Tag::OCTET_STRING);
        assert_eq!(tlv.content().as_slice(), b"\x01\x02\x03");
        assert_eq!(tlv.content().base(), 3);
        assert_eq!(tlv.end(), 6);
        assert_eq!(tlv.range(), 1..6);
        let tlv = Tlv::read(&cursor, 6, Mode::Der).unwrap();
        assert_eq!(tlv.range(), 6..8);
    }

    #[test]
    fn indefinite() {
        let data = b"\x30\x80\x30\x80\x02\x01\x05\x00\x00\x04\x00\x00\x00\x01";
        let cursor = ByteCursor::new(data);
        let tlv = Tlv::read(&cursor, 0, Mode::Ber).unwrap();
        assert_eq!(tlv.content().as_slice(), &data[2..11]);
        assert_eq!(tlv.end(), 13);
        assert_eq!(tlv.range(), 0..13);
        assert_eq!(
            Tlv::read(&cursor, 0, Mode::Der).unwrap_err().kind(),
            ErrorKind::MalformedLength
        );
    }

    #[test]
    fn broken() {
        let check = |data: &[u8], kind| {
            assert_eq!(
                Tlv::read(&ByteCursor::new(data), 0, Mode::Ber)
                    .unwrap_err().kind(),
                kind
            );
        };
        check(b"\x04\x05\x01", ErrorKind::MalformedLength);
        check(b"\x04\x80\x00\x00", ErrorKind::MalformedLength);
        check(b"\x30\x80\x02\x01\x05", ErrorKind::MalformedLength);
        check(b"\x00\x00", ErrorKind::MalformedValue);
        check(b"\x04", ErrorKind::OutOfBounds);
        check(b"", ErrorKind::OutOfBounds);
    }
}
