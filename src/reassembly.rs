//! Turning a byte stream into messages.
//!
//! Stream transports deliver data in chunks that have nothing to do with
//! message boundaries. A [`Reassembler`] collects the chunks of one
//! direction of one connection, reads the length prefix of the next
//! message, and hands out messages once they are complete.
//!
//! The reassembler never blocks. Whether it needs more data is reported
//! through its [`ReassemblyState`]. The caller simply pushes the next chunk
//! whenever it arrives.

use std::collections::VecDeque;
use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, trace};
use crate::cursor::ByteCursor;
use crate::decode::{DecodeError, FatalError};
use crate::ident::Ident;
use crate::length::Length;
use crate::mode::Mode;


//------------ FrameFormat ---------------------------------------------------

/// How messages are delimited in a stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FrameFormat {
    /// A big-endian 32 bit length prefix followed by the message.
    ///
    /// Bits set in `reserved_mask` must be zero in the prefix. The prefix
    /// is not part of the message.
    U32 { reserved_mask: u32 },

    /// Each message is a single BER encoded value of definite length.
    ///
    /// The identifier and length octets are part of the message.
    BerTlv,

    /// Every chunk is exactly one message.
    Datagram,
}

impl FrameFormat {
    /// The record marking used by Kerberos over TCP.
    ///
    /// The most significant bit of the record mark is reserved for an
    /// extension mechanism that is not supported.
    pub const KERBEROS: Self = FrameFormat::U32 { reserved_mask: 0x8000_0000 };

    /// A plain 32 bit length prefix.
    pub const LENGTH_PREFIXED: Self = FrameFormat::U32 { reserved_mask: 0 };
}


//------------ ReassemblyState -----------------------------------------------

/// Where a reassembler stands.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReassemblyState {
    /// The length of the next message isn’t known yet.
    AwaitingLengthPrefix,

    /// The given number of octets is still missing from the next message.
    AwaitingBody(usize),

    /// At least one complete message can be taken.
    MessageReady,
}


//------------ ReassemblyError -----------------------------------------------

/// The stream could not be split into messages.
///
/// After an error, everything buffered for the current message has been
/// dropped. If the message was only rejected for its size, the rest of its
/// body is skipped as it arrives. Otherwise the reassembler waits for a new
/// length prefix right away.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ReassemblyError {
    #[error(transparent)]
    Fatal(#[from] FatalError),

    #[error(transparent)]
    Framing(#[from] DecodeError),
}


//------------ Reassembler ---------------------------------------------------

/// Reassembles the messages of one direction of one connection.
#[derive(Clone, Debug)]
pub struct Reassembler {
    format: FrameFormat,
    max_message_size: usize,

    /// Data received but not yet handed out.
    buf: BytesMut,

    /// The header and body length of the current message.
    ///
    /// This is `None` while the length prefix is still incomplete.
    current: Option<(usize, usize)>,

    /// The number of stream octets that have left the buffer.
    consumed: usize,

    /// The number of octets of a rejected message still to be skipped.
    discard: usize,

    ready: VecDeque<Bytes>,
}

impl Reassembler {
    pub fn new(format: FrameFormat, max_message_size: usize) -> Self {
        Reassembler {
            format,
            max_message_size,
            buf: BytesMut::new(),
            current: None,
            consumed: 0,
            discard: 0,
            ready: VecDeque::new(),
        }
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Returns the number of octets buffered for incomplete messages.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Returns the number of octets of a rejected message yet to arrive.
    pub fn discarding(&self) -> usize {
        self.discard
    }

    pub fn state(&self) -> ReassemblyState {
        if !self.ready.is_empty() {
            ReassemblyState::MessageReady
        }
        else {
            match self.current {
                None => ReassemblyState::AwaitingLengthPrefix,
                Some((header, body)) => {
                    ReassemblyState::AwaitingBody(
                        (header + body).saturating_sub(self.buf.len())
                    )
                }
            }
        }
    }

    /// Adds the next chunk of data.
    ///
    /// Returns the new state. All messages completed by the chunk can then
    /// be taken via [`next_message`][Self::next_message], even if an error
    /// is returned. The error is the first one found in the chunk.
    pub fn push(
        &mut self, data: &[u8]
    ) -> Result<ReassemblyState, ReassemblyError> {
        if self.format == FrameFormat::Datagram {
            let pos = self.consumed;
            self.consumed += data.len();
            self.check_size(data.len(), pos)?;
            self.ready.push_back(Bytes::copy_from_slice(data));
            return Ok(self.state())
        }

        let skipped = self.discard.min(data.len());
        self.discard -= skipped;
        self.consumed += skipped;
        self.buf.extend_from_slice(&data[skipped..]);

        let mut failed: Option<ReassemblyError> = None;
        loop {
            let (header, body) = match self.current {
                Some(current) => current,
                None => {
                    match self.read_header() {
                        Ok(Some((header, body))) => {
                            if let Err(err) = self.check_size(
                                body, self.consumed
                            ) {
                                self.reject(header.saturating_add(body));
                                failed = failed.or(Some(err.into()));
                                continue
                            }
                            self.current = Some((header, body));
                            (header, body)
                        }
                        Ok(None) => break,
                        Err(err) => {
                            self.reset();
                            failed = failed.or(Some(err));
                            break
                        }
                    }
                }
            };
            let total = header + body;
            if self.buf.len() < total {
                break
            }
            let mut message = self.buf.split_to(total).freeze();
            if matches!(self.format, FrameFormat::U32 { .. }) {
                message = message.slice(header..)
            }
            trace!(
                "message of {} octets complete at stream offset {}",
                message.len(), self.consumed
            );
            self.consumed += total;
            self.ready.push_back(message);
            self.current = None;
        }
        match failed {
            Some(err) => Err(err),
            None => Ok(self.state()),
        }
    }

    /// Takes the next complete message.
    pub fn next_message(&mut self) -> Option<Bytes> {
        self.ready.pop_front()
    }

    /// Drops all buffered data of the current message.
    ///
    /// Messages already complete remain available.
    pub fn reset(&mut self) {
        if !self.buf.is_empty() {
            debug!("discarding {} buffered octets", self.buf.len());
        }
        self.consumed += self.buf.len();
        self.buf.clear();
        self.current = None;
        self.discard = 0;
    }

    /// Skips a rejected message of `total` octets including its header.
    ///
    /// Whatever part of it hasn’t arrived yet is skipped by later pushes.
    fn reject(&mut self, total: usize) {
        let skipped = total.min(self.buf.len());
        self.buf.advance(skipped);
        self.consumed += skipped;
        self.discard = total - skipped;
        self.current = None;
        if self.discard > 0 {
            debug!("skipping the next {} octets of the stream", self.discard);
        }
    }

    /// Reads the length prefix if it is complete.
    ///
    /// Returns the length of the prefix and of the body.
    fn read_header(
        &self
    ) -> Result<Option<(usize, usize)>, ReassemblyError> {
        let cursor = ByteCursor::with_base(&self.buf, self.consumed);
        match self.format {
            FrameFormat::U32 { reserved_mask } => {
                if cursor.len() < 4 {
                    return Ok(None)
                }
                let prefix = cursor.read_u32(0).map_err(DecodeError::from)?;
                if prefix & reserved_mask != 0 {
                    return Err(DecodeError::unsupported(
                        "reserved bits set in length prefix", cursor.base()
                    ).into())
                }
                let len = usize::try_from(prefix).map_err(|_| {
                    DecodeError::malformed_length(
                        "excessive length", cursor.base()
                    )
                })?;
                Ok(Some((4, len)))
            }
            FrameFormat::BerTlv => {
                if ber_header_len(cursor.as_slice()).is_none() {
                    return Ok(None)
                }
                let (_, next) = Ident::read(&cursor, 0, Mode::Ber)?;
                match Length::read(&cursor, next, Mode::Ber)? {
                    (Length::Definite(len), next) => Ok(Some((next, len))),
                    (Length::Indefinite, _) => {
                        Err(DecodeError::malformed_length(
                            "indefinite length in stream framing",
                            cursor.base()
                        ).into())
                    }
                }
            }
            FrameFormat::Datagram => Ok(None)
        }
    }

    fn check_size(&self, len: usize, pos: usize) -> Result<(), FatalError> {
        if len > self.max_message_size {
            debug!(
                "rejecting message of {} octets, maximum is {}",
                len, self.max_message_size
            );
            Err(FatalError::DeclaredSizeExceedsMaximum {
                declared: len as u64,
                maximum: self.max_message_size as u64,
                pos,
            })
        }
        else {
            Ok(())
        }
    }
}


//------------ ber_header_len ------------------------------------------------

/// Returns the length of the identifier and length octets at `buf`.
///
/// Returns `None` if more data is needed to tell. The header isn’t
/// validated. A header that is too long to be valid is reported as
/// complete so that reading it produces the error.
fn ber_header_len(buf: &[u8]) -> Option<usize> {
    let first = *buf.first()?;
    let mut len = 1;
    if first & 0x1F == 0x1F {
        loop {
            let octet = *buf.get(len)?;
            len += 1;
            if octet & 0x80 == 0 || len > 6 {
                break
            }
        }
    }
    let length = *buf.get(len)?;
    len += 1;
    if length & 0x80 != 0 && length != 0x80 && length != 0xFF {
        let octets = usize::from(length & 0x7F);
        if octets <= Length::MAX_LONG_OCTETS {
            len += octets;
        }
    }
    (len <= buf.len()).then_some(len)
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use proptest::prelude::*;
    use crate::decode::ErrorKind;
    use crate::encode;
    use super::*;

    #[test]
    fn length_prefixed_in_two_parts() {
        let mut re = Reassembler::new(FrameFormat::LENGTH_PREFIXED, 100);
        assert_eq!(re.state(), ReassemblyState::AwaitingLengthPrefix);
        assert_eq!(
            re.push(b"\x00\x00").unwrap(),
            ReassemblyState::AwaitingLengthPrefix
        );
        assert_eq!(
            re.push(b"\x00\x0A\x01\x02\x03").unwrap(),
            ReassemblyState::AwaitingBody(7)
        );
        assert!(re.next_message().is_none());
        assert_eq!(
            re.push(b"\x04\x05\x06\x07\x08\x09").unwrap(),
            ReassemblyState::AwaitingBody(1)
        );
        assert_eq!(
            re.push(b"\x0A\x00\x00").unwrap(),
            ReassemblyState::MessageReady
        );
        assert_eq!(
            re.next_message().unwrap().as_ref(),
            b"\x01\x02\x03\x04\x05\x06\x07\x08\x09\x0A"
        );
        assert!(re.next_message().is_none());
        assert_eq!(re.state(), ReassemblyState::AwaitingLengthPrefix);
        assert_eq!(re.pending(), 2);
    }

    #[test]
    fn several_messages_per_chunk() {
        let mut re = Reassembler::new(FrameFormat::BerTlv, 100);
        let mut data = encode::octet_string(b"abc");
        data.extend_from_slice(&encode::sequence(&[&encode::null()]));
        data.extend_from_slice(b"\x30\x81");
        assert_eq!(re.push(&data).unwrap(), ReassemblyState::MessageReady);
        assert_eq!(re.next_message().unwrap().as_ref(), b"\x04\x03abc");
        assert_eq!(re.next_message().unwrap().as_ref(), b"\x30\x02\x05\x00");
        assert_eq!(re.state(), ReassemblyState::AwaitingLengthPrefix);
        assert_eq!(
            re.push(b"\x02\x05").unwrap(), ReassemblyState::AwaitingBody(1)
        );
    }

    #[test]
    fn oversized_message_is_rejected() {
        let mut re = Reassembler::new(FrameFormat::LENGTH_PREFIXED, 16);
        let err = re.push(b"\x00\x00\x00\x14\x01\x02").unwrap_err();
        assert_eq!(
            err,
            ReassemblyError::Fatal(FatalError::DeclaredSizeExceedsMaximum {
                declared: 20, maximum: 16, pos: 0
            })
        );
        assert_eq!(re.pending(), 0);
        assert_eq!(re.discarding(), 18);
        assert_eq!(re.state(), ReassemblyState::AwaitingLengthPrefix);

        // The rest of the body looks like a prefix but is skipped.
        let mut data = b"\x00\x00\x00\x02".to_vec();
        data.extend_from_slice(&[0x41; 10]);
        assert_eq!(
            re.push(&data).unwrap(), ReassemblyState::AwaitingLengthPrefix
        );
        assert!(re.next_message().is_none());
        assert_eq!(re.discarding(), 4);

        // The next message is processed normally.
        re.push(b"AAAA\x00\x00\x00\x01\xAA").unwrap();
        assert_eq!(re.discarding(), 0);
        assert_eq!(re.next_message().unwrap().as_ref(), b"\xAA");
        assert!(re.next_message().is_none());
    }

    #[test]
    fn messages_after_oversized_one_in_same_chunk() {
        let mut re = Reassembler::new(FrameFormat::BerTlv, 8);
        let mut data = encode::octet_string(b"ab");
        data.extend_from_slice(&encode::octet_string(&[0x30; 12]));
        data.extend_from_slice(&encode::null());
        let err = re.push(&data).unwrap_err();
        assert_eq!(
            err,
            ReassemblyError::Fatal(FatalError::DeclaredSizeExceedsMaximum {
                declared: 12, maximum: 8, pos: 4
            })
        );
        assert_eq!(re.next_message().unwrap().as_ref(), b"\x04\x02ab");
        assert_eq!(re.next_message().unwrap().as_ref(), b"\x05\x00");
        assert_eq!(re.discarding(), 0);
        assert_eq!(re.pending(), 0);
    }

    #[test]
    fn framing_errors() {
        let mut re = Reassembler::new(FrameFormat::BerTlv, 100);
        match re.push(b"\x30\x80\x05\x00\x00\x00").unwrap_err() {
            ReassemblyError::Framing(err) => {
                assert_eq!(err.kind(), ErrorKind::MalformedLength)
            }
            err => panic!("unexpected error {err:?}"),
        }
        assert_eq!(re.pending(), 0);

        let mut re = Reassembler::new(FrameFormat::KERBEROS, 100);
        match re.push(b"\x80\x00\x00\x01\x00").unwrap_err() {
            ReassemblyError::Framing(err) => {
                assert_eq!(err.kind(), ErrorKind::Unsupported)
            }
            err => panic!("unexpected error {err:?}"),
        }
        re.push(b"\x00\x00\x00\x01\x00").unwrap();
        assert_eq!(re.next_message().unwrap().as_ref(), b"\x00");
    }

    #[test]
    fn datagrams() {
        let mut re = Reassembler::new(FrameFormat::Datagram, 4);
        assert_eq!(re.push(b"ab").unwrap(), ReassemblyState::MessageReady);
        assert!(re.push(b"abcde").is_err());
        assert_eq!(re.next_message().unwrap().as_ref(), b"ab");
        assert!(re.next_message().is_none());
    }

    fn collect(re: &mut Reassembler) -> Vec<Bytes> {
        std::iter::from_fn(|| re.next_message()).collect()
    }

    proptest! {
        #[test]
        fn split_feeding_is_identical(
            bodies in proptest::collection::vec(
                proptest::collection::vec(any::<u8>(), 0..300), 1..4
            ),
            ber in any::<bool>(),
        ) {
            let (format, stream) = if ber {
                let stream: Vec<u8> = bodies.iter().flat_map(|body| {
                    encode::octet_string(body)
                }).collect();
                (FrameFormat::BerTlv, stream)
            }
            else {
                let stream: Vec<u8> = bodies.iter().flat_map(|body| {
                    let mut res = (body.len() as u32).to_be_bytes().to_vec();
                    res.extend_from_slice(body);
                    res
                }).collect();
                (FrameFormat::LENGTH_PREFIXED, stream)
            };

            let mut whole = Reassembler::new(format, 1000);
            whole.push(&stream).unwrap();
            let whole = collect(&mut whole);

            let mut split = Reassembler::new(format, 1000);
            let mut pieces = Vec::new();
            for octet in &stream {
                split.push(std::slice::from_ref(octet)).unwrap();
                pieces.extend(collect(&mut split));
            }
            prop_assert_eq!(whole.len(), bodies.len());
            prop_assert_eq!(whole, pieces);
            prop_assert_eq!(split.pending(), 0);
        }
    }
}
