//! Protocol decoders.
//!
//! Each protocol module describes its messages through field tables and
//! registers the decoders for embedded values with a [`Registry`]. The
//! [`Protocol`] type ties a protocol to its transport: the well-known
//! ports, how messages are framed in a stream, and the entry point for
//! decoding a complete message.

use std::fmt;
use std::str::FromStr;
use crate::config::Config;
use crate::cursor::ByteCursor;
use crate::decode::{DecodeContext, DecodedNode};
use crate::reassembly::FrameFormat;
use crate::registry::Registry;

pub mod c1222;
pub mod cmp;
pub mod kerberos;
pub mod pkix;
pub mod z3950;


//------------ register_all --------------------------------------------------

/// Registers the decoders of all protocols.
pub fn register_all(registry: &mut Registry, config: &Config) {
    cmp::register(registry);
    kerberos::register(registry);
    z3950::register(registry, config.z3950.max_record_size);
}


//------------ Protocol ------------------------------------------------------

/// A protocol carried over a stream transport.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Protocol {
    Cmp,
    Kerberos,
    C1222,
    Z3950,
}

impl Protocol {
    pub const ALL: [Protocol; 4] = [
        Protocol::Cmp, Protocol::Kerberos, Protocol::C1222, Protocol::Z3950
    ];

    /// Returns the name used in configuration and on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Protocol::Cmp => "cmp",
            Protocol::Kerberos => "kerberos",
            Protocol::C1222 => "c1222",
            Protocol::Z3950 => "z3950",
        }
    }

    /// Returns the well-known transport ports.
    pub fn default_ports(self) -> &'static [u16] {
        match self {
            Protocol::Cmp => &[829],
            Protocol::Kerberos => &[88],
            Protocol::C1222 => &[1153],
            Protocol::Z3950 => &[210],
        }
    }

    /// Returns how messages are delimited in a stream.
    pub fn frame_format(self) -> FrameFormat {
        match self {
            Protocol::Cmp => FrameFormat::LENGTH_PREFIXED,
            Protocol::Kerberos => FrameFormat::KERBEROS,
            Protocol::C1222 | Protocol::Z3950 => FrameFormat::BerTlv,
        }
    }

    /// Decodes one complete message.
    ///
    /// For CMP, the message includes the TCP transport header.
    pub fn decode(
        self, cursor: ByteCursor, ctx: &mut DecodeContext
    ) -> DecodedNode {
        match self {
            Protocol::Cmp => cmp::decode_tcp_message(cursor, ctx),
            Protocol::Kerberos => kerberos::decode_message(cursor, ctx),
            Protocol::C1222 => c1222::decode_message(cursor, ctx),
            Protocol::Z3950 => z3950::decode_pdu(cursor, ctx),
        }
    }
}

impl FromStr for Protocol {
    type Err = UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Protocol::ALL.iter().copied().find(|protocol| {
            protocol.name().eq_ignore_ascii_case(s)
        }).ok_or_else(|| UnknownProtocol(s.into()))
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}


//------------ UnknownProtocol -----------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("unknown protocol '{0}'")]
pub struct UnknownProtocol(String);


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use crate::registry::Discriminator;
    use super::*;

    #[test]
    fn names() {
        for protocol in Protocol::ALL {
            assert_eq!(protocol.name().parse::<Protocol>(), Ok(protocol));
            assert_eq!(protocol.to_string(), protocol.name());
        }
        assert_eq!("Z3950".parse::<Protocol>(), Ok(Protocol::Z3950));
        assert!("ldap".parse::<Protocol>().is_err());
    }

    #[test]
    fn defaults_registered() {
        let registry = Registry::with_defaults();
        assert!(registry.contains(&Discriminator::media_type(cmp::MEDIA_TYPE)));
        assert!(registry.contains(
            &Discriminator::number(kerberos::PADATA_NAMESPACE, 2)
        ));
        assert!(registry.contains(&Discriminator::Oid(z3950::MARC21.into())));
        assert!(!registry.contains(
            &Discriminator::Oid("1.2.840.10003.5.109.3".into())
        ));
    }
}
