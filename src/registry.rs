//! The dispatch registry.
//!
//! Embedded values are decoded by looking up a decoder for a
//! [`Discriminator`] found in the enclosing data, such as an object
//! identifier, a small integer type code or a media type. The registry is
//! populated once when a session is set up and is read-only afterwards, so
//! it can be shared between threads behind an `Arc`.

use std::fmt;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use crate::config::Config;
use crate::cursor::ByteCursor;
use crate::decode::{DecodeContext, DecodedNode};
use crate::oid::Oid;


//------------ Decoder -------------------------------------------------------

/// A type that can decode an embedded value.
///
/// The decoder is handed a cursor over exactly the octets of the value.
/// It must never fail: problems are attached to the returned node.
pub trait Decoder: Send + Sync {
    fn decode(&self, cursor: ByteCursor, ctx: &mut DecodeContext) -> DecodedNode;
}

impl<F> Decoder for F
where F: Fn(ByteCursor, &mut DecodeContext) -> DecodedNode + Send + Sync {
    fn decode(
        &self, cursor: ByteCursor, ctx: &mut DecodeContext
    ) -> DecodedNode {
        (self)(cursor, ctx)
    }
}


//------------ Discriminator -------------------------------------------------

/// The key a decoder is registered under.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Discriminator {
    /// An object identifier in dotted notation.
    Oid(String),

    /// A number within a namespace, such as the padata-type of Kerberos.
    Number {
        namespace: &'static str,
        value: i64,
    },

    /// A media type, stored in lower case.
    MediaType(String),
}

impl Discriminator {
    pub fn oid(oid: &Oid) -> Self {
        Discriminator::Oid(oid.to_string())
    }

    pub fn number(namespace: &'static str, value: i64) -> Self {
        Discriminator::Number { namespace, value }
    }

    pub fn media_type(media_type: &str) -> Self {
        Discriminator::MediaType(media_type.trim().to_ascii_lowercase())
    }
}

impl fmt::Display for Discriminator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Discriminator::Oid(ref oid) => write!(f, "OID {oid}"),
            Discriminator::Number { namespace, value } => {
                write!(f, "{namespace} {value}")
            }
            Discriminator::MediaType(ref media_type) => {
                write!(f, "media type {media_type}")
            }
        }
    }
}


//------------ Media Type Aliases --------------------------------------------

/// Media types that are served by the decoder of another media type.
///
/// The first element is the alias, the second the registered type.
pub static MEDIA_TYPE_ALIASES: &[(&str, &str)] = &[
    ("application/x-pkixcmp", "application/pkixcmp"),
    ("application/x-pkixcmp-poll", "application/pkixcmp-poll"),
];

fn resolve_alias(media_type: &str) -> Option<&'static str> {
    MEDIA_TYPE_ALIASES.iter().find_map(|&(alias, target)| {
        (alias == media_type).then_some(target)
    })
}


//------------ Registry ------------------------------------------------------

/// Maps discriminators to decoders.
#[derive(Clone, Default)]
pub struct Registry {
    decoders: HashMap<Discriminator, Arc<dyn Decoder>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with all protocol decoders of this crate.
    pub fn with_defaults() -> Self {
        Self::from_config(&Config::default())
    }

    /// Creates a registry with all protocol decoders set up per `config`.
    pub fn from_config(config: &Config) -> Self {
        let mut res = Self::new();
        crate::proto::register_all(&mut res, config);
        res
    }

    /// Registers a decoder, replacing any previous one.
    pub fn register(
        &mut self, discriminator: Discriminator, decoder: impl Decoder + 'static
    ) {
        debug!("registering decoder for {}", discriminator);
        self.decoders.insert(discriminator, Arc::new(decoder));
    }

    /// Looks up the decoder for a discriminator.
    ///
    /// Matching is exact except for media types listed in
    /// [`MEDIA_TYPE_ALIASES`].
    pub fn lookup(&self, discriminator: &Discriminator) -> Option<&dyn Decoder> {
        if let Some(decoder) = self.decoders.get(discriminator) {
            return Some(&**decoder)
        }
        match *discriminator {
            Discriminator::MediaType(ref media_type) => {
                let target = resolve_alias(media_type)?;
                self.decoders.get(
                    &Discriminator::MediaType(target.into())
                ).map(|decoder| &**decoder)
            }
            _ => None
        }
    }

    pub fn contains(&self, discriminator: &Discriminator) -> bool {
        self.lookup(discriminator).is_some()
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.decoders.keys()).finish()
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use crate::decode::NodeValue;
    use crate::mode::Mode;
    use super::*;

    fn marker(cursor: ByteCursor, _: &mut DecodeContext) -> DecodedNode {
        DecodedNode::new("marker", cursor.base()..cursor.end())
            .with_value(NodeValue::Unsigned(cursor.len() as u64))
    }

    #[test]
    fn exact_lookup() {
        let mut registry = Registry::new();
        registry.register(Discriminator::Oid("1.2.3".into()), marker);
        registry.register(Discriminator::number("krb5.padata", 2), marker);
        assert!(registry.contains(&Discriminator::Oid("1.2.3".into())));
        assert!(!registry.contains(&Discriminator::Oid("1.2.3.4".into())));
        assert!(!registry.contains(&Discriminator::Oid("1.2".into())));
        assert!(registry.contains(&Discriminator::number("krb5.padata", 2)));
        assert!(!registry.contains(&Discriminator::number("other", 2)));
    }

    #[test]
    fn media_type_alias() {
        let mut registry = Registry::new();
        registry.register(
            Discriminator::media_type("application/pkixcmp"), marker
        );
        assert!(registry.contains(
            &Discriminator::media_type("Application/X-PKIXCMP")
        ));
        assert!(!registry.contains(
            &Discriminator::media_type("application/x-pkixcmp-poll")
        ));
    }

    #[test]
    fn dispatch_through_context() {
        let mut registry = Registry::new();
        registry.register(Discriminator::media_type("a/b"), marker);
        let mut ctx = DecodeContext::new(&registry, Mode::Ber);
        let data = [0u8; 5];
        let node = ctx.dispatch(
            &Discriminator::media_type("a/b"), ByteCursor::new(&data)
        );
        assert_eq!(node.name(), "marker");
        assert_eq!(node.value(), &NodeValue::Unsigned(5));
    }
}
