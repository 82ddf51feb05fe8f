//! The state threaded through a single decode.
//!
//! This is a private module. Its public content is being re-exported by the
//! parent module.

use bytes::Bytes;
use tracing::{debug, trace};
use crate::crypto::CryptoContext;
use crate::cursor::ByteCursor;
use crate::mode::Mode;
use crate::registry::{Discriminator, Registry};
use super::error::{DecodeError, ErrorKind, FatalError};
use super::node::{DecodedNode, NodeValue, SummaryField, SummaryValue};


//------------ DecodeContext -------------------------------------------------

/// Everything a decoder needs besides the data itself.
///
/// A context lives for the decode of exactly one message. It provides the
/// registry for dispatching embedded values, tracks the nesting depth, and
/// collects summary fields and the first fatal condition encountered.
pub struct DecodeContext<'a> {
    registry: &'a Registry,
    mode: Mode,
    max_depth: usize,
    depth: usize,
    summary: Vec<SummaryField>,
    fatal: Option<FatalError>,
    crypto: Option<CryptoContext<'a>>,
}

impl<'a> DecodeContext<'a> {
    /// The nesting depth used unless configured otherwise.
    pub const DEFAULT_MAX_DEPTH: usize = 64;

    pub fn new(registry: &'a Registry, mode: Mode) -> Self {
        DecodeContext {
            registry,
            mode,
            max_depth: Self::DEFAULT_MAX_DEPTH,
            depth: 0,
            summary: Vec::new(),
            fatal: None,
            crypto: None,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_crypto(mut self, crypto: CryptoContext<'a>) -> Self {
        self.crypto = Some(crypto);
        self
    }

    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn crypto(&self) -> Option<&CryptoContext<'a>> {
        self.crypto.as_ref()
    }

    /// Adds a summary field for the message.
    pub fn add_summary(
        &mut self, key: &'static str, value: impl Into<SummaryValue>
    ) {
        self.summary.push(SummaryField { key, value: value.into() })
    }

    pub fn summary(&self) -> &[SummaryField] {
        &self.summary
    }

    /// Returns the first fatal condition encountered, if any.
    pub fn fatal(&self) -> Option<&FatalError> {
        self.fatal.as_ref()
    }

    /// Records a fatal condition.
    ///
    /// Only the first one is kept.
    pub fn set_fatal(&mut self, err: FatalError) {
        if self.fatal.is_none() {
            debug!("fatal decoding condition: {}", err);
            self.fatal = Some(err)
        }
    }

    /// Converts the context into the collected summary and fatal error.
    pub fn finish(self) -> (Vec<SummaryField>, Option<FatalError>) {
        (self.summary, self.fatal)
    }

    /// Runs `op` one nesting level deeper.
    ///
    /// If this would exceed the maximum depth, `op` is not run. Instead,
    /// the fatal condition is recorded and returned as an error for the
    /// caller to attach to the branch it was about to decode.
    pub fn enter<T>(
        &mut self, pos: usize, op: impl FnOnce(&mut Self) -> T
    ) -> Result<T, DecodeError> {
        if self.depth >= self.max_depth {
            let err = FatalError::RecursionLimitExceeded {
                limit: self.max_depth, pos
            };
            self.set_fatal(err.clone());
            return Err(err.into())
        }
        self.depth += 1;
        let res = op(self);
        self.depth -= 1;
        Ok(res)
    }

    /// Decodes an embedded value through the registry.
    ///
    /// If no decoder is registered for `discriminator`, the content is
    /// returned as an opaque node with a note attached.
    pub fn dispatch(
        &mut self,
        discriminator: &Discriminator,
        content: ByteCursor,
    ) -> DecodedNode {
        let range = content.base()..content.end();
        let registry = self.registry;
        let decoder = match registry.lookup(discriminator) {
            Some(decoder) => decoder,
            None => {
                trace!("no decoder for {}", discriminator);
                let mut node = DecodedNode::new("opaque", range).with_value(
                    NodeValue::Bytes(Bytes::copy_from_slice(content.as_slice()))
                );
                node.annotate(DecodeError::new(
                    ErrorKind::UnknownDiscriminator,
                    format!("no decoder registered for {discriminator}"),
                    content.base()
                ));
                return node
            }
        };
        match self.enter(content.base(), |ctx| decoder.decode(content, ctx)) {
            Ok(node) => node,
            Err(err) => {
                let mut node = DecodedNode::new("truncated", range);
                node.annotate(err);
                node
            }
        }
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn depth_limit() {
        let registry = Registry::new();
        let mut ctx = DecodeContext::new(&registry, Mode::Ber)
            .with_max_depth(2);
        let res = ctx.enter(0, |ctx| {
            ctx.enter(1, |ctx| {
                ctx.enter(2, |_| ()).map_err(|err| err.kind())
            })
        });
        assert_eq!(res, Ok(Ok(Err(ErrorKind::RecursionLimitExceeded))));
        assert_eq!(ctx.depth(), 0);
        assert!(matches!(
            ctx.fatal(),
            Some(FatalError::RecursionLimitExceeded { limit: 2, pos: 2 })
        ));
    }

    #[test]
    fn unknown_discriminator() {
        let registry = Registry::new();
        let mut ctx = DecodeContext::new(&registry, Mode::Ber);
        let data = b"\x01\x02\x03\x04";
        let cursor = ByteCursor::new(data).subrange(1, 2).unwrap();
        let node = ctx.dispatch(&Discriminator::media_type("text/plain"), cursor);
        assert_eq!(node.range(), 1..3);
        assert_eq!(node.value().as_bytes(), Some(b"\x02\x03".as_ref()));
        assert!(node.has_annotation(ErrorKind::UnknownDiscriminator));
        assert!(ctx.fatal().is_none());
    }
}
