//! Decoding the messages of a capture.
//!
//! A [`Session`] holds everything that is remembered between messages:
//! the reassembly state of each direction of each connection, the sequence
//! state of RLC channels and the keys for protected content. Transport data
//! is fed into the session which returns a [`Dissection`] for every
//! message completed by it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use bytes::Bytes;
use tracing::{debug, trace, warn};
use crate::config::Config;
use crate::crypto::{CryptoContext, KeyStore, Verifier};
use crate::cursor::ByteCursor;
use crate::decode::{
    DecodeContext, DecodeError, DecodedNode, FatalError, SummaryField,
};
use crate::message::{ChannelKey, Chunk, ConnectionId, Direction, Message};
use crate::proto::Protocol;
use crate::reassembly::{
    FrameFormat, Reassembler, ReassemblyError, ReassemblyState,
};
use crate::registry::Registry;
use crate::rlc::{self, RlcMode};
use crate::sequence::SequenceTracker;


//------------ Dissection ----------------------------------------------------

/// The result of decoding one message.
#[derive(Clone, Debug)]
pub struct Dissection {
    message: Message,
    tree: DecodedNode,
    summary: Vec<SummaryField>,
    fatal: Option<FatalError>,
}

impl Dissection {
    /// Returns the message the dissection is for.
    ///
    /// If the stream could not be split into messages, this is the chunk
    /// that revealed the problem.
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn decoded_tree(&self) -> &DecodedNode {
        &self.tree
    }

    pub fn summary_fields(&self) -> &[SummaryField] {
        &self.summary
    }

    /// Returns the error that made decoding stop, if any.
    pub fn fatal(&self) -> Option<&FatalError> {
        self.fatal.as_ref()
    }

    pub fn into_tree(self) -> DecodedNode {
        self.tree
    }
}


//------------ Session -------------------------------------------------------

/// The decoding state of a capture.
pub struct Session {
    registry: Arc<Registry>,
    config: Config,

    /// The reassembly state of each direction of each connection.
    reassemblers: HashMap<(ConnectionId, Direction), Reassembler>,

    /// The RLC sequence trackers by sequence number width.
    trackers: HashMap<u8, SequenceTracker>,

    keys: KeyStore,
    verifier: Option<Box<dyn Verifier>>,
}

impl Session {
    /// Creates a session with the default decoders set up per `config`.
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(Registry::from_config(&config));
        Self::with_registry(registry, config)
    }

    /// Creates a session using a shared registry.
    pub fn with_registry(registry: Arc<Registry>, config: Config) -> Self {
        Session {
            registry,
            config,
            reassemblers: HashMap::new(),
            trackers: HashMap::new(),
            keys: KeyStore::new(),
            verifier: None,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    pub fn keys_mut(&mut self) -> &mut KeyStore {
        &mut self.keys
    }

    /// Sets the verifier used for protocols with decryption enabled.
    pub fn set_verifier(&mut self, verifier: impl Verifier + 'static) {
        self.verifier = Some(Box::new(verifier))
    }

    /// Returns the reassembly state of one direction of a connection.
    pub fn reassembly_state(
        &self, connection: ConnectionId, direction: Direction
    ) -> Option<ReassemblyState> {
        self.reassemblers.get(&(connection, direction)).map(|item| {
            item.state()
        })
    }

    /// Feeds a chunk of transport data carrying `protocol`.
    ///
    /// Returns a dissection for every message the chunk completes. If the
    /// stream could not be split, the buffered data of the current message
    /// is dropped and a dissection carrying the error is returned.
    pub fn feed(
        &mut self, chunk: Chunk, protocol: Protocol
    ) -> Vec<Dissection> {
        let settings = self.config.protocol(protocol);
        let format = if settings.reassembly_enabled {
            protocol.frame_format()
        }
        else {
            FrameFormat::Datagram
        };
        let max = settings.max_message_size as usize;
        let reassembler = self.reassemblers.entry(
            (chunk.connection, chunk.direction)
        ).or_insert_with(|| {
            debug!(
                "{} {}: new {} stream", chunk.connection, chunk.direction,
                protocol
            );
            Reassembler::new(format, max)
        });

        let failed = reassembler.push(&chunk.data).err();
        let mut messages = Vec::new();
        while let Some(data) = reassembler.next_message() {
            messages.push(Message {
                data,
                ..Message::from_chunk(&chunk)
            });
        }

        let mut res: Vec<_> = messages.into_iter().map(|message| {
            self.dissect(protocol, message)
        }).collect();
        if let Some(err) = failed {
            warn!(
                "{} {}: {} stream reset: {}",
                chunk.connection, chunk.direction, protocol, err
            );
            res.push(framing_failure(protocol, &chunk, err));
        }
        res
    }

    /// Feeds a single RLC PDU of the given channel.
    ///
    /// The message reference identifies the PDU within the capture. It is
    /// used to tell a retransmitted PDU from a duplicate.
    pub fn feed_rlc(
        &mut self,
        key: ChannelKey,
        mode: RlcMode,
        message_ref: u64,
        data: impl Into<Bytes>,
        retransmission: bool,
    ) -> Dissection {
        let data = data.into();
        let mut ctx = DecodeContext::new(&self.registry, self.config.mode)
            .with_max_depth(self.config.max_depth);
        let (mut tree, pdu) = rlc::decode_pdu(
            ByteCursor::new(&data), mode, &mut ctx
        );
        let (summary, fatal) = ctx.finish();
        if let Some(pdu) = pdu {
            let tracker = self.tracker(mode.sn_width());
            rlc::track(
                &pdu, tracker, key, message_ref, retransmission, &mut tree
            );
        }
        Dissection {
            message: Message {
                connection: ConnectionId(key.endpoint()),
                direction: key.direction(),
                timestamp: Duration::ZERO,
                data,
                retransmission,
            },
            tree,
            summary,
            fatal,
        }
    }

    /// Drops the reassembly state of both directions of a connection.
    pub fn close(&mut self, connection: ConnectionId) {
        for direction in [Direction::Uplink, Direction::Downlink] {
            if let Some(reassembler) = self.reassemblers.remove(
                &(connection, direction)
            ) {
                if reassembler.pending() > 0 {
                    debug!(
                        "{} {}: closed with {} octets pending",
                        connection, direction, reassembler.pending()
                    );
                }
            }
        }
    }

    /// Forgets all state remembered between messages.
    ///
    /// Keys and the verifier are kept.
    pub fn reset(&mut self) {
        debug!(
            "resetting session with {} streams", self.reassemblers.len()
        );
        self.reassemblers.clear();
        self.trackers.clear();
    }

    fn dissect(&self, protocol: Protocol, message: Message) -> Dissection {
        trace!(
            "{} {}: {} message of {} octets",
            message.connection, message.direction, protocol, message.len()
        );
        let mut ctx = DecodeContext::new(&self.registry, self.config.mode)
            .with_max_depth(self.config.max_depth);
        if self.config.protocol(protocol).decrypt_enabled {
            if let Some(verifier) = self.verifier.as_deref() {
                ctx = ctx.with_crypto(CryptoContext::new(verifier, &self.keys));
            }
        }
        let tree = protocol.decode(ByteCursor::new(&message.data), &mut ctx);
        let (summary, fatal) = ctx.finish();
        if let Some(fatal) = fatal.as_ref() {
            warn!(
                "{} {}: {} message aborted: {}",
                message.connection, message.direction, protocol, fatal
            );
        }
        Dissection { message, tree, summary, fatal }
    }

    /// Returns the tracker for sequence numbers of the given width.
    ///
    /// The configured acknowledgement window only applies to trackers of
    /// the configured width.
    fn tracker(&mut self, width: u8) -> &mut SequenceTracker {
        let config = &self.config;
        self.trackers.entry(width).or_insert_with(|| {
            if width == config.rlc.sequence_number_width {
                config.sequence_tracker()
            }
            else {
                SequenceTracker::new(width)
            }
        })
    }
}


//------------ Helpers -------------------------------------------------------

fn framing_failure(
    protocol: Protocol, chunk: &Chunk, err: ReassemblyError
) -> Dissection {
    let mut tree = DecodedNode::new(protocol.name(), 0..chunk.data.len());
    let fatal = match err {
        ReassemblyError::Fatal(fatal) => {
            tree.annotate(DecodeError::from(fatal.clone()));
            Some(fatal)
        }
        ReassemblyError::Framing(err) => {
            tree.annotate(err);
            None
        }
    };
    Dissection {
        message: Message::from_chunk(chunk),
        tree,
        summary: Vec::new(),
        fatal,
    }
}


//============ Tests =========================================================
