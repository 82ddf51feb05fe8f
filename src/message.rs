//! Messages and the transport data they are made from.

use std::fmt;
use std::time::Duration;
use bytes::Bytes;


//------------ Direction -----------------------------------------------------

/// The direction data travels in.
///
/// For connection-oriented transports, uplink is from the client that
/// opened the connection to the server.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Direction {
    Uplink,
    Downlink,
}

impl Direction {
    /// Returns the other direction.
    pub fn opposite(self) -> Self {
        match self {
            Direction::Uplink => Direction::Downlink,
            Direction::Downlink => Direction::Uplink,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Direction::Uplink => "uplink",
            Direction::Downlink => "downlink",
        })
    }
}


//------------ ConnectionId --------------------------------------------------

/// Identifies a transport connection.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}


//------------ ChannelType ---------------------------------------------------

/// The type of a logical channel.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ChannelType {
    /// Common control channel.
    Ccch,

    /// Signalling radio bearer.
    Srb,

    /// Data radio bearer.
    Drb,

    /// Any other channel type, identified by a number.
    Other(u8),
}


//------------ ChannelKey ----------------------------------------------------

/// Identifies a logical sub-stream for sequence tracking.
///
/// Keys are immutable once created.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ChannelKey {
    endpoint: u64,
    channel_type: ChannelType,
    channel_id: u16,
    direction: Direction,
}

impl ChannelKey {
    pub fn new(
        endpoint: u64,
        channel_type: ChannelType,
        channel_id: u16,
        direction: Direction,
    ) -> Self {
        ChannelKey { endpoint, channel_type, channel_id, direction }
    }

    pub fn endpoint(&self) -> u64 {
        self.endpoint
    }

    pub fn channel_type(&self) -> ChannelType {
        self.channel_type
    }

    pub fn channel_id(&self) -> u16 {
        self.channel_id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns the key of the same channel in the other direction.
    pub fn opposite(&self) -> Self {
        ChannelKey { direction: self.direction.opposite(), ..*self }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f, "{}/{:?}{}/{}",
            self.endpoint, self.channel_type, self.channel_id, self.direction
        )
    }
}


//------------ Chunk ---------------------------------------------------------

/// A piece of transport data as delivered by the capture layer.
///
/// Chunk boundaries do not need to align with message boundaries.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Chunk {
    pub connection: ConnectionId,
    pub direction: Direction,

    /// The transport timestamp relative to the start of the capture.
    pub timestamp: Duration,

    pub data: Bytes,

    /// Whether the transport layer reported the data as retransmitted.
    pub retransmission: bool,
}

impl Chunk {
    pub fn new(
        connection: ConnectionId, direction: Direction, data: impl Into<Bytes>
    ) -> Self {
        Chunk {
            connection,
            direction,
            timestamp: Duration::ZERO,
            data: data.into(),
            retransmission: false,
        }
    }

    pub fn with_timestamp(mut self, timestamp: Duration) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_retransmission(mut self, retransmission: bool) -> Self {
        self.retransmission = retransmission;
        self
    }
}


//------------ Message -------------------------------------------------------

/// A complete protocol message.
///
/// A message is created when reassembly completes or a datagram arrives.
/// Its data is owned and cheap to clone.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    pub connection: ConnectionId,
    pub direction: Direction,

    /// The timestamp of the chunk that completed the message.
    pub timestamp: Duration,

    pub data: Bytes,
    pub retransmission: bool,
}

impl Message {
    /// Creates a message from a chunk carrying exactly one message.
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Message {
            connection: chunk.connection,
            direction: chunk.direction,
            timestamp: chunk.timestamp,
            data: chunk.data.clone(),
            retransmission: chunk.retransmission,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn opposite_channel() {
        let key = ChannelKey::new(7, ChannelType::Drb, 3, Direction::Uplink);
        let other = key.opposite();
        assert_eq!(other.direction(), Direction::Downlink);
        assert_eq!(other.channel_id(), 3);
        assert_eq!(other.opposite(), key);
        assert_eq!(key.to_string(), "7/Drb3/uplink");
    }
}
