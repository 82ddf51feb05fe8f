//! Tracking sequence numbers of logical channels.
//!
//! Protocols with per-channel sequence numbers allow detecting lost,
//! repeated and retransmitted messages. The [`SequenceTracker`] keeps the
//! last sequence number seen for each [`ChannelKey`] and classifies every
//! new message against it. It is purely diagnostic: its reports end up as
//! annotations but never change how a message is decoded.
//!
//! The tracker itself is not synchronized. Callers decoding on several
//! threads can use [`SharedSequenceTracker`] which shards the channels
//! over a number of mutexes.

use std::fmt;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use parking_lot::Mutex;
use tracing::trace;
use crate::decode::{DecodeError, ErrorKind};
use crate::message::ChannelKey;


//------------ SequenceStatus ------------------------------------------------

/// How a sequence number relates to the previous one of its channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SequenceStatus {
    /// The number is the expected one or the first of the channel.
    Ok,

    /// Numbers were skipped.
    ///
    /// Both ends of the missing range are inclusive and may wrap around.
    GapDetected { first_missing: u32, last_missing: u32 },

    /// The number repeats the previous one.
    DuplicateDetected,

    /// The transport layer reported the message as retransmitted.
    RetransmissionAtTransportLayer,
}

impl SequenceStatus {
    pub fn is_ok(self) -> bool {
        matches!(self, SequenceStatus::Ok)
    }
}

impl fmt::Display for SequenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SequenceStatus::Ok => f.write_str("in sequence"),
            SequenceStatus::GapDetected { first_missing, last_missing } => {
                if first_missing == last_missing {
                    write!(f, "sequence number {first_missing} missing")
                }
                else {
                    write!(
                        f, "sequence numbers {first_missing} to \
                        {last_missing} missing"
                    )
                }
            }
            SequenceStatus::DuplicateDetected => {
                f.write_str("repeated sequence number")
            }
            SequenceStatus::RetransmissionAtTransportLayer => {
                f.write_str("retransmitted by the transport layer")
            }
        }
    }
}


//------------ SegmentStatus -------------------------------------------------

/// Whether the segmentation of a message fits the previous message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SegmentStatus {
    Consistent,

    /// The previous message ended mid-segment but this one starts anew.
    MissingContinuation,

    /// This message continues a segment the previous one had completed.
    UnexpectedContinuation,
}

impl fmt::Display for SegmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            SegmentStatus::Consistent => "segments consistent",
            SegmentStatus::MissingContinuation => {
                "previous message left an incomplete segment"
            }
            SegmentStatus::UnexpectedContinuation => {
                "continues a segment that was already complete"
            }
        })
    }
}


//------------ SequenceReport ------------------------------------------------

/// The result of observing one message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SequenceReport {
    pub status: SequenceStatus,
    pub segments: SegmentStatus,
}

impl SequenceReport {
    /// Returns the annotation to attach for this report, if any.
    pub fn to_error(&self, pos: usize) -> Option<DecodeError> {
        if !self.status.is_ok() {
            Some(DecodeError::new(
                ErrorKind::SequenceAnomaly, self.status.to_string(), pos
            ))
        }
        else if self.segments != SegmentStatus::Consistent {
            Some(DecodeError::new(
                ErrorKind::SequenceAnomaly, self.segments.to_string(), pos
            ))
        }
        else {
            None
        }
    }
}


//------------ Observation ---------------------------------------------------

/// What the tracker needs to know about a message.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Observation {
    pub sequence_number: u32,

    /// A reference to the message, such as its frame number.
    ///
    /// Observing the same message again returns the earlier report
    /// without changing any state.
    pub message_ref: u64,

    /// The transport layer reported the message as retransmitted.
    pub retransmission: bool,

    /// The message starts with the continuation of a segment.
    pub starts_with_continuation: bool,

    /// The message ends with an incomplete segment.
    pub ends_incomplete: bool,
}

impl Observation {
    pub fn new(sequence_number: u32, message_ref: u64) -> Self {
        Observation {
            sequence_number, message_ref, ..Default::default()
        }
    }

    pub fn with_retransmission(mut self, retransmission: bool) -> Self {
        self.retransmission = retransmission;
        self
    }

    pub fn with_segments(
        mut self, starts_with_continuation: bool, ends_incomplete: bool
    ) -> Self {
        self.starts_with_continuation = starts_with_continuation;
        self.ends_incomplete = ends_incomplete;
        self
    }
}


//------------ AckStatus -----------------------------------------------------

/// How an acknowledged sequence number relates to the peer’s sending.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AckStatus {
    InWindow,

    /// The number isn’t among the recently sent ones.
    AckOutOfWindow { ack: u32, last_sent: u32 },

    /// Nothing has been seen in the acknowledged direction yet.
    NoReference,
}

impl AckStatus {
    pub fn to_error(&self, pos: usize) -> Option<DecodeError> {
        match *self {
            AckStatus::AckOutOfWindow { ack, last_sent } => {
                Some(DecodeError::new(
                    ErrorKind::SequenceAnomaly,
                    format!(
                        "acknowledged sequence number {ack} out of window \
                        (last sent {last_sent})"
                    ),
                    pos
                ))
            }
            _ => None
        }
    }
}


//------------ ChannelSequenceState ------------------------------------------

/// The state kept for one channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChannelSequenceState {
    pub last_sequence_number: u32,
    pub last_message_ref: u64,

    /// The previous message ended with an incomplete segment.
    pub incomplete_segment: bool,

    last_report: SequenceReport,
}


//------------ SequenceTracker -----------------------------------------------

/// Sequence number state for a set of channels.
#[derive(Clone, Debug)]
pub struct SequenceTracker {
    modulus: u32,
    ack_window: u32,
    channels: HashMap<ChannelKey, ChannelSequenceState>,
}

impl SequenceTracker {
    /// Creates a tracker for sequence numbers of `width` bits.
    ///
    /// The acknowledgement window defaults to half the sequence space.
    pub fn new(width: u8) -> Self {
        let modulus = 1u32 << width.clamp(1, 31);
        SequenceTracker {
            modulus,
            ack_window: modulus / 2,
            channels: HashMap::new(),
        }
    }

    pub fn with_ack_window(mut self, ack_window: u32) -> Self {
        self.ack_window = ack_window;
        self
    }

    pub fn modulus(&self) -> u32 {
        self.modulus
    }

    pub fn ack_window(&self) -> u32 {
        self.ack_window
    }

    pub fn state(&self, key: &ChannelKey) -> Option<&ChannelSequenceState> {
        self.channels.get(key)
    }

    /// Classifies a message and updates the channel’s state.
    pub fn observe(
        &mut self, key: ChannelKey, observation: Observation
    ) -> SequenceReport {
        let seq = observation.sequence_number % self.modulus;
        let modulus = self.modulus;
        let state = match self.channels.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let report = SequenceReport {
                    status: SequenceStatus::Ok,
                    segments: if observation.starts_with_continuation {
                        SegmentStatus::UnexpectedContinuation
                    }
                    else {
                        SegmentStatus::Consistent
                    }
                };
                entry.insert(ChannelSequenceState {
                    last_sequence_number: seq,
                    last_message_ref: observation.message_ref,
                    incomplete_segment: observation.ends_incomplete,
                    last_report: report,
                });
                return report
            }
        };
        if state.last_message_ref == observation.message_ref {
            return state.last_report
        }

        let prev = state.last_sequence_number;
        let status = if observation.retransmission {
            SequenceStatus::RetransmissionAtTransportLayer
        }
        else if seq == (prev + 1) % modulus {
            SequenceStatus::Ok
        }
        else if seq == prev {
            SequenceStatus::DuplicateDetected
        }
        else {
            SequenceStatus::GapDetected {
                first_missing: (prev + 1) % modulus,
                last_missing: (seq + modulus - 1) % modulus,
            }
        };
        let advance = matches!(
            status, SequenceStatus::Ok | SequenceStatus::GapDetected { .. }
        );
        let segments = if status != SequenceStatus::Ok {
            // After a gap, nothing can be said about the segments.
            SegmentStatus::Consistent
        }
        else if state.incomplete_segment
            && !observation.starts_with_continuation
        {
            SegmentStatus::MissingContinuation
        }
        else if !state.incomplete_segment
            && observation.starts_with_continuation
        {
            SegmentStatus::UnexpectedContinuation
        }
        else {
            SegmentStatus::Consistent
        };
        let report = SequenceReport { status, segments };
        if !status.is_ok() {
            trace!("channel {}: {}", key, status);
        }
        if advance {
            state.last_sequence_number = seq;
            state.incomplete_segment = observation.ends_incomplete;
        }
        state.last_message_ref = observation.message_ref;
        state.last_report = report;
        report
    }

    /// Checks an acknowledged sequence number received on `key`.
    ///
    /// The number acknowledges data sent in the opposite direction. It is
    /// plausible if it lies within the acknowledgement window ending just
    /// after the last sequence number sent in that direction.
    pub fn check_ack(&self, key: &ChannelKey, ack: u32) -> AckStatus {
        let last_sent = match self.channels.get(&key.opposite()) {
            Some(state) => state.last_sequence_number,
            None => return AckStatus::NoReference,
        };
        let ack = ack % self.modulus;
        let modulus = u64::from(self.modulus);
        let distance = (
            u64::from(last_sent) + 1 + modulus - u64::from(ack)
        ) % modulus;
        if distance <= u64::from(self.ack_window) {
            AckStatus::InWindow
        }
        else {
            trace!("channel {}: ack {} out of window", key, ack);
            AckStatus::AckOutOfWindow { ack, last_sent }
        }
    }

    /// Forgets the state of a channel.
    pub fn forget(&mut self, key: &ChannelKey) {
        self.channels.remove(key);
    }

    /// Forgets all state.
    pub fn reset(&mut self) {
        self.channels.clear()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}


//------------ SharedSequenceTracker -----------------------------------------

/// A sequence tracker that can be used from several threads.
///
/// Channels are distributed over shards each protected by its own mutex.
/// Both directions of a channel always live in the same shard.
#[derive(Debug)]
pub struct SharedSequenceTracker {
    shards: Box<[Mutex<SequenceTracker>]>,
}

impl SharedSequenceTracker {
    pub const DEFAULT_SHARDS: usize = 16;

    pub fn new(template: SequenceTracker, shards: usize) -> Self {
        SharedSequenceTracker {
            shards: (0..shards.max(1)).map(|_| {
                Mutex::new(template.clone())
            }).collect()
        }
    }

    fn shard(&self, key: &ChannelKey) -> &Mutex<SequenceTracker> {
        let mut hasher = DefaultHasher::new();
        key.endpoint().hash(&mut hasher);
        key.channel_type().hash(&mut hasher);
        key.channel_id().hash(&mut hasher);
        let idx = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    pub fn observe(
        &self, key: ChannelKey, observation: Observation
    ) -> SequenceReport {
        self.shard(&key).lock().observe(key, observation)
    }

    pub fn check_ack(&self, key: &ChannelKey, ack: u32) -> AckStatus {
        self.shard(key).lock().check_ack(key, ack)
    }

    pub fn forget(&self, key: &ChannelKey) {
        self.shard(key).lock().forget(key)
    }

    pub fn reset(&self) {
        self.shards.iter().for_each(|shard| shard.lock().reset())
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use crate::message::{ChannelType, Direction};
    use super::*;

    fn key(direction: Direction) -> ChannelKey {
        ChannelKey::new(1, ChannelType::Drb, 4, direction)
    }

    fn run(
        tracker: &mut SequenceTracker, seqs: &[u32], retransmit_last: bool
    ) -> Vec<SequenceStatus> {
        seqs.iter().enumerate().map(|(idx, &seq)| {
            let obs = Observation::new(seq, idx as u64).with_retransmission(
                retransmit_last && idx + 1 == seqs.len()
            );
            tracker.observe(key(Direction::Uplink), obs).status
        }).collect()
    }

    #[test]
    fn gap_reported_once() {
        let mut tracker = SequenceTracker::new(10);
        let res = run(&mut tracker, &[0, 1, 2, 5, 6], false);
        assert_eq!(
            res,
            [
                SequenceStatus::Ok, SequenceStatus::Ok, SequenceStatus::Ok,
                SequenceStatus::GapDetected {
                    first_missing: 3, last_missing: 4
                },
                SequenceStatus::Ok,
            ]
        );
    }

    #[test]
    fn duplicate_and_retransmission() {
        let mut tracker = SequenceTracker::new(10);
        assert_eq!(
            run(&mut tracker, &[0, 1, 1], false)[2],
            SequenceStatus::DuplicateDetected
        );
        let mut tracker = SequenceTracker::new(10);
        assert_eq!(
            run(&mut tracker, &[0, 1, 1], true)[2],
            SequenceStatus::RetransmissionAtTransportLayer
        );
        // Neither advances the state.
        assert_eq!(
            tracker.state(&key(Direction::Uplink)).unwrap()
                .last_sequence_number,
            1
        );
    }

    #[test]
    fn wrap_around() {
        let mut tracker = SequenceTracker::new(5);
        let res = run(&mut tracker, &[30, 31, 0, 3], false);
        assert!(res[..3].iter().all(|status| status.is_ok()));
        assert_eq!(
            res[3],
            SequenceStatus::GapDetected { first_missing: 1, last_missing: 2 }
        );
        let res = run(&mut SequenceTracker::new(5), &[30, 1], false);
        assert_eq!(
            res[1],
            SequenceStatus::GapDetected { first_missing: 31, last_missing: 0 }
        );
    }

    #[test]
    fn observing_again_is_stable() {
        let mut tracker = SequenceTracker::new(10);
        let key = key(Direction::Uplink);
        tracker.observe(key, Observation::new(0, 1));
        let first = tracker.observe(key, Observation::new(4, 2));
        let second = tracker.observe(key, Observation::new(4, 2));
        assert_eq!(first, second);
        assert!(matches!(first.status, SequenceStatus::GapDetected { .. }));
    }

    #[test]
    fn segment_continuity() {
        let mut tracker = SequenceTracker::new(10);
        let key = key(Direction::Downlink);
        let obs = |seq, starts, ends| {
            Observation::new(seq, u64::from(seq)).with_segments(starts, ends)
        };
        assert_eq!(
            tracker.observe(key, obs(0, false, true)).segments,
            SegmentStatus::Consistent
        );
        assert_eq!(
            tracker.observe(key, obs(1, false, false)).segments,
            SegmentStatus::MissingContinuation
        );
        let report = tracker.observe(key, obs(2, true, false));
        assert_eq!(report.segments, SegmentStatus::UnexpectedContinuation);
        assert!(report.to_error(0).is_some());
    }

    #[test]
    fn ack_window() {
        let mut tracker = SequenceTracker::new(10).with_ack_window(512);
        assert_eq!(
            tracker.check_ack(&key(Direction::Downlink), 3),
            AckStatus::NoReference
        );
        for seq in 0..=700 {
            tracker.observe(
                key(Direction::Uplink), Observation::new(seq, seq.into())
            );
        }
        let status_key = key(Direction::Downlink);
        assert_eq!(tracker.check_ack(&status_key, 701), AckStatus::InWindow);
        assert_eq!(tracker.check_ack(&status_key, 189), AckStatus::InWindow);
        assert_eq!(
            tracker.check_ack(&status_key, 188),
            AckStatus::AckOutOfWindow { ack: 188, last_sent: 700 }
        );
        assert_eq!(
            tracker.check_ack(&status_key, 702),
            AckStatus::AckOutOfWindow { ack: 702, last_sent: 700 }
        );
    }

    #[test]
    fn ack_window_at_widest_sequence_space() {
        let mut tracker = SequenceTracker::new(31);
        let last = (1u32 << 31) - 1;
        tracker.observe(key(Direction::Uplink), Observation::new(last, 1));
        let status_key = key(Direction::Downlink);
        assert_eq!(tracker.check_ack(&status_key, 0), AckStatus::InWindow);
        assert_eq!(tracker.check_ack(&status_key, last), AckStatus::InWindow);
        assert_eq!(
            tracker.check_ack(&status_key, (1 << 30) - 1),
            AckStatus::AckOutOfWindow { ack: (1 << 30) - 1, last_sent: last }
        );
    }

    #[test]
    fn shared_tracker() {
        let shared = Arc::new(
            SharedSequenceTracker::new(SequenceTracker::new(10), 4)
        );
        let handles: Vec<_> = (0..4u64).map(|endpoint| {
            let shared = shared.clone();
            std::thread::spawn(move || {
                let key = ChannelKey::new(
                    endpoint, ChannelType::Srb, 1, Direction::Uplink
                );
                (0..50u32).map(|seq| {
                    shared.observe(key, Observation::new(seq, seq.into()))
                }).all(|report| report.status.is_ok())
            })
        }).collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(shared.len(), 4);
        let key = ChannelKey::new(0, ChannelType::Srb, 1, Direction::Downlink);
        assert_eq!(shared.check_ack(&key, 50), AckStatus::InWindow);
        shared.reset();
        assert!(shared.is_empty());
    }
}
