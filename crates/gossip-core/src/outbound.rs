//! Outbound message queue.
//!
//! Each queued datagram is an [`Envelope`]: a shared encoded buffer plus the
//! retry bookkeeping for one recipient. A fanout to several members encodes
//! once and clones the [`Bytes`] handle into one envelope per recipient.

use crate::address::Address;
use crate::config::MAX_OUTPUT_MESSAGES;
use crate::protocol::message::MessageType;
use bytes::Bytes;
use tracing::{debug, warn};

/// How a message is addressed when it is queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dissemination {
    /// Exactly one recipient.
    Direct(Address),
    /// Up to the rumor factor of randomly chosen members.
    Random,
    /// Every known member.
    Broadcast,
    /// Every known member not reachable at the given address.
    BroadcastExcept(Address),
}

/// One datagram awaiting transmission to one recipient.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub sequence_number: u64,
    pub message_type: MessageType,
    pub buffer: Bytes,
    pub recipient: Address,
    pub attempt_count: u32,
    pub last_attempt_ms: u64,
    pub max_attempts: u32,
}

impl Envelope {
    pub fn new(
        sequence_number: u64,
        message_type: MessageType,
        buffer: Bytes,
        recipient: Address,
        max_attempts: u32,
    ) -> Self {
        Self {
            sequence_number,
            message_type,
            buffer,
            recipient,
            attempt_count: 0,
            last_attempt_ms: 0,
            max_attempts,
        }
    }

    /// Whether the recipient is expected to acknowledge this envelope.
    pub fn requires_ack(&self) -> bool {
        self.max_attempts > 1
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }

    /// Whether a retry is due at `now_ms`. Never-sent envelopes are always due.
    pub fn is_due(&self, now_ms: u64, retry_interval_ms: u64) -> bool {
        self.attempt_count == 0 || self.last_attempt_ms + retry_interval_ms <= now_ms
    }
}

/// Outcome of one drain cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// Datagrams handed to the transport.
    pub sent: usize,
    /// Recipients that exhausted their retry budget without an ack.
    pub unreachable: Vec<Address>,
}

/// Bounded FIFO of envelopes, serviced in enqueue order.
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    envelopes: Vec<Envelope>,
    capacity: usize,
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::with_capacity(MAX_OUTPUT_MESSAGES)
    }
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            envelopes: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append an envelope, dropping the oldest one if the queue is full.
    pub fn push(&mut self, envelope: Envelope) -> Option<Envelope> {
        // Drop oldest if queue is full (FIFO eviction)
        let evicted = if self.envelopes.len() >= self.capacity {
            let oldest = self.envelopes.remove(0);
            warn!(
                seq = oldest.sequence_number,
                recipient = %oldest.recipient,
                "Outbound queue full, dropping oldest {} envelope",
                oldest.message_type
            );
            Some(oldest)
        } else {
            None
        };
        self.envelopes.push(envelope);
        evicted
    }

    /// Find the envelope with `sequence_number` sent to `recipient`.
    ///
    /// A fanout shares its sequence number across recipients, so both are
    /// needed to identify the envelope an Ack or Welcome answers.
    pub fn find_by_sequence(&self, sequence_number: u64, recipient: &Address) -> Option<&Envelope> {
        self.envelopes
            .iter()
            .find(|e| e.sequence_number == sequence_number && e.recipient == *recipient)
    }

    /// Remove and return the envelope with `sequence_number` sent to `recipient`.
    pub fn dequeue_by_sequence(&mut self, sequence_number: u64, recipient: &Address) -> Option<Envelope> {
        let idx = self
            .envelopes
            .iter()
            .position(|e| e.sequence_number == sequence_number && e.recipient == *recipient)?;
        Some(self.envelopes.remove(idx))
    }

    /// Run one transmission cycle.
    ///
    /// Per envelope, in order:
    /// 1. Exhausted and ack-required: the recipient is reported unreachable,
    ///    and this envelope plus any directly following ones to the same
    ///    recipient are dropped. Exhausted single-shot envelopes are dropped.
    /// 2. Not yet due for retry: skipped.
    /// 3. Otherwise `sink` transmits it. A sink error aborts the cycle and is
    ///    returned; on success the attempt is recorded and single-shot
    ///    envelopes are dropped.
    pub fn drain<F, E>(
        &mut self,
        now_ms: u64,
        retry_interval_ms: u64,
        mut sink: F,
    ) -> Result<DrainReport, E>
    where
        F: FnMut(&Envelope) -> Result<(), E>,
    {
        let mut report = DrainReport::default();
        let mut i = 0;

        while i < self.envelopes.len() {
            let envelope = &self.envelopes[i];

            if envelope.is_exhausted() {
                if envelope.requires_ack() {
                    let recipient = envelope.recipient;
                    let end = self.envelopes[i..]
                        .iter()
                        .position(|e| e.recipient != recipient)
                        .map_or(self.envelopes.len(), |offset| i + offset);
                    let dropped = self.envelopes.drain(i..end).count();
                    debug!(%recipient, dropped, "Recipient unreachable, dropping envelopes");
                    if !report.unreachable.contains(&recipient) {
                        report.unreachable.push(recipient);
                    }
                } else {
                    self.envelopes.remove(i);
                }
                continue;
            }

            if !envelope.is_due(now_ms, retry_interval_ms) {
                i += 1;
                continue;
            }

            sink(envelope)?;
            report.sent += 1;

            let envelope = &mut self.envelopes[i];
            envelope.attempt_count += 1;
            envelope.last_attempt_ms = now_ms;
            if envelope.max_attempts <= 1 {
                self.envelopes.remove(i);
            } else {
                i += 1;
            }
        }

        Ok(report)
    }

    /// Keep only envelopes matching `keep`, returning how many were dropped.
    pub fn retain<F>(&mut self, keep: F) -> usize
    where
        F: FnMut(&Envelope) -> bool,
    {
        let before = self.envelopes.len();
        self.envelopes.retain(keep);
        before - self.envelopes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Envelope> {
        self.envelopes.iter()
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    pub fn clear(&mut self) {
        self.envelopes.clear();
    }
}
