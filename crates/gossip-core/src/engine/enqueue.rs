//! Building and queueing outbound messages.

use super::GossipEngine;
use crate::address::Address;
use crate::config::{MEMBER_LIST_SYNC_SIZE, MESSAGE_MAX_SIZE};
use crate::error::{GossipError, Result};
use crate::member::Member;
use crate::outbound::{Dissemination, Envelope};
use crate::protocol::codec::{WireEncode, FIELD_WIDTH};
use crate::protocol::message::{Message, MessageBody, MessageType, HEADER_SIZE};
use crate::transport::Transport;
use crate::vector_clock::{ClockOrdering, VectorClock};
use bytes::Bytes;
use tracing::{debug, trace, warn};

/// Split `members` into groups whose MemberList frame fits in one datagram
/// and holds at most [`MEMBER_LIST_SYNC_SIZE`] members.
fn member_list_chunks(members: &[Member]) -> Result<Vec<Vec<Member>>> {
    let budget = MESSAGE_MAX_SIZE - HEADER_SIZE - FIELD_WIDTH;
    let mut chunks = Vec::new();
    let mut current: Vec<Member> = Vec::new();
    let mut used = 0;

    for member in members {
        let size = member.encode()?.len();
        if !current.is_empty() && (used + size > budget || current.len() == MEMBER_LIST_SYNC_SIZE) {
            chunks.push(std::mem::take(&mut current));
            used = 0;
        }
        current.push(member.clone());
        used += size;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    Ok(chunks)
}

impl<T: Transport> GossipEngine<T> {
    /// Encode `body` once and queue an envelope per recipient.
    ///
    /// Returns the number of envelopes queued, which is zero for a random
    /// or broadcast fanout while the directory is empty. Frames larger than
    /// [`MESSAGE_MAX_SIZE`] are not queued.
    pub(crate) fn enqueue_message(&mut self, body: MessageBody, mode: Dissemination) -> Result<usize> {
        let sequence_number = self.next_sequence();
        let message = Message::new(sequence_number, body);
        let message_type = message.message_type();
        let buffer = Bytes::from(message.encode()?);

        if buffer.len() > MESSAGE_MAX_SIZE {
            warn!(kind = %message_type, size = buffer.len(), "Frame exceeds datagram limit, not queued");
            return Err(GossipError::FrameTooLarge {
                kind: message_type,
                size: buffer.len(),
                max: MESSAGE_MAX_SIZE,
            });
        }

        let max_attempts = match message_type {
            // Replies are never acknowledged themselves.
            MessageType::Welcome | MessageType::Ack => 1,
            _ => self.config.retry_attempts.max(1),
        };

        let recipients: Vec<Address> = match mode {
            Dissemination::Direct(address) => vec![address],
            Dissemination::BroadcastExcept(excluded) => self
                .members
                .iter()
                .map(|m| *m.address())
                .filter(|a| *a != excluded)
                .collect(),
            Dissemination::Random => match self.members.random_members(self.config.rumor_factor) {
                Some(picked) => picked.iter().map(|m| *m.address()).collect(),
                None => {
                    debug!(kind = %message_type, "No members to gossip to");
                    return Ok(0);
                }
            },
            Dissemination::Broadcast => self.members.iter().map(|m| *m.address()).collect(),
        };

        for recipient in &recipients {
            trace!(seq = sequence_number, kind = %message_type, %recipient, "Queued envelope");
            self.outbound.push(Envelope::new(
                sequence_number,
                message_type,
                buffer.clone(),
                *recipient,
                max_attempts,
            ));
        }
        Ok(recipients.len())
    }

    pub(crate) fn enqueue_hello(&mut self, seed: Address) -> Result<usize> {
        let member = self.self_member.clone();
        self.enqueue_message(MessageBody::Hello { member }, Dissemination::Direct(seed))
    }

    pub(crate) fn enqueue_welcome(&mut self, recipient: Address, hello_sequence_number: u64) -> Result<usize> {
        let member = self.self_member.clone();
        self.enqueue_message(
            MessageBody::Welcome {
                hello_sequence_number,
                member,
            },
            Dissemination::Direct(recipient),
        )
    }

    pub(crate) fn enqueue_ack(&mut self, recipient: Address, ack_sequence_number: u64) -> Result<usize> {
        self.enqueue_message(
            MessageBody::Ack { ack_sequence_number },
            Dissemination::Direct(recipient),
        )
    }

    /// Queue our vector clock, to `recipient` or to random members.
    pub(crate) fn enqueue_status(&mut self, recipient: Option<Address>) -> Result<usize> {
        let version = self.data_version.clone();
        let mode = recipient.map_or(Dissemination::Random, Dissemination::Direct);
        self.enqueue_message(MessageBody::Status { version }, mode)
    }

    pub(crate) fn enqueue_data(&mut self, body: MessageBody, mode: Dissemination) -> Result<usize> {
        debug_assert_eq!(body.message_type(), MessageType::Data);
        self.enqueue_message(body, mode)
    }

    /// Replay every logged payload that `peer_version` has not seen.
    pub(crate) fn enqueue_data_log(&mut self, recipient: Address, peer_version: &VectorClock) -> Result<usize> {
        let missing: Vec<MessageBody> = self
            .data_log
            .iter()
            .filter(|record| peer_version.compare_record(&record.version) == ClockOrdering::Before)
            .map(|record| record.create_data_message())
            .collect();

        debug!(%recipient, count = missing.len(), "Replaying data log");
        let mut queued = 0;
        for body in missing {
            queued += self.enqueue_data(body, Dissemination::Direct(recipient))?;
        }
        Ok(queued)
    }

    /// Send the whole directory in MemberList chunks, to `recipient` or to
    /// every member.
    pub(crate) fn enqueue_member_list(&mut self, recipient: Option<Address>) -> Result<usize> {
        let mode = recipient.map_or(Dissemination::Broadcast, Dissemination::Direct);
        let chunks = member_list_chunks(self.members.as_slice())?;

        let mut queued = 0;
        for members in chunks {
            queued += self.enqueue_message(MessageBody::MemberList { members }, mode)?;
        }
        Ok(queued)
    }
}
