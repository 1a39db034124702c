//! Inbound message handling.

use super::GossipEngine;
use crate::address::Address;
use crate::error::{GossipError, Result};
use crate::member::Member;
use crate::outbound::Dissemination;
use crate::protocol::message::{peek_type, Message, MessageBody, MessageType};
use crate::state::NodeState;
use crate::transport::Transport;
use crate::vector_clock::{ClockOrdering, VectorClock, VectorRecord};
use bytes::Bytes;
use tracing::{debug, info};

/// Whether a message of `kind` is handled in `state`.
///
/// Welcome only completes a pending join. Ack is accepted while joining and
/// while connected, since Data and Status envelopes expect one.
/// Everything else requires a connected node.
pub(crate) fn accepts(state: NodeState, kind: MessageType) -> bool {
    match kind {
        MessageType::Welcome => state == NodeState::Joining,
        MessageType::Ack => state.is_active(),
        MessageType::Hello | MessageType::MemberList | MessageType::Data | MessageType::Status => {
            state == NodeState::Connected
        }
    }
}

impl<T: Transport> GossipEngine<T> {
    /// Decode and handle a datagram from `sender` without touching the
    /// transport.
    ///
    /// Rejected and malformed datagrams leave the node unchanged.
    pub fn handle_datagram(&mut self, buf: &[u8], sender: Address) -> Result<()> {
        let kind = peek_type(buf)?;
        if !accepts(self.state, kind) {
            return Err(GossipError::Rejected {
                kind,
                state: self.state,
            });
        }

        let message = Message::from_datagram(buf)?;
        let seq = message.sequence_number;
        debug!(%sender, seq, %kind, "Handling message");

        match message.body {
            MessageBody::Hello { member } => self.handle_hello(sender, seq, member),
            MessageBody::Welcome {
                hello_sequence_number,
                member,
            } => {
                self.handle_welcome(sender, hello_sequence_number, member);
                Ok(())
            }
            MessageBody::MemberList { members } => self.handle_member_list(sender, seq, members),
            MessageBody::Ack {
                ack_sequence_number,
            } => {
                self.handle_ack(sender, ack_sequence_number);
                Ok(())
            }
            MessageBody::Data { version, data } => self.handle_data(sender, seq, version, data),
            MessageBody::Status { version } => self.handle_status(sender, seq, version),
        }
    }

    fn handle_hello(&mut self, sender: Address, seq: u64, member: Member) -> Result<()> {
        self.enqueue_welcome(sender, seq)?;
        if !self.members.is_empty() {
            self.enqueue_member_list(Some(sender))?;
        }

        // Announce to everyone else. A repeated Hello finds the newcomer
        // already in the directory, and it rejects member lists until its
        // Welcome arrives.
        let newcomer = *member.address();
        self.enqueue_message(
            MessageBody::MemberList {
                members: vec![member.clone()],
            },
            Dissemination::BroadcastExcept(newcomer),
        )?;

        if member != self.self_member {
            info!(member_id = %member.member_id(), "Member joined");
            self.members.put([member]);
        }
        Ok(())
    }

    fn handle_welcome(&mut self, sender: Address, hello_sequence_number: u64, member: Member) {
        self.state = NodeState::Connected;
        info!(seed = %member.member_id(), "Joined cluster");

        if member != self.self_member {
            self.members.put([member]);
        }

        if self
            .outbound
            .dequeue_by_sequence(hello_sequence_number, &sender)
            .is_none()
        {
            debug!(%sender, seq = hello_sequence_number, "No pending Hello for Welcome");
        }

        // Hellos still pending for other seeds are moot now.
        let dropped = self.outbound.retain(|e| e.message_type != MessageType::Hello);
        if dropped > 0 {
            debug!(dropped, "Dropped Hellos to other seeds");
        }
    }

    fn handle_member_list(&mut self, sender: Address, seq: u64, members: Vec<Member>) -> Result<()> {
        let own = &self.self_member;
        let added = self
            .members
            .put(members.into_iter().filter(|m| m != own));
        if added > 0 {
            debug!(%sender, added, total = self.members.len(), "Learned members");
        }
        self.enqueue_ack(sender, seq)?;
        Ok(())
    }

    fn handle_ack(&mut self, sender: Address, ack_sequence_number: u64) {
        if self
            .outbound
            .dequeue_by_sequence(ack_sequence_number, &sender)
            .is_none()
        {
            debug!(%sender, seq = ack_sequence_number, "Ack for unknown envelope");
        }
    }

    fn handle_data(&mut self, sender: Address, seq: u64, version: VectorRecord, data: Bytes) -> Result<()> {
        self.enqueue_ack(sender, seq)?;

        if self.data_version.merge_record(&version) != ClockOrdering::Before {
            return Ok(());
        }

        debug!(origin = %version.member_id, version = version.sequence_number, "New data");
        self.data_log.add_or_replace(&version, &data);
        if let Some(receiver) = self.data_receiver.as_mut() {
            receiver.on_data(&data);
        }
        self.enqueue_data(MessageBody::Data { version, data }, Dissemination::Random)?;
        Ok(())
    }

    fn handle_status(&mut self, sender: Address, seq: u64, peer_version: VectorClock) -> Result<()> {
        self.enqueue_ack(sender, seq)?;

        let ordering = self.data_version.compare_clock(&peer_version);
        debug!(%sender, ?ordering, "Compared status");
        match ordering {
            ClockOrdering::After => {
                self.enqueue_data_log(sender, &peer_version)?;
            }
            ClockOrdering::Before => {
                self.enqueue_status(Some(sender))?;
            }
            ClockOrdering::Conflict => {
                self.enqueue_data_log(sender, &peer_version)?;
                self.enqueue_status(Some(sender))?;
            }
            ClockOrdering::Equal => {}
        }
        Ok(())
    }
}
