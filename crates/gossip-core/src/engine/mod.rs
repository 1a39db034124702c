//! The gossip protocol engine.
//!
//! [`GossipEngine`] owns all node state and is driven by its host:
//!
//! 1. wait for the transport to become readable, at most for the duration
//!    returned by the last [`tick`](GossipEngine::tick)
//! 2. [`receive`](GossipEngine::receive) one datagram
//! 3. [`tick`](GossipEngine::tick) the anti-entropy timer
//! 4. [`send`](GossipEngine::send) whatever is due in the outbound queue
//!
//! Nothing here blocks or spawns; every mutating entry point takes
//! `&mut self`.

mod enqueue;
mod handler;

use crate::address::Address;
use crate::clock::{Clock, SystemClock};
use crate::config::{GossipConfig, MESSAGE_MAX_SIZE};
use crate::data_log::DataLog;
use crate::error::{GossipError, Result};
use crate::member::Member;
use crate::membership::MemberList;
use crate::outbound::{Dissemination, OutboundQueue};
use crate::protocol::codec::{WireEncode, FIELD_MAX};
use crate::protocol::message::{Message, MessageBody};
use crate::state::NodeState;
use crate::transport::{Transport, TransportError};
use crate::uid::MemberUid;
use crate::vector_clock::{VectorClock, VectorRecord};
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Consumer of application payloads delivered by the cluster.
///
/// Called once for every Data message that carries information this node
/// had not seen before.
pub trait DataReceiver {
    fn on_data(&mut self, data: &[u8]);
}

impl<F> DataReceiver for F
where
    F: FnMut(&[u8]),
{
    fn on_data(&mut self, data: &[u8]) {
        self(data)
    }
}

/// A cluster member's protocol state machine.
pub struct GossipEngine<T: Transport> {
    config: GossipConfig,
    state: NodeState,
    self_member: Member,
    members: MemberList,
    data_version: VectorClock,
    data_log: DataLog,
    outbound: OutboundQueue,
    /// Last envelope sequence number handed out (wraps within the field)
    sequence_counter: u64,
    /// Version of the last payload this node originated
    data_counter: u64,
    last_gossip_ms: u64,
    transport: T,
    clock: Box<dyn Clock>,
    data_receiver: Option<Box<dyn DataReceiver + Send>>,
}

impl<T: Transport> GossipEngine<T> {
    /// Bind `transport` to `address` and create an engine with a random uid.
    ///
    /// The member address is whatever the transport reports after binding,
    /// so port 0 works.
    pub fn new(address: Address, mut transport: T, config: GossipConfig) -> Result<Self> {
        transport.bind(&address)?;
        let local = transport.local_address()?;
        let self_member = Member::new(MemberUid::generate(), local);
        let data_log = DataLog::with_capacity(config.data_log_capacity);

        debug!(member_id = %self_member.member_id(), "Gossip engine bound");

        Ok(Self {
            config,
            state: NodeState::Initialized,
            self_member,
            members: MemberList::new(),
            data_version: VectorClock::new(),
            data_log,
            outbound: OutboundQueue::new(),
            sequence_counter: 0,
            data_counter: 0,
            last_gossip_ms: 0,
            transport,
            clock: Box::new(SystemClock),
            data_receiver: None,
        })
    }

    /// Use a fixed uid instead of a random one.
    pub fn with_uid(mut self, uid: MemberUid) -> Self {
        self.self_member = Member::new(uid, *self.self_member.address());
        self
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn set_data_receiver(&mut self, receiver: impl DataReceiver + Send + 'static) {
        self.data_receiver = Some(Box::new(receiver));
    }

    // ==================== Lifecycle ====================

    /// Join the cluster through `seeds`.
    ///
    /// With no seeds (other than ourselves) this node starts a new cluster
    /// and is connected immediately. Otherwise a Hello is queued for every
    /// seed and the node waits for the first Welcome.
    pub fn join(&mut self, seeds: &[Address]) -> Result<()> {
        if self.state != NodeState::Initialized {
            return Err(GossipError::InvalidState {
                operation: "join",
                state: self.state,
            });
        }

        let own = *self.self_member.address();
        let seeds: Vec<Address> = seeds.iter().copied().filter(|s| *s != own).collect();

        if seeds.is_empty() {
            info!(address = %own, "Starting new cluster as seed node");
            self.state = NodeState::Connected;
            return Ok(());
        }

        for seed in &seeds {
            self.enqueue_hello(*seed)?;
        }
        info!(address = %own, seeds = seeds.len(), "Joining cluster");
        self.state = NodeState::Joining;
        Ok(())
    }

    /// Stop participating: pending envelopes are dropped.
    pub fn leave(&mut self) -> Result<()> {
        self.require_active("leave")?;
        let dropped = self.outbound.len();
        self.outbound.clear();
        info!(dropped, "Leaving cluster");
        self.state = NodeState::Leaving;
        Ok(())
    }

    /// Close the transport. The engine is unusable afterwards.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.state == NodeState::Disconnected {
            return Ok(());
        }
        self.transport.close()?;
        self.outbound.clear();
        self.state = NodeState::Disconnected;
        debug!("Gossip engine shut down");
        Ok(())
    }

    // ==================== Driving ====================

    /// Originate a payload.
    ///
    /// The payload is stamped with the next version of this node, recorded
    /// in the anti-entropy log and queued either for `recipient` or for a
    /// random fanout. Returns the number of envelopes queued.
    pub fn send_data(&mut self, payload: impl Into<Bytes>, recipient: Option<Address>) -> Result<usize> {
        self.require_active("send data")?;

        let data: Bytes = payload.into();
        let version = VectorRecord::new(self.self_member.member_id(), self.data_counter + 1);
        let body = MessageBody::Data {
            version: version.clone(),
            data: data.clone(),
        };

        // Frame size does not depend on the header sequence number.
        let size = Message::new(FIELD_MAX, body.clone()).encode()?.len();
        if size > MESSAGE_MAX_SIZE {
            return Err(GossipError::PayloadTooLarge {
                size,
                max: MESSAGE_MAX_SIZE,
            });
        }

        self.data_counter = version.sequence_number;
        self.data_version
            .set_sequence_number_by_id(&version.member_id, version.sequence_number);
        self.data_log.add_or_replace(&version, &data);

        let mode = match recipient {
            Some(address) => Dissemination::Direct(address),
            None => Dissemination::Random,
        };
        self.enqueue_message(body, mode)
    }

    /// Run the anti-entropy timer.
    ///
    /// When the gossip interval has elapsed a Status is queued for random
    /// members. Returns how long the host may wait before the next tick, or
    /// [`GossipError::FrameTooLarge`] when the clock no longer fits in a
    /// datagram.
    pub fn tick(&mut self) -> Result<Duration> {
        if self.state != NodeState::Connected {
            return Err(GossipError::InvalidState {
                operation: "tick",
                state: self.state,
            });
        }

        let interval = self.config.gossip_interval.as_millis() as u64;
        let now = self.clock.now_ms();
        let elapsed = now.saturating_sub(self.last_gossip_ms);
        if elapsed < interval {
            return Ok(Duration::from_millis(interval - elapsed));
        }

        // The timer advances even when the Status cannot be queued.
        self.last_gossip_ms = now;
        self.enqueue_status(None)?;
        Ok(self.config.gossip_interval)
    }

    /// Transmit every due envelope.
    ///
    /// Members whose envelopes exhaust their retries are evicted from the
    /// directory. A transport failure aborts the cycle; whatever was not
    /// sent stays queued for the next call. Returns the number of datagrams
    /// sent.
    pub fn send(&mut self) -> Result<usize> {
        self.require_active("send")?;

        let now = self.clock.now_ms();
        let retry_interval = self.config.retry_interval.as_millis() as u64;
        let transport = &self.transport;
        let report = self.outbound.drain(now, retry_interval, |envelope| {
            transport
                .send_to(&envelope.buffer, &envelope.recipient)
                .map(|_| ())
        })?;

        for address in &report.unreachable {
            while let Some(member) = self.members.remove_by_address(address) {
                warn!(member_id = %member.member_id(), "Evicting unreachable member");
            }
        }

        Ok(report.sent)
    }

    /// Receive and handle one datagram.
    ///
    /// Returns `Ok(false)` when nothing was waiting or the datagram was
    /// dropped (malformed, or not acceptable in the current state).
    /// Transport failures are returned as errors.
    pub fn receive(&mut self) -> Result<bool> {
        self.require_active("receive")?;

        let (buf, sender) = match self.transport.recv_from() {
            Ok(datagram) => datagram,
            Err(TransportError::WouldBlock) => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        match self.handle_datagram(&buf, sender) {
            Ok(()) => Ok(true),
            Err(e) => {
                debug!(%sender, error = %e, "Dropped datagram");
                Ok(false)
            }
        }
    }

    // ==================== Introspection ====================

    pub fn current_state(&self) -> NodeState {
        self.state
    }

    /// Raw descriptor of the underlying socket, if the transport has one.
    #[cfg(unix)]
    pub fn socket_descriptor(&self) -> Option<std::os::unix::io::RawFd> {
        self.transport.descriptor()
    }

    pub fn self_member(&self) -> &Member {
        &self.self_member
    }

    pub fn members(&self) -> &MemberList {
        &self.members
    }

    pub fn data_version(&self) -> &VectorClock {
        &self.data_version
    }

    pub fn data_log(&self) -> &DataLog {
        &self.data_log
    }

    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    pub fn config(&self) -> &GossipConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // ==================== Internals ====================

    fn require_active(&self, operation: &'static str) -> Result<()> {
        if self.state.is_active() {
            Ok(())
        } else {
            Err(GossipError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Next envelope sequence number, wrapping within `1..=9999`.
    fn next_sequence(&mut self) -> u64 {
        self.sequence_counter = self.sequence_counter % FIELD_MAX + 1;
        self.sequence_counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::protocol::codec::WireDecode;
    use crate::protocol::message::MessageType;
    use crate::transport::{MemoryNetwork, MemoryTransport};
    use std::sync::{Arc, Mutex};

    fn addr(port: u16) -> Address {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn engine(network: &MemoryNetwork, port: u16, clock: &ManualClock) -> GossipEngine<MemoryTransport> {
        GossipEngine::new(addr(port), network.transport(), GossipConfig::default())
            .unwrap()
            .with_uid(MemberUid::new(u64::from(port)).unwrap())
            .with_clock(clock.clone())
    }

    fn inbox(network: &MemoryNetwork, port: u16) -> Vec<Message> {
        network
            .drain(&addr(port))
            .into_iter()
            .map(|(buf, _)| Message::from_datagram(&buf).unwrap())
            .collect()
    }

    // ==================== Construction ====================

    #[test]
    fn test_new_binds_transport() {
        let network = MemoryNetwork::new();
        let clock = ManualClock::new(0);
        let node = engine(&network, 7000, &clock);

        assert_eq!(node.current_state(), NodeState::Initialized);
        assert_eq!(node.self_member().address(), &addr(7000));
        assert_eq!(node.self_member().member_id(), "/ip/127.0.0.1/port/7000/uid/7000");
        assert_eq!(node.transport().local_address().unwrap(), addr(7000));
    }

    #[test]
    fn test_new_fails_when_address_taken() {
        let network = MemoryNetwork::new();
        let clock = ManualClock::new(0);
        let _first = engine(&network, 7000, &clock);

        let second = GossipEngine::new(addr(7000), network.transport(), GossipConfig::default());
        assert!(matches!(second, Err(GossipError::Transport(_))));
    }

    #[test]
    fn test_new_with_ephemeral_port() {
        let network = MemoryNetwork::new();
        let node = GossipEngine::new(addr(0), network.transport(), GossipConfig::default()).unwrap();
        assert_ne!(node.self_member().address().port(), 0);
    }

    // ==================== join ====================

    #[test]
    fn test_join_without_seeds_connects() {
        let network = MemoryNetwork::new();
        let clock = ManualClock::new(0);
        let mut node = engine(&network, 7000, &clock);

        node.join(&[]).unwrap();
        assert_eq!(node.current_state(), NodeState::Connected);
        assert_eq!(node.outbound_len(), 0);
    }

    #[test]
    fn test_join_only_self_as_seed_connects() {
        let network = MemoryNetwork::new();
        let clock = ManualClock::new(0);
        let mut node = engine(&network, 7000, &clock);

        node.join(&[addr(7000)]).unwrap();
        assert_eq!(node.current_state(), NodeState::Connected);
    }

    #[test]
    fn test_join_with_seeds_sends_hello() {
        let network = MemoryNetwork::new();
        let clock = ManualClock::new(0);
        let mut node = engine(&network, 7001, &clock);
        let _seed = network.transport();

        node.join(&[addr(7000), addr(7002)]).unwrap();
        assert_eq!(node.current_state(), NodeState::Joining);
        assert_eq!(node.outbound_len(), 2);
    }

    #[test]
    fn test_join_twice_is_error() {
        let network = MemoryNetwork::new();
        let clock = ManualClock::new(0);
        let mut node = engine(&network, 7000, &clock);

        node.join(&[]).unwrap();
        assert!(matches!(
            node.join(&[]),
            Err(GossipError::InvalidState { operation: "join", state: NodeState::Connected })
        ));
    }

    // ==================== Wrong state ====================

    #[test]
    fn test_operations_before_join_are_errors() {
        let network = MemoryNetwork::new();
        let clock = ManualClock::new(0);
        let mut node = engine(&network, 7000, &clock);

        assert!(matches!(node.send(), Err(GossipError::InvalidState { .. })));
        assert!(matches!(node.receive(), Err(GossipError::InvalidState { .. })));
        assert!(matches!(node.tick(), Err(GossipError::InvalidState { .. })));
        assert!(matches!(
            node.send_data(&b"x"[..], None),
            Err(GossipError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_tick_while_joining_is_error() {
        let network = MemoryNetwork::new();
        let clock = ManualClock::new(0);
        let mut node = engine(&network, 7001, &clock);
        node.join(&[addr(7000)]).unwrap();

        assert!(matches!(
            node.tick(),
            Err(GossipError::InvalidState { operation: "tick", state: NodeState::Joining })
        ));
        // receive and send are allowed while joining
        assert!(!node.receive().unwrap());
        assert_eq!(node.send().unwrap(), 1);
    }

    // ==================== Sequence numbers ====================

    #[test]
    fn test_sequence_wraps_within_field() {
        let network = MemoryNetwork::new();
        let clock = ManualClock::new(0);
        let mut node = engine(&network, 7000, &clock);

        node.sequence_counter = FIELD_MAX - 1;
        assert_eq!(node.next_sequence(), FIELD_MAX);
        assert_eq!(node.next_sequence(), 1);
        assert_eq!(node.next_sequence(), 2);
    }

    // ==================== tick ====================

    #[test]
    fn test_tick_schedules_status() {
        let network = MemoryNetwork::new();
        let clock = ManualClock::new(10_000);
        let mut node = engine(&network, 7000, &clock);
        node.join(&[]).unwrap();
        node.members.put([Member::new(MemberUid::new(1).unwrap(), addr(7001))]);

        assert_eq!(node.tick().unwrap(), Duration::from_secs(1));
        assert_eq!(node.outbound_len(), 1);

        clock.advance(400);
        assert_eq!(node.tick().unwrap(), Duration::from_millis(600));
        assert_eq!(node.outbound_len(), 1);

        clock.advance(600);
        assert_eq!(node.tick().unwrap(), Duration::from_secs(1));
        assert_eq!(node.outbound_len(), 2);
    }

    #[test]
    fn test_tick_with_empty_directory_queues_nothing() {
        let network = MemoryNetwork::new();
        let clock = ManualClock::new(10_000);
        let mut node = engine(&network, 7000, &clock);
        node.join(&[]).unwrap();

        assert_eq!(node.tick().unwrap(), Duration::from_secs(1));
        assert_eq!(node.outbound_len(), 0);
    }

    #[test]
    fn test_tick_with_oversized_clock_still_advances() {
        let network = MemoryNetwork::new();
        let clock = ManualClock::new(10_000);
        let mut node = engine(&network, 7000, &clock);
        node.join(&[]).unwrap();
        node.members.put([Member::new(MemberUid::new(1).unwrap(), addr(7001))]);
        for i in 0..20 {
            node.data_version
                .set_sequence_number_by_id(&format!("/ip/10.0.0.{i}/port/7000/uid/{}", i + 1), 1);
        }

        assert!(matches!(node.tick(), Err(GossipError::FrameTooLarge { .. })));
        assert_eq!(node.outbound_len(), 0);
        // The failed round still counts, so the host is not spun
        assert_eq!(node.tick().unwrap(), Duration::from_secs(1));
    }

    // ==================== send_data ====================

    #[test]
    fn test_send_data_stamps_version_and_logs() {
        let network = MemoryNetwork::new();
        let clock = ManualClock::new(0);
        let mut node = engine(&network, 7000, &clock);
        let _peer = {
            let mut t = network.transport();
            t.bind(&addr(7001)).unwrap();
            t
        };
        node.join(&[]).unwrap();

        let queued = node.send_data(&b"one"[..], Some(addr(7001))).unwrap();
        assert_eq!(queued, 1);
        node.send_data(&b"two"[..], Some(addr(7001))).unwrap();

        let own_id = node.self_member().member_id();
        assert_eq!(node.data_version().get(&own_id), 2);
        let logged = node.data_log().get(&own_id).unwrap();
        assert_eq!(logged.data, Bytes::from_static(b"two"));

        node.send().unwrap();
        let received = inbox(&network, 7001);
        assert_eq!(received.len(), 2);
        match &received[1].body {
            MessageBody::Data { version, data } => {
                assert_eq!(version.sequence_number, 2);
                assert_eq!(data, &Bytes::from_static(b"two"));
            }
            other => panic!("expected data, got {other:?}"),
        }
    }

    #[test]
    fn test_send_data_without_members_is_not_an_error() {
        let network = MemoryNetwork::new();
        let clock = ManualClock::new(0);
        let mut node = engine(&network, 7000, &clock);
        node.join(&[]).unwrap();

        assert_eq!(node.send_data(&b"lonely"[..], None).unwrap(), 0);
        assert_eq!(node.data_version().get(&node.self_member().member_id()), 1);
    }

    #[test]
    fn test_send_data_rejects_oversized_payload() {
        let network = MemoryNetwork::new();
        let clock = ManualClock::new(0);
        let mut node = engine(&network, 7000, &clock);
        node.join(&[]).unwrap();

        let result = node.send_data(vec![b'x'; MESSAGE_MAX_SIZE], None);
        assert!(matches!(
            result,
            Err(GossipError::PayloadTooLarge { max: MESSAGE_MAX_SIZE, .. })
        ));
        // Nothing committed
        assert!(node.data_version().is_empty());
        assert!(node.data_log().is_empty());
    }

    // ==================== receive ====================

    #[test]
    fn test_receive_drops_malformed_datagram() {
        let network = MemoryNetwork::new();
        let clock = ManualClock::new(0);
        let mut node = engine(&network, 7000, &clock);
        node.join(&[]).unwrap();

        let mut other = network.transport();
        other.bind(&addr(7001)).unwrap();
        other.send_to(b"0500", &addr(7000)).unwrap();
        other.send_to(b"99000001", &addr(7000)).unwrap();

        assert!(!node.receive().unwrap());
        assert!(!node.receive().unwrap());
        assert!(!node.receive().unwrap());
        assert_eq!(node.current_state(), NodeState::Connected);
    }

    #[test]
    fn test_receive_invokes_data_receiver() {
        let network = MemoryNetwork::new();
        let clock = ManualClock::new(0);
        let mut node = engine(&network, 7000, &clock);
        node.join(&[]).unwrap();

        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();
        node.set_data_receiver(move |data: &[u8]| sink.lock().unwrap().push(data.to_vec()));

        let mut other = network.transport();
        other.bind(&addr(7001)).unwrap();
        let message = Message::new(
            1,
            MessageBody::Data {
                version: VectorRecord::new("/ip/127.0.0.1/port/7001/uid/1", 1),
                data: Bytes::from_static(b"hi"),
            },
        );
        other.send_to(&message.encode().unwrap(), &addr(7000)).unwrap();

        assert!(node.receive().unwrap());
        assert_eq!(*delivered.lock().unwrap(), vec![b"hi".to_vec()]);

        // Only the Ack is queued: the directory is empty so the rumor has no target
        node.send().unwrap();
        let replies = inbox(&network, 7001);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].message_type(), MessageType::Ack);
        assert_eq!(
            replies[0].body,
            MessageBody::Ack { ack_sequence_number: 1 }
        );
    }

    #[test]
    fn test_receive_transport_error_propagates() {
        let network = MemoryNetwork::new();
        let clock = ManualClock::new(0);
        let mut node = engine(&network, 7000, &clock);
        node.join(&[]).unwrap();

        network.disconnect(&addr(7000));
        assert!(matches!(node.receive(), Err(GossipError::Transport(_))));
    }

    // ==================== send ====================

    #[test]
    fn test_send_failure_keeps_envelopes() {
        let network = MemoryNetwork::new();
        let clock = ManualClock::new(0);
        let mut node = engine(&network, 7001, &clock);
        node.join(&[addr(7000)]).unwrap();

        network.set_offline(&addr(7001), true);
        assert!(matches!(node.send(), Err(GossipError::Transport(_))));
        assert_eq!(node.outbound_len(), 1);

        network.set_offline(&addr(7001), false);
        assert_eq!(node.send().unwrap(), 1);
    }

    // ==================== leave / shutdown ====================

    #[test]
    fn test_leave_and_shutdown() {
        let network = MemoryNetwork::new();
        let clock = ManualClock::new(0);
        let mut node = engine(&network, 7001, &clock);
        node.join(&[addr(7000)]).unwrap();

        node.leave().unwrap();
        assert_eq!(node.current_state(), NodeState::Leaving);
        assert_eq!(node.outbound_len(), 0);
        assert!(matches!(node.send(), Err(GossipError::InvalidState { .. })));
        assert!(matches!(node.leave(), Err(GossipError::InvalidState { .. })));

        node.shutdown().unwrap();
        assert_eq!(node.current_state(), NodeState::Disconnected);
        assert!(node.transport().local_address().is_err());
        node.shutdown().unwrap();
    }

    #[test]
    fn test_hello_wire_carries_self() {
        let network = MemoryNetwork::new();
        let clock = ManualClock::new(0);
        let mut node = engine(&network, 7001, &clock);
        let mut seed = network.transport();
        seed.bind(&addr(7000)).unwrap();

        node.join(&[addr(7000)]).unwrap();
        node.send().unwrap();

        let (buf, sender) = seed.recv_from().unwrap();
        assert_eq!(sender, addr(7001));
        let (message, _) = Message::decode(&buf).unwrap();
        assert_eq!(
            message.body,
            MessageBody::Hello {
                member: node.self_member().clone()
            }
        );
    }
}
