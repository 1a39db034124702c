//! gossip-core: Cluster membership and data dissemination over datagrams.
//!
//! This crate provides:
//! - A fixed-width text wire format for the six gossip messages
//! - A membership directory fed by join handshakes and member lists
//! - Vector clocks and a bounded anti-entropy log for eventual consistency
//! - A retrying outbound queue with direct, random and broadcast fanout
//! - The [`GossipEngine`] state machine tying them together
//!
//! The engine performs no I/O of its own beyond the [`Transport`] trait, so
//! it can be driven by any event loop.

pub mod address;
pub mod clock;
pub mod config;
pub mod data_log;
pub mod engine;
pub mod error;
pub mod member;
pub mod membership;
pub mod outbound;
pub mod protocol;
pub mod state;
pub mod transport;
pub mod uid;
pub mod vector_clock;

pub use address::{Address, AddressError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::GossipConfig;
pub use data_log::{DataLog, DataLogRecord};
pub use engine::{DataReceiver, GossipEngine};
pub use error::{GossipError, Result};
pub use member::Member;
pub use membership::MemberList;
pub use outbound::{Dissemination, DrainReport, Envelope, OutboundQueue};
pub use protocol::{DecodeError, EncodeError, Message, MessageBody, MessageType};
pub use state::NodeState;
pub use transport::{MemoryNetwork, MemoryTransport, Transport, TransportError};
pub use uid::{MemberUid, UidError};
pub use vector_clock::{ClockOrdering, VectorClock, VectorRecord};
