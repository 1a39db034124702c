//! Protocol constants and tunable engine configuration.

use crate::protocol::codec::FIELD_WIDTH;
use crate::protocol::message::HEADER_SIZE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Protocol version advertised in every member record.
pub const PROTOCOL_VERSION: u8 = 1;

/// Upper bound for a single encoded data frame.
pub const MESSAGE_MAX_SIZE: usize = 512;

/// Delay before an unacknowledged envelope is retransmitted.
pub const MESSAGE_RETRY_INTERVAL: Duration = Duration::from_millis(10_000);

/// Transmission attempts before a peer is considered unreachable.
pub const MESSAGE_RETRY_ATTEMPTS: u32 = 3;

/// Number of random members a rumor is forwarded to.
pub const MESSAGE_RUMOR_FACTOR: usize = 3;

/// Period of the anti-entropy Status gossip.
pub const GOSSIP_TICK_INTERVAL: Duration = Duration::from_millis(1_000);

/// Capacity of the anti-entropy data log.
pub const DATA_LOG_SIZE: usize = 25;

/// Maximum number of envelopes waiting in the outbound queue.
pub const MAX_OUTPUT_MESSAGES: usize = 100;

/// Longest multiaddr an encoded member is sized for.
pub const MAX_MEMBER_ADDRESS_SIZE: usize = 30;

/// Encoded size of one member: version, uid, address length, address.
pub const CLUSTER_MEMBER_SIZE: usize = FIELD_WIDTH * 3 + MAX_MEMBER_ADDRESS_SIZE;

/// Members per MemberList message, leaving room for the header and count.
///
/// Sized for IPv4 multiaddrs. Chunks are also cut by their encoded length,
/// so wider addresses yield fewer members per message.
pub const MEMBER_LIST_SYNC_SIZE: usize =
    (MESSAGE_MAX_SIZE - HEADER_SIZE - FIELD_WIDTH) / CLUSTER_MEMBER_SIZE;

/// Runtime configuration of a [`GossipEngine`](crate::GossipEngine).
///
/// Durations (de)serialize as integer milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GossipConfig {
    /// Wait between retransmissions of an unacked envelope (default: 10s)
    #[serde(with = "duration_ms")]
    pub retry_interval: Duration,
    /// Attempts before the recipient is evicted (default: 3)
    pub retry_attempts: u32,
    /// Fanout of random dissemination (default: 3)
    pub rumor_factor: usize,
    /// Status gossip period (default: 1s)
    #[serde(with = "duration_ms")]
    pub gossip_interval: Duration,
    /// Anti-entropy log capacity (default: 25)
    pub data_log_capacity: usize,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            retry_interval: MESSAGE_RETRY_INTERVAL,
            retry_attempts: MESSAGE_RETRY_ATTEMPTS,
            rumor_factor: MESSAGE_RUMOR_FACTOR,
            gossip_interval: GOSSIP_TICK_INTERVAL,
            data_log_capacity: DATA_LOG_SIZE,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
