//! gossip-daemon library: UDP transport and engine configuration for the
//! daemon binary.
//!
//! Kept as a library so integration tests can drive real sockets.

pub mod settings;
pub mod udp;

pub use settings::Settings;
pub use udp::{UdpTransport, RECV_BUFFER_SIZE};
