//! Node lifecycle.

use std::fmt::{self, Display, Formatter};

/// Lifecycle state of a gossip node.
///
/// ```text
/// Initialized --join(seeds)--> Joining --Welcome--> Connected
/// Initialized --join([])-----------------------------> Connected
/// Joining | Connected --leave--> Leaving --shutdown--> Disconnected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeState {
    #[default]
    Initialized,
    Joining,
    Connected,
    Leaving,
    Disconnected,
    Destroyed,
}

impl NodeState {
    /// Whether the node exchanges messages in this state.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Joining | Self::Connected)
    }
}

impl Display for NodeState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initialized => "initialized",
            Self::Joining => "joining",
            Self::Connected => "connected",
            Self::Leaving => "leaving",
            Self::Disconnected => "disconnected",
            Self::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}
