use crate::protocol::codec::{DecodeError, EncodeError};
use crate::protocol::message::MessageType;
use crate::state::NodeState;
use crate::transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GossipError {
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: NodeState,
    },

    #[error("Rejected {kind} message while {state}")]
    Rejected { kind: MessageType, state: NodeState },

    #[error("Payload of {size} bytes exceeds the {max} byte message limit")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Encoded {kind} frame of {size} bytes exceeds the {max} byte datagram limit")]
    FrameTooLarge {
        kind: MessageType,
        size: usize,
        max: usize,
    },

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, GossipError>;
