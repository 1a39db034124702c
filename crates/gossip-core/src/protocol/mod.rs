//! Wire protocol for cluster gossip.
//!
//! This module defines the datagram format exchanged between members:
//! - Fixed-width text framing primitives (codec)
//! - The six message kinds and their header (message)

pub mod codec;
pub mod message;

pub use codec::{DecodeError, EncodeError, WireDecode, WireEncode};
pub use message::{peek_type, Message, MessageBody, MessageType, HEADER_SIZE, MESSAGE_MIN_SIZE};
