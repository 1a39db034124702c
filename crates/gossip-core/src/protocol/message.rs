//! The six gossip message kinds.
//!
//! Every datagram starts with an 8-byte header: type (2 digits), reserved
//! (2 digits, always `00`) and sequence number (4 digits). The body layout
//! depends on the type:
//!
//! | Type | Body |
//! |---|---|
//! | Hello (01) | Member |
//! | Welcome (02) | hello sequence number + Member |
//! | MemberList (03) | count + Members |
//! | Ack (04) | acknowledged sequence number |
//! | Data (05) | VectorRecord + length-prefixed payload |
//! | Status (06) | VectorClock |

use crate::member::Member;
use crate::protocol::codec::{
    put_bytes, put_number, DecodeError, EncodeError, Reader, WireDecode, WireEncode, FIELD_WIDTH,
    SHORT_FIELD_WIDTH,
};
use crate::vector_clock::{VectorClock, VectorRecord};
use bytes::Bytes;
use std::fmt::{self, Display, Formatter};

/// Encoded size of the common header.
pub const HEADER_SIZE: usize = SHORT_FIELD_WIDTH * 2 + FIELD_WIDTH;

/// Shortest buffer that can hold a message.
pub const MESSAGE_MIN_SIZE: usize = HEADER_SIZE;

/// Discriminant carried in the first two bytes of every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Hello = 1,
    Welcome = 2,
    MemberList = 3,
    Ack = 4,
    Data = 5,
    Status = 6,
}

impl MessageType {
    pub fn code(self) -> u64 {
        self as u64
    }

    pub fn from_code(code: u64) -> Result<Self, DecodeError> {
        match code {
            1 => Ok(Self::Hello),
            2 => Ok(Self::Welcome),
            3 => Ok(Self::MemberList),
            4 => Ok(Self::Ack),
            5 => Ok(Self::Data),
            6 => Ok(Self::Status),
            other => Err(DecodeError::UnknownMessageType(other)),
        }
    }
}

impl Display for MessageType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hello => "hello",
            Self::Welcome => "welcome",
            Self::MemberList => "member-list",
            Self::Ack => "ack",
            Self::Data => "data",
            Self::Status => "status",
        };
        f.write_str(name)
    }
}

/// Read the message type without decoding the rest of the buffer.
pub fn peek_type(buf: &[u8]) -> Result<MessageType, DecodeError> {
    if buf.len() < MESSAGE_MIN_SIZE {
        return Err(DecodeError::Truncated {
            offset: 0,
            needed: MESSAGE_MIN_SIZE,
            available: buf.len(),
        });
    }
    let code = Reader::new(buf).number(SHORT_FIELD_WIDTH)?;
    MessageType::from_code(code)
}

/// Type-specific part of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// Join request from a new member to a seed.
    Hello { member: Member },
    /// Seed's answer to a Hello, carrying the seed itself.
    Welcome {
        hello_sequence_number: u64,
        member: Member,
    },
    /// Batch of known members.
    MemberList { members: Vec<Member> },
    /// Acknowledges the envelope with the given sequence number.
    Ack { ack_sequence_number: u64 },
    /// Application payload stamped with its originator's version.
    Data { version: VectorRecord, data: Bytes },
    /// Sender's full vector clock, for anti-entropy.
    Status { version: VectorClock },
}

impl MessageBody {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Hello { .. } => MessageType::Hello,
            Self::Welcome { .. } => MessageType::Welcome,
            Self::MemberList { .. } => MessageType::MemberList,
            Self::Ack { .. } => MessageType::Ack,
            Self::Data { .. } => MessageType::Data,
            Self::Status { .. } => MessageType::Status,
        }
    }
}

/// A framed gossip message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sequence_number: u64,
    pub body: MessageBody,
}

impl Message {
    pub fn new(sequence_number: u64, body: MessageBody) -> Self {
        Self {
            sequence_number,
            body,
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }

    /// Decode a whole datagram, checking the minimum size first.
    pub fn from_datagram(buf: &[u8]) -> Result<Self, DecodeError> {
        peek_type(buf)?;
        Ok(Self::decode(buf)?.0)
    }
}

impl WireEncode for Message {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_number(out, "message type", self.message_type().code(), SHORT_FIELD_WIDTH)?;
        put_number(out, "reserved", 0, SHORT_FIELD_WIDTH)?;
        put_number(out, "sequence number", self.sequence_number, FIELD_WIDTH)?;

        match &self.body {
            MessageBody::Hello { member } => member.encode_into(out),
            MessageBody::Welcome {
                hello_sequence_number,
                member,
            } => {
                put_number(out, "hello sequence number", *hello_sequence_number, FIELD_WIDTH)?;
                member.encode_into(out)
            }
            MessageBody::MemberList { members } => {
                put_number(out, "member count", members.len() as u64, FIELD_WIDTH)?;
                for member in members {
                    member.encode_into(out)?;
                }
                Ok(())
            }
            MessageBody::Ack {
                ack_sequence_number,
            } => put_number(out, "ack sequence number", *ack_sequence_number, FIELD_WIDTH),
            MessageBody::Data { version, data } => {
                version.encode_into(out)?;
                put_bytes(out, "payload length", data)
            }
            MessageBody::Status { version } => version.encode_into(out),
        }
    }
}

impl WireDecode for Message {
    fn decode_from(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let message_type = MessageType::from_code(reader.number(SHORT_FIELD_WIDTH)?)?;
        let _reserved = reader.number(SHORT_FIELD_WIDTH)?;
        let sequence_number = reader.number(FIELD_WIDTH)?;

        let body = match message_type {
            MessageType::Hello => MessageBody::Hello {
                member: Member::decode_from(reader)?,
            },
            MessageType::Welcome => {
                let hello_sequence_number = reader.number(FIELD_WIDTH)?;
                MessageBody::Welcome {
                    hello_sequence_number,
                    member: Member::decode_from(reader)?,
                }
            }
            MessageType::MemberList => {
                let count = reader.number(FIELD_WIDTH)?;
                let mut members = Vec::new();
                for _ in 0..count {
                    members.push(Member::decode_from(reader)?);
                }
                MessageBody::MemberList { members }
            }
            MessageType::Ack => MessageBody::Ack {
                ack_sequence_number: reader.number(FIELD_WIDTH)?,
            },
            MessageType::Data => {
                let version = VectorRecord::decode_from(reader)?;
                let data = Bytes::copy_from_slice(reader.bytes()?);
                MessageBody::Data { version, data }
            }
            MessageType::Status => MessageBody::Status {
                version: VectorClock::decode_from(reader)?,
            },
        };

        Ok(Self {
            sequence_number,
            body,
        })
    }
}
