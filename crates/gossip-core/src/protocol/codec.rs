//! Fixed-width text framing.
//!
//! Every numeric field is zero-padded ASCII decimal: two digits for the
//! message type and reserved byte pair, four digits for everything else.
//! Variable-length fields (addresses, member ids, payloads) are preceded by a
//! four-digit length. Decoding reports how many bytes it consumed so nested
//! structures compose by chaining offsets through a [`Reader`].

use crate::address::AddressError;
use thiserror::Error;

/// Width of the message type and reserved fields.
pub const SHORT_FIELD_WIDTH: usize = 2;

/// Width of every other numeric field (sequence numbers, lengths, uids, ...).
pub const FIELD_WIDTH: usize = 4;

/// Largest value a four-digit field can carry.
pub const FIELD_MAX: u64 = 9_999;

/// Largest value a two-digit field can carry.
pub const SHORT_FIELD_MAX: u64 = 99;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Truncated buffer: need {needed} bytes at offset {offset}, have {available}")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Invalid numeric field at offset {offset}")]
    InvalidNumber { offset: usize },

    #[error("Invalid UTF-8 text at offset {offset}")]
    InvalidText { offset: usize },

    #[error("Unknown message type: {0:02}")]
    UnknownMessageType(u64),

    #[error("Value {value} out of range for {field}")]
    OutOfRange { field: &'static str, value: u64 },

    #[error("Invalid address: {0}")]
    Address(#[from] AddressError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("{field} value {value} does not fit in {width} decimal digits")]
    FieldOverflow {
        field: &'static str,
        value: u64,
        width: usize,
    },
}

/// A structure with a wire representation.
pub trait WireEncode {
    /// Append the encoded form to `out`.
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), EncodeError>;

    /// Encode into a fresh buffer.
    fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut out = Vec::new();
        self.encode_into(&mut out)?;
        Ok(out)
    }
}

/// A structure that can be parsed from its wire representation.
pub trait WireDecode: Sized {
    /// Parse from the reader's current position, advancing it.
    fn decode_from(reader: &mut Reader<'_>) -> Result<Self, DecodeError>;

    /// Parse from the start of `buf`, returning the value and the number of
    /// bytes consumed.
    fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        let mut reader = Reader::new(buf);
        let value = Self::decode_from(&mut reader)?;
        Ok((value, reader.position()))
    }
}

/// Append `value` as a zero-padded decimal field of `width` digits.
pub fn put_number(
    out: &mut Vec<u8>,
    field: &'static str,
    value: u64,
    width: usize,
) -> Result<(), EncodeError> {
    let max = 10u64.pow(width as u32) - 1;
    if value > max {
        return Err(EncodeError::FieldOverflow {
            field,
            value,
            width,
        });
    }
    out.extend_from_slice(format!("{value:0width$}").as_bytes());
    Ok(())
}

/// Append a four-digit length prefix followed by `bytes`.
pub fn put_bytes(out: &mut Vec<u8>, field: &'static str, bytes: &[u8]) -> Result<(), EncodeError> {
    put_number(out, field, bytes.len() as u64, FIELD_WIDTH)?;
    out.extend_from_slice(bytes);
    Ok(())
}

/// Cursor over an encoded buffer.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: len,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Read a zero-padded decimal field of `width` digits.
    pub fn number(&mut self, width: usize) -> Result<u64, DecodeError> {
        let offset = self.pos;
        let digits = self.take(width)?;
        if !digits.iter().all(u8::is_ascii_digit) {
            return Err(DecodeError::InvalidNumber { offset });
        }
        Ok(digits
            .iter()
            .fold(0u64, |acc, d| acc * 10 + u64::from(d - b'0')))
    }

    /// Read a length-prefixed byte field.
    pub fn bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.number(FIELD_WIDTH)? as usize;
        self.take(len)
    }

    /// Read a length-prefixed UTF-8 field.
    pub fn text(&mut self) -> Result<&'a str, DecodeError> {
        let offset = self.pos;
        let bytes = self.bytes()?;
        std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidText { offset })
    }
}
