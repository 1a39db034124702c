//! MemberUid: Per-process identifier distinguishing members that reuse an address.
//!
//! The wire carries the uid as a four-digit decimal field, so values are
//! limited to `1..=9999`.

use crate::protocol::codec::FIELD_MAX;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UidError {
    #[error("Invalid member uid: expected 1..=9999, got {0}")]
    OutOfRange(u64),
    #[error("Invalid member uid format: {0}")]
    InvalidFormat(String),
}

/// Identifier of a member process.
///
/// Together with the member's address it forms the member id used by the
/// vector clock and the anti-entropy log.
///
/// # Examples
/// ```
/// use gossip_core::MemberUid;
///
/// let uid = MemberUid::generate();
/// let parsed: MemberUid = uid.to_string().parse().unwrap();
/// assert_eq!(uid, parsed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberUid(u16);

impl MemberUid {
    /// Generate a random uid. Never returns zero.
    pub fn generate() -> Self {
        use rand::Rng;
        Self(rand::rng().random_range(1..=FIELD_MAX as u16))
    }

    pub fn new(value: u64) -> Result<Self, UidError> {
        if value == 0 || value > FIELD_MAX {
            return Err(UidError::OutOfRange(value));
        }
        Ok(Self(value as u16))
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl Display for MemberUid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MemberUid {
    type Err = UidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > 4 || !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(UidError::InvalidFormat(s.to_string()));
        }
        let value: u64 = s
            .parse()
            .map_err(|_| UidError::InvalidFormat(s.to_string()))?;
        Self::new(value)
    }
}

impl TryFrom<u64> for MemberUid {
    type Error = UidError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MemberUid> for u64 {
    fn from(uid: MemberUid) -> u64 {
        u64::from(uid.0)
    }
}

impl serde::Serialize for MemberUid {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for MemberUid {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_unpadded() {
        assert_eq!(MemberUid::new(42).unwrap().to_string(), "42");
    }

    #[test]
    fn test_parse() {
        let uid: MemberUid = "3243".parse().unwrap();
        assert_eq!(uid.as_u16(), 3243);
    }

    #[test]
    fn test_parse_zero_padded() {
        let uid: MemberUid = "0042".parse().unwrap();
        assert_eq!(uid.as_u16(), 42);
    }

    #[test]
    fn test_reject_out_of_range() {
        assert_eq!(MemberUid::new(0), Err(UidError::OutOfRange(0)));
        assert_eq!(MemberUid::new(10_000), Err(UidError::OutOfRange(10_000)));
        assert!("0".parse::<MemberUid>().is_err());
    }

    #[test]
    fn test_reject_invalid_format() {
        assert!("".parse::<MemberUid>().is_err());
        assert!("12345".parse::<MemberUid>().is_err());
        assert!("12a".parse::<MemberUid>().is_err());
        assert!("-1".parse::<MemberUid>().is_err());
    }

    #[test]
    fn test_generate_in_range() {
        for _ in 0..1000 {
            let uid = MemberUid::generate();
            assert!(uid.as_u16() >= 1 && u64::from(uid) <= FIELD_MAX);
        }
    }

    #[test]
    fn test_serde_roundtrip() {
        let original = MemberUid::generate();
        let json = serde_json::to_string(&original).unwrap();
        let parsed: MemberUid = serde_json::from_str(&json).unwrap();
        assert_eq!(original, parsed);
    }
}
