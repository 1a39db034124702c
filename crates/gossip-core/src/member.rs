//! A single cluster member and its canonical id.

use crate::address::Address;
use crate::config::PROTOCOL_VERSION;
use crate::protocol::codec::{
    put_number, DecodeError, EncodeError, Reader, WireDecode, WireEncode, FIELD_WIDTH,
};
use crate::uid::MemberUid;
use serde::{Deserialize, Serialize};

/// A node participating in the cluster.
///
/// Equality is structural: two members are the same entry only when
/// protocol version, uid and address all match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    protocol_version: u8,
    uid: MemberUid,
    address: Address,
}

impl Member {
    /// Create a member speaking the current protocol version.
    pub fn new(uid: MemberUid, address: Address) -> Self {
        Self::with_version(PROTOCOL_VERSION, uid, address)
    }

    pub fn with_version(protocol_version: u8, uid: MemberUid, address: Address) -> Self {
        Self {
            protocol_version,
            uid,
            address,
        }
    }

    pub fn protocol_version(&self) -> u8 {
        self.protocol_version
    }

    pub fn uid(&self) -> MemberUid {
        self.uid
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Canonical member id: `<multiaddr>/uid/<uid>`.
    ///
    /// This is the key under which the vector clock and the data log track
    /// everything originated by this member.
    pub fn member_id(&self) -> String {
        format!("{}/uid/{}", self.address.to_multiaddr(), self.uid)
    }
}

impl WireEncode for Member {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_number(out, "protocol version", u64::from(self.protocol_version), FIELD_WIDTH)?;
        put_number(out, "uid", u64::from(self.uid), FIELD_WIDTH)?;
        self.address.encode_into(out)
    }
}

impl WireDecode for Member {
    fn decode_from(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let version = reader.number(FIELD_WIDTH)?;
        let protocol_version = u8::try_from(version).map_err(|_| DecodeError::OutOfRange {
            field: "protocol version",
            value: version,
        })?;
        let uid = reader.number(FIELD_WIDTH)?;
        let uid = MemberUid::new(uid).map_err(|_| DecodeError::OutOfRange {
            field: "uid",
            value: uid,
        })?;
        let address = Address::decode_from(reader)?;
        Ok(Self {
            protocol_version,
            uid,
            address,
        })
    }
}
