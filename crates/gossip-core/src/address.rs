//! Network address of a cluster member.
//!
//! Addresses travel on the wire as multiaddr text (`/ip/<ip>/port/<port>`)
//! and are written by humans as `host:port`.

use crate::protocol::codec::{put_bytes, DecodeError, EncodeError, Reader, WireDecode, WireEncode};
use std::fmt::{self, Display, Formatter};
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Invalid multiaddr: {0}")]
    InvalidMultiaddr(String),
    #[error("Invalid host:port address: {0}")]
    InvalidHostPort(String),
}

/// IP address and port of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    ip: IpAddr,
    port: u16,
}

impl Address {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Render as `/ip/<ip>/port/<port>`.
    pub fn to_multiaddr(&self) -> String {
        format!("/ip/{}/port/{}", self.ip, self.port)
    }

    /// Parse `/ip/<ip>/port/<port>`.
    pub fn from_multiaddr(s: &str) -> Result<Self, AddressError> {
        let invalid = || AddressError::InvalidMultiaddr(s.to_string());

        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            ["", "ip", ip, "port", port] => {
                let ip = ip.parse::<IpAddr>().map_err(|_| invalid())?;
                let port = port.trim().parse::<u16>().map_err(|_| invalid())?;
                Ok(Self { ip, port })
            }
            _ => Err(invalid()),
        }
    }

    /// Parse `host:port` (IPv6 hosts in brackets).
    pub fn from_host_port(s: &str) -> Result<Self, AddressError> {
        s.trim()
            .parse::<SocketAddr>()
            .map(Self::from)
            .map_err(|_| AddressError::InvalidHostPort(s.to_string()))
    }

    /// Whether this address can be used as a datagram destination.
    pub fn is_routable(&self) -> bool {
        !self.ip.is_unspecified() && self.port != 0
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", SocketAddr::from(*self))
    }
}

impl FromStr for Address {
    type Err = AddressError;

    /// Accepts either `host:port` or a multiaddr.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with('/') {
            Self::from_multiaddr(s)
        } else {
            Self::from_host_port(s)
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Self {
            ip: addr.ip(),
            port: addr.port(),
        }
    }
}

impl From<Address> for SocketAddr {
    fn from(addr: Address) -> Self {
        SocketAddr::new(addr.ip, addr.port)
    }
}

impl WireEncode for Address {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_bytes(out, "address length", self.to_multiaddr().as_bytes())
    }
}

impl WireDecode for Address {
    fn decode_from(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let text = reader.text()?;
        Ok(Self::from_multiaddr(text)?)
    }
}

// Serialize as host:port for logs and config files
impl serde::Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
