//! Transport trait for datagram exchange between members.
//!
//! Implementations:
//! - Memory: in-process datagram fabric for tests (this module)
//! - UDP: non-blocking socket driven by tokio (gossip-daemon)

use crate::address::Address;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Bind failed: {0}")]
    BindFailed(String),

    #[error("Invalid destination: {0}")]
    InvalidDestination(Address),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("No datagram available")]
    WouldBlock,

    #[error("Transport is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Unreliable, unordered datagram transport.
///
/// Every call is non-blocking: `recv_from` returns
/// [`TransportError::WouldBlock`] when nothing is queued. Hosts wait for
/// readiness themselves and then call into the engine.
pub trait Transport {
    /// Bind to `address`. Port 0 lets the transport pick one.
    fn bind(&mut self, address: &Address) -> Result<()>;

    /// Send one datagram, returning the number of bytes written.
    fn send_to(&self, buf: &[u8], destination: &Address) -> Result<usize>;

    /// Receive one datagram and its sender.
    fn recv_from(&self) -> Result<(Vec<u8>, Address)>;

    fn close(&mut self) -> Result<()>;

    /// Address actually bound.
    fn local_address(&self) -> Result<Address>;

    /// Raw descriptor for hosts that multiplex sockets themselves.
    #[cfg(unix)]
    fn descriptor(&self) -> Option<std::os::unix::io::RawFd> {
        None
    }
}

#[derive(Debug, Default)]
struct NetworkState {
    inboxes: HashMap<Address, VecDeque<(Vec<u8>, Address)>>,
    offline: HashSet<Address>,
    next_port: u16,
}

/// Shared in-memory datagram fabric.
///
/// Datagrams sent to an address nobody is bound to are silently dropped,
/// like UDP to a dead host. Cloning yields another handle to the same
/// network.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an unbound transport attached to this network.
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            network: self.clone(),
            address: None,
        }
    }

    /// Make every send from `address` fail, or restore it.
    pub fn set_offline(&self, address: &Address, offline: bool) {
        let mut state = self.lock();
        if offline {
            state.offline.insert(*address);
        } else {
            state.offline.remove(address);
        }
    }

    /// Drop the inbox of `address`; later datagrams to it are lost.
    pub fn disconnect(&self, address: &Address) {
        self.lock().inboxes.remove(address);
    }

    /// Number of datagrams waiting for `address`.
    pub fn pending(&self, address: &Address) -> usize {
        self.lock().inboxes.get(address).map(VecDeque::len).unwrap_or(0)
    }

    /// Discard everything queued for `address`.
    pub fn drain(&self, address: &Address) -> Vec<(Vec<u8>, Address)> {
        self.lock()
            .inboxes
            .get_mut(address)
            .map(|inbox| inbox.drain(..).collect())
            .unwrap_or_default()
    }
}

/// One endpoint on a [`MemoryNetwork`].
#[derive(Debug)]
pub struct MemoryTransport {
    network: MemoryNetwork,
    address: Option<Address>,
}

impl MemoryTransport {
    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }
}

impl Transport for MemoryTransport {
    fn bind(&mut self, address: &Address) -> Result<()> {
        let mut state = self.network.lock();

        let mut bound = *address;
        if bound.port() == 0 {
            // Ephemeral range, skipping ports already taken.
            loop {
                state.next_port = (state.next_port + 1) % 16_384;
                let candidate = Address::new(address.ip(), 49_152 + state.next_port);
                if !state.inboxes.contains_key(&candidate) {
                    bound = candidate;
                    break;
                }
            }
        }

        if state.inboxes.contains_key(&bound) {
            return Err(TransportError::BindFailed(format!("{bound} already in use")));
        }
        state.inboxes.insert(bound, VecDeque::new());
        drop(state);

        self.address = Some(bound);
        Ok(())
    }

    fn send_to(&self, buf: &[u8], destination: &Address) -> Result<usize> {
        let source = self.address.ok_or(TransportError::Closed)?;
        if !destination.is_routable() {
            return Err(TransportError::InvalidDestination(*destination));
        }

        let mut state = self.network.lock();
        if state.offline.contains(&source) {
            return Err(TransportError::SendFailed(format!("{source} is offline")));
        }
        if let Some(inbox) = state.inboxes.get_mut(destination) {
            inbox.push_back((buf.to_vec(), source));
        }
        Ok(buf.len())
    }

    fn recv_from(&self) -> Result<(Vec<u8>, Address)> {
        let address = self.address.ok_or(TransportError::Closed)?;
        let mut state = self.network.lock();
        state
            .inboxes
            .get_mut(&address)
            .ok_or(TransportError::Closed)?
            .pop_front()
            .ok_or(TransportError::WouldBlock)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(address) = self.address.take() {
            self.network.disconnect(&address);
        }
        Ok(())
    }

    fn local_address(&self) -> Result<Address> {
        self.address.ok_or(TransportError::Closed)
    }
}
