//! UDP transport.
//!
//! The socket is non-blocking and owned twice: the std handle performs every
//! send and receive, and a tokio registration of the same socket lets the
//! host loop `await` readiness. tokio's own `try_*` operations consult the
//! reactor's cached readiness and report `WouldBlock` on a fresh socket
//! without attempting the syscall, so they are not used.

use gossip_core::transport::{Result, Transport, TransportError};
use gossip_core::Address;
use std::io;
use std::net::SocketAddr;
use tokio::io::Interest;
use tracing::debug;

/// Largest datagram accepted from the network.
pub const RECV_BUFFER_SIZE: usize = 65_536;

#[derive(Debug)]
struct Socket {
    io: std::net::UdpSocket,
    readiness: tokio::net::UdpSocket,
}

/// [`Transport`] over a non-blocking UDP socket.
///
/// Binding registers the socket with the current tokio runtime, so
/// [`Transport::bind`] must be called from within one.
#[derive(Debug, Default)]
pub struct UdpTransport {
    socket: Option<Socket>,
}

impl UdpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until a datagram may be available.
    ///
    /// Readiness can be spurious; a following `recv_from` may still report
    /// [`TransportError::WouldBlock`].
    pub async fn readable(&self) -> io::Result<()> {
        match &self.socket {
            Some(socket) => socket.readiness.readable().await,
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "transport is closed")),
        }
    }

    fn socket(&self) -> Result<&Socket> {
        self.socket.as_ref().ok_or(TransportError::Closed)
    }
}

impl Transport for UdpTransport {
    fn bind(&mut self, address: &Address) -> Result<()> {
        let addr = SocketAddr::from(*address);
        let io = std::net::UdpSocket::bind(addr)
            .map_err(|e| TransportError::BindFailed(format!("{addr}: {e}")))?;
        io.set_nonblocking(true)?;
        let readiness = tokio::net::UdpSocket::from_std(io.try_clone()?)?;

        debug!(local = %io.local_addr()?, "UDP socket bound");
        self.socket = Some(Socket { io, readiness });
        Ok(())
    }

    fn send_to(&self, buf: &[u8], destination: &Address) -> Result<usize> {
        if !destination.is_routable() {
            return Err(TransportError::InvalidDestination(*destination));
        }
        self.socket()?
            .io
            .send_to(buf, SocketAddr::from(*destination))
            .map_err(|e| match e.kind() {
                io::ErrorKind::WouldBlock => TransportError::WouldBlock,
                _ => TransportError::SendFailed(format!("{destination}: {e}")),
            })
    }

    fn recv_from(&self) -> Result<(Vec<u8>, Address)> {
        let socket = self.socket()?;
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        // Reading inside `try_io` clears the cached readiness once the
        // socket is drained. When the cache has not caught up yet the
        // closure is skipped, so read directly as well.
        let received = match socket
            .readiness
            .try_io(Interest::READABLE, || socket.io.recv_from(&mut buf))
        {
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => socket.io.recv_from(&mut buf),
            other => other,
        };

        match received {
            Ok((len, sender)) => {
                buf.truncate(len);
                Ok((buf, Address::from(sender)))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(TransportError::WouldBlock),
            Err(e) => Err(TransportError::ReceiveFailed(e.to_string())),
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.socket.take().is_some() {
            debug!("UDP socket closed");
        }
        Ok(())
    }

    fn local_address(&self) -> Result<Address> {
        Ok(Address::from(self.socket()?.io.local_addr()?))
    }

    #[cfg(unix)]
    fn descriptor(&self) -> Option<std::os::unix::io::RawFd> {
        use std::os::unix::io::AsRawFd;
        self.socket.as_ref().map(|socket| socket.io.as_raw_fd())
    }
}
