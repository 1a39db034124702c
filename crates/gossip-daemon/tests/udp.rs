//! UDP transport and engine tests over loopback sockets.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use gossip_core::{
    Address, GossipConfig, GossipEngine, GossipError, NodeState, Transport, TransportError,
};
use gossip_daemon::UdpTransport;
use tokio::time::timeout;

fn loopback() -> Address {
    "127.0.0.1:0".parse().unwrap()
}

fn bound() -> UdpTransport {
    let mut transport = UdpTransport::new();
    transport.bind(&loopback()).unwrap();
    transport
}

/// Wait for a datagram and read it.
async fn recv(transport: &UdpTransport) -> (Vec<u8>, Address) {
    loop {
        timeout(Duration::from_secs(2), transport.readable())
            .await
            .expect("timed out waiting for datagram")
            .unwrap();
        match transport.recv_from() {
            Ok(datagram) => return datagram,
            Err(TransportError::WouldBlock) => continue,
            Err(e) => panic!("receive failed: {e}"),
        }
    }
}

/// Flush both engines and handle whatever arrives until the network is quiet.
async fn pump(nodes: &mut [&mut GossipEngine<UdpTransport>]) {
    for _ in 0..8 {
        for node in nodes.iter_mut() {
            if node.current_state().is_active() {
                node.send().unwrap();
            }
        }
        let mut handled = false;
        for node in nodes.iter_mut() {
            if !node.current_state().is_active() {
                continue;
            }
            while let Ok(Ok(())) =
                timeout(Duration::from_millis(50), node.transport().readable()).await
            {
                if !node.receive().unwrap() {
                    break;
                }
                handled = true;
            }
        }
        if !handled {
            return;
        }
    }
}

// ==================== Transport ====================

#[tokio::test]
async fn test_send_and_receive() {
    let a = bound();
    let b = bound();
    let a_addr = a.local_address().unwrap();
    let b_addr = b.local_address().unwrap();
    assert_ne!(a_addr.port(), 0);

    assert_eq!(a.send_to(b"ping", &b_addr).unwrap(), 4);
    let (data, sender) = recv(&b).await;
    assert_eq!(data, b"ping");
    assert_eq!(sender, a_addr);
}

#[tokio::test]
async fn test_fresh_socket_sends_without_yielding() {
    let a = bound();
    let b = bound();
    let b_addr = b.local_address().unwrap();

    // No await between bind and the sends
    for _ in 0..3 {
        assert_eq!(a.send_to(b"now", &b_addr).unwrap(), 3);
    }
    for _ in 0..3 {
        assert_eq!(recv(&b).await.0, b"now");
    }
}

#[tokio::test]
async fn test_drained_socket_waits_for_next_datagram() {
    let a = bound();
    let b = bound();
    let b_addr = b.local_address().unwrap();

    a.send_to(b"one", &b_addr).unwrap();
    assert_eq!(recv(&b).await.0, b"one");
    assert!(matches!(b.recv_from(), Err(TransportError::WouldBlock)));
    assert!(timeout(Duration::from_millis(50), b.readable()).await.is_err());

    a.send_to(b"two", &b_addr).unwrap();
    assert_eq!(recv(&b).await.0, b"two");
}

#[tokio::test]
async fn test_empty_socket_would_block() {
    let a = bound();
    assert!(matches!(a.recv_from(), Err(TransportError::WouldBlock)));
}

#[tokio::test]
async fn test_invalid_destination() {
    let a = bound();
    let unspecified: Address = "0.0.0.0:7000".parse().unwrap();
    let no_port: Address = "127.0.0.1:0".parse().unwrap();
    assert!(matches!(
        a.send_to(b"x", &unspecified),
        Err(TransportError::InvalidDestination(_))
    ));
    assert!(matches!(
        a.send_to(b"x", &no_port),
        Err(TransportError::InvalidDestination(_))
    ));
}

#[tokio::test]
async fn test_closed_transport() {
    let mut a = bound();
    let target = bound().local_address().unwrap();
    a.close().unwrap();
    // Closing twice is harmless
    a.close().unwrap();

    assert!(matches!(a.send_to(b"x", &target), Err(TransportError::Closed)));
    assert!(matches!(a.recv_from(), Err(TransportError::Closed)));
    assert!(matches!(a.local_address(), Err(TransportError::Closed)));
    assert!(a.readable().await.is_err());
}

#[tokio::test]
async fn test_bind_conflict() {
    let a = bound();
    let taken = a.local_address().unwrap();
    let mut b = UdpTransport::new();
    assert!(matches!(b.bind(&taken), Err(TransportError::BindFailed(_))));
}

#[cfg(unix)]
#[tokio::test]
async fn test_descriptor() {
    let mut a = UdpTransport::new();
    assert!(a.descriptor().is_none());
    a.bind(&loopback()).unwrap();
    assert!(a.descriptor().is_some());
}

// ==================== Engine over UDP ====================

#[tokio::test]
async fn test_engine_handshake_and_data() {
    let mut seed = GossipEngine::new(loopback(), UdpTransport::new(), GossipConfig::default()).unwrap();
    let mut joiner =
        GossipEngine::new(loopback(), UdpTransport::new(), GossipConfig::default()).unwrap();
    #[cfg(unix)]
    assert!(seed.socket_descriptor().is_some());

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    seed.set_data_receiver(move |data: &[u8]| sink.lock().unwrap().push(data.to_vec()));

    let seed_addr = *seed.self_member().address();
    seed.join(&[]).unwrap();
    joiner.join(&[seed_addr]).unwrap();
    assert_eq!(joiner.current_state(), NodeState::Joining);

    pump(&mut [&mut seed, &mut joiner]).await;

    assert_eq!(joiner.current_state(), NodeState::Connected);
    assert!(joiner.members().contains(seed.self_member()));
    assert!(seed.members().contains(joiner.self_member()));

    assert_eq!(joiner.send_data(&b"over the wire"[..], None).unwrap(), 1);
    pump(&mut [&mut seed, &mut joiner]).await;

    assert_eq!(*received.lock().unwrap(), vec![b"over the wire".to_vec()]);
    assert_eq!(seed.outbound_len(), 0);
    assert_eq!(joiner.outbound_len(), 0);
}

#[tokio::test]
async fn test_engine_shutdown_closes_socket() {
    let mut node = GossipEngine::new(loopback(), UdpTransport::new(), GossipConfig::default()).unwrap();
    node.join(&[]).unwrap();
    node.leave().unwrap();
    node.shutdown().unwrap();

    assert_eq!(node.current_state(), NodeState::Disconnected);
    assert!(node.transport().local_address().is_err());
    assert!(matches!(node.receive(), Err(GossipError::InvalidState { .. })));
}
