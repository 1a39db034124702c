//! gossip-daemon: A cluster member speaking the gossip protocol over UDP.
//!
//! Runs the gossip-core engine on a tokio event loop. Optionally originates a
//! payload at a fixed interval so a handful of local processes make a demo
//! cluster.

use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use gossip_core::{GossipEngine, GossipError, NodeState, TransportError};
use gossip_daemon::{Settings, UdpTransport};

/// Upper bound on how long the loop sleeps before it is connected.
const IDLE_WAIT: Duration = Duration::from_millis(1_000);

/// Resolve when the periodic send timer fires, or never without one.
async fn next_send(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Settings::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,gossip_core=debug,gossip_daemon=debug"
    } else {
        "info,gossip_core=info,gossip_daemon=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    args.validate()?;

    info!("Starting gossip-daemon");
    info!("Listen address: {}", args.listen);

    let mut engine = GossipEngine::new(args.listen, UdpTransport::new(), args.gossip_config())?;
    if let Some(uid) = args.uid {
        engine = engine.with_uid(uid);
    }
    engine.set_data_receiver(|data: &[u8]| {
        info!("Received data: {}", String::from_utf8_lossy(data));
    });
    info!("Member id: {}", engine.self_member().member_id());

    engine.join(&args.seed)?;
    if args.seed.is_empty() {
        info!("No seeds given, running as seed node");
    } else {
        info!("Joining through {} seed(s)", args.seed.len());
    }

    let mut send_timer = args.send_interval().map(|period| {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer
    });
    let mut sent_count: u64 = 0;

    info!("Node running. Press Ctrl+C to stop.");

    // Main event loop
    loop {
        let wait = if engine.current_state() == NodeState::Connected {
            match engine.tick() {
                Ok(wait) => wait,
                Err(e) => {
                    warn!("Status gossip skipped: {}", e);
                    engine.config().gossip_interval
                }
            }
        } else {
            IDLE_WAIT
        };

        // A failed cycle keeps its envelopes queued for the next iteration
        match engine.send() {
            Ok(_) => {}
            Err(GossipError::Transport(TransportError::WouldBlock)) => {
                debug!("Socket buffer full, deferring send cycle");
            }
            Err(e) => warn!("Send cycle failed: {}", e),
        }

        tokio::select! {
            // Inbound datagram
            result = engine.transport().readable() => {
                result?;
                engine.receive()?;
            }

            // Gossip timer
            _ = tokio::time::sleep(wait) => {}

            // Demo payload
            _ = next_send(&mut send_timer) => {
                sent_count += 1;
                let payload = format!("{} #{}", args.message, sent_count);
                match engine.send_data(payload.into_bytes(), None) {
                    Ok(queued) => debug!("Queued payload #{} for {} member(s)", sent_count, queued),
                    Err(e) => warn!("Failed to send payload: {}", e),
                }
            }

            // Handle graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Shutting down");
    if engine.current_state().is_active() {
        engine.leave()?;
    }
    engine.shutdown()?;
    Ok(())
}
