use clap::Parser;
use gossip_core::{Address, GossipConfig, MemberUid};
use std::time::Duration;

/// Command line settings of a gossip node.
#[derive(Parser, Debug, Clone)]
#[command(name = "gossip-daemon")]
#[command(about = "Gossip cluster member over UDP")]
pub struct Settings {
    /// Address to listen on (ip:port). Peers reach this node here, so it
    /// must be a concrete address.
    #[arg(short, long, default_value = "127.0.0.1:7000")]
    pub listen: Address,

    /// Seed node to join through (repeatable). Without seeds the node starts
    /// a new cluster.
    #[arg(short, long)]
    pub seed: Vec<Address>,

    /// Member uid (random if not provided)
    #[arg(long)]
    pub uid: Option<MemberUid>,

    /// Originate a payload every N seconds
    #[arg(long)]
    pub send_interval: Option<u64>,

    /// Text of the periodic payload
    #[arg(long, default_value = "hello")]
    pub message: String,

    /// Wait before retransmitting an unacknowledged message
    #[arg(long)]
    pub retry_interval_ms: Option<u64>,

    /// Transmissions before a silent peer is evicted
    #[arg(long)]
    pub retry_attempts: Option<u32>,

    /// Number of random members each rumor is forwarded to
    #[arg(long)]
    pub rumor_factor: Option<usize>,

    /// Enable verbose logging
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Listen address {0} is not reachable by peers")]
    UnroutableListen(Address),
    #[error("Retry attempts must be at least 1")]
    ZeroRetryAttempts,
    #[error("Send interval must be at least 1 second")]
    ZeroSendInterval,
}

impl Settings {
    /// Reject combinations clap cannot express.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.listen.is_routable() {
            return Err(SettingsError::UnroutableListen(self.listen));
        }
        if self.retry_attempts == Some(0) {
            return Err(SettingsError::ZeroRetryAttempts);
        }
        if self.send_interval == Some(0) {
            return Err(SettingsError::ZeroSendInterval);
        }
        Ok(())
    }

    /// Engine configuration, defaults overridden by whatever was given.
    pub fn gossip_config(&self) -> GossipConfig {
        let mut config = GossipConfig::default();
        if let Some(ms) = self.retry_interval_ms {
            config.retry_interval = Duration::from_millis(ms);
        }
        if let Some(attempts) = self.retry_attempts {
            config.retry_attempts = attempts;
        }
        if let Some(factor) = self.rumor_factor {
            config.rumor_factor = factor;
        }
        config
    }

    pub fn send_interval(&self) -> Option<Duration> {
        self.send_interval.map(Duration::from_secs)
    }
}
