//! Timeouts and bounds for the connection layer and the services above it.

use std::time::Duration;

use tradenet_types::Address;

/// Default bound on connected peers.
pub const DEFAULT_MAX_CONNECTIONS: usize = 12;

/// Capacity of the channel between read loops and the dispatcher.
pub const DEFAULT_DISPATCH_CAPACITY: usize = 1024;

#[derive(Clone, Debug)]
pub struct PeerConfig {
    pub max_connections: usize,
    pub seed_nodes: Vec<Address>,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    pub request_timeout: Duration,
    /// A connection with no inbound frame for this long is closed.
    pub read_idle_timeout: Duration,
    /// How often every handshaked connection gets a keepalive. Keep it
    /// well below the peer's `read_idle_timeout`.
    pub keepalive_interval: Duration,
    pub dispatch_capacity: usize,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            seed_nodes: Vec::new(),
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            read_idle_timeout: Duration::from_secs(120),
            keepalive_interval: Duration::from_secs(30),
            dispatch_capacity: DEFAULT_DISPATCH_CAPACITY,
        }
    }
}
