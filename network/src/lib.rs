//! P2P networking layer for tradenet.
//!
//! Connections over a pluggable transport, the capability handshake and
//! access guard that admit them, peer discovery through peer exchange, and
//! sealed confidential messaging with a one-hop relay.

pub mod capability;
pub mod config;
pub mod confidential;
pub mod connection;
pub mod error;
pub mod guard;
pub mod listeners;
pub mod observer;
pub mod peers;
pub mod requests;

pub use capability::CapabilityExchange;
pub use config::PeerConfig;
pub use confidential::ConfidentialService;
pub use connection::{Connection, ConnectionPool, Direction, ServerInfo};
pub use error::NetworkError;
pub use guard::Guard;
pub use listeners::{ConfidentialListener, ConnectionListener, ListenerRegistry, MessageListener};
pub use observer::{NetworkObserver, NoopObserver};
pub use peers::{Peer, PeerExchangeGraph, PeerExchangeService, PeerGroup, PeerManager};
pub use requests::RequestTracker;
