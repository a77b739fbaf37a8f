//! Peer group membership and peer exchange.

pub mod exchange;
pub mod graph;
pub mod group;
pub mod manager;

pub use exchange::{PeerExchangeService, MAX_REPORTED_PER_RESPONSE};
pub use graph::{PeerExchangeGraph, MAX_EXCHANGE_EDGES};
pub use group::{Peer, PeerGroup, MAX_REPORTED_PEERS};
pub use manager::PeerManager;
