//! tradenet node: everything a trading application needs from the network
//! behind one facade.
//!
//! The node:
//! - binds a server socket on the configured transport (clear-net or Tor)
//! - bootstraps its peer group from seed nodes through peer exchange
//! - sends confidential messages directly or through a one-hop relay
//! - gossips owner-signed data entries and reconciles missed ones
//! - delivers mailbox messages left for it while it was offline

pub mod broadcast;
pub mod config;
pub mod data_service;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod shutdown;

pub use broadcast::{BroadcastResult, Broadcaster};
pub use config::{NodeConfig, TransportKind};
pub use data_service::{DataListener, DataService};
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use node::NetworkNode;
pub use shutdown::ShutdownController;
