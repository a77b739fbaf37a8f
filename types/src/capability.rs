//! Capabilities exchanged during the connection handshake.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{Address, NetworkType, PublicKey};

/// What a peer declares about itself when a connection is negotiated.
///
/// The network set is ordered so that the serialized form is canonical;
/// access tokens are derived from it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    /// The peer's own server address. `None` for client-only nodes that
    /// never bound a server socket.
    pub address: Option<Address>,
    pub supported_network_types: BTreeSet<NetworkType>,
    /// Identity key; used for sealing confidential messages to this peer.
    pub public_key: PublicKey,
}

impl Capability {
    pub fn new(
        address: Option<Address>,
        supported_network_types: impl IntoIterator<Item = NetworkType>,
        public_key: PublicKey,
    ) -> Self {
        Self {
            address,
            supported_network_types: supported_network_types.into_iter().collect(),
            public_key,
        }
    }

    pub fn supports(&self, network_type: NetworkType) -> bool {
        self.supported_network_types.contains(&network_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supports_declared_networks_only() {
        let cap = Capability::new(
            Some(Address::clear("127.0.0.1", 1)),
            [NetworkType::Clear, NetworkType::Tor],
            PublicKey([1; 32]),
        );
        assert!(cap.supports(NetworkType::Clear));
        assert!(cap.supports(NetworkType::Tor));
        assert!(!cap.supports(NetworkType::I2p));
    }

    #[test]
    fn duplicate_networks_collapse() {
        let cap = Capability::new(
            None,
            [NetworkType::Tor, NetworkType::Tor],
            PublicKey([1; 32]),
        );
        assert_eq!(cap.supported_network_types.len(), 1);
    }
}
