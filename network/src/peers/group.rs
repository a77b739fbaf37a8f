//! The set of connected peers, plus peers we have only heard about.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tradenet_protocol::ReportedPeer;
use tradenet_types::{Address, Capability};

/// Upper bound on remembered reported peers.
pub const MAX_REPORTED_PEERS: usize = 1000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Peer {
    pub address: Address,
    pub capability: Capability,
    pub connection_id: u64,
    /// We reached `address` by dialing it. An inbound peer's address is
    /// only what it advertised.
    pub dialed: bool,
}

/// Connected peers keyed by address, bounded by `max_connections`.
///
/// Readers get an `Arc` snapshot of the map; writers copy on write, so a
/// snapshot never changes underneath the code iterating it.
pub struct PeerGroup {
    max_connections: usize,
    connected: RwLock<Arc<HashMap<Address, Peer>>>,
    reported: RwLock<HashMap<Address, Capability>>,
    verified: RwLock<HashSet<Address>>,
}

impl PeerGroup {
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            connected: RwLock::new(Arc::new(HashMap::new())),
            reported: RwLock::new(HashMap::new()),
            verified: RwLock::new(HashSet::new()),
        }
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn connected_peers(&self) -> Arc<HashMap<Address, Peer>> {
        self.connected
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn peers(&self) -> Vec<Peer> {
        self.connected_peers().values().cloned().collect()
    }

    pub fn get(&self, address: &Address) -> Option<Peer> {
        self.connected_peers().get(address).cloned()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.connected_peers().contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.connected_peers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.max_connections
    }

    /// Add or refresh a peer. A known address keeps its identity key: the
    /// newest connection wins only when it presents the same key, or when
    /// it was dialed and the entry it replaces was not. A new address is
    /// refused when the group is full.
    pub fn add(&self, peer: Peer) -> bool {
        let mut guard = self.connected.write().unwrap_or_else(|e| e.into_inner());
        match guard.get(&peer.address) {
            Some(known) if known.capability.public_key != peer.capability.public_key => {
                if !peer.dialed || known.dialed {
                    tracing::warn!(
                        peer = %peer.address,
                        "refusing peer presenting a different key for a known address"
                    );
                    return false;
                }
            }
            Some(_) => {}
            None if guard.len() >= self.max_connections => return false,
            None => {}
        }
        Arc::make_mut(&mut *guard).insert(peer.address.clone(), peer);
        true
    }

    pub fn remove(&self, address: &Address) -> Option<Peer> {
        let mut guard = self.connected.write().unwrap_or_else(|e| e.into_inner());
        if !guard.contains_key(address) {
            return None;
        }
        Arc::make_mut(&mut *guard).remove(address)
    }

    /// Remove `address` only if it is still served by `connection_id`.
    pub fn remove_connection(&self, address: &Address, connection_id: u64) -> bool {
        let mut guard = self.connected.write().unwrap_or_else(|e| e.into_inner());
        match guard.get(address) {
            Some(peer) if peer.connection_id == connection_id => {
                Arc::make_mut(&mut *guard).remove(address);
                true
            }
            _ => false,
        }
    }

    /// Remember peers learned through exchange. Returns how many were new.
    pub fn add_reported(&self, peers: impl IntoIterator<Item = ReportedPeer>) -> usize {
        let mut reported = self.reported.write().unwrap_or_else(|e| e.into_inner());
        let mut added = 0;
        for peer in peers {
            if reported.len() >= MAX_REPORTED_PEERS && !reported.contains_key(&peer.address) {
                break;
            }
            if reported.insert(peer.address, peer.capability).is_none() {
                added += 1;
            }
        }
        added
    }

    pub fn reported_peers(&self) -> Vec<ReportedPeer> {
        self.reported
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(address, capability)| ReportedPeer {
                address: address.clone(),
                capability: capability.clone(),
            })
            .collect()
    }

    /// The capability of `address`, from a live connection if we have one,
    /// otherwise from what other peers reported.
    pub fn capability_of(&self, address: &Address) -> Option<Capability> {
        if let Some(peer) = self.get(address) {
            return Some(peer.capability);
        }
        self.reported
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(address)
            .cloned()
    }

    /// Record that dialing `address` reached a peer that completed the
    /// handshake.
    pub fn mark_verified(&self, address: &Address) {
        self.verified
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(address.clone());
    }

    pub fn is_verified(&self, address: &Address) -> bool {
        self.verified
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradenet_types::{NetworkType, PublicKey};

    fn peer(port: u16, connection_id: u64) -> Peer {
        let address = Address::clear("10.0.0.1", port);
        Peer {
            capability: Capability::new(Some(address.clone()), [NetworkType::Clear], PublicKey([port as u8; 32])),
            address,
            connection_id,
            dialed: false,
        }
    }

    fn rekeyed(mut peer: Peer, key: u8, dialed: bool) -> Peer {
        peer.capability.public_key = PublicKey([key; 32]);
        peer.dialed = dialed;
        peer
    }

    #[test]
    fn add_respects_bound() {
        let group = PeerGroup::new(2);
        assert!(group.add(peer(1, 1)));
        assert!(group.add(peer(2, 2)));
        assert!(group.is_full());
        assert!(!group.add(peer(3, 3)));
        assert_eq!(group.len(), 2);

        // refreshing a known peer is allowed when full
        assert!(group.add(peer(1, 9)));
        assert_eq!(group.get(&peer(1, 0).address).unwrap().connection_id, 9);
    }

    #[test]
    fn known_address_keeps_its_key() {
        let group = PeerGroup::new(4);
        let genuine = peer(1, 1);
        assert!(group.add(genuine.clone()));

        // An inbound claimant with another key cannot take the address over.
        assert!(!group.add(rekeyed(peer(1, 2), 0xAA, false)));
        assert_eq!(group.get(&genuine.address).unwrap(), genuine);

        // A dialed connection proves the address and displaces the claim.
        assert!(group.add(rekeyed(peer(1, 3), 0xBB, true)));
        assert_eq!(group.get(&genuine.address).unwrap().connection_id, 3);

        // ... and is not displaced again by another key, dialed or not.
        assert!(!group.add(rekeyed(peer(1, 4), 0xCC, true)));
        assert!(!group.add(peer(1, 5)));
        assert_eq!(group.get(&genuine.address).unwrap().connection_id, 3);
    }

    #[test]
    fn snapshot_is_unaffected_by_later_writes() {
        let group = PeerGroup::new(4);
        group.add(peer(1, 1));
        let snapshot = group.connected_peers();
        group.add(peer(2, 2));
        group.remove(&peer(1, 1).address);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn stale_connection_does_not_evict_replacement() {
        let group = PeerGroup::new(4);
        group.add(peer(1, 1));
        group.add(peer(1, 2));
        assert!(!group.remove_connection(&peer(1, 0).address, 1));
        assert!(group.remove_connection(&peer(1, 0).address, 2));
        assert!(group.is_empty());
    }

    #[test]
    fn same_host_and_port_on_different_networks_are_distinct() {
        let group = PeerGroup::new(4);
        let clear = peer(1, 1);
        let mut tor = peer(1, 2);
        tor.address.network_type = NetworkType::Tor;
        group.add(clear);
        group.add(tor);
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn capability_lookup_prefers_connected() {
        let group = PeerGroup::new(4);
        let connected = peer(1, 1);
        let reported = peer(2, 0);
        group.add(connected.clone());
        let added = group.add_reported([
            ReportedPeer {
                address: reported.address.clone(),
                capability: reported.capability.clone(),
            },
            ReportedPeer {
                address: reported.address.clone(),
                capability: reported.capability.clone(),
            },
        ]);
        assert_eq!(added, 1);
        assert_eq!(group.capability_of(&connected.address), Some(connected.capability));
        assert_eq!(group.capability_of(&reported.address), Some(reported.capability));
        assert_eq!(group.capability_of(&peer(3, 0).address), None);
    }

    #[test]
    fn verified_addresses_are_remembered() {
        let group = PeerGroup::new(1);
        let address = peer(1, 1).address;
        assert!(!group.is_verified(&address));
        group.mark_verified(&address);
        assert!(group.is_verified(&address));
    }
}
