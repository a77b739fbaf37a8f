//! Peer exchange: learn about peers from peers, and fill the peer group.

use std::collections::HashSet;
use std::sync::Arc;

use tradenet_protocol::{Message, PeerExchangeRequest, PeerExchangeResponse, ReportedPeer};
use tradenet_types::Address;

use crate::connection::Connection;
use crate::guard::Guard;
use crate::listeners::{ConnectionListener, MessageListener};
use crate::peers::graph::PeerExchangeGraph;
use crate::peers::group::PeerGroup;
use crate::requests::RequestTracker;
use crate::NetworkError;

/// Most peers reported in one exchange message.
pub const MAX_REPORTED_PER_RESPONSE: usize = 32;

pub struct PeerExchangeService {
    guard: Arc<Guard>,
    group: Arc<PeerGroup>,
    graph: PeerExchangeGraph,
    pending: RequestTracker<Vec<ReportedPeer>>,
}

impl PeerExchangeService {
    /// Create the service and register it with the guard (messages) and the
    /// pool (disconnects).
    pub fn new(guard: Arc<Guard>, group: Arc<PeerGroup>) -> Arc<Self> {
        let service = Arc::new(Self {
            guard: Arc::clone(&guard),
            group,
            graph: PeerExchangeGraph::new(),
            pending: RequestTracker::new(),
        });
        guard.add_message_listener(service.clone());
        guard.pool().add_connection_listener(service.clone());
        service
    }

    pub fn graph(&self) -> &PeerExchangeGraph {
        &self.graph
    }

    /// Bind the server socket, then contact the seed nodes and keep
    /// connecting to reported peers until the group is full or no new
    /// candidates turn up. Returns whether any peer is connected.
    pub async fn bootstrap(&self, server_id: &str, port: u16) -> Result<bool, NetworkError> {
        self.guard.initialize_server(server_id, port).await?;
        let own = self.guard.pool().own_address();
        let mut tried: HashSet<Address> = HashSet::new();

        for seed in &self.guard.pool().config().seed_nodes {
            if self.group.is_full() {
                break;
            }
            if own.as_ref() == Some(seed) || !tried.insert(seed.clone()) {
                continue;
            }
            match self.exchange_with(seed).await {
                Ok(learned) => tracing::debug!(seed = %seed, learned, "seed node answered"),
                Err(e) => tracing::warn!(seed = %seed, error = %e, "seed node unreachable"),
            }
        }

        while !self.group.is_full() {
            let candidates = self.candidates(own.as_ref(), &tried);
            if candidates.is_empty() {
                break;
            }
            for candidate in candidates {
                if self.group.is_full() {
                    break;
                }
                tried.insert(candidate.clone());
                if let Err(e) = self.exchange_with(&candidate).await {
                    tracing::debug!(peer = %candidate, error = %e, "candidate unreachable");
                }
            }
        }

        tracing::info!(peers = self.group.len(), edges = self.graph.len(), "bootstrap finished");
        Ok(!self.group.is_empty())
    }

    /// Reported peers worth dialing: reachable by our transport, not yet
    /// connected or tried, previously verified ones first, at most the
    /// group's remaining capacity.
    fn candidates(&self, own: Option<&Address>, tried: &HashSet<Address>) -> Vec<Address> {
        let supported = self.guard.pool().supported_network_types();
        let mut candidates: Vec<Address> = self
            .group
            .reported_peers()
            .into_iter()
            .map(|p| p.address)
            .filter(|a| Some(a) != own)
            .filter(|a| !tried.contains(a) && !self.group.contains(a))
            .filter(|a| supported.contains(&a.network_type))
            .collect();
        candidates.sort_by_key(|a| !self.group.is_verified(a));
        let remaining = self
            .group
            .max_connections()
            .saturating_sub(self.group.len());
        candidates.truncate(remaining);
        candidates
    }

    /// One request/response round with `address`. Returns how many new
    /// peers it reported.
    pub async fn exchange_with(&self, address: &Address) -> Result<usize, NetworkError> {
        let connection = self.guard.connect(address).await?;
        let (nonce, rx) = self.pending.register(connection.id());
        let request = Message::PeerExchangeRequest(PeerExchangeRequest {
            nonce,
            peers: self.report_for(Some(address)),
        });
        if let Err(e) = self.guard.send_to(request, &connection).await {
            self.pending.cancel(nonce);
            return Err(e);
        }

        let timeout = self.guard.pool().config().request_timeout;
        let peers = self.pending.wait(nonce, rx, timeout, "peer exchange").await?;
        Ok(self.record(address, peers))
    }

    /// Our connected peers as we report them, leaving out `exclude`.
    fn report_for(&self, exclude: Option<&Address>) -> Vec<ReportedPeer> {
        self.group
            .connected_peers()
            .values()
            .filter(|p| Some(&p.address) != exclude)
            .take(MAX_REPORTED_PER_RESPONSE)
            .map(|p| ReportedPeer {
                address: p.address.clone(),
                capability: p.capability.clone(),
            })
            .collect()
    }

    fn record(&self, source: &Address, peers: Vec<ReportedPeer>) -> usize {
        let own = self.guard.pool().own_address();
        let peers: Vec<ReportedPeer> = peers
            .into_iter()
            .filter(|p| Some(&p.address) != own.as_ref() && &p.address != source)
            .take(MAX_REPORTED_PER_RESPONSE)
            .collect();
        self.graph.add_edges(source, peers.iter().map(|p| &p.address));
        self.group.add_reported(peers)
    }

    fn on_request(&self, request: &PeerExchangeRequest, connection: &Arc<Connection>) {
        let requester = connection.remote_address();
        if let Some(requester) = &requester {
            let learned = self.record(requester, request.peers.clone());
            tracing::debug!(peer = %requester, learned, "peer exchange request");
        }

        let response = Message::PeerExchangeResponse(PeerExchangeResponse {
            nonce: request.nonce,
            peers: self.report_for(requester.as_ref()),
        });
        let guard = Arc::clone(&self.guard);
        let conn = Arc::clone(connection);
        tokio::spawn(async move {
            if let Err(e) = guard.send_to(response, &conn).await {
                tracing::debug!(connection = conn.id(), error = %e, "peer exchange response not sent");
            }
        });
    }

    fn on_response(&self, response: &PeerExchangeResponse, connection: &Arc<Connection>) {
        if !self
            .pending
            .complete(response.nonce, connection.id(), response.peers.clone())
        {
            tracing::debug!(connection = connection.id(), "unsolicited peer exchange response");
        }
    }
}

impl MessageListener for PeerExchangeService {
    fn on_message(&self, message: &Message, connection: &Arc<Connection>) {
        match message {
            Message::PeerExchangeRequest(request) => self.on_request(request, connection),
            Message::PeerExchangeResponse(response) => self.on_response(response, connection),
            _ => {}
        }
    }
}

impl ConnectionListener for PeerExchangeService {
    fn on_disconnect(&self, connection: &Arc<Connection>) {
        self.pending.cancel_connection(connection.id());

        let Some(address) = connection.remote_address() else {
            return;
        };
        let still_connected = self
            .guard
            .pool()
            .connections()
            .iter()
            .any(|c| c.id() != connection.id() && c.remote_address().as_ref() == Some(&address));
        if !still_connected {
            let pruned = self.graph.remove_source(&address);
            if pruned > 0 {
                tracing::debug!(peer = %address, pruned, "pruned exchange edges of departed peer");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PeerConfig;
    use crate::connection::ConnectionPool;
    use crate::observer::NoopObserver;
    use crate::peers::manager::PeerManager;
    use std::time::Duration;
    use tradenet_nullables::{MemoryNetwork, MemoryTransport};
    use tradenet_types::{NetworkType, PublicKey};

    struct TestNode {
        guard: Arc<Guard>,
        group: Arc<PeerGroup>,
        exchange: Arc<PeerExchangeService>,
    }

    fn node(network: &Arc<MemoryNetwork>, host: &str, key: u8, max: usize, seeds: Vec<Address>) -> TestNode {
        let transport = Arc::new(MemoryTransport::new(network.clone(), host, NetworkType::Clear));
        let config = PeerConfig {
            max_connections: max,
            seed_nodes: seeds,
            request_timeout: Duration::from_secs(2),
            ..PeerConfig::default()
        };
        let pool = ConnectionPool::new(transport, config, Arc::new(NoopObserver));
        let group = Arc::new(PeerGroup::new(max));
        pool.add_connection_listener(PeerManager::new(group.clone(), Arc::new(NoopObserver)));
        let guard = Guard::new(pool, PublicKey([key; 32]));
        let exchange = PeerExchangeService::new(guard.clone(), group.clone());
        TestNode { guard, group, exchange }
    }

    async fn wait_for(what: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !what() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn bootstrap_without_seeds_finds_nobody() {
        let network = MemoryNetwork::new();
        let lonely = node(&network, "lonely", 1, 4, Vec::new());
        assert!(!lonely.exchange.bootstrap("lonely", 0).await.unwrap());
    }

    #[tokio::test]
    async fn bootstrap_survives_dead_seed() {
        let network = MemoryNetwork::new();
        let dead = Address::clear("dead", 1);
        let seed = node(&network, "seed", 1, 4, Vec::new());
        let seed_address = seed.guard.initialize_server("seed", 0).await.unwrap().address;

        let joiner = node(&network, "joiner", 2, 4, vec![dead, seed_address.clone()]);
        assert!(joiner.exchange.bootstrap("joiner", 0).await.unwrap());
        assert!(joiner.group.contains(&seed_address));
    }

    #[tokio::test]
    async fn bootstrap_reaches_peers_reported_by_seed() {
        let network = MemoryNetwork::new();
        let seed = node(&network, "seed", 1, 8, Vec::new());
        let seed_address = seed.guard.initialize_server("seed", 0).await.unwrap().address;

        let early = node(&network, "early", 2, 8, vec![seed_address.clone()]);
        assert!(early.exchange.bootstrap("early", 0).await.unwrap());
        let early_address = early.guard.pool().own_address().unwrap();
        wait_for(|| seed.group.contains(&early_address)).await;

        let late = node(&network, "late", 3, 8, vec![seed_address.clone()]);
        assert!(late.exchange.bootstrap("late", 0).await.unwrap());
        assert!(late.group.contains(&seed_address));
        assert!(late.group.contains(&early_address));
        assert!(late
            .exchange
            .graph()
            .edges()
            .contains(&(seed_address.clone(), early_address.clone())));

        // The seed learned what the late joiner reported about itself: nothing
        // but the seed, which is excluded, so no edge from late.
        let late_address = late.guard.pool().own_address().unwrap();
        assert!(seed.exchange.graph().targets_of(&late_address).is_empty());
    }

    #[tokio::test]
    async fn bootstrap_stops_at_capacity() {
        let network = MemoryNetwork::new();
        let seed = node(&network, "seed", 1, 8, Vec::new());
        let seed_address = seed.guard.initialize_server("seed", 0).await.unwrap().address;
        let mut others = Vec::new();
        for (i, host) in ["p1", "p2", "p3"].iter().enumerate() {
            let peer = node(&network, host, 10 + i as u8, 8, vec![seed_address.clone()]);
            assert!(peer.exchange.bootstrap(host, 0).await.unwrap());
            let address = peer.guard.pool().own_address().unwrap();
            wait_for(|| seed.group.contains(&address)).await;
            others.push(peer);
        }

        let small = node(&network, "small", 2, 2, vec![seed_address]);
        assert!(small.exchange.bootstrap("small", 0).await.unwrap());
        assert_eq!(small.group.len(), 2);
        assert!(small.group.is_full());
    }

    #[tokio::test]
    async fn departed_peer_edges_are_pruned() {
        let network = MemoryNetwork::new();
        let seed = node(&network, "seed", 1, 8, Vec::new());
        let seed_address = seed.guard.initialize_server("seed", 0).await.unwrap().address;
        let early = node(&network, "early", 2, 8, vec![seed_address.clone()]);
        assert!(early.exchange.bootstrap("early", 0).await.unwrap());
        let early_address = early.guard.pool().own_address().unwrap();
        wait_for(|| seed.group.contains(&early_address)).await;

        let late = node(&network, "late", 3, 8, vec![seed_address.clone()]);
        assert!(late.exchange.bootstrap("late", 0).await.unwrap());
        assert!(!late.exchange.graph().targets_of(&seed_address).is_empty());

        seed.guard.pool().shutdown().await;
        wait_for(|| late.exchange.graph().targets_of(&seed_address).is_empty()).await;
        wait_for(|| !late.group.contains(&seed_address)).await;
    }
}
