//! Prometheus metrics for the node.
//!
//! [`NodeMetrics`] owns a dedicated [`Registry`] and doubles as the
//! network layer's [`NetworkObserver`], so connection and message events
//! are counted without the network crate knowing about Prometheus.

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use tradenet_network::NetworkObserver;
use tradenet_protocol::GossipResult;

use crate::NodeError;

pub struct NodeMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Messages written, by message kind.
    pub messages_sent: IntCounterVec,
    /// Messages decoded from the wire, by message kind.
    pub messages_received: IntCounterVec,
    /// Messages dropped by the access guard.
    pub unauthorized_dropped: IntCounter,
    pub relays_forwarded: IntCounter,
    pub gossip_added: IntCounter,
    pub gossip_ignored: IntCounter,
    pub gossip_rejected: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub connections: IntGauge,
    pub peers: IntGauge,
}

impl NodeMetrics {
    pub fn new() -> Result<Self, NodeError> {
        let registry = Registry::new();

        let messages_sent = register_int_counter_vec_with_registry!(
            Opts::new("tradenet_messages_sent_total", "Messages sent to peers"),
            &["kind"],
            registry
        )?;
        let messages_received = register_int_counter_vec_with_registry!(
            Opts::new("tradenet_messages_received_total", "Messages received from peers"),
            &["kind"],
            registry
        )?;
        let unauthorized_dropped = register_int_counter_with_registry!(
            Opts::new(
                "tradenet_unauthorized_dropped_total",
                "Messages dropped for a missing or invalid access token"
            ),
            registry
        )?;
        let relays_forwarded = register_int_counter_with_registry!(
            Opts::new("tradenet_relays_forwarded_total", "Relayed messages forwarded"),
            registry
        )?;
        let gossip_added = register_int_counter_with_registry!(
            Opts::new("tradenet_gossip_added_total", "Gossip operations applied"),
            registry
        )?;
        let gossip_ignored = register_int_counter_with_registry!(
            Opts::new("tradenet_gossip_ignored_total", "Stale or repeated gossip operations"),
            registry
        )?;
        let gossip_rejected = register_int_counter_with_registry!(
            Opts::new("tradenet_gossip_rejected_total", "Invalid gossip operations"),
            registry
        )?;

        let connections = register_int_gauge_with_registry!(
            Opts::new("tradenet_connections", "Open connections"),
            registry
        )?;
        let peers = register_int_gauge_with_registry!(
            Opts::new("tradenet_peers", "Peers in the peer group"),
            registry
        )?;

        Ok(Self {
            registry,
            messages_sent,
            messages_received,
            unauthorized_dropped,
            relays_forwarded,
            gossip_added,
            gossip_ignored,
            gossip_rejected,
            connections,
            peers,
        })
    }

    pub fn record_gossip(&self, result: GossipResult) {
        match result {
            GossipResult::Added => self.gossip_added.inc(),
            GossipResult::Ignored => self.gossip_ignored.inc(),
            GossipResult::Rejected => self.gossip_rejected.inc(),
        }
    }

    /// Encode all metrics in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, NodeError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl NetworkObserver for NodeMetrics {
    fn message_sent(&self, kind: &'static str) {
        self.messages_sent.with_label_values(&[kind]).inc();
    }

    fn message_received(&self, kind: &'static str) {
        self.messages_received.with_label_values(&[kind]).inc();
    }

    fn unauthorized_dropped(&self) {
        self.unauthorized_dropped.inc();
    }

    fn relay_forwarded(&self) {
        self.relays_forwarded.inc();
    }

    fn connections_changed(&self, count: usize) {
        self.connections.set(count as i64);
    }

    fn peers_changed(&self, count: usize) {
        self.peers.set(count as i64);
    }
}
