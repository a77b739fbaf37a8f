//! Flood a message to every connected peer.

use std::sync::Arc;

use futures_util::future::join_all;
use tradenet_network::{Guard, NetworkError, Peer, PeerGroup};
use tradenet_protocol::Message;
use tradenet_types::Address;

/// Outcome of a broadcast attempt.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastResult {
    /// Peers the message was written to.
    pub sent: usize,
    /// Peers whose connection failed.
    pub failed: usize,
}

#[derive(Clone)]
pub struct Broadcaster {
    guard: Arc<Guard>,
    group: Arc<PeerGroup>,
}

impl Broadcaster {
    pub fn new(guard: Arc<Guard>, group: Arc<PeerGroup>) -> Self {
        Self { guard, group }
    }

    /// Send `message` to all peers in the group except `exclude`, concurrently,
    /// each over the connection the peer joined the group on.
    pub async fn broadcast(&self, message: &Message, exclude: Option<&Address>) -> BroadcastResult {
        let targets: Vec<Peer> = self
            .group
            .connected_peers()
            .values()
            .filter(|peer| Some(&peer.address) != exclude)
            .cloned()
            .collect();

        let sends = targets.iter().map(|peer| async move {
            let result = match self.guard.pool().get(peer.connection_id) {
                Some(connection) => self.guard.send_to(message.clone(), &connection).await,
                None => Err(NetworkError::ConnectionClosed),
            };
            if let Err(e) = &result {
                tracing::debug!(peer = %peer.address, kind = message.kind(), error = %e, "broadcast send failed");
            }
            result.is_ok()
        });

        let mut result = BroadcastResult::default();
        for ok in join_all(sends).await {
            if ok {
                result.sent += 1;
            } else {
                result.failed += 1;
            }
        }
        result
    }
}
