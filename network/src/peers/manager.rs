//! Keeps the [`PeerGroup`] in step with handshakes and disconnects.

use std::sync::Arc;

use crate::connection::{Connection, Direction};
use crate::listeners::ConnectionListener;
use crate::observer::NetworkObserver;
use crate::peers::group::{Peer, PeerGroup};

pub struct PeerManager {
    group: Arc<PeerGroup>,
    observer: Arc<dyn NetworkObserver>,
}

impl PeerManager {
    pub fn new(group: Arc<PeerGroup>, observer: Arc<dyn NetworkObserver>) -> Arc<Self> {
        Arc::new(Self { group, observer })
    }

    pub fn group(&self) -> &Arc<PeerGroup> {
        &self.group
    }
}

impl ConnectionListener for PeerManager {
    fn on_handshake_complete(&self, connection: &Arc<Connection>) {
        let (Some(address), Some(capability)) =
            (connection.remote_address(), connection.capability().cloned())
        else {
            if connection.direction() == Direction::Inbound {
                tracing::debug!(connection = connection.id(), "inbound peer has no address, closing");
                let conn = Arc::clone(connection);
                tokio::spawn(async move { conn.close().await });
            }
            return;
        };

        let dialed = connection.direction() == Direction::Outbound;
        let added = self.group.add(Peer {
            address: address.clone(),
            capability,
            connection_id: connection.id(),
            dialed,
        });
        if added {
            if dialed {
                self.group.mark_verified(&address);
            }
            self.observer.peers_changed(self.group.len());
            tracing::info!(peer = %address, connection = connection.id(), "peer connected");
        } else if connection.direction() == Direction::Inbound {
            tracing::debug!(peer = %address, "inbound peer not admitted to the group, closing");
            let conn = Arc::clone(connection);
            tokio::spawn(async move { conn.close().await });
        } else {
            // Still usable for the caller's direct send, just not a group member.
            self.group.mark_verified(&address);
            tracing::debug!(peer = %address, "outbound connection kept outside the group");
        }
    }

    fn on_disconnect(&self, connection: &Arc<Connection>) {
        let Some(address) = connection.remote_address() else {
            return;
        };
        if self.group.remove_connection(&address, connection.id()) {
            self.observer.peers_changed(self.group.len());
            tracing::info!(peer = %address, connection = connection.id(), "peer disconnected");
        }
    }
}
