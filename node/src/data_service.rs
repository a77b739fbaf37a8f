//! Gossip data service.
//!
//! Local adds and removes are signed with the node identity at the next
//! sequence number, applied to storage and flooded to every connected peer.
//! Entries arriving from the network go through the same storage gate and
//! are re-flooded to everyone but the sender when they change something;
//! the sequence gate is what stops the flood. Inventory requests let a node
//! catch up on entries it missed while offline.

use std::sync::Arc;

use futures_util::future::join_all;
use tradenet_network::{
    Connection, ConfidentialService, ConnectionListener, Guard, ListenerRegistry,
    MessageListener, NetworkError, PeerGroup, RequestTracker,
};
use tradenet_protocol::{
    AuthenticatedData, DataFilter, DataKey, GossipResult, InventoryRequest, InventoryResponse,
    MailboxMessage, MailboxPayload, Message, MetaData, NetworkData, NetworkPayload,
    RemoveDataRequest, RequestInventoryResult, MAX_MESSAGE_SIZE,
};
use tradenet_store::DataStore;
use tradenet_types::{Address, KeyPair, PublicKey, Timestamp};

use crate::broadcast::Broadcaster;
use crate::metrics::NodeMetrics;
use crate::NodeError;

/// Cap on the entries packed into one inventory response.
pub const MAX_INVENTORY_BYTES: usize = MAX_MESSAGE_SIZE / 2;

/// Notified when stored data changes, whatever the origin.
pub trait DataListener: Send + Sync {
    fn on_added(&self, _data: &AuthenticatedData) {}

    fn on_removed(&self, _key: &DataKey) {}
}

pub struct DataService {
    guard: Arc<Guard>,
    store: Arc<dyn DataStore>,
    keypair: Arc<KeyPair>,
    broadcaster: Broadcaster,
    group: Arc<PeerGroup>,
    confidential: Arc<ConfidentialService>,
    metrics: Arc<NodeMetrics>,
    listeners: ListenerRegistry<dyn DataListener>,
    pending: RequestTracker<Vec<AuthenticatedData>>,
}

impl DataService {
    /// Create the service and register it with the guard (messages) and the
    /// pool (disconnects).
    pub fn new(
        guard: Arc<Guard>,
        group: Arc<PeerGroup>,
        store: Arc<dyn DataStore>,
        keypair: Arc<KeyPair>,
        confidential: Arc<ConfidentialService>,
        metrics: Arc<NodeMetrics>,
    ) -> Arc<Self> {
        let service = Arc::new(Self {
            broadcaster: Broadcaster::new(Arc::clone(&guard), Arc::clone(&group)),
            guard: Arc::clone(&guard),
            store,
            keypair,
            group,
            confidential,
            metrics,
            listeners: ListenerRegistry::new(),
            pending: RequestTracker::new(),
        });
        guard.add_message_listener(service.clone());
        guard.pool().add_connection_listener(service.clone());
        service
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    pub fn add_listener(&self, listener: Arc<dyn DataListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn DataListener>) -> bool {
        self.listeners.remove(listener)
    }

    pub fn clear_listeners(&self) {
        self.listeners.clear();
    }

    fn next_sequence(&self, key: &DataKey, now: Timestamp) -> u64 {
        self.store
            .sequence_number(key, now)
            .map_or(1, |seq| seq.saturating_add(1))
    }

    /// Publish `data` under our identity.
    pub async fn request_add_data(&self, data: NetworkData) -> Result<GossipResult, NodeError> {
        let now = Timestamp::now();
        let sequence_number = self.next_sequence(&data.key(&self.keypair.public), now);
        let signed = AuthenticatedData::sign(data, sequence_number, &self.keypair)?;

        let result = self.apply_add(signed.clone(), now);
        if result.is_added() {
            let sent = self.broadcaster.broadcast(&Message::AddData(signed), None).await;
            tracing::debug!(sent = sent.sent, failed = sent.failed, "add data broadcast");
        }
        Ok(result)
    }

    /// Withdraw one of our entries. Leaves a tombstone everywhere it reaches.
    pub async fn request_remove_data(&self, data: NetworkData) -> Result<GossipResult, NodeError> {
        let now = Timestamp::now();
        let key = data.key(&self.keypair.public);
        let request = RemoveDataRequest::sign(key, self.next_sequence(&key, now), &self.keypair);

        let result = self.apply_remove(&request, now);
        if result.is_added() {
            let sent = self.broadcaster.broadcast(&Message::RemoveData(request), None).await;
            tracing::debug!(sent = sent.sent, failed = sent.failed, "remove data broadcast");
        }
        Ok(result)
    }

    /// Leave `message` for `recipient`, who may be offline. Only the
    /// recipient can open it; everyone else stores and gossips ciphertext.
    pub async fn send_mailbox(
        &self,
        message: Message,
        recipient: &PublicKey,
        meta: MetaData,
    ) -> Result<GossipResult, NodeError> {
        let payload = MailboxPayload::seal(&MailboxMessage { message }, recipient, &self.keypair)?;
        let data = NetworkData {
            id: hex::encode(rand::random::<[u8; 16]>()),
            payload: NetworkPayload::Mailbox(payload),
            meta,
        };
        self.request_add_data(data).await
    }

    /// Ask every connected peer for entries matching `filter` that we lack
    /// or hold an older version of, and apply what comes back.
    pub async fn request_inventory(&self, mut filter: DataFilter) -> Result<RequestInventoryResult, NodeError> {
        let known = self.store.known(&filter, Timestamp::now());
        filter.known.extend(known);

        let peers: Vec<Address> = self.group.connected_peers().keys().cloned().collect();
        let responses = join_all(peers.iter().map(|address| self.inventory_from(address, &filter))).await;

        let mut result = RequestInventoryResult::default();
        for (address, response) in peers.iter().zip(responses) {
            match response {
                Ok(entries) => {
                    result.responded_peers += 1;
                    for entry in entries {
                        if self.on_add_data(entry.clone(), Some(address)).is_added() {
                            result.added.push(entry);
                        }
                    }
                }
                Err(e) => {
                    result.failed_peers += 1;
                    tracing::debug!(peer = %address, error = %e, "inventory request failed");
                }
            }
        }
        tracing::info!(
            added = result.added.len(),
            responded = result.responded_peers,
            failed = result.failed_peers,
            "inventory reconciled"
        );
        Ok(result)
    }

    async fn inventory_from(&self, address: &Address, filter: &DataFilter) -> Result<Vec<AuthenticatedData>, NetworkError> {
        let connection = self.guard.connect(address).await?;
        let (nonce, rx) = self.pending.register(connection.id());
        let request = Message::InventoryRequest(InventoryRequest {
            nonce,
            filter: filter.clone(),
        });
        if let Err(e) = self.guard.send_to(request, &connection).await {
            self.pending.cancel(nonce);
            return Err(e);
        }
        let timeout = self.guard.pool().config().request_timeout;
        self.pending.wait(nonce, rx, timeout, "inventory").await
    }

    /// Drop expired entries from storage.
    pub fn purge_expired(&self) -> usize {
        self.store.purge_expired(Timestamp::now())
    }

    fn apply_add(&self, data: AuthenticatedData, now: Timestamp) -> GossipResult {
        let result = self.store.add(data.clone(), now);
        self.metrics.record_gossip(result);
        if result.is_added() {
            for listener in self.listeners.snapshot().iter() {
                listener.on_added(&data);
            }
        }
        result
    }

    fn apply_remove(&self, request: &RemoveDataRequest, now: Timestamp) -> GossipResult {
        let result = self.store.remove(request, now);
        self.metrics.record_gossip(result);
        if result.is_added() {
            for listener in self.listeners.snapshot().iter() {
                listener.on_removed(&request.key);
            }
        }
        result
    }

    /// Apply an entry from the network and pass it on if it was news.
    fn on_add_data(&self, data: AuthenticatedData, source: Option<&Address>) -> GossipResult {
        let result = self.apply_add(data.clone(), Timestamp::now());
        if result.is_added() {
            self.open_mailbox(&data);
            self.regossip(Message::AddData(data), source);
        }
        result
    }

    fn on_remove_data(&self, request: &RemoveDataRequest, source: Option<&Address>) {
        if self.apply_remove(request, Timestamp::now()).is_added() {
            self.regossip(Message::RemoveData(request.clone()), source);
        }
    }

    fn regossip(&self, message: Message, source: Option<&Address>) {
        let broadcaster = self.broadcaster.clone();
        let source = source.cloned();
        tokio::spawn(async move {
            let result = broadcaster.broadcast(&message, source.as_ref()).await;
            tracing::trace!(kind = message.kind(), sent = result.sent, "re-gossiped");
        });
    }

    fn open_mailbox(&self, data: &AuthenticatedData) {
        let NetworkPayload::Mailbox(payload) = &data.data.payload else {
            return;
        };
        match payload.open(&self.keypair) {
            Ok(mailbox) => {
                tracing::debug!(key = %data.key(), sender = %payload.sealed.sender, "mailbox message received");
                self.confidential.deliver(&mailbox.message, &payload.sealed.sender);
            }
            Err(_) => tracing::trace!(key = %data.key(), "mailbox entry for someone else"),
        }
    }

    fn on_inventory_request(&self, request: &InventoryRequest, connection: &Arc<Connection>) {
        let mut remaining = MAX_INVENTORY_BYTES;
        let entries: Vec<AuthenticatedData> = self
            .store
            .inventory(&request.filter, Timestamp::now())
            .into_iter()
            .take_while(|entry| {
                let size = entry.data.to_bytes().map(|b| b.len()).unwrap_or(usize::MAX);
                match remaining.checked_sub(size) {
                    Some(rest) => {
                        remaining = rest;
                        true
                    }
                    None => false,
                }
            })
            .collect();

        let response = Message::InventoryResponse(InventoryResponse {
            nonce: request.nonce,
            entries,
        });
        let guard = Arc::clone(&self.guard);
        let conn = Arc::clone(connection);
        tokio::spawn(async move {
            if let Err(e) = guard.send_to(response, &conn).await {
                tracing::debug!(connection = conn.id(), error = %e, "inventory response not sent");
            }
        });
    }
}

impl MessageListener for DataService {
    fn on_message(&self, message: &Message, connection: &Arc<Connection>) {
        match message {
            Message::AddData(data) => {
                self.on_add_data(data.clone(), connection.remote_address().as_ref());
            }
            Message::RemoveData(request) => {
                self.on_remove_data(request, connection.remote_address().as_ref());
            }
            Message::InventoryRequest(request) => self.on_inventory_request(request, connection),
            Message::InventoryResponse(response) => {
                if !self
                    .pending
                    .complete(response.nonce, connection.id(), response.entries.clone())
                {
                    tracing::debug!(connection = connection.id(), "unsolicited inventory response");
                }
            }
            _ => {}
        }
    }
}

impl ConnectionListener for DataService {
    fn on_disconnect(&self, connection: &Arc<Connection>) {
        self.pending.cancel_connection(connection.id());
    }
}
