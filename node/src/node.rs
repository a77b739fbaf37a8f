//! The node facade: one object wiring transport, connection pool, guard,
//! peer management, confidential messaging and the gossip data service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tradenet_network::{
    ConfidentialListener, ConfidentialService, Connection, ConnectionPool, Guard, NetworkObserver,
    PeerExchangeService, PeerGroup, PeerManager, ServerInfo,
};
use tradenet_protocol::{
    DataFilter, GossipResult, Message, MetaData, NetworkData, RequestInventoryResult,
};
use tradenet_store::{DataStore, Storage};
use tradenet_transport::{ClearNetTransport, TorTransport, Transport};
use tradenet_types::{Address, KeyPair, PublicKey};

use crate::config::{NodeConfig, TransportKind};
use crate::data_service::{DataListener, DataService};
use crate::metrics::NodeMetrics;
use crate::shutdown::ShutdownController;
use crate::NodeError;

pub struct NetworkNode {
    config: NodeConfig,
    keypair: Arc<KeyPair>,
    metrics: Arc<NodeMetrics>,
    transport: Arc<dyn Transport>,
    pool: Arc<ConnectionPool>,
    guard: Arc<Guard>,
    group: Arc<PeerGroup>,
    exchange: Arc<PeerExchangeService>,
    confidential: Arc<ConfidentialService>,
    data: Arc<DataService>,
    shutdown: ShutdownController,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    purge_started: AtomicBool,
}

impl NetworkNode {
    /// Build a node on the transport named in `config`. Must be called
    /// inside a Tokio runtime.
    pub fn new(config: NodeConfig, keypair: KeyPair) -> Result<Self, NodeError> {
        let transport: Arc<dyn Transport> = match config.transport {
            TransportKind::Clear => Arc::new(ClearNetTransport::new(config.host.clone(), config.base_dir.clone())),
            TransportKind::Tor => Arc::new(TorTransport::new(
                config.tor_socks_proxy.clone(),
                config.tor_hidden_service_dir.clone(),
                config.base_dir.clone(),
            )),
        };
        Self::with_transport(config, keypair, transport)
    }

    /// Build a node on an explicit transport.
    pub fn with_transport(
        config: NodeConfig,
        keypair: KeyPair,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, NodeError> {
        let keypair = Arc::new(keypair);
        let metrics = Arc::new(NodeMetrics::new()?);
        let observer: Arc<dyn NetworkObserver> = metrics.clone();

        let pool = ConnectionPool::new(Arc::clone(&transport), config.peer_config()?, Arc::clone(&observer));
        let group = Arc::new(PeerGroup::new(config.max_connections));
        pool.add_connection_listener(PeerManager::new(Arc::clone(&group), observer));

        let guard = Guard::new(Arc::clone(&pool), keypair.public);
        let exchange = PeerExchangeService::new(Arc::clone(&guard), Arc::clone(&group));
        let confidential = ConfidentialService::new(Arc::clone(&guard), Arc::clone(&group), Arc::clone(&keypair));
        let store: Arc<dyn DataStore> = Arc::new(Storage::new());
        let data = DataService::new(
            Arc::clone(&guard),
            Arc::clone(&group),
            store,
            Arc::clone(&keypair),
            Arc::clone(&confidential),
            Arc::clone(&metrics),
        );

        tracing::info!(public_key = %keypair.public, server_id = %config.server_id, "node created");
        Ok(Self {
            config,
            keypair,
            metrics,
            transport,
            pool,
            guard,
            group,
            exchange,
            confidential,
            data,
            shutdown: ShutdownController::new(),
            tasks: Mutex::new(Vec::new()),
            purge_started: AtomicBool::new(false),
        })
    }

    fn ensure_running(&self) -> Result<(), NodeError> {
        if self.shutdown.is_triggered() {
            return Err(NodeError::ShutDown);
        }
        Ok(())
    }

    /// Bind the server socket and start background maintenance.
    pub async fn initialize_server(&self) -> Result<ServerInfo, NodeError> {
        self.ensure_running()?;
        let info = self
            .guard
            .initialize_server(&self.config.server_id, self.server_port())
            .await?;
        self.start_purge_task();
        Ok(info)
    }

    /// Bind the server socket and fill the peer group from the seed nodes.
    /// Returns whether any peer is connected.
    pub async fn bootstrap(&self) -> Result<bool, NodeError> {
        self.ensure_running()?;
        let connected = self
            .exchange
            .bootstrap(&self.config.server_id, self.server_port())
            .await?;
        self.start_purge_task();
        Ok(connected)
    }

    /// The configured port, or with port 0 the one persisted for our
    /// server id so a restart keeps its address.
    fn server_port(&self) -> u16 {
        if self.config.port != 0 {
            return self.config.port;
        }
        self.transport
            .get_server_address(&self.config.server_id)
            .map_or(0, |address| address.port)
    }

    fn start_purge_task(&self) {
        if self.purge_started.swap(true, Ordering::AcqRel) {
            return;
        }
        let data = Arc::clone(&self.data);
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut interval = tokio::time::interval(self.config.purge_interval());

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        tracing::debug!("purge task shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        data.purge_expired();
                    }
                }
            }
        });
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
    }

    /// Send `message` sealed for the peer at `address`.
    pub async fn confidential_send(&self, message: Message, address: &Address) -> Result<Arc<Connection>, NodeError> {
        self.ensure_running()?;
        Ok(self.confidential.send(&message, address).await?)
    }

    /// Send `message` sealed for an explicitly known key.
    pub async fn confidential_send_with_key(
        &self,
        message: Message,
        address: &Address,
        recipient: &PublicKey,
    ) -> Result<Arc<Connection>, NodeError> {
        self.ensure_running()?;
        Ok(self.confidential.send_with_key(&message, address, recipient).await?)
    }

    pub async fn relay(&self, message: Message, target: &Address) -> Result<Arc<Connection>, NodeError> {
        self.ensure_running()?;
        Ok(self.confidential.relay(&message, target).await?)
    }

    pub async fn relay_with_key(
        &self,
        message: Message,
        target: &Address,
        recipient: &PublicKey,
    ) -> Result<Arc<Connection>, NodeError> {
        self.ensure_running()?;
        Ok(self.confidential.relay_with_key(&message, target, recipient).await?)
    }

    pub async fn request_add_data(&self, data: NetworkData) -> Result<GossipResult, NodeError> {
        self.ensure_running()?;
        self.data.request_add_data(data).await
    }

    pub async fn request_remove_data(&self, data: NetworkData) -> Result<GossipResult, NodeError> {
        self.ensure_running()?;
        self.data.request_remove_data(data).await
    }

    pub async fn request_inventory(&self, filter: DataFilter) -> Result<RequestInventoryResult, NodeError> {
        self.ensure_running()?;
        self.data.request_inventory(filter).await
    }

    pub async fn send_mailbox(
        &self,
        message: Message,
        recipient: &PublicKey,
        meta: MetaData,
    ) -> Result<GossipResult, NodeError> {
        self.ensure_running()?;
        self.data.send_mailbox(message, recipient, meta).await
    }

    /// Receive decrypted confidential and mailbox messages.
    pub fn add_message_listener(&self, listener: Arc<dyn ConfidentialListener>) {
        self.confidential.add_listener(listener);
    }

    pub fn remove_message_listener(&self, listener: &Arc<dyn ConfidentialListener>) -> bool {
        self.confidential.remove_listener(listener)
    }

    pub fn add_data_listener(&self, listener: Arc<dyn DataListener>) {
        self.data.add_listener(listener);
    }

    pub fn remove_data_listener(&self, listener: &Arc<dyn DataListener>) -> bool {
        self.data.remove_listener(listener)
    }

    /// Our server address: the live one, or the one persisted by an earlier
    /// run under the same server id.
    pub fn address(&self) -> Option<Address> {
        self.pool
            .own_address()
            .or_else(|| self.transport.get_server_address(&self.config.server_id))
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public
    }

    pub fn peer_group(&self) -> &Arc<PeerGroup> {
        &self.group
    }

    pub fn metrics(&self) -> &Arc<NodeMetrics> {
        &self.metrics
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        self.data.store()
    }

    pub fn guard(&self) -> &Arc<Guard> {
        &self.guard
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Stop background tasks, drop listeners, close every connection and
    /// shut the transport down. Idempotent.
    pub async fn shutdown(&self) {
        if !self.shutdown.shutdown() {
            return;
        }
        tracing::info!(server_id = %self.config.server_id, "node shutting down");

        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for task in tasks {
            let _ = task.await;
        }

        self.confidential.clear_listeners();
        self.data.clear_listeners();
        self.guard.clear_listeners();
        self.pool.shutdown().await;
        self.transport.shutdown().await;
        tracing::info!("node shut down");
    }
}
