//! In-memory switchboard transport.

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tradenet_transport::{
    Acceptor, BoxedStream, ServerBinding, ServerSocket, StateMachine, Transport, TransportError,
    TransportState,
};
use tradenet_types::{Address, NetworkType};

const DUPLEX_BUFFER: usize = 64 * 1024;
const ACCEPT_BACKLOG: usize = 64;

type Inbound = (DuplexStream, String);

/// Routes dials to listeners by [`Address`].
pub struct MemoryNetwork {
    listeners: Mutex<HashMap<Address, mpsc::Sender<Inbound>>>,
    next_port: AtomicU16,
}

impl MemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            listeners: Mutex::new(HashMap::new()),
            next_port: AtomicU16::new(20_000),
        })
    }

    fn allocate_port(&self) -> u16 {
        self.next_port.fetch_add(1, Ordering::Relaxed)
    }

    fn register(&self, address: Address) -> io::Result<mpsc::Receiver<Inbound>> {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        if listeners.get(&address).is_some_and(|tx| !tx.is_closed()) {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("{address} already bound"),
            ));
        }
        let (tx, rx) = mpsc::channel(ACCEPT_BACKLOG);
        listeners.insert(address, tx);
        Ok(rx)
    }

    fn unregister(&self, address: &Address) {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.remove(address);
    }

    async fn dial(&self, address: &Address, from: String) -> io::Result<DuplexStream> {
        let tx = {
            let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
            listeners.get(address).cloned()
        };
        let tx = tx.ok_or_else(|| {
            io::Error::new(io::ErrorKind::ConnectionRefused, format!("{address} not bound"))
        })?;

        let (client, server) = tokio::io::duplex(DUPLEX_BUFFER);
        tx.send((server, from)).await.map_err(|_| {
            io::Error::new(io::ErrorKind::ConnectionRefused, format!("{address} closed"))
        })?;
        Ok(client)
    }

    /// Whether anything is listening on `address`.
    pub fn is_bound(&self, address: &Address) -> bool {
        let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.get(address).is_some_and(|tx| !tx.is_closed())
    }
}

struct MemoryAcceptor {
    inbound: mpsc::Receiver<Inbound>,
}

#[async_trait]
impl Acceptor for MemoryAcceptor {
    async fn accept(&mut self) -> io::Result<(BoxedStream, String)> {
        match self.inbound.recv().await {
            Some((stream, from)) => Ok((Box::new(stream), from)),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "memory listener closed",
            )),
        }
    }
}

/// A transport whose sockets live on a shared [`MemoryNetwork`].
pub struct MemoryTransport {
    network: Arc<MemoryNetwork>,
    host: String,
    network_type: NetworkType,
    reachable: BTreeSet<NetworkType>,
    binding: Option<ServerBinding>,
    bound: Mutex<HashMap<String, Address>>,
    state: StateMachine,
}

impl MemoryTransport {
    /// A transport that binds on `network_type` and can only reach peers on
    /// that same network type.
    pub fn new(network: Arc<MemoryNetwork>, host: impl Into<String>, network_type: NetworkType) -> Self {
        Self {
            network,
            host: host.into(),
            network_type,
            reachable: BTreeSet::from([network_type]),
            binding: None,
            bound: Mutex::new(HashMap::new()),
            state: StateMachine::new(),
        }
    }

    /// Extend the set of network types this transport can dial.
    pub fn with_reachable(mut self, network_types: impl IntoIterator<Item = NetworkType>) -> Self {
        self.reachable.extend(network_types);
        self
    }

    /// Persist server bindings under `base_dir` like the real transports.
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.binding = Some(ServerBinding::new(base_dir, self.network_type));
        self
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn initialize(&self) -> Result<(), TransportError> {
        self.state.advance(TransportState::Initialized);
        self.state.require_running()
    }

    async fn get_server_socket(
        &self,
        server_id: &str,
        port: u16,
    ) -> Result<ServerSocket, TransportError> {
        self.state.require_running()?;

        let port = if port == 0 {
            self.network.allocate_port()
        } else {
            port
        };
        let address = Address::new(self.host.clone(), port, self.network_type);
        let inbound = self
            .network
            .register(address.clone())
            .map_err(|source| TransportError::Bind {
                address: address.to_string(),
                source,
            })?;

        if let Some(binding) = &self.binding {
            binding.persist(server_id, &address)?;
        }
        self.bound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(server_id.to_string(), address.clone());
        self.state.advance(TransportState::ServerSocketCreated);
        tracing::debug!(server_id, address = %address, "memory server socket bound");

        Ok(ServerSocket::new(Box::new(MemoryAcceptor { inbound }), address))
    }

    async fn get_socket(&self, address: &Address) -> Result<BoxedStream, TransportError> {
        self.state.require_running()?;
        if !self.reachable.contains(&address.network_type) {
            return Err(TransportError::UnsupportedNetworkType(address.network_type));
        }
        let stream = self
            .network
            .dial(address, self.host.clone())
            .await
            .map_err(|source| TransportError::Connect {
                address: address.to_string(),
                source,
            })?;
        Ok(Box::new(stream))
    }

    fn get_server_address(&self, server_id: &str) -> Option<Address> {
        if let Some(binding) = &self.binding {
            return binding.load(server_id);
        }
        self.bound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(server_id)
            .cloned()
    }

    async fn shutdown(&self) {
        if !self.state.begin_shutdown() {
            return;
        }
        let bound: Vec<Address> = self
            .bound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        for address in &bound {
            self.network.unregister(address);
        }
        self.state.finish_shutdown();
    }

    fn state(&self) -> TransportState {
        self.state.get()
    }

    fn supported_network_types(&self) -> BTreeSet<NetworkType> {
        self.reachable.clone()
    }
}
