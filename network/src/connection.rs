//! Connection management.
//!
//! The [`ConnectionPool`] owns every live [`Connection`]. Each connection has
//! a read loop that decodes length-prefixed frames and pushes them onto one
//! bounded dispatch channel; a single dispatcher task fans messages and
//! disconnect events out to the registered listeners, so listener code never
//! runs on an I/O task.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};
use std::time::Duration;

use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tradenet_protocol::{codec, AccessToken, GuardedMessage, Message, ProtocolError};
use tradenet_transport::{BoxedStream, ServerSocket, Transport, TransportState};
use tradenet_types::{Address, Capability, NetworkType};

use crate::config::PeerConfig;
use crate::listeners::{ConnectionListener, ListenerRegistry, MessageListener};
use crate::observer::NetworkObserver;
use crate::NetworkError;

/// Delay before retrying after a transient accept error.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// The server socket a node is reachable on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerInfo {
    pub server_id: String,
    pub address: Address,
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// A live channel to one peer.
///
/// The peer's capability and the access token are each recorded exactly once,
/// by the capability exchange.
pub struct Connection {
    id: u64,
    direction: Direction,
    dialed: Option<Address>,
    description: String,
    writer: tokio::sync::Mutex<WriteHalf<BoxedStream>>,
    /// Encoded frame that goes out before anything else written after it
    /// was queued, with its message kind for the observer.
    head: Mutex<Option<(Vec<u8>, &'static str)>>,
    capability: OnceLock<Capability>,
    access_token: OnceLock<AccessToken>,
    closed: AtomicBool,
    close_signal: Notify,
    observer: Arc<dyn NetworkObserver>,
}

impl Connection {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The dialed address for outbound connections, the advertised address
    /// for inbound ones once the handshake recorded it.
    pub fn remote_address(&self) -> Option<Address> {
        self.dialed.clone().or_else(|| {
            self.capability
                .get()
                .and_then(|capability| capability.address.clone())
        })
    }

    pub fn capability(&self) -> Option<&Capability> {
        self.capability.get()
    }

    pub fn access_token(&self) -> Option<AccessToken> {
        self.access_token.get().copied()
    }

    pub fn is_handshaked(&self) -> bool {
        self.access_token.get().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn set_capability(&self, capability: Capability) -> Result<(), NetworkError> {
        self.capability
            .set(capability)
            .map_err(|_| NetworkError::HandshakeFailed("capability already recorded".into()))
    }

    pub(crate) fn set_access_token(&self, token: AccessToken) -> Result<(), NetworkError> {
        self.access_token
            .set(token)
            .map_err(|_| NetworkError::HandshakeFailed("access token already recorded".into()))
    }

    /// Frame and write one message. Messages on one connection are written
    /// in call order, after any frame queued with [`queue_head`](Self::queue_head).
    pub async fn send(&self, message: &Message) -> Result<(), NetworkError> {
        if self.is_closed() {
            return Err(NetworkError::ConnectionClosed);
        }
        let frame = codec::encode(message)?;

        let mut writer = self.writer.lock().await;
        self.write_head(&mut writer).await?;
        self.write_locked(&mut writer, &frame, message.kind()).await
    }

    /// Queue `message` to be written ahead of every later [`send`](Self::send).
    /// Callable from synchronous listener code; pair it with
    /// [`flush_head`](Self::flush_head).
    pub(crate) fn queue_head(&self, message: &Message) -> Result<(), NetworkError> {
        let frame = codec::encode(message)?;
        *self.head.lock().unwrap_or_else(|e| e.into_inner()) = Some((frame, message.kind()));
        Ok(())
    }

    /// Write the queued head frame if no send has carried it out yet.
    pub(crate) async fn flush_head(&self) -> Result<(), NetworkError> {
        if self.is_closed() {
            return Err(NetworkError::ConnectionClosed);
        }
        let mut writer = self.writer.lock().await;
        self.write_head(&mut writer).await
    }

    async fn write_head(&self, writer: &mut WriteHalf<BoxedStream>) -> Result<(), NetworkError> {
        let head = self.head.lock().unwrap_or_else(|e| e.into_inner()).take();
        match head {
            Some((frame, kind)) => self.write_locked(writer, &frame, kind).await,
            None => Ok(()),
        }
    }

    async fn write_locked(
        &self,
        writer: &mut WriteHalf<BoxedStream>,
        frame: &[u8],
        kind: &'static str,
    ) -> Result<(), NetworkError> {
        if let Err(e) = codec::write_frame(writer, frame).await {
            tracing::debug!(connection = self.id, error = %e, "write failed, closing");
            self.closed.store(true, Ordering::Release);
            self.close_signal.notify_one();
            let _ = writer.shutdown().await;
            return Err(e.into());
        }
        self.observer.message_sent(kind);
        Ok(())
    }

    /// Close the connection. The read loop stops and the pool removes it.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.close_signal.notify_one();
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("remote", &self.remote_address())
            .field("description", &self.description)
            .field("handshaked", &self.is_handshaked())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Connection pool
// ---------------------------------------------------------------------------

enum Dispatch {
    Message(Message, Arc<Connection>),
    Disconnected(Arc<Connection>),
}

/// Owns all live connections and the server socket's accept loop.
pub struct ConnectionPool {
    transport: Arc<dyn Transport>,
    config: PeerConfig,
    connections: RwLock<HashMap<u64, Arc<Connection>>>,
    next_id: AtomicU64,
    server: RwLock<Option<ServerInfo>>,
    message_listeners: Arc<ListenerRegistry<dyn MessageListener>>,
    connection_listeners: Arc<ListenerRegistry<dyn ConnectionListener>>,
    dispatch_tx: mpsc::Sender<Dispatch>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
    keepalive_task: Mutex<Option<JoinHandle<()>>>,
    shutting_down: AtomicBool,
    observer: Arc<dyn NetworkObserver>,
}

impl ConnectionPool {
    /// Create the pool and start its dispatcher. Must be called inside a
    /// Tokio runtime.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: PeerConfig,
        observer: Arc<dyn NetworkObserver>,
    ) -> Arc<Self> {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(config.dispatch_capacity.max(1));
        let message_listeners = Arc::new(ListenerRegistry::new());
        let connection_listeners = Arc::new(ListenerRegistry::new());

        let dispatcher = tokio::spawn(run_dispatcher(
            dispatch_rx,
            Arc::clone(&message_listeners),
            Arc::clone(&connection_listeners),
        ));

        let pool = Arc::new(Self {
            transport,
            config,
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            server: RwLock::new(None),
            message_listeners,
            connection_listeners,
            dispatch_tx,
            accept_task: Mutex::new(None),
            dispatch_task: Mutex::new(Some(dispatcher)),
            keepalive_task: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
            observer,
        });

        let keepalive = tokio::spawn(run_keepalive(Arc::downgrade(&pool)));
        *pool.keepalive_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(keepalive);
        pool
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    pub fn observer(&self) -> &Arc<dyn NetworkObserver> {
        &self.observer
    }

    pub fn supported_network_types(&self) -> BTreeSet<NetworkType> {
        self.transport.supported_network_types()
    }

    /// Our own server address, once [`initialize_server`](Self::initialize_server) ran.
    pub fn own_address(&self) -> Option<Address> {
        self.server_info().map(|info| info.address)
    }

    pub fn server_info(&self) -> Option<ServerInfo> {
        self.server.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn add_message_listener(&self, listener: Arc<dyn MessageListener>) {
        self.message_listeners.add(listener);
    }

    pub fn add_connection_listener(&self, listener: Arc<dyn ConnectionListener>) {
        self.connection_listeners.add(listener);
    }

    /// Bind the server socket for `server_id` and start accepting.
    pub async fn initialize_server(
        self: &Arc<Self>,
        server_id: &str,
        port: u16,
    ) -> Result<ServerInfo, NetworkError> {
        if let Some(info) = self.server_info() {
            return Ok(info);
        }
        if self.transport.state() == TransportState::NotStarted {
            self.transport.initialize().await?;
        }
        let socket = self.transport.get_server_socket(server_id, port).await?;
        let info = ServerInfo {
            server_id: server_id.to_string(),
            address: socket.address().clone(),
        };
        *self.server.write().unwrap_or_else(|e| e.into_inner()) = Some(info.clone());

        let pool = Arc::clone(self);
        let handle = tokio::spawn(async move { pool.accept_loop(socket).await });
        if let Some(old) = self
            .accept_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle)
        {
            old.abort();
        }

        tracing::info!(server_id, address = %info.address, "server initialized");
        Ok(info)
    }

    async fn accept_loop(self: Arc<Self>, mut socket: ServerSocket) {
        loop {
            match socket.accept().await {
                Ok((stream, description)) => {
                    if self.shutting_down.load(Ordering::Acquire) {
                        break;
                    }
                    let connection = self.register(stream, Direction::Inbound, None, description);
                    tracing::debug!(connection = connection.id(), "accepted inbound connection");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotConnected => break,
                Err(e) => {
                    if self.shutting_down.load(Ordering::Acquire) {
                        break;
                    }
                    tracing::warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }
        tracing::debug!("accept loop stopped");
    }

    /// Dial `address` and start reading from it. The connection is not
    /// handshaked yet.
    pub async fn connect(self: &Arc<Self>, address: &Address) -> Result<Arc<Connection>, NetworkError> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(NetworkError::ConnectionClosed);
        }
        if self.transport.state() == TransportState::NotStarted {
            self.transport.initialize().await?;
        }
        let stream = tokio::time::timeout(self.config.connect_timeout, self.transport.get_socket(address))
            .await
            .map_err(|_| NetworkError::Timeout("connect"))??;

        let connection = self.register(
            stream,
            Direction::Outbound,
            Some(address.clone()),
            address.to_string(),
        );
        tracing::debug!(connection = connection.id(), peer = %address, "connected");
        Ok(connection)
    }

    /// A handshaked, open connection we dialed to `address`, if any.
    ///
    /// Inbound connections never match: the address an inbound peer
    /// advertises is a claim, and anyone can claim anyone's address.
    pub fn find_connection(&self, address: &Address) -> Option<Arc<Connection>> {
        let connections = self.connections.read().unwrap_or_else(|e| e.into_inner());
        connections
            .values()
            .filter(|c| c.direction == Direction::Outbound)
            .filter(|c| c.is_handshaked() && !c.is_closed())
            .find(|c| c.dialed.as_ref() == Some(address))
            .cloned()
    }

    pub fn get(&self, id: u64) -> Option<Arc<Connection>> {
        self.connections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.connections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.connections.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Tell connection listeners that `connection` completed its handshake.
    pub(crate) fn notify_handshake_complete(&self, connection: &Arc<Connection>) {
        for listener in self.connection_listeners.snapshot().iter() {
            listener.on_handshake_complete(connection);
        }
    }

    fn register(
        self: &Arc<Self>,
        stream: BoxedStream,
        direction: Direction,
        dialed: Option<Address>,
        description: String,
    ) -> Arc<Connection> {
        let (reader, writer) = tokio::io::split(stream);
        let connection = Arc::new(Connection {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            direction,
            dialed,
            description,
            writer: tokio::sync::Mutex::new(writer),
            head: Mutex::new(None),
            capability: OnceLock::new(),
            access_token: OnceLock::new(),
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
            observer: Arc::clone(&self.observer),
        });

        let count = {
            let mut connections = self.connections.write().unwrap_or_else(|e| e.into_inner());
            connections.insert(connection.id, Arc::clone(&connection));
            connections.len()
        };
        self.observer.connections_changed(count);

        let pool = Arc::clone(self);
        let conn = Arc::clone(&connection);
        tokio::spawn(async move {
            let result = pool.read_loop(&conn, reader).await;
            match &result {
                Ok(()) => tracing::debug!(connection = conn.id, "connection closed"),
                Err(e) => tracing::debug!(connection = conn.id, error = %e, "connection closed with error"),
            }
            pool.remove(&conn).await;
        });

        connection
    }

    async fn read_loop(
        &self,
        connection: &Arc<Connection>,
        mut reader: ReadHalf<BoxedStream>,
    ) -> Result<(), ProtocolError> {
        loop {
            let frame = tokio::select! {
                _ = connection.close_signal.notified() => return Ok(()),
                frame = tokio::time::timeout(self.config.read_idle_timeout, codec::read_frame(&mut reader)) => frame,
            };

            let body = match frame {
                Ok(Ok(Some(body))) => body,
                Ok(Ok(None)) => return Ok(()),
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(ProtocolError::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "read idle timeout",
                    )))
                }
            };

            let message = match codec::decode(&body) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(connection = connection.id, error = %e, "undecodable frame, disconnecting");
                    return Err(e);
                }
            };
            self.observer.message_received(message.kind());

            if self
                .dispatch_tx
                .send(Dispatch::Message(message, Arc::clone(connection)))
                .await
                .is_err()
            {
                return Ok(());
            }
        }
    }

    async fn remove(&self, connection: &Arc<Connection>) {
        connection.close().await;
        let (removed, count) = {
            let mut connections = self.connections.write().unwrap_or_else(|e| e.into_inner());
            let removed = connections.remove(&connection.id).is_some();
            (removed, connections.len())
        };
        if removed {
            self.observer.connections_changed(count);
            let _ = self
                .dispatch_tx
                .send(Dispatch::Disconnected(Arc::clone(connection)))
                .await;
        }
    }

    /// Close every connection and stop accepting. Idempotent.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(task) = self
            .accept_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
        if let Some(task) = self
            .keepalive_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
        for connection in self.connections() {
            connection.close().await;
        }
        self.message_listeners.clear();
        self.connection_listeners.clear();
        if let Some(task) = self
            .dispatch_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
        tracing::info!("connection pool shut down");
    }
}

/// Every `keepalive_interval`, send a guarded keepalive on each handshaked
/// connection so the peer's read loop never sees it idle. A zero interval
/// disables keepalives. Stops once the pool is dropped.
async fn run_keepalive(pool: Weak<ConnectionPool>) {
    let period = match pool.upgrade() {
        Some(pool) => pool.config.keepalive_interval,
        None => return,
    };
    if period.is_zero() {
        return;
    }
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval.tick().await;
    loop {
        interval.tick().await;
        let Some(pool) = pool.upgrade() else {
            break;
        };
        let mut sent = 0usize;
        for connection in pool.connections() {
            let Some(access_token) = connection.access_token() else {
                continue;
            };
            if connection.is_closed() {
                continue;
            }
            sent += 1;
            tokio::spawn(async move {
                let keepalive = Message::Guarded(GuardedMessage {
                    message: Box::new(Message::Keepalive),
                    access_token,
                });
                if let Err(e) = connection.send(&keepalive).await {
                    tracing::debug!(connection = connection.id(), error = %e, "keepalive send failed");
                }
            });
        }
        tracing::trace!(connections = sent, "keepalive round");
    }
    tracing::debug!("keepalive task stopped");
}

async fn run_dispatcher(
    mut rx: mpsc::Receiver<Dispatch>,
    message_listeners: Arc<ListenerRegistry<dyn MessageListener>>,
    connection_listeners: Arc<ListenerRegistry<dyn ConnectionListener>>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            Dispatch::Message(message, connection) => {
                for listener in message_listeners.snapshot().iter() {
                    listener.on_message(&message, &connection);
                }
            }
            Dispatch::Disconnected(connection) => {
                for listener in connection_listeners.snapshot().iter() {
                    listener.on_disconnect(&connection);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
