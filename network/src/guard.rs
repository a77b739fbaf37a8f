//! Access guard: admits only handshaked connections.
//!
//! Outbound, every post-handshake message is wrapped in
//! [`Message::Guarded`] with the connection's access token. Inbound, a
//! guarded message whose token matches the one recorded for its connection
//! is unwrapped and fanned out to the guard's listeners; everything else is
//! dropped without telling the sender.

use std::sync::Arc;

use tradenet_protocol::{GuardedMessage, Message};
use tradenet_types::{Address, PublicKey};

use crate::capability::CapabilityExchange;
use crate::connection::{Connection, ConnectionPool, ServerInfo};
use crate::listeners::{ListenerRegistry, MessageListener};
use crate::NetworkError;

pub struct Guard {
    pool: Arc<ConnectionPool>,
    exchange: Arc<CapabilityExchange>,
    listeners: ListenerRegistry<dyn MessageListener>,
}

impl Guard {
    /// Build the guard and the capability exchange and register both as
    /// listeners on `pool`.
    pub fn new(pool: Arc<ConnectionPool>, public_key: PublicKey) -> Arc<Self> {
        let exchange = CapabilityExchange::new(Arc::clone(&pool), public_key);
        pool.add_message_listener(exchange.clone());
        pool.add_connection_listener(exchange.clone());

        let guard = Arc::new(Self {
            pool: Arc::clone(&pool),
            exchange,
            listeners: ListenerRegistry::new(),
        });
        pool.add_message_listener(guard.clone());
        guard
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn exchange(&self) -> &Arc<CapabilityExchange> {
        &self.exchange
    }

    pub async fn initialize_server(&self, server_id: &str, port: u16) -> Result<ServerInfo, NetworkError> {
        self.pool.initialize_server(server_id, port).await
    }

    pub fn add_message_listener(&self, listener: Arc<dyn MessageListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_message_listener(&self, listener: &Arc<dyn MessageListener>) -> bool {
        self.listeners.remove(listener)
    }

    pub fn clear_listeners(&self) {
        self.listeners.clear();
    }

    /// A handshaked connection to `address`, reusing an existing one when
    /// possible.
    pub async fn connect(&self, address: &Address) -> Result<Arc<Connection>, NetworkError> {
        if let Some(connection) = self.pool.find_connection(address) {
            return Ok(connection);
        }
        let connection = self.pool.connect(address).await?;
        self.exchange.initiate(&connection).await?;
        Ok(connection)
    }

    /// Send `message` to `address`, connecting and handshaking if needed.
    pub async fn send(&self, message: Message, address: &Address) -> Result<Arc<Connection>, NetworkError> {
        let connection = self.connect(address).await?;
        self.send_to(message, &connection).await?;
        Ok(connection)
    }

    /// Send `message` over an already handshaked connection.
    pub async fn send_to(&self, message: Message, connection: &Arc<Connection>) -> Result<(), NetworkError> {
        let access_token = connection
            .access_token()
            .ok_or_else(|| NetworkError::HandshakeFailed("connection not handshaked".into()))?;
        connection
            .send(&Message::Guarded(GuardedMessage {
                message: Box::new(message),
                access_token,
            }))
            .await
    }

    fn drop_unauthorized(&self, message: &Message, connection: &Arc<Connection>, reason: &str) {
        tracing::debug!(
            connection = connection.id(),
            kind = message.kind(),
            reason,
            "dropping unauthorized message"
        );
        self.pool.observer().unauthorized_dropped();
    }
}

impl MessageListener for Guard {
    fn on_message(&self, message: &Message, connection: &Arc<Connection>) {
        match message {
            m if m.is_handshake() => {}
            Message::Guarded(guarded) => match connection.access_token() {
                Some(token) if token == guarded.access_token => {
                    for listener in self.listeners.snapshot().iter() {
                        listener.on_message(&guarded.message, connection);
                    }
                }
                Some(_) => self.drop_unauthorized(message, connection, "invalid access token"),
                None => self.drop_unauthorized(message, connection, "connection not handshaked"),
            },
            other => self.drop_unauthorized(other, connection, "message not guarded"),
        }
    }
}
