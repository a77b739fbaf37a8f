//! Capability exchange: the handshake that admits a connection.
//!
//! The dialer sends a [`CapabilityRequest`] with a fresh nonce and its own
//! capability; the responder records it, derives the access token and
//! replies with its capability under the same nonce. Both sides end up with
//! the peer's capability and the same [`AccessToken`] recorded on the
//! connection.
//!
//! Both sides record the token on the dispatcher, in frame order, so a
//! guarded frame that follows the handshake is never judged before it.
//! The responder's reply is queued as the connection's head frame, so it
//! reaches the wire before anything a handshake listener sends.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tradenet_protocol::version::is_compatible;
use tradenet_protocol::{
    AccessToken, CapabilityRequest, CapabilityResponse, Message, PROTOCOL_VERSION,
};
use tradenet_types::{Capability, PublicKey};

use crate::connection::{Connection, ConnectionPool};
use crate::listeners::{ConnectionListener, MessageListener};
use crate::requests::RequestTracker;
use crate::NetworkError;

/// The capability an initiator sent under one nonce.
struct Offer {
    connection_id: u64,
    capability: Capability,
}

pub struct CapabilityExchange {
    pool: Arc<ConnectionPool>,
    public_key: PublicKey,
    pending: RequestTracker<Result<(), NetworkError>>,
    offers: Mutex<HashMap<u64, Offer>>,
}

impl CapabilityExchange {
    pub fn new(pool: Arc<ConnectionPool>, public_key: PublicKey) -> Arc<Self> {
        Arc::new(Self {
            pool,
            public_key,
            pending: RequestTracker::new(),
            offers: Mutex::new(HashMap::new()),
        })
    }

    /// What we advertise: our server address (if bound), the network types
    /// our transport reaches, and our identity key.
    pub fn my_capability(&self) -> Capability {
        Capability::new(
            self.pool.own_address(),
            self.pool.supported_network_types(),
            self.public_key,
        )
    }

    /// Run the initiator side of the handshake on a fresh connection.
    /// On any failure the connection is closed.
    pub async fn initiate(&self, connection: &Arc<Connection>) -> Result<(), NetworkError> {
        let result = self.run_initiator(connection).await;
        if let Err(e) = &result {
            tracing::debug!(connection = connection.id(), error = %e, "handshake failed");
            connection.close().await;
        }
        result
    }

    async fn run_initiator(&self, connection: &Arc<Connection>) -> Result<(), NetworkError> {
        let mine = self.my_capability();
        let (nonce, rx) = self.pending.register(connection.id());
        self.offers.lock().unwrap_or_else(|e| e.into_inner()).insert(
            nonce,
            Offer {
                connection_id: connection.id(),
                capability: mine.clone(),
            },
        );
        let request = Message::CapabilityRequest(CapabilityRequest {
            version: PROTOCOL_VERSION,
            nonce,
            capability: mine,
        });
        if let Err(e) = connection.send(&request).await {
            self.forget(nonce);
            return Err(e);
        }

        let timeout = self.pool.config().handshake_timeout;
        match self.pending.wait(nonce, rx, timeout, "handshake").await {
            Ok(outcome) => outcome?,
            Err(NetworkError::Timeout(_)) => {
                self.forget(nonce);
                let peer = connection
                    .remote_address()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| format!("connection {}", connection.id()));
                return Err(NetworkError::HandshakeTimeout(peer));
            }
            Err(e) => {
                self.forget(nonce);
                return Err(e);
            }
        }

        tracing::debug!(
            connection = connection.id(),
            peer = ?connection.remote_address(),
            "handshake complete (initiator)"
        );
        self.pool.notify_handshake_complete(connection);
        Ok(())
    }

    fn forget(&self, nonce: u64) {
        self.pending.cancel(nonce);
        self.offers.lock().unwrap_or_else(|e| e.into_inner()).remove(&nonce);
    }

    fn on_request(&self, request: &CapabilityRequest, connection: &Arc<Connection>) {
        if connection.capability().is_some() {
            tracing::warn!(connection = connection.id(), "repeated capability request, closing");
            close_in_background(connection);
            return;
        }
        if !is_compatible(request.version) {
            tracing::debug!(
                connection = connection.id(),
                version = request.version,
                "incompatible protocol version, closing"
            );
            close_in_background(connection);
            return;
        }

        let mine = self.my_capability();
        let response = Message::CapabilityResponse(CapabilityResponse {
            version: PROTOCOL_VERSION,
            nonce: request.nonce,
            capability: mine.clone(),
        });
        let recorded = connection.queue_head(&response).and_then(|()| {
            let token = AccessToken::derive(request.nonce, &request.capability, &mine)?;
            connection.set_capability(request.capability.clone())?;
            connection.set_access_token(token)
        });
        if let Err(e) = recorded {
            tracing::warn!(connection = connection.id(), error = %e, "handshake failed (responder)");
            close_in_background(connection);
            return;
        }

        let conn = Arc::clone(connection);
        tokio::spawn(async move {
            if let Err(e) = conn.flush_head().await {
                tracing::debug!(connection = conn.id(), error = %e, "capability response not sent");
            }
        });

        tracing::debug!(
            connection = connection.id(),
            peer = ?connection.remote_address(),
            "handshake complete (responder)"
        );
        self.pool.notify_handshake_complete(connection);
    }

    fn on_response(&self, response: &CapabilityResponse, connection: &Arc<Connection>) {
        let offered = {
            let mut offers = self.offers.lock().unwrap_or_else(|e| e.into_inner());
            match offers.get(&response.nonce) {
                Some(offer) if offer.connection_id == connection.id() => {
                    offers.remove(&response.nonce).map(|offer| offer.capability)
                }
                _ => None,
            }
        };
        let Some(mine) = offered else {
            tracing::warn!(
                connection = connection.id(),
                "capability response with unknown nonce, closing"
            );
            close_in_background(connection);
            return;
        };

        let outcome = admit(response, &mine, connection);
        if !self.pending.complete(response.nonce, connection.id(), outcome) {
            tracing::debug!(connection = connection.id(), "capability response after the waiter left");
        }
    }
}

/// Record the responder's capability and the derived token on `connection`.
fn admit(
    response: &CapabilityResponse,
    mine: &Capability,
    connection: &Connection,
) -> Result<(), NetworkError> {
    if !is_compatible(response.version) {
        return Err(NetworkError::HandshakeFailed(format!(
            "incompatible protocol version {}",
            response.version
        )));
    }
    let token = AccessToken::derive(response.nonce, mine, &response.capability)?;
    connection.set_capability(response.capability.clone())?;
    connection.set_access_token(token)
}

fn close_in_background(connection: &Arc<Connection>) {
    let conn = Arc::clone(connection);
    tokio::spawn(async move { conn.close().await });
}

impl MessageListener for CapabilityExchange {
    fn on_message(&self, message: &Message, connection: &Arc<Connection>) {
        match message {
            Message::CapabilityRequest(request) => self.on_request(request, connection),
            Message::CapabilityResponse(response) => self.on_response(response, connection),
            _ => {}
        }
    }
}

impl ConnectionListener for CapabilityExchange {
    fn on_disconnect(&self, connection: &Arc<Connection>) {
        self.pending.cancel_connection(connection.id());
        self.offers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, offer| offer.connection_id != connection.id());
    }
}
