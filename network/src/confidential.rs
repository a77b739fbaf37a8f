//! Confidential messaging and the one-hop relay.
//!
//! Every confidential message is sealed for the recipient's identity key
//! and signed by ours. A relayed message is sealed twice: the inner layer
//! for the target, the outer layer (a [`Message::Relay`] wrapper) for the
//! relay peer, which can read where to forward but not what.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tradenet_crypto::{seal, unseal, Sealed};
use tradenet_protocol::{ConfidentialMessage, Message, RelayMessage};
use tradenet_types::{Address, KeyPair, PublicKey};

use crate::connection::Connection;
use crate::guard::Guard;
use crate::listeners::{ConfidentialListener, ListenerRegistry, MessageListener};
use crate::peers::{Peer, PeerGroup};
use crate::NetworkError;

pub struct ConfidentialService {
    guard: Arc<Guard>,
    group: Arc<PeerGroup>,
    keypair: Arc<KeyPair>,
    listeners: ListenerRegistry<dyn ConfidentialListener>,
}

impl ConfidentialService {
    /// Create the service and register it with the guard.
    pub fn new(guard: Arc<Guard>, group: Arc<PeerGroup>, keypair: Arc<KeyPair>) -> Arc<Self> {
        let service = Arc::new(Self {
            guard: Arc::clone(&guard),
            group,
            keypair,
            listeners: ListenerRegistry::new(),
        });
        guard.add_message_listener(service.clone());
        service
    }

    pub fn add_listener(&self, listener: Arc<dyn ConfidentialListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ConfidentialListener>) -> bool {
        self.listeners.remove(listener)
    }

    pub fn clear_listeners(&self) {
        self.listeners.clear();
    }

    /// Seal `message` for the key `address` presented in the handshake and
    /// send it directly.
    pub async fn send(&self, message: &Message, address: &Address) -> Result<Arc<Connection>, NetworkError> {
        let connection = self.guard.connect(address).await?;
        let recipient = connection
            .capability()
            .map(|c| c.public_key)
            .ok_or_else(|| NetworkError::UnknownRecipientKey(address.clone()))?;
        let sealed = self.seal_message(message, &recipient)?;
        self.guard
            .send_to(Message::Confidential(ConfidentialMessage { sealed }), &connection)
            .await?;
        Ok(connection)
    }

    /// Seal `message` for an explicitly given key and send it to `address`.
    pub async fn send_with_key(
        &self,
        message: &Message,
        address: &Address,
        recipient: &PublicKey,
    ) -> Result<Arc<Connection>, NetworkError> {
        let sealed = self.seal_message(message, recipient)?;
        self.guard
            .send(Message::Confidential(ConfidentialMessage { sealed }), address)
            .await
    }

    /// Relay `message` to `target` through one connected peer, using the key
    /// `target` advertised to us or to our peers.
    pub async fn relay(&self, message: &Message, target: &Address) -> Result<Arc<Connection>, NetworkError> {
        let recipient = self
            .group
            .capability_of(target)
            .map(|c| c.public_key)
            .ok_or_else(|| NetworkError::UnknownRecipientKey(target.clone()))?;
        self.relay_with_key(message, target, &recipient).await
    }

    /// Relay `message` to `target`, sealed for `recipient`. The relay is a
    /// random connected peer, other than the target, that can reach the
    /// target's network type.
    pub async fn relay_with_key(
        &self,
        message: &Message,
        target: &Address,
        recipient: &PublicKey,
    ) -> Result<Arc<Connection>, NetworkError> {
        let relay = self
            .pick_relay(target)
            .ok_or(NetworkError::NoRoute(target.network_type))?;

        let inner = self.seal_message(message, recipient)?;
        let wrapper = Message::Relay(RelayMessage {
            sealed: inner,
            target: target.clone(),
        });
        let outer = self.seal_message(&wrapper, &relay.capability.public_key)?;

        tracing::debug!(target = %target, relay = %relay.address, "relaying confidential message");
        self.guard
            .send(Message::Confidential(ConfidentialMessage { sealed: outer }), &relay.address)
            .await
    }

    fn pick_relay(&self, target: &Address) -> Option<Peer> {
        let qualifying: Vec<Peer> = self
            .group
            .connected_peers()
            .values()
            .filter(|p| &p.address != target && p.capability.supports(target.network_type))
            .cloned()
            .collect();
        qualifying.choose(&mut rand::thread_rng()).cloned()
    }

    fn seal_message(&self, message: &Message, recipient: &PublicKey) -> Result<Sealed, NetworkError> {
        let plaintext = message.to_bytes()?;
        Ok(seal(&plaintext, recipient, &self.keypair)?)
    }

    fn open(&self, sealed: &Sealed) -> Result<Message, NetworkError> {
        let plaintext = unseal(sealed, &self.keypair)?;
        Ok(Message::from_bytes(&plaintext)?)
    }

    fn on_confidential(&self, confidential: &ConfidentialMessage, connection: &Arc<Connection>) {
        let message = match self.open(&confidential.sealed) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(connection = connection.id(), error = %e, "dropping confidential message");
                return;
            }
        };

        match message {
            Message::Relay(relay) => self.forward(relay),
            other => {
                let sender = confidential.sealed.sender;
                tracing::trace!(kind = other.kind(), sender = %sender, "confidential message received");
                self.deliver(&other, &sender);
            }
        }
    }

    /// Hand a decrypted message to the application listeners.
    pub fn deliver(&self, message: &Message, sender: &PublicKey) {
        for listener in self.listeners.snapshot().iter() {
            listener.on_message(message, sender);
        }
    }

    fn forward(&self, relay: RelayMessage) {
        let guard = Arc::clone(&self.guard);
        tokio::spawn(async move {
            let RelayMessage { sealed, target } = relay;
            match guard
                .send(Message::Confidential(ConfidentialMessage { sealed }), &target)
                .await
            {
                Ok(_) => {
                    guard.pool().observer().relay_forwarded();
                    tracing::debug!(target = %target, "relayed message forwarded");
                }
                Err(e) => tracing::warn!(target = %target, error = %e, "relay forward failed"),
            }
        });
    }
}

impl MessageListener for ConfidentialService {
    fn on_message(&self, message: &Message, connection: &Arc<Connection>) {
        if let Message::Confidential(confidential) = message {
            self.on_confidential(confidential, connection);
        }
    }
}
