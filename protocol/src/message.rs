//! Top-level P2P wire message envelope.
//!
//! Every frame exchanged between nodes carries exactly one [`Message`].
//! Only the capability handshake travels bare; everything else is wrapped
//! in [`Message::Guarded`] with the connection's access token.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use tradenet_crypto::{tagged_hash, Domain, Sealed};
use tradenet_types::{Address, Capability};

use crate::data::{AuthenticatedData, DataFilter, RemoveDataRequest};
use crate::ProtocolError;

/// Top-level P2P wire message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Handshake opener carrying the initiator's capability
    CapabilityRequest(CapabilityRequest),
    /// Handshake reply carrying the responder's capability
    CapabilityResponse(CapabilityResponse),
    /// Any post-handshake message plus the connection's access token
    Guarded(GuardedMessage),
    /// A message sealed for the receiving node
    Confidential(ConfidentialMessage),
    /// Relay instruction, only ever found inside a sealed payload
    Relay(RelayMessage),
    /// Peer exchange: our peers, asking for theirs
    PeerExchangeRequest(PeerExchangeRequest),
    /// Peer exchange reply
    PeerExchangeResponse(PeerExchangeResponse),
    /// Gossip: add or replace a data entry
    AddData(AuthenticatedData),
    /// Gossip: remove a data entry
    RemoveData(RemoveDataRequest),
    /// Ask a peer for entries we are missing
    InventoryRequest(InventoryRequest),
    /// Entries the requester did not know about
    InventoryResponse(InventoryResponse),
    /// Opaque application payload (offers, trade protocol steps, chat)
    Application(ApplicationMessage),
    /// Keeps an otherwise quiet connection under its read idle timeout
    Keepalive,
}

impl Message {
    /// Short variant name for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::CapabilityRequest(_) => "capability_request",
            Message::CapabilityResponse(_) => "capability_response",
            Message::Guarded(_) => "guarded",
            Message::Confidential(_) => "confidential",
            Message::Relay(_) => "relay",
            Message::PeerExchangeRequest(_) => "peer_exchange_request",
            Message::PeerExchangeResponse(_) => "peer_exchange_response",
            Message::AddData(_) => "add_data",
            Message::RemoveData(_) => "remove_data",
            Message::InventoryRequest(_) => "inventory_request",
            Message::InventoryResponse(_) => "inventory_response",
            Message::Application(_) => "application",
            Message::Keepalive => "keepalive",
        }
    }

    /// Whether this message belongs to the capability handshake.
    pub fn is_handshake(&self) -> bool {
        matches!(
            self,
            Message::CapabilityRequest(_) | Message::CapabilityResponse(_)
        )
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serialize(self).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        bincode::deserialize(bytes).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

/// Proof that one connection completed the capability handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessToken(pub [u8; 32]);

impl AccessToken {
    /// Both ends derive the same token from the handshake transcript.
    pub fn derive(
        nonce: u64,
        initiator: &Capability,
        responder: &Capability,
    ) -> Result<Self, ProtocolError> {
        let initiator =
            bincode::serialize(initiator).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        let responder =
            bincode::serialize(responder).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        Ok(Self(tagged_hash(
            Domain::AccessToken,
            &[&nonce.to_be_bytes(), &initiator, &responder],
        )))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRequest {
    pub version: u16,
    pub nonce: u64,
    pub capability: Capability,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityResponse {
    pub version: u16,
    pub nonce: u64,
    pub capability: Capability,
}

/// The payload of a guarded message is never itself guarded; decoding
/// rejects a second layer instead of recursing into it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardedMessage {
    #[serde(deserialize_with = "decode_unguarded")]
    pub message: Box<Message>,
    pub access_token: AccessToken,
}

/// Wire twin of [`Message`] for the inside of a guarded envelope. Variant
/// order must stay identical to [`Message`]; the guarded slot cannot decode.
#[derive(Deserialize)]
enum Unguarded {
    CapabilityRequest(CapabilityRequest),
    CapabilityResponse(CapabilityResponse),
    Guarded(NestedGuard),
    Confidential(ConfidentialMessage),
    Relay(RelayMessage),
    PeerExchangeRequest(PeerExchangeRequest),
    PeerExchangeResponse(PeerExchangeResponse),
    AddData(AuthenticatedData),
    RemoveData(RemoveDataRequest),
    InventoryRequest(InventoryRequest),
    InventoryResponse(InventoryResponse),
    Application(ApplicationMessage),
    Keepalive,
}

enum NestedGuard {}

impl<'de> Deserialize<'de> for NestedGuard {
    fn deserialize<D: Deserializer<'de>>(_: D) -> Result<Self, D::Error> {
        Err(D::Error::custom("guarded message nested in a guarded message"))
    }
}

impl From<Unguarded> for Message {
    fn from(inner: Unguarded) -> Self {
        match inner {
            Unguarded::CapabilityRequest(m) => Message::CapabilityRequest(m),
            Unguarded::CapabilityResponse(m) => Message::CapabilityResponse(m),
            Unguarded::Guarded(never) => match never {},
            Unguarded::Confidential(m) => Message::Confidential(m),
            Unguarded::Relay(m) => Message::Relay(m),
            Unguarded::PeerExchangeRequest(m) => Message::PeerExchangeRequest(m),
            Unguarded::PeerExchangeResponse(m) => Message::PeerExchangeResponse(m),
            Unguarded::AddData(m) => Message::AddData(m),
            Unguarded::RemoveData(m) => Message::RemoveData(m),
            Unguarded::InventoryRequest(m) => Message::InventoryRequest(m),
            Unguarded::InventoryResponse(m) => Message::InventoryResponse(m),
            Unguarded::Application(m) => Message::Application(m),
            Unguarded::Keepalive => Message::Keepalive,
        }
    }
}

fn decode_unguarded<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Box<Message>, D::Error> {
    Unguarded::deserialize(deserializer).map(|inner| Box::new(inner.into()))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidentialMessage {
    pub sealed: Sealed,
}

/// Sealed for `target`; the relay forwards `sealed` without opening it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub sealed: Sealed,
    pub target: Address,
}

/// A peer learned through exchange, with the capability it advertised.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedPeer {
    pub address: Address,
    pub capability: Capability,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerExchangeRequest {
    pub nonce: u64,
    pub peers: Vec<ReportedPeer>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerExchangeResponse {
    pub nonce: u64,
    pub peers: Vec<ReportedPeer>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRequest {
    pub nonce: u64,
    pub filter: DataFilter,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryResponse {
    pub nonce: u64,
    pub entries: Vec<AuthenticatedData>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}
