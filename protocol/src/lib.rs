//! Wire protocol: the [`Message`] envelope, gossip data types, frame codec
//! and protocol versioning.

pub mod codec;
pub mod data;
pub mod error;
pub mod message;
pub mod version;

pub use codec::{decode, encode, read_frame, write_frame, MAX_MESSAGE_SIZE};
pub use data::{
    AuthenticatedData, DataFilter, DataKey, GossipResult, MailboxMessage, MailboxPayload,
    MetaData, NetworkData, NetworkPayload, RemoveDataRequest, RequestInventoryResult,
    MAX_DATA_SIZE,
};
pub use error::ProtocolError;
pub use message::{
    AccessToken, ApplicationMessage, CapabilityRequest, CapabilityResponse, ConfidentialMessage,
    GuardedMessage, InventoryRequest, InventoryResponse, Message, PeerExchangeRequest,
    PeerExchangeResponse, RelayMessage, ReportedPeer,
};
pub use version::PROTOCOL_VERSION;
