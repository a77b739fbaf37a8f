use thiserror::Error;
use tradenet_crypto::CryptoError;
use tradenet_protocol::ProtocolError;
use tradenet_transport::TransportError;
use tradenet_types::{Address, NetworkType};

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("handshake with {0} timed out")]
    HandshakeTimeout(String),

    #[error("no connected peer can relay to network type {0}")]
    NoRoute(NetworkType),

    #[error("no public key known for {0}")]
    UnknownRecipientKey(Address),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("server socket not initialized")]
    ServerNotInitialized,
}
