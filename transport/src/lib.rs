//! Socket providers for the tradenet P2P layer.
//!
//! A [`Transport`] hands out listening sockets and outbound streams for one
//! or more network types. Everything above this crate sees only
//! [`BoxedStream`]s and [`Address`]es, so clear-net, Tor and in-memory
//! transports are interchangeable.

pub mod binding;
pub mod clear;
pub mod error;
pub mod state;
pub mod tor;

use std::collections::BTreeSet;
use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tradenet_types::{Address, NetworkType};

pub use binding::ServerBinding;
pub use clear::ClearNetTransport;
pub use error::TransportError;
pub use state::{StateMachine, TransportState};
pub use tor::{TorTransport, DEFAULT_ONION_PORT};

/// A bidirectional byte stream to one peer.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

pub type BoxedStream = Box<dyn AsyncStream>;

/// Accepts inbound streams for a bound server socket.
#[async_trait]
pub trait Acceptor: Send {
    /// Wait for the next inbound stream. The string describes the remote end
    /// for logging only; it is not a routable address.
    async fn accept(&mut self) -> io::Result<(BoxedStream, String)>;
}

/// A bound listening socket together with the address peers reach it on.
pub struct ServerSocket {
    acceptor: Box<dyn Acceptor>,
    address: Address,
}

impl ServerSocket {
    pub fn new(acceptor: Box<dyn Acceptor>, address: Address) -> Self {
        Self { acceptor, address }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub async fn accept(&mut self) -> io::Result<(BoxedStream, String)> {
        self.acceptor.accept().await
    }
}

/// A socket provider for one family of networks.
///
/// Lifecycle: `NotStarted → Initialized → ServerSocketCreated →
/// ShuttingDown → ShutDown`. Transitions only move forward.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Prepare the transport (start or check the underlying network).
    async fn initialize(&self) -> Result<(), TransportError>;

    /// Bind a server socket for `server_id` and persist its address.
    async fn get_server_socket(
        &self,
        server_id: &str,
        port: u16,
    ) -> Result<ServerSocket, TransportError>;

    /// Open an outbound stream to `address`.
    async fn get_socket(&self, address: &Address) -> Result<BoxedStream, TransportError>;

    /// The persisted address of `server_id`, without re-binding.
    fn get_server_address(&self, server_id: &str) -> Option<Address>;

    /// Idempotent.
    async fn shutdown(&self);

    fn state(&self) -> TransportState;

    fn supported_network_types(&self) -> BTreeSet<NetworkType>;
}
