//! Clear-net TCP transport.

use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tradenet_types::{Address, NetworkType};

use crate::binding::ServerBinding;
use crate::state::{StateMachine, TransportState};
use crate::{Acceptor, BoxedStream, ServerSocket, Transport, TransportError};

struct TcpAcceptor {
    listener: TcpListener,
}

#[async_trait]
impl Acceptor for TcpAcceptor {
    async fn accept(&mut self) -> io::Result<(BoxedStream, String)> {
        let (stream, remote) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        Ok((Box::new(stream), remote.to_string()))
    }
}

/// Plain TCP on `host`. Port 0 binds an ephemeral port; the persisted
/// binding records the port actually assigned.
pub struct ClearNetTransport {
    host: String,
    binding: ServerBinding,
    state: StateMachine,
}

impl ClearNetTransport {
    pub fn new(host: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            binding: ServerBinding::new(base_dir, NetworkType::Clear),
            state: StateMachine::new(),
        }
    }
}

#[async_trait]
impl Transport for ClearNetTransport {
    async fn initialize(&self) -> Result<(), TransportError> {
        if self.state.advance(TransportState::Initialized) {
            tracing::info!(host = %self.host, "clear-net transport initialized");
        }
        self.state.require_running()
    }

    async fn get_server_socket(
        &self,
        server_id: &str,
        port: u16,
    ) -> Result<ServerSocket, TransportError> {
        self.state.require_running()?;

        let requested = Address::clear(self.host.clone(), port).socket_string();
        let listener = TcpListener::bind(&requested)
            .await
            .map_err(|source| TransportError::Bind {
                address: requested.clone(),
                source,
            })?;
        let bound_port = listener.local_addr()?.port();
        let address = Address::clear(self.host.clone(), bound_port);

        self.binding.persist(server_id, &address)?;
        self.state.advance(TransportState::ServerSocketCreated);
        tracing::info!(server_id, address = %address, "clear-net server socket bound");

        Ok(ServerSocket::new(Box::new(TcpAcceptor { listener }), address))
    }

    async fn get_socket(&self, address: &Address) -> Result<BoxedStream, TransportError> {
        self.state.require_running()?;
        if address.network_type != NetworkType::Clear {
            return Err(TransportError::UnsupportedNetworkType(address.network_type));
        }

        let target = address.socket_string();
        let stream = TcpStream::connect(&target)
            .await
            .map_err(|source| TransportError::Connect {
                address: target,
                source,
            })?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }

    fn get_server_address(&self, server_id: &str) -> Option<Address> {
        self.binding.load(server_id)
    }

    async fn shutdown(&self) {
        if self.state.begin_shutdown() {
            self.state.finish_shutdown();
            tracing::info!("clear-net transport shut down");
        }
    }

    fn state(&self) -> TransportState {
        self.state.get()
    }

    fn supported_network_types(&self) -> BTreeSet<NetworkType> {
        BTreeSet::from([NetworkType::Clear])
    }
}
