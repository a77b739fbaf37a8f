//! Tor transport on top of an externally managed Tor daemon.
//!
//! Tor is configured with one hidden service per server id, mapping
//! [`DEFAULT_ONION_PORT`] to a local port, and writes the onion hostname to
//! `<hidden_service_dir>/<server_id>/hostname`. Outbound streams go through
//! Tor's SOCKS5 proxy with domain-name CONNECT requests.

use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio_socks::tcp::Socks5Stream;
use tradenet_types::{Address, NetworkType};

use crate::binding::ServerBinding;
use crate::state::{StateMachine, TransportState};
use crate::{Acceptor, BoxedStream, ServerSocket, Transport, TransportError};

/// Virtual port every hidden service exposes.
pub const DEFAULT_ONION_PORT: u16 = 9999;

struct OnionAcceptor {
    listener: TcpListener,
}

#[async_trait]
impl Acceptor for OnionAcceptor {
    async fn accept(&mut self) -> io::Result<(BoxedStream, String)> {
        // Tor delivers every inbound circuit from loopback.
        let (stream, remote) = self.listener.accept().await?;
        Ok((Box::new(stream), format!("tor-circuit via {remote}")))
    }
}

pub struct TorTransport {
    socks_proxy: String,
    hidden_service_dir: PathBuf,
    binding: ServerBinding,
    state: StateMachine,
}

impl TorTransport {
    pub fn new(
        socks_proxy: impl Into<String>,
        hidden_service_dir: impl Into<PathBuf>,
        base_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            socks_proxy: socks_proxy.into(),
            hidden_service_dir: hidden_service_dir.into(),
            binding: ServerBinding::new(base_dir, NetworkType::Tor),
            state: StateMachine::new(),
        }
    }

    fn read_onion_hostname(&self, server_id: &str) -> Result<String, TransportError> {
        let path = self.hidden_service_dir.join(server_id).join("hostname");
        let hostname = std::fs::read_to_string(&path)
            .map_err(|_| TransportError::HostnameUnavailable(path.clone()))?;
        let hostname = hostname.trim();
        if hostname.is_empty() {
            return Err(TransportError::HostnameUnavailable(path));
        }
        Ok(hostname.to_string())
    }
}

#[async_trait]
impl Transport for TorTransport {
    async fn initialize(&self) -> Result<(), TransportError> {
        let state = self.state.get();
        if state.is_running() {
            return Ok(());
        }
        if state != TransportState::NotStarted {
            return self.state.require_running();
        }

        // Reach the proxy once so a missing Tor daemon fails fast.
        TcpStream::connect(&self.socks_proxy)
            .await
            .map_err(|source| TransportError::Connect {
                address: self.socks_proxy.clone(),
                source,
            })?;
        self.state.advance(TransportState::Initialized);
        tracing::info!(proxy = %self.socks_proxy, "tor transport initialized");
        self.state.require_running()
    }

    async fn get_server_socket(
        &self,
        server_id: &str,
        port: u16,
    ) -> Result<ServerSocket, TransportError> {
        self.state.require_running()?;

        let local = format!("127.0.0.1:{port}");
        let listener = TcpListener::bind(&local)
            .await
            .map_err(|source| TransportError::Bind {
                address: local.clone(),
                source,
            })?;
        let hostname = self.read_onion_hostname(server_id)?;
        let address = Address::new(hostname, DEFAULT_ONION_PORT, NetworkType::Tor);

        self.binding.persist(server_id, &address)?;
        self.state.advance(TransportState::ServerSocketCreated);
        tracing::info!(server_id, address = %address, local = %local, "hidden service socket bound");

        Ok(ServerSocket::new(
            Box::new(OnionAcceptor { listener }),
            address,
        ))
    }

    async fn get_socket(&self, address: &Address) -> Result<BoxedStream, TransportError> {
        self.state.require_running()?;
        if address.network_type != NetworkType::Tor {
            return Err(TransportError::UnsupportedNetworkType(address.network_type));
        }
        let stream = socks5_connect(&self.socks_proxy, &address.host, address.port).await?;
        Ok(Box::new(stream))
    }

    fn get_server_address(&self, server_id: &str) -> Option<Address> {
        self.binding.load(server_id)
    }

    async fn shutdown(&self) {
        if self.state.begin_shutdown() {
            self.state.finish_shutdown();
            tracing::info!("tor transport shut down");
        }
    }

    fn state(&self) -> TransportState {
        self.state.get()
    }

    fn supported_network_types(&self) -> BTreeSet<NetworkType> {
        BTreeSet::from([NetworkType::Tor])
    }
}

/// Open a stream to `host:port` through a SOCKS5 proxy. The hostname goes
/// to the proxy unresolved, so onion names never touch local DNS.
pub async fn socks5_connect(proxy: &str, host: &str, port: u16) -> Result<TcpStream, TransportError> {
    let stream = Socks5Stream::connect(proxy, (host, port)).await?;
    tracing::debug!(host, port, "SOCKS5 stream established");
    Ok(stream.into_inner())
}
