use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("network error: {0}")]
    Network(#[from] tradenet_network::NetworkError),

    #[error("transport error: {0}")]
    Transport(#[from] tradenet_transport::TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] tradenet_protocol::ProtocolError),

    #[error("store error: {0}")]
    Store(#[from] tradenet_store::StoreError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("logging already initialized: {0}")]
    Logging(String),

    #[error("node not initialized")]
    NotInitialized,

    #[error("node is shut down")]
    ShutDown,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
