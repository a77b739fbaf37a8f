use std::path::PathBuf;

use thiserror::Error;
use tradenet_types::{AddressError, NetworkType};

use crate::state::TransportState;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    #[error("SOCKS5 proxy error: {0}")]
    Socks(#[from] tokio_socks::Error),

    #[error("network type {0} not supported by this transport")]
    UnsupportedNetworkType(NetworkType),

    #[error("transport is {actual:?}, operation needs {expected}")]
    InvalidState {
        expected: &'static str,
        actual: TransportState,
    },

    #[error("hidden service hostname not available at {0}")]
    HostnameUnavailable(PathBuf),

    #[error("invalid address: {0}")]
    Address(#[from] AddressError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
