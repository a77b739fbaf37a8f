//! Peer endpoint addresses and the transport families they live on.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Transport family an [`Address`] belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NetworkType {
    /// Plain TCP over the public internet (or loopback in development).
    Clear,
    /// Tor onion services.
    Tor,
    /// I2P garlic routing.
    I2p,
}

impl NetworkType {
    /// Human-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Tor => "tor",
            Self::I2p => "i2p",
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must be host:port, got {0:?}")]
    MissingPort(String),

    #[error("invalid port in {0:?}")]
    InvalidPort(String),

    #[error("empty host in {0:?}")]
    EmptyHost(String),
}

/// A peer endpoint on one transport.
///
/// Two addresses with the same host and port but different network types are
/// distinct peers.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address {
    pub host: String,
    pub port: u16,
    pub network_type: NetworkType,
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16, network_type: NetworkType) -> Self {
        Self {
            host: host.into(),
            port,
            network_type,
        }
    }

    /// Clear-net address shorthand.
    pub fn clear(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, port, NetworkType::Clear)
    }

    /// Parse a `host:port` string on the given network.
    ///
    /// IPv6 hosts may be bracketed (`[::1]:8000`); the brackets are stripped.
    pub fn parse(s: &str, network_type: NetworkType) -> Result<Self, AddressError> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AddressError::MissingPort(s.to_string()))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| AddressError::InvalidPort(s.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(AddressError::EmptyHost(s.to_string()));
        }
        Ok(Self::new(host, port, network_type))
    }

    /// `host:port` form suitable for socket APIs.
    pub fn socket_string(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.socket_string(), self.network_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_host_and_port() {
        let addr = Address::parse("127.0.0.1:8000", NetworkType::Clear).unwrap();
        assert_eq!(addr, Address::clear("127.0.0.1", 8000));
    }

    #[test]
    fn parse_bracketed_ipv6() {
        let addr = Address::parse("[::1]:9000", NetworkType::Clear).unwrap();
        assert_eq!(addr.host, "::1");
        assert_eq!(addr.socket_string(), "[::1]:9000");
    }

    #[test]
    fn parse_rejects_missing_or_bad_port() {
        assert!(matches!(
            Address::parse("localhost", NetworkType::Clear),
            Err(AddressError::MissingPort(_))
        ));
        assert!(matches!(
            Address::parse("localhost:99999", NetworkType::Clear),
            Err(AddressError::InvalidPort(_))
        ));
        assert!(matches!(
            Address::parse(":80", NetworkType::Clear),
            Err(AddressError::EmptyHost(_))
        ));
    }

    #[test]
    fn same_endpoint_on_different_networks_is_distinct() {
        let clear = Address::new("abc.onion", 9999, NetworkType::Clear);
        let tor = Address::new("abc.onion", 9999, NetworkType::Tor);
        assert_ne!(clear, tor);
    }

    #[test]
    fn display_includes_network() {
        let addr = Address::new("abc.onion", 9999, NetworkType::Tor);
        assert_eq!(addr.to_string(), "abc.onion:9999/tor");
    }
}
