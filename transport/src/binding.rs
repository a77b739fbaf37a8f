//! Persisted server bindings.
//!
//! Each transport records the address a server id was bound to as a single
//! `host:port` line at `<base_dir>/<scope>/<server_id>/hostname`, so a node
//! can learn its own address after a restart without binding again.

use std::fs;
use std::path::PathBuf;

use tradenet_types::{Address, NetworkType};

use crate::TransportError;

const HOSTNAME_FILE: &str = "hostname";

#[derive(Clone, Debug)]
pub struct ServerBinding {
    dir: PathBuf,
    network_type: NetworkType,
}

impl ServerBinding {
    /// Bindings for `network_type` under `<base_dir>/<network_type>/`.
    pub fn new(base_dir: impl Into<PathBuf>, network_type: NetworkType) -> Self {
        Self {
            dir: base_dir.into().join(network_type.as_str()),
            network_type,
        }
    }

    pub fn path(&self, server_id: &str) -> PathBuf {
        self.dir.join(server_id).join(HOSTNAME_FILE)
    }

    pub fn persist(&self, server_id: &str, address: &Address) -> Result<(), TransportError> {
        let path = self.path(server_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, format!("{}\n", address.socket_string()))?;
        tracing::debug!(server_id, address = %address, path = %path.display(), "persisted server binding");
        Ok(())
    }

    /// Read a previously persisted binding. Missing or unreadable records
    /// yield `None`.
    pub fn load(&self, server_id: &str) -> Option<Address> {
        let path = self.path(server_id);
        let contents = fs::read_to_string(&path).ok()?;
        match Address::parse(contents.trim(), self.network_type) {
            Ok(address) => Some(address),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt server binding");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let binding = ServerBinding::new(dir.path(), NetworkType::Clear);
        let address = Address::clear("127.0.0.1", 8123);

        binding.persist("alice", &address).unwrap();
        assert_eq!(binding.load("alice"), Some(address));
        assert!(binding.path("alice").ends_with("clear/alice/hostname"));
    }

    #[test]
    fn load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let binding = ServerBinding::new(dir.path(), NetworkType::Tor);
        assert_eq!(binding.load("bob"), None);
    }

    #[test]
    fn corrupt_record_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let binding = ServerBinding::new(dir.path(), NetworkType::Clear);
        let path = binding.path("carol");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "no-port-here").unwrap();
        assert_eq!(binding.load("carol"), None);
    }

    #[test]
    fn network_types_are_scoped_separately() {
        let dir = tempfile::tempdir().unwrap();
        let clear = ServerBinding::new(dir.path(), NetworkType::Clear);
        let tor = ServerBinding::new(dir.path(), NetworkType::Tor);
        clear.persist("alice", &Address::clear("127.0.0.1", 1)).unwrap();
        assert_eq!(tor.load("alice"), None);
    }
}
