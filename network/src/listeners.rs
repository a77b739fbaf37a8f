//! Listener traits and the copy-on-iterate registry that holds them.
//!
//! Fan-out iterates over an `Arc` snapshot of the listener list, so a
//! listener may add or remove listeners (including itself) while being
//! called without deadlocking or invalidating the iteration.

use std::sync::{Arc, RwLock};

use tradenet_protocol::Message;
use tradenet_types::PublicKey;

use crate::connection::Connection;

/// Receives messages arriving on a connection.
pub trait MessageListener: Send + Sync {
    fn on_message(&self, message: &Message, connection: &Arc<Connection>);
}

/// Receives connection lifecycle events.
pub trait ConnectionListener: Send + Sync {
    fn on_handshake_complete(&self, _connection: &Arc<Connection>) {}

    fn on_disconnect(&self, _connection: &Arc<Connection>) {}
}

/// Receives decrypted confidential messages together with the
/// authenticated sender identity.
pub trait ConfidentialListener: Send + Sync {
    fn on_message(&self, message: &Message, sender: &PublicKey);
}

pub struct ListenerRegistry<T: ?Sized> {
    listeners: RwLock<Arc<Vec<Arc<T>>>>,
}

impl<T: ?Sized> ListenerRegistry<T> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn add(&self, listener: Arc<T>) {
        let mut guard = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        Arc::make_mut(&mut *guard).push(listener);
    }

    /// Remove by identity. Returns whether the listener was registered.
    pub fn remove(&self, listener: &Arc<T>) -> bool {
        let target = Arc::as_ptr(listener) as *const ();
        let mut guard = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = guard.len();
        Arc::make_mut(&mut *guard).retain(|l| Arc::as_ptr(l) as *const () != target);
        guard.len() != before
    }

    /// The current listeners. Later registrations do not affect the snapshot.
    pub fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        *self.listeners.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(Vec::new());
    }

    pub fn len(&self) -> usize {
        self.listeners.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: ?Sized> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Counter: Send + Sync {
        fn hit(&self);
    }

    struct Hits(AtomicUsize);

    impl Counter for Hits {
        fn hit(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn add_remove_by_identity() {
        let registry: ListenerRegistry<dyn Counter> = ListenerRegistry::new();
        let a: Arc<dyn Counter> = Arc::new(Hits(AtomicUsize::new(0)));
        let b: Arc<dyn Counter> = Arc::new(Hits(AtomicUsize::new(0)));
        registry.add(a.clone());
        registry.add(b.clone());
        assert_eq!(registry.len(), 2);

        assert!(registry.remove(&a));
        assert!(!registry.remove(&a));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn snapshot_is_stable_during_mutation() {
        let registry: ListenerRegistry<dyn Counter> = ListenerRegistry::new();
        let hits = Arc::new(Hits(AtomicUsize::new(0)));
        registry.add(hits.clone());

        let snapshot = registry.snapshot();
        registry.clear();
        for listener in snapshot.iter() {
            listener.hit();
        }
        assert_eq!(hits.0.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }
}
