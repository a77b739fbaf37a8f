//! Request/response correlation by nonce.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::NetworkError;

struct Pending<T> {
    connection_id: u64,
    tx: oneshot::Sender<T>,
}

/// Maps outstanding request nonces to the task awaiting the response.
///
/// A response only completes a request if it arrives on the connection the
/// request was sent on.
pub struct RequestTracker<T> {
    pending: Mutex<HashMap<u64, Pending<T>>>,
}

impl<T> RequestTracker<T> {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate a fresh nonce for a request sent on `connection_id`.
    pub fn register(&self, connection_id: u64) -> (u64, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let mut nonce: u64 = rand::random();
        while pending.contains_key(&nonce) {
            nonce = rand::random();
        }
        pending.insert(nonce, Pending { connection_id, tx });
        (nonce, rx)
    }

    /// Deliver a response. Returns `false` for unknown nonces or a response
    /// from the wrong connection (the pending request is left untouched).
    pub fn complete(&self, nonce: u64, connection_id: u64, value: T) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        match pending.get(&nonce) {
            Some(p) if p.connection_id == connection_id => {}
            _ => return false,
        }
        match pending.remove(&nonce) {
            Some(p) => p.tx.send(value).is_ok(),
            None => false,
        }
    }

    pub fn cancel(&self, nonce: u64) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&nonce);
    }

    /// Fail every request waiting on a closed connection.
    pub fn cancel_connection(&self, connection_id: u64) -> usize {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let before = pending.len();
        pending.retain(|_, p| p.connection_id != connection_id);
        before - pending.len()
    }

    /// Await the response for `nonce`.
    pub async fn wait(
        &self,
        nonce: u64,
        rx: oneshot::Receiver<T>,
        timeout: Duration,
        what: &'static str,
    ) -> Result<T, NetworkError> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(NetworkError::ConnectionClosed),
            Err(_) => {
                self.cancel(nonce);
                Err(NetworkError::Timeout(what))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for RequestTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}
