//! Hook for counting network events without depending on a metrics crate.

/// Receives network events. Every method defaults to a no-op.
pub trait NetworkObserver: Send + Sync {
    fn message_sent(&self, _kind: &'static str) {}

    fn message_received(&self, _kind: &'static str) {}

    /// A message failed the access guard and was dropped.
    fn unauthorized_dropped(&self) {}

    fn relay_forwarded(&self) {}

    fn connections_changed(&self, _count: usize) {}

    fn peers_changed(&self, _count: usize) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl NetworkObserver for NoopObserver {}
