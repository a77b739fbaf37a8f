//! Storage for gossiped data.
//!
//! Entries are keyed by [`DataKey`](tradenet_protocol::DataKey) and gated by
//! the owner's sequence number: a newer signed version replaces an older one,
//! a removal leaves a tombstone so replays of older versions stay out, and
//! everything expires after its TTL. The rest of the node talks to the
//! [`DataStore`] trait.

pub mod entry;
pub mod error;
pub mod memory;

pub use entry::{Entry, StoredValue};
pub use error::StoreError;
pub use memory::Storage;

use tradenet_protocol::{AuthenticatedData, DataFilter, DataKey, GossipResult, RemoveDataRequest};
use tradenet_types::Timestamp;

/// Sequence-gated storage of owner-signed entries.
pub trait DataStore: Send + Sync {
    /// Validate and apply an add. Invalid entries are `Rejected`, stale or
    /// repeated ones `Ignored`.
    fn add(&self, data: AuthenticatedData, now: Timestamp) -> GossipResult;

    /// Validate and apply a removal, leaving a tombstone.
    fn remove(&self, request: &RemoveDataRequest, now: Timestamp) -> GossipResult;

    /// Live entries the filter asks for.
    fn inventory(&self, filter: &DataFilter, now: Timestamp) -> Vec<AuthenticatedData>;

    /// Highest sequence number seen for `key`, tombstones included, while the
    /// entry is live.
    fn sequence_number(&self, key: &DataKey, now: Timestamp) -> Option<u64>;

    /// The live payload stored under `key` (not a tombstone).
    fn get(&self, key: &DataKey, now: Timestamp) -> Option<AuthenticatedData>;

    /// Sequence numbers of every live entry in the given namespaces, in the
    /// shape an inventory request advertises them.
    fn known(&self, filter: &DataFilter, now: Timestamp) -> Vec<(DataKey, u64)>;

    /// Drop expired entries and tombstones. Returns how many were removed.
    fn purge_expired(&self, now: Timestamp) -> usize;

    /// Number of stored entries, expired ones included until purged.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
