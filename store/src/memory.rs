//! In-memory [`DataStore`] sharded over a `DashMap`, so concurrent writers
//! to different keys do not contend and writes to one key are serialized.

use dashmap::mapref::entry::Entry as Slot;
use dashmap::DashMap;
use tradenet_protocol::{
    AuthenticatedData, DataFilter, DataKey, GossipResult, RemoveDataRequest, MAX_DATA_SIZE,
};
use tradenet_types::Timestamp;

use crate::entry::Entry;
use crate::{DataStore, StoreError};

#[derive(Default)]
pub struct Storage {
    entries: DashMap<DataKey, Entry>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Serialized size of the entry's data, checked against its own limit and
/// the global one.
pub fn checked_size(data: &AuthenticatedData) -> Result<usize, StoreError> {
    let size = data
        .data
        .to_bytes()
        .map_err(|e| StoreError::Serialization(e.to_string()))?
        .len();
    let max = usize::try_from(data.data.meta.max_size_bytes)
        .unwrap_or(usize::MAX)
        .min(MAX_DATA_SIZE);
    if size > max {
        return Err(StoreError::TooLarge { size, max });
    }
    Ok(size)
}

impl DataStore for Storage {
    fn add(&self, data: AuthenticatedData, now: Timestamp) -> GossipResult {
        let key = data.key();
        if !data.verify() {
            tracing::debug!(key = %key, "rejecting add: bad signature");
            return GossipResult::Rejected;
        }
        if data.data.meta.ttl_millis == 0 {
            tracing::debug!(key = %key, "rejecting add: zero ttl");
            return GossipResult::Rejected;
        }
        if let Err(e) = checked_size(&data) {
            tracing::debug!(key = %key, error = %e, "rejecting add");
            return GossipResult::Rejected;
        }

        match self.entries.entry(key) {
            Slot::Occupied(mut slot) => {
                let current = slot.get();
                if !current.is_expired(now) && current.sequence_number >= data.sequence_number {
                    return GossipResult::Ignored;
                }
                slot.insert(Entry::data(data, now));
            }
            Slot::Vacant(slot) => {
                slot.insert(Entry::data(data, now));
            }
        }
        GossipResult::Added
    }

    fn remove(&self, request: &RemoveDataRequest, now: Timestamp) -> GossipResult {
        if !request.verify() {
            tracing::debug!(key = %request.key, "rejecting remove: bad signature");
            return GossipResult::Rejected;
        }
        let Some(mut current) = self.entries.get_mut(&request.key) else {
            return GossipResult::Ignored;
        };
        if current.is_expired(now) || current.as_data().is_none() {
            return GossipResult::Ignored;
        }
        if current.owner() != &request.owner {
            tracing::debug!(key = %request.key, "rejecting remove: not the owner");
            return GossipResult::Rejected;
        }
        if request.sequence_number <= current.sequence_number {
            return GossipResult::Ignored;
        }

        let ttl_millis = current.ttl_millis;
        *current = Entry::tombstone(request.owner, request.sequence_number, ttl_millis, now);
        GossipResult::Added
    }

    fn inventory(&self, filter: &DataFilter, now: Timestamp) -> Vec<AuthenticatedData> {
        self.entries
            .iter()
            .filter(|e| !e.is_expired(now))
            .filter_map(|e| e.as_data().filter(|data| filter.wants(data)).cloned())
            .collect()
    }

    fn sequence_number(&self, key: &DataKey, now: Timestamp) -> Option<u64> {
        self.entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.sequence_number)
    }

    fn get(&self, key: &DataKey, now: Timestamp) -> Option<AuthenticatedData> {
        self.entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .and_then(|e| e.as_data().cloned())
    }

    fn known(&self, filter: &DataFilter, now: Timestamp) -> Vec<(DataKey, u64)> {
        self.entries
            .iter()
            .filter(|e| !e.is_expired(now))
            .filter(|e| {
                e.as_data()
                    .is_some_and(|data| filter.matches_file(&data.data.meta.file_name))
            })
            .map(|e| (*e.key(), e.sequence_number))
            .collect()
    }

    fn purge_expired(&self, now: Timestamp) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            tracing::debug!(purged, remaining = self.entries.len(), "purged expired entries");
        }
        purged
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradenet_crypto::generate_keypair;
    use tradenet_protocol::{MetaData, NetworkData};
    use tradenet_types::KeyPair;

    const TTL: u64 = 10_000;

    fn offer(body: &str) -> NetworkData {
        NetworkData::public("offer-1", body.as_bytes().to_vec(), MetaData::new(TTL, 1_000, "offers"))
    }

    fn signed(owner: &KeyPair, body: &str, seq: u64) -> AuthenticatedData {
        AuthenticatedData::sign(offer(body), seq, owner).unwrap()
    }

    fn at(ms: u64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    #[test]
    fn newer_sequence_replaces_older() {
        let owner = generate_keypair();
        let store = Storage::new();
        assert_eq!(store.add(signed(&owner, "v1", 1), at(0)), GossipResult::Added);
        assert_eq!(store.add(signed(&owner, "v2", 2), at(1)), GossipResult::Added);
        assert_eq!(store.add(signed(&owner, "v1", 1), at(2)), GossipResult::Ignored);
        assert_eq!(store.add(signed(&owner, "v2", 2), at(3)), GossipResult::Ignored);

        let key = offer("").key(&owner.public);
        assert_eq!(store.get(&key, at(4)).unwrap(), signed(&owner, "v2", 2));
        assert_eq!(store.sequence_number(&key, at(4)), Some(2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn invalid_entries_are_rejected() {
        let owner = generate_keypair();
        let store = Storage::new();

        let mut tampered = signed(&owner, "honest", 1);
        tampered.data = offer("forged");
        assert_eq!(store.add(tampered, at(0)), GossipResult::Rejected);

        let big = NetworkData::public("big", vec![0; 2_000], MetaData::new(TTL, 1_000, "offers"));
        let big = AuthenticatedData::sign(big, 1, &owner).unwrap();
        assert_eq!(store.add(big, at(0)), GossipResult::Rejected);

        let huge = NetworkData::public("huge", vec![0; MAX_DATA_SIZE + 1], MetaData::new(TTL, u64::MAX, "offers"));
        let huge = AuthenticatedData::sign(huge, 1, &owner).unwrap();
        assert_eq!(store.add(huge, at(0)), GossipResult::Rejected);

        let eternal = NetworkData::public("zero", vec![1], MetaData::new(0, 1_000, "offers"));
        let eternal = AuthenticatedData::sign(eternal, 1, &owner).unwrap();
        assert_eq!(store.add(eternal, at(0)), GossipResult::Rejected);

        assert!(store.is_empty());
    }

    #[test]
    fn removal_leaves_tombstone_that_blocks_replay() {
        let owner = generate_keypair();
        let store = Storage::new();
        store.add(signed(&owner, "v1", 1), at(0));
        let key = offer("").key(&owner.public);

        let stale = RemoveDataRequest::sign(key, 1, &owner);
        assert_eq!(store.remove(&stale, at(1)), GossipResult::Ignored);

        let remove = RemoveDataRequest::sign(key, 2, &owner);
        assert_eq!(store.remove(&remove, at(1)), GossipResult::Added);
        assert_eq!(store.get(&key, at(2)), None);
        assert_eq!(store.sequence_number(&key, at(2)), Some(2));

        assert_eq!(store.add(signed(&owner, "v1", 1), at(3)), GossipResult::Ignored);
        assert_eq!(store.remove(&remove, at(3)), GossipResult::Ignored);
        assert_eq!(store.add(signed(&owner, "v3", 3), at(4)), GossipResult::Added);
    }

    #[test]
    fn remove_checks_signature_and_owner() {
        let owner = generate_keypair();
        let other = generate_keypair();
        let store = Storage::new();
        store.add(signed(&owner, "v1", 1), at(0));
        let key = offer("").key(&owner.public);

        let mut forged = RemoveDataRequest::sign(key, 2, &owner);
        forged.sequence_number = 3;
        assert_eq!(store.remove(&forged, at(1)), GossipResult::Rejected);

        let foreign = RemoveDataRequest::sign(key, 2, &other);
        assert_eq!(store.remove(&foreign, at(1)), GossipResult::Rejected);

        let missing = RemoveDataRequest::sign(DataKey([7; 32]), 1, &owner);
        assert_eq!(store.remove(&missing, at(1)), GossipResult::Ignored);
        assert!(store.get(&key, at(1)).is_some());
    }

    #[test]
    fn expired_entries_count_as_absent() {
        let owner = generate_keypair();
        let store = Storage::new();
        store.add(signed(&owner, "v5", 5), at(0));
        let key = offer("").key(&owner.public);

        assert_eq!(store.inventory(&DataFilter::all(), at(TTL)).len(), 1);
        assert!(store.inventory(&DataFilter::all(), at(TTL + 1)).is_empty());
        assert_eq!(store.sequence_number(&key, at(TTL + 1)), None);

        // An older version is accepted again once the newer one has expired.
        assert_eq!(store.add(signed(&owner, "v1", 1), at(TTL + 1)), GossipResult::Added);
    }

    #[test]
    fn purge_reclaims_expired() {
        let owner = generate_keypair();
        let store = Storage::new();
        store.add(signed(&owner, "v1", 1), at(0));
        let fresh = NetworkData::public("other", vec![1], MetaData::new(TTL * 10, 1_000, "offers"));
        store.add(AuthenticatedData::sign(fresh, 1, &owner).unwrap(), at(0));

        assert_eq!(store.purge_expired(at(TTL)), 0);
        assert_eq!(store.purge_expired(at(TTL + 1)), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn inventory_honours_filter() {
        let alice = generate_keypair();
        let bob = generate_keypair();
        let store = Storage::new();
        let a1 = signed(&alice, "a", 1);
        let b3 = signed(&bob, "b", 3);
        let trade = AuthenticatedData::sign(
            NetworkData::public("t", vec![2], MetaData::new(TTL, 1_000, "trades")),
            1,
            &alice,
        )
        .unwrap();
        for data in [a1.clone(), b3.clone(), trade.clone()] {
            store.add(data, at(0));
        }

        assert_eq!(store.inventory(&DataFilter::all(), at(1)).len(), 3);

        let mut offers = DataFilter::for_files(["offers"]);
        assert_eq!(store.inventory(&offers, at(1)).len(), 2);

        offers.known.insert(a1.key(), 1);
        offers.known.insert(b3.key(), 2);
        assert_eq!(store.inventory(&offers, at(1)), vec![b3]);

        let mut known = store.known(&DataFilter::for_files(["trades"]), at(1));
        known.sort();
        assert_eq!(known, vec![(trade.key(), 1)]);
    }
}
