use proptest::prelude::*;

use tradenet_crypto::keypair_from_seed;
use tradenet_protocol::{AuthenticatedData, DataFilter, GossipResult, MetaData, NetworkData};
use tradenet_store::{DataStore, Storage};
use tradenet_types::{KeyPair, Timestamp};

fn version(owner: &KeyPair, seq: u64) -> AuthenticatedData {
    let data = NetworkData::public("offer", seq.to_be_bytes().to_vec(), MetaData::new(60_000, 1_000, "offers"));
    AuthenticatedData::sign(data, seq, owner).unwrap()
}

proptest! {
    /// Two versions of one key: the higher sequence number always wins,
    /// whatever order they arrive in.
    #[test]
    fn higher_sequence_wins(seed in any::<[u8; 32]>(), s1 in 0u64..1_000, delta in 1u64..1_000) {
        let owner = keypair_from_seed(&seed);
        let s2 = s1 + delta;
        let now = Timestamp::from_millis(0);

        let in_order = Storage::new();
        prop_assert_eq!(in_order.add(version(&owner, s1), now), GossipResult::Added);
        prop_assert_eq!(in_order.add(version(&owner, s2), now), GossipResult::Added);

        let reversed = Storage::new();
        prop_assert_eq!(reversed.add(version(&owner, s2), now), GossipResult::Added);
        prop_assert_eq!(reversed.add(version(&owner, s1), now), GossipResult::Ignored);

        let key = version(&owner, s2).key();
        prop_assert_eq!(in_order.get(&key, now), Some(version(&owner, s2)));
        prop_assert_eq!(reversed.get(&key, now), Some(version(&owner, s2)));
    }

    /// Whatever arrives, the stored sequence number never goes down and
    /// there is never more than one entry per key.
    #[test]
    fn stored_sequence_is_monotonic(seed in any::<[u8; 32]>(), seqs in prop::collection::vec(0u64..50, 1..20)) {
        let owner = keypair_from_seed(&seed);
        let store = Storage::new();
        let now = Timestamp::from_millis(0);
        let key = version(&owner, 0).key();
        let mut highest: Option<u64> = None;

        for seq in seqs {
            store.add(version(&owner, seq), now);
            let stored = store.sequence_number(&key, now);
            prop_assert!(stored >= highest);
            highest = stored;
            prop_assert_eq!(store.len(), 1);
            prop_assert_eq!(store.inventory(&DataFilter::all(), now).len(), 1);
        }
    }
}
