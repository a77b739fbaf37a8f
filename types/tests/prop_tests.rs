use proptest::prelude::*;

use tradenet_types::{Address, Capability, NetworkType, PublicKey, Signature, Timestamp};

fn arb_network_type() -> impl Strategy<Value = NetworkType> {
    prop_oneof![
        Just(NetworkType::Clear),
        Just(NetworkType::Tor),
        Just(NetworkType::I2p),
    ]
}

proptest! {
    /// Address display form parses back to the same address.
    #[test]
    fn address_parse_of_socket_string(
        host in "[a-z0-9]{1,20}(\\.[a-z]{2,6})?",
        port in any::<u16>(),
        network in arb_network_type(),
    ) {
        let addr = Address::new(host, port, network);
        let parsed = Address::parse(&addr.socket_string(), network).unwrap();
        prop_assert_eq!(parsed, addr);
    }

    /// Capability encodes canonically regardless of insertion order.
    #[test]
    fn capability_encoding_is_order_independent(
        networks in prop::collection::vec(arb_network_type(), 0..6),
        key in any::<[u8; 32]>(),
    ) {
        let forward = Capability::new(None, networks.clone(), PublicKey(key));
        let reversed = Capability::new(None, networks.into_iter().rev(), PublicKey(key));
        prop_assert_eq!(
            bincode::serialize(&forward).unwrap(),
            bincode::serialize(&reversed).unwrap()
        );
    }

    /// Signature bincode serialization roundtrip.
    #[test]
    fn signature_bincode_roundtrip(bytes in prop::collection::vec(any::<u8>(), 64)) {
        let mut arr = [0u8; 64];
        arr.copy_from_slice(&bytes);
        let sig = Signature(arr);
        let encoded = bincode::serialize(&sig).unwrap();
        let decoded: Signature = bincode::deserialize(&encoded).unwrap();
        prop_assert_eq!(decoded, sig);
    }

    /// An entry never counts as expired before its TTL has fully elapsed.
    #[test]
    fn not_expired_within_ttl(start in 0u64..1_000_000, ttl in 0u64..1_000_000, offset in 0u64..1_000_000) {
        let received = Timestamp::from_millis(start);
        let now = Timestamp::from_millis(start + offset);
        prop_assert_eq!(received.has_expired(ttl, now), offset > ttl);
    }
}
