use proptest::prelude::*;

use tradenet_protocol::{
    decode, encode, ApplicationMessage, AuthenticatedData, Message, MetaData, NetworkData,
};
use tradenet_crypto::keypair_from_seed;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Any application message decodes from its own frame body.
    #[test]
    fn application_frame_roundtrip(
        topic in "[a-z]{0,16}",
        payload in prop::collection::vec(any::<u8>(), 0..4096),
    ) {
        let msg = Message::Application(ApplicationMessage { topic, payload });
        let frame = encode(&msg).unwrap();
        prop_assert_eq!(frame.len() - 4, u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize);
        prop_assert_eq!(decode(&frame[4..]).unwrap(), msg);
    }

    /// Signed data verifies, and survives the wire intact.
    #[test]
    fn signed_data_verifies_after_transport(
        seed in any::<[u8; 32]>(),
        id in "[a-z0-9]{1,12}",
        body in prop::collection::vec(any::<u8>(), 0..512),
        seq in 1u64..u64::MAX,
    ) {
        let owner = keypair_from_seed(&seed);
        let data = NetworkData::public(id, body, MetaData::new(1_000, 1_024, "offers"));
        let signed = AuthenticatedData::sign(data, seq, &owner).unwrap();
        let frame = encode(&Message::AddData(signed.clone())).unwrap();
        match decode(&frame[4..]).unwrap() {
            Message::AddData(received) => {
                prop_assert!(received.verify());
                prop_assert_eq!(received.key(), signed.key());
            }
            other => prop_assert!(false, "expected AddData, got {:?}", other),
        }
    }
}
