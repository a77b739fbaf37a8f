use proptest::prelude::*;

use tradenet_crypto::{
    keypair_from_seed, seal, sign_message, tagged_hash, unseal, verify_signature, Domain,
};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Sealed payloads open to the original bytes for the intended recipient.
    #[test]
    fn seal_unseal_roundtrip(
        payload in prop::collection::vec(any::<u8>(), 0..2048),
        sender_seed in any::<[u8; 32]>(),
        recipient_seed in any::<[u8; 32]>(),
    ) {
        let sender = keypair_from_seed(&sender_seed);
        let recipient = keypair_from_seed(&recipient_seed);
        let sealed = seal(&payload, &recipient.public, &sender).unwrap();
        prop_assert_eq!(sealed.sender, sender.public);
        prop_assert_eq!(unseal(&sealed, &recipient).unwrap(), payload);
    }

    /// Signatures verify for the signed bytes.
    #[test]
    fn sign_verify(message in prop::collection::vec(any::<u8>(), 0..512), seed in any::<[u8; 32]>()) {
        let kp = keypair_from_seed(&seed);
        let sig = sign_message(&message, &kp.private);
        prop_assert!(verify_signature(&message, &sig, &kp.public));
    }

    /// Moving bytes from one part to the next changes the digest.
    #[test]
    fn tagged_hash_separates_parts(
        a in prop::collection::vec(any::<u8>(), 1..64),
        b in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let mut shifted_b = vec![a[a.len() - 1]];
        shifted_b.extend_from_slice(&b);
        let shifted_a = &a[..a.len() - 1];
        prop_assert_ne!(
            tagged_hash(Domain::DataKey, &[&a, &b]),
            tagged_hash(Domain::DataKey, &[shifted_a, &shifted_b]),
        );
    }
}
