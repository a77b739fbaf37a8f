//! Ed25519 signatures over node identities.
//!
//! Verification uses the strict rules: small-order keys and non-canonical
//! signatures are rejected, so a signed gossip entry has exactly one valid
//! signature per owner.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use tradenet_types::{PrivateKey, PublicKey, Signature};

pub fn sign_message(message: &[u8], private_key: &PrivateKey) -> Signature {
    Signature(SigningKey::from_bytes(&private_key.0).sign(message).to_bytes())
}

/// `false` for malformed keys and signatures as well as mismatches.
pub fn verify_signature(message: &[u8], signature: &Signature, public_key: &PublicKey) -> bool {
    VerifyingKey::from_bytes(&public_key.0)
        .map(|key| {
            key.verify_strict(message, &ed25519_dalek::Signature::from_bytes(&signature.0))
                .is_ok()
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::keypair_from_seed;

    #[test]
    fn owner_signature_verifies_only_for_owner_and_message() {
        let owner = keypair_from_seed(&[1; 32]);
        let other = keypair_from_seed(&[2; 32]);
        let signature = sign_message(b"sell 2 ETH seq 7", &owner.private);

        assert!(verify_signature(b"sell 2 ETH seq 7", &signature, &owner.public));
        assert!(!verify_signature(b"sell 2 ETH seq 8", &signature, &owner.public));
        assert!(!verify_signature(b"sell 2 ETH seq 7", &signature, &other.public));
    }

    #[test]
    fn garbage_key_or_signature_is_rejected() {
        let owner = keypair_from_seed(&[3; 32]);
        let signature = sign_message(b"m", &owner.private);
        assert!(!verify_signature(b"m", &signature, &PublicKey([0xFF; 32])));
        assert!(!verify_signature(b"m", &Signature([0; 64]), &owner.public));
    }

    #[test]
    fn small_order_key_is_rejected() {
        // The identity point: any signature "verifies" under lax rules.
        let mut identity = [0u8; 32];
        identity[0] = 1;
        assert!(!verify_signature(b"m", &Signature([0; 64]), &PublicKey(identity)));
    }
}
