//! Node identities and the X25519 view of them used for sealing.

use ed25519_dalek::{SigningKey, VerifyingKey};
use tradenet_types::{KeyPair, PrivateKey, PublicKey};

/// A fresh identity from the OS-seeded thread RNG.
pub fn generate_keypair() -> KeyPair {
    keypair_from_seed(&rand::random())
}

pub fn keypair_from_seed(seed: &[u8; 32]) -> KeyPair {
    let signing = SigningKey::from_bytes(seed);
    KeyPair {
        public: PublicKey(signing.verifying_key().to_bytes()),
        private: PrivateKey(*seed),
    }
}

/// Montgomery form of an identity key; `None` if the bytes are not a
/// curve point.
pub fn ed25519_public_to_x25519(public: &[u8; 32]) -> Option<[u8; 32]> {
    VerifyingKey::from_bytes(public)
        .ok()
        .map(|key| key.to_montgomery().to_bytes())
}

/// The clamped scalar matching [`ed25519_public_to_x25519`] of the same
/// identity.
pub fn ed25519_private_to_x25519(private: &[u8; 32]) -> [u8; 32] {
    SigningKey::from_bytes(private).to_scalar_bytes()
}
