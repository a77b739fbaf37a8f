//! Cryptographic primitives for tradenet.
//!
//! - **Ed25519** node identities, signing and signature verification
//! - **Blake2b** domain-separated digests (data keys, access tokens, signatures)
//! - **X25519 + ChaCha20-Poly1305** hybrid sealing of confidential messages

pub mod error;
pub mod hash;
pub mod keys;
pub mod sealing;
pub mod sign;

pub use error::CryptoError;
pub use hash::{blake2b_256, tagged_hash, Domain};
pub use keys::{
    ed25519_private_to_x25519, ed25519_public_to_x25519, generate_keypair, keypair_from_seed,
};
pub use sealing::{seal, unseal, Sealed};
pub use sign::{sign_message, verify_signature};
