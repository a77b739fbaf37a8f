//! Hybrid sealing of confidential payloads.
//!
//! A fresh ephemeral X25519 secret is agreed against the recipient's
//! Ed25519 identity (converted to its Montgomery form), the shared secret
//! is hashed into a ChaCha20-Poly1305 key, and the sender signs the
//! ciphertext with its Ed25519 identity so the recipient learns who sent it.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use serde::{Deserialize, Serialize};
use tradenet_types::{KeyPair, PublicKey, Signature};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use crate::error::CryptoError;
use crate::hash::{tagged_hash, Domain};
use crate::keys::{ed25519_private_to_x25519, ed25519_public_to_x25519};
use crate::sign::{sign_message, verify_signature};

/// A payload encrypted to one recipient and signed by its sender.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sealed {
    pub sender: PublicKey,
    pub ephemeral_public: [u8; 32],
    pub nonce: [u8; 12],
    pub ciphertext: Vec<u8>,
    pub signature: Signature,
}

fn derive_key(shared: &[u8; 32], ephemeral_public: &[u8; 32], recipient_x: &[u8; 32]) -> [u8; 32] {
    tagged_hash(Domain::SealKey, &[shared, ephemeral_public, recipient_x])
}

fn signed_bytes(
    recipient: &PublicKey,
    ephemeral_public: &[u8; 32],
    nonce: &[u8; 12],
    ciphertext: &[u8],
) -> [u8; 32] {
    tagged_hash(Domain::SealSignature, &[
        recipient.as_bytes(),
        ephemeral_public,
        nonce,
        ciphertext,
    ])
}

/// Encrypt `plaintext` so that only the holder of `recipient`'s private key
/// can read it, signed with `sender`'s identity.
pub fn seal(plaintext: &[u8], recipient: &PublicKey, sender: &KeyPair) -> Result<Sealed, CryptoError> {
    let recipient_x =
        ed25519_public_to_x25519(recipient.as_bytes()).ok_or(CryptoError::InvalidPublicKey)?;

    let ephemeral = StaticSecret::from(rand::random::<[u8; 32]>());
    let ephemeral_public = X25519Public::from(&ephemeral).to_bytes();
    let shared = ephemeral.diffie_hellman(&X25519Public::from(recipient_x));

    let key = derive_key(shared.as_bytes(), &ephemeral_public, &recipient_x);
    let cipher = ChaCha20Poly1305::new_from_slice(&key).map_err(|_| CryptoError::SealFailed)?;

    let nonce: [u8; 12] = rand::random();
    let ciphertext = cipher
        .encrypt(&Nonce::from(nonce), plaintext)
        .map_err(|_| CryptoError::SealFailed)?;

    let digest = signed_bytes(recipient, &ephemeral_public, &nonce, &ciphertext);
    let signature = sign_message(&digest, &sender.private);

    Ok(Sealed {
        sender: sender.public,
        ephemeral_public,
        nonce,
        ciphertext,
        signature,
    })
}

/// Verify and decrypt a sealed payload addressed to `recipient`.
///
/// Fails with [`CryptoError::InvalidSignature`] if the sender signature does
/// not cover this ciphertext for this recipient, and with
/// [`CryptoError::UnsealFailed`] if the AEAD check fails.
pub fn unseal(sealed: &Sealed, recipient: &KeyPair) -> Result<Vec<u8>, CryptoError> {
    let digest = signed_bytes(
        &recipient.public,
        &sealed.ephemeral_public,
        &sealed.nonce,
        &sealed.ciphertext,
    );
    if !verify_signature(&digest, &sealed.signature, &sealed.sender) {
        return Err(CryptoError::InvalidSignature);
    }

    let recipient_x = ed25519_public_to_x25519(recipient.public.as_bytes())
        .ok_or(CryptoError::InvalidPublicKey)?;
    let secret = StaticSecret::from(ed25519_private_to_x25519(&recipient.private.0));
    let shared = secret.diffie_hellman(&X25519Public::from(sealed.ephemeral_public));

    let key = derive_key(shared.as_bytes(), &sealed.ephemeral_public, &recipient_x);
    let cipher = ChaCha20Poly1305::new_from_slice(&key).map_err(|_| CryptoError::UnsealFailed)?;

    cipher
        .decrypt(&Nonce::from(sealed.nonce), sealed.ciphertext.as_ref())
        .map_err(|_| CryptoError::UnsealFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_keypair;

    #[test]
    fn seal_unseal_roundtrip() {
        let alice = generate_keypair();
        let bob = generate_keypair();

        let sealed = seal(b"take offer 7", &bob.public, &alice).unwrap();
        assert_eq!(sealed.sender, alice.public);
        // plaintext + 16-byte Poly1305 tag
        assert_eq!(sealed.ciphertext.len(), b"take offer 7".len() + 16);

        let opened = unseal(&sealed, &bob).unwrap();
        assert_eq!(opened, b"take offer 7");
    }

    #[test]
    fn sealing_twice_differs() {
        let alice = generate_keypair();
        let bob = generate_keypair();
        let a = seal(b"same", &bob.public, &alice).unwrap();
        let b = seal(b"same", &bob.public, &alice).unwrap();
        assert_ne!(a.ciphertext, b.ciphertext);
        assert_ne!(a.ephemeral_public, b.ephemeral_public);
    }

    #[test]
    fn wrong_recipient_fails() {
        let alice = generate_keypair();
        let bob = generate_keypair();
        let carol = generate_keypair();

        let sealed = seal(b"for bob only", &bob.public, &alice).unwrap();
        // The signature binds the intended recipient.
        assert_eq!(unseal(&sealed, &carol), Err(CryptoError::InvalidSignature));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let alice = generate_keypair();
        let bob = generate_keypair();

        let mut sealed = seal(b"payload", &bob.public, &alice).unwrap();
        sealed.ciphertext[0] ^= 0xFF;
        assert_eq!(unseal(&sealed, &bob), Err(CryptoError::InvalidSignature));
    }

    #[test]
    fn forged_sender_fails() {
        let alice = generate_keypair();
        let bob = generate_keypair();
        let mallory = generate_keypair();

        let mut sealed = seal(b"payload", &bob.public, &alice).unwrap();
        sealed.sender = mallory.public;
        assert_eq!(unseal(&sealed, &bob), Err(CryptoError::InvalidSignature));
    }

    #[test]
    fn resigned_tampering_fails_aead() {
        let alice = generate_keypair();
        let bob = generate_keypair();

        let mut sealed = seal(b"payload", &bob.public, &alice).unwrap();
        sealed.ciphertext[0] ^= 0xFF;
        let digest = signed_bytes(
            &bob.public,
            &sealed.ephemeral_public,
            &sealed.nonce,
            &sealed.ciphertext,
        );
        sealed.signature = sign_message(&digest, &alice.private);
        assert_eq!(unseal(&sealed, &bob), Err(CryptoError::UnsealFailed));
    }
}
