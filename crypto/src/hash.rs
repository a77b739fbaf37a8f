//! Blake2b-256 digests with domain separation.
//!
//! Every digest the protocol signs or compares is computed under a
//! [`Domain`] tag, and each input part is length-prefixed, so a digest made
//! for one purpose can never be replayed as another and no two splits of
//! the same bytes collide.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

type Blake2b256 = Blake2b<U32>;

/// What a digest is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Domain {
    /// Storage key of a gossip entry.
    DataKey,
    /// Owner signature over an add-data operation.
    AddData,
    /// Owner signature over a remove-data operation.
    RemoveData,
    /// Per-connection access token from the capability handshake.
    AccessToken,
    /// Symmetric key for a sealed payload.
    SealKey,
    /// Sender signature over a sealed payload.
    SealSignature,
}

impl Domain {
    fn tag(self) -> &'static [u8] {
        match self {
            Domain::DataKey => b"tradenet/data-key/1",
            Domain::AddData => b"tradenet/add-data/1",
            Domain::RemoveData => b"tradenet/remove-data/1",
            Domain::AccessToken => b"tradenet/access-token/1",
            Domain::SealKey => b"tradenet/seal-key/1",
            Domain::SealSignature => b"tradenet/seal-signature/1",
        }
    }
}

/// Plain Blake2b-256 of `data`.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    Blake2b256::digest(data).into()
}

/// Digest of `parts` under `domain`.
pub fn tagged_hash(domain: Domain, parts: &[&[u8]]) -> [u8; 32] {
    let tag = domain.tag();
    let mut hasher = Blake2b256::new();
    hasher.update((tag.len() as u64).to_be_bytes());
    hasher.update(tag);
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_boundaries_matter() {
        assert_ne!(
            tagged_hash(Domain::DataKey, &[b"offers", b"42"]),
            tagged_hash(Domain::DataKey, &[b"offers4", b"2"]),
        );
        assert_ne!(
            tagged_hash(Domain::DataKey, &[b"offers42"]),
            tagged_hash(Domain::DataKey, &[b"offers", b"42"]),
        );
    }

    #[test]
    fn domains_never_share_digests() {
        let parts: &[&[u8]] = &[b"same", b"input"];
        assert_ne!(tagged_hash(Domain::AddData, parts), tagged_hash(Domain::RemoveData, parts));
        assert_ne!(tagged_hash(Domain::SealKey, parts), tagged_hash(Domain::SealSignature, parts));
    }

    #[test]
    fn tagged_hash_is_stable() {
        assert_eq!(
            tagged_hash(Domain::AccessToken, &[b"nonce"]),
            tagged_hash(Domain::AccessToken, &[b"nonce"]),
        );
        assert_ne!(blake2b_256(b""), [0u8; 32]);
    }
}
