//! Gossiped data: payloads, ownership signatures, storage keys and filters.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tradenet_crypto::{
    blake2b_256, seal, sign_message, tagged_hash, unseal, verify_signature, Domain, Sealed,
};
use tradenet_types::{KeyPair, PublicKey, Signature};

use crate::message::Message;
use crate::ProtocolError;

/// Hard cap on a serialized payload regardless of what its metadata allows.
pub const MAX_DATA_SIZE: usize = 1024 * 1024; // 1 MiB

/// Storage parameters that travel unencrypted with every entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetaData {
    pub ttl_millis: u64,
    pub max_size_bytes: u64,
    /// Storage namespace the entry belongs to.
    pub file_name: String,
}

impl MetaData {
    pub fn new(ttl_millis: u64, max_size_bytes: u64, file_name: impl Into<String>) -> Self {
        Self {
            ttl_millis,
            max_size_bytes,
            file_name: file_name.into(),
        }
    }
}

/// Stable identity of a data entry across versions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DataKey(pub [u8; 32]);

impl DataKey {
    /// Digest of `(owner, file_name, id)`.
    pub fn new(owner: &PublicKey, file_name: &str, id: &str) -> Self {
        Self(tagged_hash(
            Domain::DataKey,
            &[owner.as_bytes(), file_name.as_bytes(), id.as_bytes()],
        ))
    }
}

impl fmt::Display for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// A message left for an offline recipient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxMessage {
    pub message: Message,
}

/// A [`MailboxMessage`] sealed for its recipient. Storage only ever sees
/// the ciphertext; TTL and size limits come from the enclosing [`NetworkData`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxPayload {
    pub sealed: Sealed,
}

impl MailboxPayload {
    pub fn seal(
        message: &MailboxMessage,
        recipient: &PublicKey,
        sender: &KeyPair,
    ) -> Result<Self, ProtocolError> {
        let bytes =
            bincode::serialize(message).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        Ok(Self {
            sealed: seal(&bytes, recipient, sender)?,
        })
    }

    /// Open the payload with our identity; fails unless addressed to us.
    pub fn open(&self, recipient: &KeyPair) -> Result<MailboxMessage, ProtocolError> {
        let bytes = unseal(&self.sealed, recipient)?;
        bincode::deserialize(&bytes).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkPayload {
    Public(Vec<u8>),
    Mailbox(MailboxPayload),
}

/// An application data entry before ownership is attached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkData {
    pub id: String,
    pub payload: NetworkPayload,
    pub meta: MetaData,
}

impl NetworkData {
    pub fn public(id: impl Into<String>, payload: Vec<u8>, meta: MetaData) -> Self {
        Self {
            id: id.into(),
            payload: NetworkPayload::Public(payload),
            meta,
        }
    }

    pub fn key(&self, owner: &PublicKey) -> DataKey {
        DataKey::new(owner, &self.meta.file_name, &self.id)
    }

    pub fn is_mailbox(&self) -> bool {
        matches!(self.payload, NetworkPayload::Mailbox(_))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serialize(self).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

/// A [`NetworkData`] signed by its owner at a sequence number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedData {
    pub data: NetworkData,
    pub sequence_number: u64,
    pub owner: PublicKey,
    pub signature: Signature,
}

fn add_digest(key: &DataKey, sequence_number: u64, data_hash: &[u8; 32]) -> [u8; 32] {
    tagged_hash(Domain::AddData, &[&key.0, &sequence_number.to_be_bytes(), data_hash])
}

fn remove_digest(key: &DataKey, sequence_number: u64) -> [u8; 32] {
    tagged_hash(Domain::RemoveData, &[&key.0, &sequence_number.to_be_bytes()])
}

impl AuthenticatedData {
    /// Sign `(data key, sequence number, data hash)` with the owner's identity.
    pub fn sign(
        data: NetworkData,
        sequence_number: u64,
        owner: &KeyPair,
    ) -> Result<Self, ProtocolError> {
        let key = data.key(&owner.public);
        let digest = add_digest(&key, sequence_number, &blake2b_256(&data.to_bytes()?));
        Ok(Self {
            signature: sign_message(&digest, &owner.private),
            data,
            sequence_number,
            owner: owner.public,
        })
    }

    pub fn key(&self) -> DataKey {
        self.data.key(&self.owner)
    }

    /// Whether the owner signature covers this exact payload and sequence.
    pub fn verify(&self) -> bool {
        let Ok(bytes) = self.data.to_bytes() else {
            return false;
        };
        let digest = add_digest(&self.key(), self.sequence_number, &blake2b_256(&bytes));
        verify_signature(&digest, &self.signature, &self.owner)
    }
}

/// Owner-signed request to delete an entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveDataRequest {
    pub key: DataKey,
    pub sequence_number: u64,
    pub owner: PublicKey,
    pub signature: Signature,
}

impl RemoveDataRequest {
    pub fn sign(key: DataKey, sequence_number: u64, owner: &KeyPair) -> Self {
        Self {
            signature: sign_message(&remove_digest(&key, sequence_number), &owner.private),
            key,
            sequence_number,
            owner: owner.public,
        }
    }

    pub fn verify(&self) -> bool {
        verify_signature(
            &remove_digest(&self.key, self.sequence_number),
            &self.signature,
            &self.owner,
        )
    }
}

/// What an inventory requester wants and what it already has.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFilter {
    /// Storage namespaces of interest; empty means all.
    pub file_names: BTreeSet<String>,
    /// Entries the requester holds, with their sequence numbers.
    pub known: HashMap<DataKey, u64>,
}

impl DataFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_files<I, S>(file_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            file_names: file_names.into_iter().map(Into::into).collect(),
            known: HashMap::new(),
        }
    }

    pub fn matches_file(&self, file_name: &str) -> bool {
        self.file_names.is_empty() || self.file_names.contains(file_name)
    }

    /// The requester lacks this entry or holds an older version of it.
    pub fn wants(&self, entry: &AuthenticatedData) -> bool {
        if !self.matches_file(&entry.data.meta.file_name) {
            return false;
        }
        match self.known.get(&entry.key()) {
            Some(&known) => known < entry.sequence_number,
            None => true,
        }
    }
}

/// Outcome of applying an add or remove to storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GossipResult {
    Added,
    Ignored,
    Rejected,
}

impl GossipResult {
    pub fn is_added(&self) -> bool {
        matches!(self, GossipResult::Added)
    }
}

/// Outcome of an inventory round across all connected peers.
#[derive(Clone, Debug, Default)]
pub struct RequestInventoryResult {
    pub added: Vec<AuthenticatedData>,
    pub responded_peers: usize,
    pub failed_peers: usize,
}
