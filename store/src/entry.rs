//! What a storage slot holds.

use tradenet_protocol::AuthenticatedData;
use tradenet_types::{PublicKey, Timestamp};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoredValue {
    Data(AuthenticatedData),
    /// Left behind by a removal; blocks older adds until it expires.
    Tombstone { owner: PublicKey },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub value: StoredValue,
    pub sequence_number: u64,
    pub ttl_millis: u64,
    pub received_at: Timestamp,
}

impl Entry {
    pub fn data(data: AuthenticatedData, received_at: Timestamp) -> Self {
        Self {
            sequence_number: data.sequence_number,
            ttl_millis: data.data.meta.ttl_millis,
            value: StoredValue::Data(data),
            received_at,
        }
    }

    pub fn tombstone(owner: PublicKey, sequence_number: u64, ttl_millis: u64, received_at: Timestamp) -> Self {
        Self {
            value: StoredValue::Tombstone { owner },
            sequence_number,
            ttl_millis,
            received_at,
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.received_at.has_expired(self.ttl_millis, now)
    }

    pub fn owner(&self) -> &PublicKey {
        match &self.value {
            StoredValue::Data(data) => &data.owner,
            StoredValue::Tombstone { owner } => owner,
        }
    }

    pub fn as_data(&self) -> Option<&AuthenticatedData> {
        match &self.value {
            StoredValue::Data(data) => Some(data),
            StoredValue::Tombstone { .. } => None,
        }
    }
}
