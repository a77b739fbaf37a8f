//! Fundamental types for the tradenet P2P layer.
//!
//! This crate defines the types shared across every other crate in the
//! workspace: peer addresses, network types, capabilities, key material and
//! time helpers.

pub mod address;
pub mod capability;
pub mod keys;
pub mod time;

pub use address::{Address, AddressError, NetworkType};
pub use capability::Capability;
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use time::{unix_now_millis, Timestamp};
