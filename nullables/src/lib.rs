//! Nullable infrastructure for deterministic testing.
//!
//! [`MemoryNetwork`] is an in-process switchboard; [`MemoryTransport`]s
//! attached to it behave like real transports (bind, dial, persisted
//! bindings, lifecycle) but never touch the operating system's network.
//! Each transport declares which network types it can reach, which lets
//! tests build topologies where only some peers can talk to others.

pub mod network;

pub use network::{MemoryNetwork, MemoryTransport};
