//! Transport lifecycle state machine.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::TransportError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum TransportState {
    NotStarted = 0,
    Initialized = 1,
    ServerSocketCreated = 2,
    ShuttingDown = 3,
    ShutDown = 4,
}

impl TransportState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NotStarted,
            1 => Self::Initialized,
            2 => Self::ServerSocketCreated,
            3 => Self::ShuttingDown,
            _ => Self::ShutDown,
        }
    }

    /// Usable for binding and dialing.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Initialized | Self::ServerSocketCreated)
    }
}

/// Lock-free, forward-only lifecycle shared by all transports.
#[derive(Debug)]
pub struct StateMachine {
    state: AtomicU8,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(TransportState::NotStarted as u8),
        }
    }

    pub fn get(&self) -> TransportState {
        TransportState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `next` if it is ahead of the current state.
    /// Returns `false` (and changes nothing) otherwise.
    pub fn advance(&self, next: TransportState) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (next as u8 > current).then_some(next as u8)
            })
            .is_ok()
    }

    /// Error unless the transport is initialized and not shutting down.
    pub fn require_running(&self) -> Result<(), TransportError> {
        let actual = self.get();
        if actual.is_running() {
            Ok(())
        } else {
            Err(TransportError::InvalidState {
                expected: "initialized",
                actual,
            })
        }
    }

    /// Common shutdown sequence: returns `true` only for the first caller.
    pub fn begin_shutdown(&self) -> bool {
        self.advance(TransportState::ShuttingDown)
    }

    pub fn finish_shutdown(&self) {
        self.advance(TransportState::ShutDown);
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_only_move_forward() {
        let sm = StateMachine::new();
        assert_eq!(sm.get(), TransportState::NotStarted);
        assert!(sm.advance(TransportState::Initialized));
        assert!(sm.advance(TransportState::ServerSocketCreated));
        assert!(!sm.advance(TransportState::Initialized));
        assert_eq!(sm.get(), TransportState::ServerSocketCreated);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let sm = StateMachine::new();
        sm.advance(TransportState::Initialized);
        assert!(sm.begin_shutdown());
        assert!(!sm.begin_shutdown());
        sm.finish_shutdown();
        sm.finish_shutdown();
        assert_eq!(sm.get(), TransportState::ShutDown);
    }

    #[test]
    fn require_running_rejects_unstarted_and_stopped() {
        let sm = StateMachine::new();
        assert!(sm.require_running().is_err());
        sm.advance(TransportState::Initialized);
        assert!(sm.require_running().is_ok());
        sm.begin_shutdown();
        assert!(matches!(
            sm.require_running(),
            Err(TransportError::InvalidState {
                actual: TransportState::ShuttingDown,
                ..
            })
        ));
    }
}
