//! Shutdown signal for the node's background tasks.
//!
//! Tasks call [`ShutdownController::subscribe`] and `select!` on the
//! receiver alongside their main loop; [`ShutdownController::shutdown`]
//! wakes all of them.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;

pub struct ShutdownController {
    tx: broadcast::Sender<()>,
    triggered: AtomicBool,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: AtomicBool::new(false),
        }
    }

    /// Get a receiver that will be notified on shutdown.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger shutdown. Returns `false` if it was already triggered.
    pub fn shutdown(&self) -> bool {
        if self.triggered.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _ = self.tx.send(());
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wakes_a_task_blocked_in_select() {
        let controller = ShutdownController::new();
        let mut rx = controller.subscribe();
        let task = tokio::spawn(async move {
            let mut ticks = 0u32;
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(5));
            loop {
                tokio::select! {
                    _ = rx.recv() => break ticks,
                    _ = interval.tick() => ticks += 1,
                }
            }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(controller.shutdown());
        assert!(task.await.unwrap() > 0);
    }

    #[test]
    fn second_shutdown_is_a_no_op() {
        let controller = ShutdownController::new();
        assert!(!controller.is_triggered());
        assert!(controller.shutdown());
        assert!(!controller.shutdown());
        assert!(controller.is_triggered());
    }
}
