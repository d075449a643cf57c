//! Task scope and ticker handle.
//!
//! # Responsibility
//! - Group timers and in-flight requests of one login session.
//! - Stop all of them together on teardown.
//!
//! # Invariants
//! - After `cancel`, no task of the scope resumes past its next await.
//! - Dropping a `TickerHandle` stops its ticker.

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Shutdown signal shared by every task spawned in one session.
#[derive(Debug)]
pub(crate) struct TaskScope {
    shutdown: watch::Sender<bool>,
}

impl TaskScope {
    pub(crate) fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self { shutdown }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Signals every subscriber and replaces the scope with a fresh one.
    pub(crate) fn renew(&mut self) {
        self.shutdown.send_replace(true);
        *self = Self::new();
    }
}

/// Resolves once `signal` turns `true` or its sender is gone.
pub(crate) async fn wait_for_shutdown(signal: &mut watch::Receiver<bool>) {
    loop {
        if *signal.borrow_and_update() {
            return;
        }
        if signal.changed().await.is_err() {
            return;
        }
    }
}

/// Owner handle of a running tick loop.
#[derive(Debug)]
pub struct TickerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TickerHandle {
    pub(crate) fn new(stop: watch::Sender<bool>, task: JoinHandle<()>) -> Self {
        Self { stop, task }
    }

    /// Whether the tick loop has exited (cancelled or scope torn down).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the tick loop.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.stop.send_replace(true);
        self.task.abort();
    }
}
