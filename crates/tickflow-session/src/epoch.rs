//! Session epoch guard.
//!
//! Every cache write, state update and error report made by a session worker
//! runs inside `run_if_current` with the epoch the worker started with.
//! `advance` takes the write lock, so it waits for any write in progress and
//! every later call with the old epoch becomes a no-op.
//!
//! Reads of the epoch go through an atomic mirror and never take the lock.
//! The lock is task-fair, so a nested read while `advance` waits would
//! deadlock.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct EpochGuard {
    current: Arc<RwLock<u64>>,
    published: Arc<AtomicU64>,
}

impl EpochGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock-free; safe to call inside `run_if_current`.
    pub fn current(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.current() == epoch
    }

    /// Invalidate the current epoch. Returns the new one.
    pub fn advance(&self) -> u64 {
        let mut current = self.current.write();
        *current += 1;
        self.published.store(*current, Ordering::Release);
        *current
    }

    /// Run `f` only while `epoch` is current.
    ///
    /// `f` runs under the read lock and must not call `advance` on the
    /// same guard.
    pub fn run_if_current<R>(&self, epoch: u64, f: impl FnOnce() -> R) -> Option<R> {
        let current = self.current.read();
        if *current != epoch {
            return None;
        }
        Some(f())
    }
}
