//! Batch progress counter.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::watch;

/// Completed/total snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
}

impl ProgressSnapshot {
    pub fn is_done(&self) -> bool {
        self.completed >= self.total
    }

    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// Monotonic counter of jobs that reached a terminal state.
///
/// Shared by every job task; subscribers see each increment in order.
#[derive(Debug)]
pub struct BatchProgress {
    completed: AtomicUsize,
    total: usize,
    tx: watch::Sender<ProgressSnapshot>,
}

impl BatchProgress {
    pub fn new(total: usize) -> Self {
        let (tx, _rx) = watch::channel(ProgressSnapshot {
            completed: 0,
            total,
        });
        Self {
            completed: AtomicUsize::new(0),
            total,
            tx,
        }
    }

    /// Count one more terminal job and return the new snapshot.
    pub fn record_completion(&self) -> ProgressSnapshot {
        let completed = (self.completed.fetch_add(1, Ordering::SeqCst) + 1).min(self.total);
        let snapshot = ProgressSnapshot {
            completed,
            total: self.total,
        };
        // Concurrent increments may publish out of order; keep the maximum.
        self.tx.send_if_modified(|current| {
            if snapshot.completed > current.completed {
                *current = snapshot;
                true
            } else {
                false
            }
        });
        snapshot
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.completed.load(Ordering::SeqCst).min(self.total),
            total: self.total,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.tx.subscribe()
    }
}
