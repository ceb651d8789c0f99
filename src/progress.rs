//! Cooperative progress reporting and cancellation.
//!
//! Element trees can be large (a long Matroska file's cue index, a podcast's
//! deep `ilst` tree) and a rewrite walks the whole container at least once.
//! `AbortToken` gives a caller on another thread a cheap way to ask a
//! long-running parse or rewrite to stop at the next checkpoint, and
//! `Progress` gives it a cheap way to report how far along it is.
//!
//! Neither type assumes threads: a single-threaded caller can just not poll
//! `is_aborted` and get the same behavior as before this existed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct AbortToken(Arc<AtomicBool>);

impl AbortToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A simple `current / total` counter, shared via an `Arc` so the owner of a
/// long-running operation can update it while another thread reads it.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    current: Arc<AtomicU64>,
    total: Arc<AtomicU64>,
}

impl Progress {
    pub fn new(total: u64) -> Self {
        Progress {
            current: Arc::new(AtomicU64::new(0)),
            total: Arc::new(AtomicU64::new(total)),
        }
    }

    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
    }

    pub fn advance(&self, by: u64) {
        self.current.fetch_add(by, Ordering::Relaxed);
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Fraction complete in `[0.0, 1.0]`. Returns `0.0` if `total` is `0`.
    pub fn fraction(&self) -> f64 {
        let total = self.total();

        if total == 0 {
            0.0
        } else {
            (self.current() as f64 / total as f64).min(1.0)
        }
    }
}
