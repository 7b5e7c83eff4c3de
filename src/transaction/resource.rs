// ============================================================================
// Resource Holder Accounting
// ============================================================================
//
// Shared bookkeeping for anything bound into a transaction registry
// (session holders, connection holders): a reference count, the
// "synchronized with transaction" flag, a rollback-only marker and an
// optional deadline used as a timeout hint.
//
// ============================================================================

use crate::core::{Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct HolderState {
    reference_count: AtomicUsize,
    synchronized_with_transaction: AtomicBool,
    rollback_only: AtomicBool,
    deadline: Mutex<Option<Instant>>,
}

impl HolderState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increase the reference count by one; returns the new count
    pub fn requested(&self) -> usize {
        self.reference_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Decrease the reference count by one; returns the new count
    ///
    /// # Errors
    /// Returns `IllegalState` if the count is already zero. Never clamps.
    pub fn released(&self) -> Result<usize> {
        self.reference_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| count.checked_sub(1))
            .map(|previous| previous - 1)
            .map_err(|_| {
                Error::IllegalState("Resource released more often than it was requested".into())
            })
    }

    pub fn reference_count(&self) -> usize {
        self.reference_count.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.reference_count() > 0
    }

    pub fn set_synchronized_with_transaction(&self, synchronized: bool) {
        self.synchronized_with_transaction
            .store(synchronized, Ordering::SeqCst);
    }

    pub fn is_synchronized_with_transaction(&self) -> bool {
        self.synchronized_with_transaction.load(Ordering::SeqCst)
    }

    pub fn set_rollback_only(&self) {
        self.rollback_only.store(true, Ordering::SeqCst);
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::SeqCst)
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.set_deadline(Instant::now().checked_add(timeout));
    }

    pub fn set_deadline(&self, deadline: Option<Instant>) {
        *self.deadline.lock() = deadline;
    }

    pub fn deadline(&self) -> Option<Instant> {
        *self.deadline.lock()
    }

    pub fn has_timeout(&self) -> bool {
        self.deadline().is_some()
    }

    /// Time left until the deadline; zero once it has passed
    pub fn time_to_live(&self) -> Option<Duration> {
        self.deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Zero all accounting (transaction completion)
    pub fn reset(&self) {
        self.reference_count.store(0, Ordering::SeqCst);
        self.synchronized_with_transaction
            .store(false, Ordering::SeqCst);
        self.rollback_only.store(false, Ordering::SeqCst);
        *self.deadline.lock() = None;
    }
}
