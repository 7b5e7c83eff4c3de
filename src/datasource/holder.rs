use super::Connection;
use crate::core::Result;
use crate::transaction::HolderState;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Binds one connection to the ambient transaction.
///
/// A holder created by the transaction manager is `transaction_active`;
/// one created on demand by `get_connection` only lives until the
/// synchronization scope completes.
pub struct ConnectionHolder {
    connection: Arc<dyn Connection>,
    transaction_active: AtomicBool,
    state: HolderState,
}

impl ConnectionHolder {
    pub fn new(connection: Arc<dyn Connection>, transaction_active: bool) -> Self {
        Self {
            connection,
            transaction_active: AtomicBool::new(transaction_active),
            state: HolderState::new(),
        }
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub fn is_transaction_active(&self) -> bool {
        self.transaction_active.load(Ordering::SeqCst)
    }

    pub fn set_transaction_active(&self, active: bool) {
        self.transaction_active.store(active, Ordering::SeqCst);
    }

    pub fn requested(&self) -> usize {
        self.state.requested()
    }

    pub fn released(&self) -> Result<usize> {
        self.state.released()
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    pub fn reference_count(&self) -> usize {
        self.state.reference_count()
    }

    pub fn set_synchronized_with_transaction(&self, synchronized: bool) {
        self.state.set_synchronized_with_transaction(synchronized);
    }

    pub fn is_synchronized_with_transaction(&self) -> bool {
        self.state.is_synchronized_with_transaction()
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.state.set_timeout(timeout);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.state.deadline()
    }

    pub fn time_to_live(&self) -> Option<Duration> {
        self.state.time_to_live()
    }

    pub fn reset(&self) {
        self.state.reset();
        self.set_transaction_active(false);
    }
}

impl std::fmt::Debug for ConnectionHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHolder")
            .field("connection", &self.connection)
            .field("transaction_active", &self.is_transaction_active())
            .field("reference_count", &self.reference_count())
            .finish()
    }
}
