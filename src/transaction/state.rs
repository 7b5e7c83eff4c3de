// ============================================================================
// Transaction State Management
// ============================================================================
//
// Definitions (what kind of transaction the caller wants) and statuses
// (handles returned by `TransactionManager::begin`). A status moves through
// Active -> Committed / RolledBack exactly once.
//
// ============================================================================

use super::registry::Resource;
use super::synchronization::TransactionSynchronization;
use crate::datasource::ConnectionHolder;
use std::sync::Arc;
use std::time::Duration;

/// How `begin` behaves relative to a transaction that is already running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    /// Join the current transaction, start one if there is none
    #[default]
    Required,
    /// Always start a new transaction, suspending the current one
    RequiresNew,
    /// Join the current transaction, run with synchronization only if there is none
    Supports,
    /// Run with synchronization only, suspending the current transaction
    NotSupported,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionDefinition {
    pub propagation: Propagation,
    pub read_only: bool,
    pub timeout: Option<Duration>,
    pub name: Option<String>,
}

impl TransactionDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
}

/// Transaction state following the State Pattern
///
/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback──> RolledBack
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::RolledBack
        )
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::RolledBack => write!(f, "ROLLED_BACK"),
        }
    }
}

/// Everything taken out of the scope while an outer transaction is suspended
pub(crate) struct SuspendedResources {
    /// `None` if synchronization was not active
    pub(crate) synchronizations: Option<Vec<Arc<dyn TransactionSynchronization>>>,
    pub(crate) connection_holder: Option<Resource>,
    pub(crate) name: Option<String>,
    pub(crate) read_only: bool,
    pub(crate) actual_transaction_active: bool,
    pub(crate) rollback_only: bool,
}

/// Connection a new transaction opened and has to hand back at cleanup
pub(crate) struct TransactionConnection {
    pub(crate) holder: Arc<ConnectionHolder>,
    pub(crate) must_restore_auto_commit: bool,
}

/// Handle for one `begin` call.
///
/// Only the status that started a transaction (`is_new_transaction`) or
/// activated synchronization (`is_new_synchronization`) drives callbacks;
/// participants just vote.
pub struct TransactionStatus {
    state: TransactionState,
    new_transaction: bool,
    new_synchronization: bool,
    read_only: bool,
    rollback_only: bool,
    pub(crate) connection: Option<TransactionConnection>,
    pub(crate) suspended: Option<SuspendedResources>,
}

impl TransactionStatus {
    pub(crate) fn new(
        new_transaction: bool,
        new_synchronization: bool,
        read_only: bool,
        connection: Option<TransactionConnection>,
        suspended: Option<SuspendedResources>,
    ) -> Self {
        Self {
            state: TransactionState::Active,
            new_transaction,
            new_synchronization,
            read_only,
            rollback_only: false,
            connection,
            suspended,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_new_transaction(&self) -> bool {
        self.new_transaction
    }

    pub fn is_new_synchronization(&self) -> bool {
        self.new_synchronization
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Mark this status so that committing it rolls back instead
    pub fn set_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    pub fn is_completed(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn has_suspended_resources(&self) -> bool {
        self.suspended.is_some()
    }

    pub(crate) fn complete(&mut self, state: TransactionState) {
        self.state = state;
    }
}

impl std::fmt::Debug for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionStatus")
            .field("state", &self.state)
            .field("new_transaction", &self.new_transaction)
            .field("new_synchronization", &self.new_synchronization)
            .field("read_only", &self.read_only)
            .field("rollback_only", &self.rollback_only)
            .field("suspended", &self.suspended.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_builder() {
        let def = TransactionDefinition::new()
            .propagation(Propagation::RequiresNew)
            .read_only(true)
            .timeout(Duration::from_secs(5))
            .name("audit");

        assert_eq!(def.propagation, Propagation::RequiresNew);
        assert!(def.read_only);
        assert_eq!(def.timeout, Some(Duration::from_secs(5)));
        assert_eq!(def.name.as_deref(), Some("audit"));
    }

    #[test]
    fn test_status_lifecycle() {
        let mut status = TransactionStatus::new(true, true, false, None, None);

        assert_eq!(status.state(), TransactionState::Active);
        assert!(status.state().is_active());
        assert!(!status.is_completed());

        status.set_rollback_only();
        assert!(status.is_rollback_only());

        status.complete(TransactionState::RolledBack);
        assert!(status.is_completed());
        assert_eq!(status.state().to_string(), "ROLLED_BACK");
    }
}
