// ============================================================================
// Transaction Management Module
// ============================================================================
//
// The ambient transaction context that sessions bind themselves to.
//
// Design Patterns Used:
// - Registry: resources keyed by the factory/data source that owns them
// - Observer: synchronizations notified at every completion point
// - State Pattern: transaction status (Active, Committed, RolledBack)
//
// ============================================================================

pub mod managed;
pub mod manager;
pub mod registry;
pub mod resource;
pub mod state;
pub mod synchronization;

pub use managed::{ManagedTransaction, ManagedTransactionFactory};
pub use manager::TransactionManager;
pub use registry::{Resource, TransactionRegistry, TransactionScope, typed_resource};
pub use resource::HolderState;
pub use state::{Propagation, TransactionDefinition, TransactionState, TransactionStatus};
pub use synchronization::{
    CONNECTION_SYNCHRONIZATION_ORDER, CompletionStatus, LOWEST_PRECEDENCE,
    TransactionSynchronization,
};
