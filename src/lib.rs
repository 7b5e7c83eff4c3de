// ============================================================================
// txsession Library
// ============================================================================
//
// Transaction-scoped session lifecycle: one session per factory per
// transaction, closed when the transaction completes, behind a facade that
// callers can share freely between tasks.
//
// ============================================================================

pub mod core;
pub mod datasource;
pub mod session;
pub mod support;
pub mod transaction;
pub mod translate;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use core::{
    BatchResult, Cursor, DataAccessError, Error, ErrorKind, ExecutorMode, ResourceKey, Result,
    RowBounds, SessionError, SqlError, TransactionError,
};
pub use datasource::{Connection, DataSource};
pub use session::{
    CompletionListener, Configuration, Environment, Session, SessionFactory, SessionHolder,
    SessionProvider, SessionSettings, SessionTemplate, TransactionStrategy,
};
pub use transaction::{
    Propagation, TransactionDefinition, TransactionManager, TransactionRegistry, TransactionScope,
    TransactionStatus, TransactionSynchronization,
};
pub use translate::{ErrorTranslator, SessionErrorTranslator};
