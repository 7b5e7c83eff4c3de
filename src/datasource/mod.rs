// ============================================================================
// Data Source Collaborators
// ============================================================================
//
// The raw connection layer underneath sessions. Only the interface is
// defined here; drivers and pools implement `DataSource` / `Connection`.
// The helpers in `utils` bind connections to the ambient transaction so
// that a managed session and the transaction manager share one connection.
//
// ============================================================================

pub mod holder;
pub mod utils;

pub use holder::ConnectionHolder;
pub use utils::{ConnectionSynchronization, get_connection, is_connection_transactional, release_connection};

use crate::core::{ResourceKey, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// A physical database connection
#[async_trait]
pub trait Connection: Send + Sync + std::fmt::Debug {
    async fn commit(&self) -> Result<()>;

    async fn rollback(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;

    fn auto_commit(&self) -> bool;

    async fn set_auto_commit(&self, auto_commit: bool) -> Result<()>;
}

/// Hands out connections; its `key` identifies it in the transaction registry.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn key(&self) -> ResourceKey;

    /// Database product name, used to pick vendor error codes
    fn product_name(&self) -> Option<String> {
        None
    }

    async fn connection(&self) -> Result<Arc<dyn Connection>>;
}

/// Identity comparison that ignores vtable pointers
pub fn same_connection(a: &Arc<dyn Connection>, b: &Arc<dyn Connection>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
