// ============================================================================
// Session Module
// ============================================================================
//
// Sessions scoped to the ambient transaction.
//
// - `SessionProvider` acquires and releases sessions, binding a
//   `SessionHolder` per factory while a transaction is running.
// - `CompletionListener` flushes and closes the bound session when the
//   transaction completes.
// - `SessionTemplate` is the thread-safe facade application code uses; it
//   routes every call through the provider.
//
// ============================================================================

pub mod config;
pub mod holder;
pub mod provider;
pub mod synchronization;
pub mod template;

pub use config::{Configuration, Environment, SessionSettings, TransactionStrategy};
pub use holder::SessionHolder;
pub use provider::SessionProvider;
pub use synchronization::{CompletionListener, ListenerState};
pub use template::{SessionTemplate, SessionTemplateBuilder};

use crate::core::{BatchResult, Cursor, ExecutorMode, ResourceKey, Result, RowBounds};
use crate::datasource::Connection;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A unit of work against the database: statements, local commit/rollback,
/// batch flushing and a first-level cache.
///
/// Implementations report driver failures as `Error::Session` so that a
/// translator can classify them.
#[async_trait]
pub trait Session: Send + Sync + std::fmt::Debug {
    async fn select_one(&self, statement: &str, parameter: Option<&Value>) -> Result<Option<Value>>;

    async fn select_list(
        &self,
        statement: &str,
        parameter: Option<&Value>,
        bounds: RowBounds,
    ) -> Result<Vec<Value>>;

    /// Rows keyed by the string form of their `map_key` property
    async fn select_map(
        &self,
        statement: &str,
        parameter: Option<&Value>,
        map_key: &str,
        bounds: RowBounds,
    ) -> Result<HashMap<String, Value>>;

    async fn select_cursor(
        &self,
        statement: &str,
        parameter: Option<&Value>,
        bounds: RowBounds,
    ) -> Result<Cursor>;

    async fn insert(&self, statement: &str, parameter: Option<&Value>) -> Result<u64>;

    async fn update(&self, statement: &str, parameter: Option<&Value>) -> Result<u64>;

    async fn delete(&self, statement: &str, parameter: Option<&Value>) -> Result<u64>;

    /// Flush and commit; `force` commits even if nothing is dirty
    async fn commit(&self, force: bool) -> Result<()>;

    async fn rollback(&self, force: bool) -> Result<()>;

    /// Execute pending batched statements
    async fn flush_statements(&self) -> Result<Vec<BatchResult>>;

    async fn clear_cache(&self) -> Result<()>;

    async fn connection(&self) -> Result<Arc<dyn Connection>>;

    async fn close(&self) -> Result<()>;
}

/// Opens sessions; `key` identifies the factory in the transaction registry.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    fn key(&self) -> ResourceKey;

    fn configuration(&self) -> &Configuration;

    async fn open_session(&self, mode: ExecutorMode) -> Result<Arc<dyn Session>>;
}

/// Identity comparison that ignores vtable pointers
pub fn same_session(a: &Arc<dyn Session>, b: &Arc<dyn Session>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
