use super::{TransactionRegistry, typed_resource};
use crate::core::Result;
use crate::datasource::{
    Connection, ConnectionHolder, DataSource, get_connection, is_connection_transactional,
    release_connection,
};
use crate::session::TransactionStrategy;
use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

struct OpenConnection {
    connection: Arc<dyn Connection>,
    transactional: bool,
    auto_commit: bool,
}

/// Session-level transaction that defers to the ambient one.
///
/// The connection is fetched lazily through `get_connection`, so it is the
/// transaction's own connection whenever one is bound. Commit and rollback
/// only touch the connection when it is neither transactional nor in
/// auto-commit mode.
pub struct ManagedTransaction {
    registry: Arc<dyn TransactionRegistry>,
    data_source: Arc<dyn DataSource>,
    connection: Mutex<Option<OpenConnection>>,
}

impl ManagedTransaction {
    pub fn new(registry: Arc<dyn TransactionRegistry>, data_source: Arc<dyn DataSource>) -> Self {
        Self {
            registry,
            data_source,
            connection: Mutex::new(None),
        }
    }

    pub async fn connection(&self) -> Result<Arc<dyn Connection>> {
        let mut slot = self.connection.lock().await;
        if let Some(open) = slot.as_ref() {
            return Ok(Arc::clone(&open.connection));
        }

        let connection = get_connection(&self.registry, self.data_source.as_ref()).await?;
        let transactional =
            is_connection_transactional(self.registry.as_ref(), &connection, self.data_source.as_ref())
                .await;
        debug!(
            "Connection [{:?}] {} managed by the ambient transaction",
            connection,
            if transactional { "will be" } else { "will not be" }
        );
        *slot = Some(OpenConnection {
            connection: Arc::clone(&connection),
            transactional,
            auto_commit: connection.auto_commit(),
        });
        Ok(connection)
    }

    pub async fn commit(&self) -> Result<()> {
        if let Some(open) = self.locally_managed().await {
            debug!("Committing connection [{:?}]", open);
            open.commit().await?;
        }
        Ok(())
    }

    pub async fn rollback(&self) -> Result<()> {
        if let Some(open) = self.locally_managed().await {
            debug!("Rolling back connection [{:?}]", open);
            open.rollback().await?;
        }
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        if let Some(open) = self.connection.lock().await.take() {
            release_connection(self.registry.as_ref(), &open.connection, self.data_source.as_ref())
                .await?;
        }
        Ok(())
    }

    /// Remaining time of the ambient transaction, if it has a deadline
    pub async fn timeout(&self) -> Result<Option<Duration>> {
        let holder =
            typed_resource::<ConnectionHolder>(self.registry.as_ref(), self.data_source.key()).await?;
        Ok(holder.and_then(|holder| holder.time_to_live()))
    }

    pub async fn is_connection_transactional(&self) -> bool {
        self.connection
            .lock()
            .await
            .as_ref()
            .is_some_and(|open| open.transactional)
    }

    async fn locally_managed(&self) -> Option<Arc<dyn Connection>> {
        self.connection
            .lock()
            .await
            .as_ref()
            .filter(|open| !open.transactional && !open.auto_commit)
            .map(|open| Arc::clone(&open.connection))
    }
}

/// Produces `ManagedTransaction`s; its presence in an `Environment` is what
/// `TransactionStrategy::Managed` means.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManagedTransactionFactory;

impl ManagedTransactionFactory {
    pub fn strategy(&self) -> TransactionStrategy {
        TransactionStrategy::Managed
    }

    pub fn new_transaction(
        &self,
        registry: Arc<dyn TransactionRegistry>,
        data_source: Arc<dyn DataSource>,
    ) -> ManagedTransaction {
        ManagedTransaction::new(registry, data_source)
    }
}
