use super::{Connection, ConnectionHolder, DataSource, same_connection};
use crate::core::{ResourceKey, Result};
use crate::transaction::{
    CONNECTION_SYNCHRONIZATION_ORDER, CompletionStatus, TransactionRegistry,
    TransactionSynchronization, typed_resource,
};
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Get a connection for `data_source`, reusing the one bound to the current
/// transaction if there is one.
///
/// When synchronization is active but nothing is bound yet, the fresh
/// connection is bound for the rest of the scope and released at completion.
pub async fn get_connection(
    registry: &Arc<dyn TransactionRegistry>,
    data_source: &dyn DataSource,
) -> Result<Arc<dyn Connection>> {
    let key = data_source.key();
    if let Some(holder) = typed_resource::<ConnectionHolder>(registry.as_ref(), key).await? {
        holder.requested();
        return Ok(Arc::clone(holder.connection()));
    }

    debug!("Fetching connection from data source [{}]", key);
    let connection = data_source.connection().await?;

    if registry.is_synchronization_active().await {
        debug!("Registering transaction synchronization for connection [{:?}]", connection);
        let holder = Arc::new(ConnectionHolder::new(Arc::clone(&connection), false));
        holder.requested();
        holder.set_synchronized_with_transaction(true);
        if let Err(err) = bind_connection(registry, key, holder).await {
            if let Err(close_err) = connection.close().await {
                warn!("Could not close connection [{:?}] after failed registration: {}", connection, close_err);
            }
            return Err(err);
        }
    }

    Ok(connection)
}

async fn bind_connection(
    registry: &Arc<dyn TransactionRegistry>,
    key: ResourceKey,
    holder: Arc<ConnectionHolder>,
) -> Result<()> {
    registry.bind_resource(key, holder.clone()).await?;
    let synchronization = ConnectionSynchronization::new(holder, key, Arc::clone(registry));
    if let Err(err) = registry.register_synchronization(Arc::new(synchronization)).await {
        registry.unbind_resource_if_possible(key).await;
        return Err(err);
    }
    Ok(())
}

/// Hand a connection back: decrement the bound holder, or close it outright
/// if it isn't the transaction's connection.
pub async fn release_connection(
    registry: &dyn TransactionRegistry,
    connection: &Arc<dyn Connection>,
    data_source: &dyn DataSource,
) -> Result<()> {
    match typed_resource::<ConnectionHolder>(registry, data_source.key()).await? {
        Some(holder) if same_connection(holder.connection(), connection) => {
            holder.released()?;
            Ok(())
        }
        _ => {
            debug!("Closing connection [{:?}]", connection);
            connection.close().await
        }
    }
}

/// Whether `connection` is the one bound to the current transaction
pub async fn is_connection_transactional(
    registry: &dyn TransactionRegistry,
    connection: &Arc<dyn Connection>,
    data_source: &dyn DataSource,
) -> bool {
    matches!(
        typed_resource::<ConnectionHolder>(registry, data_source.key()).await,
        Ok(Some(holder)) if same_connection(holder.connection(), connection)
    )
}

/// Releases a connection bound by `get_connection` when the scope completes.
pub struct ConnectionSynchronization {
    holder: Arc<ConnectionHolder>,
    key: ResourceKey,
    registry: Arc<dyn TransactionRegistry>,
    holder_active: AtomicBool,
}

impl ConnectionSynchronization {
    pub fn new(
        holder: Arc<ConnectionHolder>,
        key: ResourceKey,
        registry: Arc<dyn TransactionRegistry>,
    ) -> Self {
        Self {
            holder,
            key,
            registry,
            holder_active: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl TransactionSynchronization for ConnectionSynchronization {
    fn order(&self) -> i32 {
        CONNECTION_SYNCHRONIZATION_ORDER
    }

    async fn suspend(&self) -> Result<()> {
        if self.holder_active.load(Ordering::SeqCst) {
            self.registry.unbind_resource(self.key).await?;
        }
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        if self.holder_active.load(Ordering::SeqCst) {
            self.registry.bind_resource(self.key, self.holder.clone()).await?;
        }
        Ok(())
    }

    async fn before_completion(&self) -> Result<()> {
        if !self.holder.is_open() {
            self.registry.unbind_resource(self.key).await?;
            self.holder_active.store(false, Ordering::SeqCst);
            debug!("Closing connection [{:?}] before completion", self.holder.connection());
            self.holder.connection().close().await?;
        }
        Ok(())
    }

    async fn after_completion(&self, _status: CompletionStatus) -> Result<()> {
        let result = if self.holder_active.swap(false, Ordering::SeqCst) {
            self.registry.unbind_resource_if_possible(self.key).await;
            debug!("Closing connection [{:?}] after completion", self.holder.connection());
            self.holder.connection().close().await
        } else {
            Ok(())
        };
        self.holder.reset();
        result
    }
}
