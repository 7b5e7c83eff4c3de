// ============================================================================
// Transaction Registry
// ============================================================================
//
// The ambient transaction context: a key/value map of resources bound to
// the current logical transaction plus the list of registered
// synchronizations. `TransactionRegistry` is the seam the session layer
// talks to; `TransactionScope` is the in-memory implementation handed out
// per logical transaction context (injected, never a hidden global).
//
// ============================================================================

use super::synchronization::TransactionSynchronization;
use crate::core::{Error, ResourceKey, Result};
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Anything that can be bound under a `ResourceKey`
pub type Resource = Arc<dyn Any + Send + Sync>;

#[async_trait]
pub trait TransactionRegistry: Send + Sync {
    async fn get_resource(&self, key: ResourceKey) -> Option<Resource>;

    /// # Errors
    /// `IllegalState` if a value is already bound for `key`
    async fn bind_resource(&self, key: ResourceKey, resource: Resource) -> Result<()>;

    /// # Errors
    /// `IllegalState` if nothing is bound for `key`
    async fn unbind_resource(&self, key: ResourceKey) -> Result<Resource>;

    async fn unbind_resource_if_possible(&self, key: ResourceKey) -> Option<Resource>;

    async fn is_synchronization_active(&self) -> bool;

    async fn is_actual_transaction_active(&self) -> bool;

    /// # Errors
    /// `IllegalState` if synchronization is not active
    async fn register_synchronization(
        &self,
        synchronization: Arc<dyn TransactionSynchronization>,
    ) -> Result<()>;
}

/// Look up a resource and downcast it to the holder type expected under `key`.
///
/// # Errors
/// `IllegalState` if something of a different type is bound there.
pub async fn typed_resource<T>(
    registry: &dyn TransactionRegistry,
    key: ResourceKey,
) -> Result<Option<Arc<T>>>
where
    T: Any + Send + Sync,
{
    match registry.get_resource(key).await {
        None => Ok(None),
        Some(resource) => resource.downcast::<T>().map(Some).map_err(|_| {
            Error::IllegalState(format!(
                "Resource bound for key [{}] is not a {}",
                key,
                std::any::type_name::<T>()
            ))
        }),
    }
}

#[derive(Default)]
struct ScopeState {
    resources: HashMap<ResourceKey, Resource>,
    /// `None` while synchronization is inactive
    synchronizations: Option<Vec<Arc<dyn TransactionSynchronization>>>,
    name: Option<String>,
    read_only: bool,
    actual_transaction_active: bool,
    rollback_only: bool,
}

/// In-memory registry for one logical transaction context.
///
/// Thread-safe; the handle may move between threads together with the
/// logical transaction (suspend on one, resume on another).
#[derive(Default)]
pub struct TransactionScope {
    state: Mutex<ScopeState>,
}

impl TransactionScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate synchronization for the current transaction
    ///
    /// # Errors
    /// `IllegalState` if synchronization is already active
    pub async fn init_synchronization(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.synchronizations.is_some() {
            return Err(Error::IllegalState(
                "Cannot activate transaction synchronization - already active".into(),
            ));
        }
        state.synchronizations = Some(Vec::new());
        Ok(())
    }

    /// Snapshot of the registered synchronizations, sorted by order.
    ///
    /// Callers iterate the snapshot with the scope unlocked, so callbacks
    /// are free to call back into the registry.
    pub async fn synchronizations(&self) -> Result<Vec<Arc<dyn TransactionSynchronization>>> {
        let state = self.state.lock().await;
        let mut snapshot = state
            .synchronizations
            .clone()
            .ok_or_else(|| Error::IllegalState("Transaction synchronization is not active".into()))?;
        snapshot.sort_by_key(|s| s.order());
        Ok(snapshot)
    }

    /// # Errors
    /// `IllegalState` if synchronization is not active
    pub async fn clear_synchronization(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.synchronizations.take().is_none() {
            return Err(Error::IllegalState(
                "Cannot deactivate transaction synchronization - not active".into(),
            ));
        }
        Ok(())
    }

    pub async fn set_actual_transaction_active(&self, active: bool) {
        self.state.lock().await.actual_transaction_active = active;
    }

    pub async fn set_current_transaction_read_only(&self, read_only: bool) {
        self.state.lock().await.read_only = read_only;
    }

    pub async fn is_current_transaction_read_only(&self) -> bool {
        self.state.lock().await.read_only
    }

    pub async fn set_current_transaction_name(&self, name: Option<String>) {
        self.state.lock().await.name = name;
    }

    pub async fn current_transaction_name(&self) -> Option<String> {
        self.state.lock().await.name.clone()
    }

    /// Mark the current transaction so that only a rollback can end it
    pub async fn set_rollback_only(&self) {
        self.state.lock().await.rollback_only = true;
    }

    pub async fn is_rollback_only(&self) -> bool {
        self.state.lock().await.rollback_only
    }

    pub async fn has_resource(&self, key: ResourceKey) -> bool {
        self.state.lock().await.resources.contains_key(&key)
    }

    pub async fn resource_count(&self) -> usize {
        self.state.lock().await.resources.len()
    }

    /// Reset transaction-level state. Bound resources are left alone; their
    /// owners unbind them.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.synchronizations = None;
        state.name = None;
        state.read_only = false;
        state.actual_transaction_active = false;
        state.rollback_only = false;
    }
}

#[async_trait]
impl TransactionRegistry for TransactionScope {
    async fn get_resource(&self, key: ResourceKey) -> Option<Resource> {
        self.state.lock().await.resources.get(&key).cloned()
    }

    async fn bind_resource(&self, key: ResourceKey, resource: Resource) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.resources.contains_key(&key) {
            return Err(Error::already_bound(key));
        }
        state.resources.insert(key, resource);
        Ok(())
    }

    async fn unbind_resource(&self, key: ResourceKey) -> Result<Resource> {
        self.state
            .lock()
            .await
            .resources
            .remove(&key)
            .ok_or_else(|| Error::not_bound(key))
    }

    async fn unbind_resource_if_possible(&self, key: ResourceKey) -> Option<Resource> {
        self.state.lock().await.resources.remove(&key)
    }

    async fn is_synchronization_active(&self) -> bool {
        self.state.lock().await.synchronizations.is_some()
    }

    async fn is_actual_transaction_active(&self) -> bool {
        self.state.lock().await.actual_transaction_active
    }

    async fn register_synchronization(
        &self,
        synchronization: Arc<dyn TransactionSynchronization>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.synchronizations.as_mut() {
            Some(list) => {
                list.push(synchronization);
                Ok(())
            }
            None => Err(Error::IllegalState(
                "Transaction synchronization is not active".into(),
            )),
        }
    }
}
