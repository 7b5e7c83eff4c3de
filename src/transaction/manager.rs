// ============================================================================
// Transaction Manager
// ============================================================================

use super::state::{SuspendedResources, TransactionConnection};
use super::{
    CompletionStatus, Propagation, TransactionDefinition, TransactionRegistry, TransactionScope,
    TransactionState, TransactionStatus, TransactionSynchronization,
};
use crate::core::{Error, Result, TransactionError};
use crate::datasource::{ConnectionHolder, DataSource};
use log::{debug, warn};
use std::future::Future;
use std::sync::Arc;

/// Drives transactions over one `TransactionScope`, optionally holding a
/// connection from `data_source` for the duration of each transaction.
pub struct TransactionManager {
    scope: Arc<TransactionScope>,
    data_source: Option<Arc<dyn DataSource>>,
}

impl TransactionManager {
    /// Manager without a data source: demarcation and synchronization only
    pub fn new(scope: Arc<TransactionScope>) -> Self {
        Self {
            scope,
            data_source: None,
        }
    }

    pub fn with_data_source(scope: Arc<TransactionScope>, data_source: Arc<dyn DataSource>) -> Self {
        Self {
            scope,
            data_source: Some(data_source),
        }
    }

    pub fn scope(&self) -> &Arc<TransactionScope> {
        &self.scope
    }

    pub fn registry(&self) -> Arc<dyn TransactionRegistry> {
        self.scope.clone()
    }

    pub fn data_source(&self) -> Option<&Arc<dyn DataSource>> {
        self.data_source.as_ref()
    }

    pub async fn begin(&self, definition: &TransactionDefinition) -> Result<TransactionStatus> {
        if self.scope.is_actual_transaction_active().await {
            return self.handle_existing_transaction(definition).await;
        }

        match definition.propagation {
            Propagation::Required | Propagation::RequiresNew => {
                // An empty synchronization-only scope may be running; park it.
                let suspended = self.suspend().await?;
                self.start_new_transaction(definition, suspended).await
            }
            Propagation::Supports | Propagation::NotSupported => {
                if self.scope.is_synchronization_active().await {
                    Ok(TransactionStatus::new(false, false, definition.read_only, None, None))
                } else {
                    self.start_synchronization_only(definition, None).await
                }
            }
        }
    }

    async fn handle_existing_transaction(
        &self,
        definition: &TransactionDefinition,
    ) -> Result<TransactionStatus> {
        match definition.propagation {
            Propagation::Required | Propagation::Supports => {
                debug!("Participating in existing transaction");
                let read_only =
                    definition.read_only || self.scope.is_current_transaction_read_only().await;
                Ok(TransactionStatus::new(false, false, read_only, None, None))
            }
            Propagation::RequiresNew => {
                debug!("Suspending current transaction, creating new transaction");
                let suspended = self.suspend().await?;
                self.start_new_transaction(definition, suspended).await
            }
            Propagation::NotSupported => {
                debug!("Suspending current transaction");
                let suspended = self.suspend().await?;
                self.start_synchronization_only(definition, suspended).await
            }
        }
    }

    async fn start_new_transaction(
        &self,
        definition: &TransactionDefinition,
        suspended: Option<SuspendedResources>,
    ) -> Result<TransactionStatus> {
        match self.start_transaction(definition).await {
            Ok(connection) => Ok(TransactionStatus::new(
                true,
                true,
                definition.read_only,
                connection,
                suspended,
            )),
            Err(err) => {
                self.resume_after_failure(suspended).await;
                Err(err)
            }
        }
    }

    async fn start_synchronization_only(
        &self,
        definition: &TransactionDefinition,
        suspended: Option<SuspendedResources>,
    ) -> Result<TransactionStatus> {
        if let Err(err) = self.scope.init_synchronization().await {
            self.resume_after_failure(suspended).await;
            return Err(err);
        }
        self.scope.set_current_transaction_read_only(definition.read_only).await;
        self.scope.set_current_transaction_name(definition.name.clone()).await;
        Ok(TransactionStatus::new(false, true, definition.read_only, None, suspended))
    }

    async fn start_transaction(
        &self,
        definition: &TransactionDefinition,
    ) -> Result<Option<TransactionConnection>> {
        self.scope.init_synchronization().await?;
        self.scope.set_actual_transaction_active(true).await;
        self.scope.set_current_transaction_read_only(definition.read_only).await;
        self.scope.set_current_transaction_name(definition.name.clone()).await;

        let Some(data_source) = &self.data_source else {
            debug!("Began transaction {:?} without a data source", definition.name);
            return Ok(None);
        };

        match self.open_connection(data_source.as_ref(), definition).await {
            Ok(connection) => Ok(Some(connection)),
            Err(err) => {
                self.scope.clear().await;
                Err(err)
            }
        }
    }

    async fn open_connection(
        &self,
        data_source: &dyn DataSource,
        definition: &TransactionDefinition,
    ) -> Result<TransactionConnection> {
        let connection = data_source.connection().await.map_err(|err| {
            Error::from(TransactionError::System(format!(
                "Could not open connection for transaction: {}",
                err
            )))
        })?;
        debug!("Acquired connection [{:?}] for transaction", connection);

        let must_restore_auto_commit = connection.auto_commit();
        if must_restore_auto_commit {
            debug!("Switching connection [{:?}] to manual commit", connection);
            if let Err(err) = connection.set_auto_commit(false).await {
                if let Err(close_err) = connection.close().await {
                    warn!("Could not close connection after failed begin: {}", close_err);
                }
                return Err(err);
            }
        }

        let holder = Arc::new(ConnectionHolder::new(connection, true));
        holder.set_synchronized_with_transaction(true);
        if let Some(timeout) = definition.timeout {
            holder.set_timeout(timeout);
        }
        self.scope.bind_resource(data_source.key(), holder.clone()).await?;

        Ok(TransactionConnection {
            holder,
            must_restore_auto_commit,
        })
    }

    /// Take everything transaction-scoped out of the scope
    async fn suspend(&self) -> Result<Option<SuspendedResources>> {
        let synchronization_active = self.scope.is_synchronization_active().await;
        let actual_transaction_active = self.scope.is_actual_transaction_active().await;
        if !synchronization_active && !actual_transaction_active {
            return Ok(None);
        }

        let synchronizations = if synchronization_active {
            Some(self.suspend_synchronizations().await?)
        } else {
            None
        };

        let connection_holder = match &self.data_source {
            Some(data_source) if actual_transaction_active => {
                self.scope.unbind_resource_if_possible(data_source.key()).await
            }
            _ => None,
        };

        let suspended = SuspendedResources {
            synchronizations,
            connection_holder,
            name: self.scope.current_transaction_name().await,
            read_only: self.scope.is_current_transaction_read_only().await,
            actual_transaction_active,
            rollback_only: self.scope.is_rollback_only().await,
        };
        self.scope.clear().await;
        Ok(Some(suspended))
    }

    async fn suspend_synchronizations(&self) -> Result<Vec<Arc<dyn TransactionSynchronization>>> {
        let synchronizations = self.scope.synchronizations().await?;
        for (index, synchronization) in synchronizations.iter().enumerate() {
            if let Err(err) = synchronization.suspend().await {
                for done in &synchronizations[..index] {
                    if let Err(resume_err) = done.resume().await {
                        warn!("Could not resume synchronization after failed suspend: {}", resume_err);
                    }
                }
                return Err(err);
            }
        }
        Ok(synchronizations)
    }

    async fn resume(&self, suspended: SuspendedResources) -> Result<()> {
        if let (Some(holder), Some(data_source)) = (suspended.connection_holder, &self.data_source) {
            self.scope.bind_resource(data_source.key(), holder).await?;
        }
        self.scope
            .set_actual_transaction_active(suspended.actual_transaction_active)
            .await;
        self.scope.set_current_transaction_read_only(suspended.read_only).await;
        self.scope.set_current_transaction_name(suspended.name).await;
        if suspended.rollback_only {
            self.scope.set_rollback_only().await;
        }

        if let Some(synchronizations) = suspended.synchronizations {
            self.scope.init_synchronization().await?;
            for synchronization in synchronizations {
                synchronization.resume().await?;
                self.scope.register_synchronization(synchronization).await?;
            }
        }
        Ok(())
    }

    async fn resume_after_failure(&self, suspended: Option<SuspendedResources>) {
        if let Some(suspended) = suspended {
            if let Err(err) = self.resume(suspended).await {
                warn!("Could not resume suspended transaction after failed begin: {}", err);
            }
        }
    }

    pub async fn commit(&self, status: &mut TransactionStatus) -> Result<()> {
        if status.is_completed() {
            return Err(TransactionError::AlreadyCompleted.into());
        }

        if status.is_rollback_only() {
            debug!("Transactional code has requested rollback");
            return self.process_rollback(status).await;
        }

        if status.is_new_transaction() && self.scope.is_rollback_only().await {
            debug!("Transaction is marked as rollback-only but commit was requested");
            self.process_rollback(status).await?;
            return Err(TransactionError::UnexpectedRollback.into());
        }

        self.process_commit(status).await
    }

    async fn process_commit(&self, status: &mut TransactionStatus) -> Result<()> {
        if let Err(err) = self.trigger_before_commit(status).await {
            self.trigger_before_completion(status).await;
            if status.is_new_transaction() {
                if let Err(rollback_err) = self.do_rollback(status).await {
                    warn!("Rollback after failed before-commit callback failed: {}", rollback_err);
                }
            } else {
                self.scope.set_rollback_only().await;
            }
            self.trigger_after_completion(status, CompletionStatus::RolledBack).await;
            self.cleanup_quietly(status, TransactionState::RolledBack).await;
            return Err(err);
        }

        self.trigger_before_completion(status).await;

        if status.is_new_transaction() {
            debug!("Initiating transaction commit");
            if let Err(err) = self.do_commit(status).await {
                self.trigger_after_completion(status, CompletionStatus::Unknown).await;
                self.cleanup_quietly(status, TransactionState::RolledBack).await;
                return Err(err);
            }
        }

        self.trigger_after_completion(status, CompletionStatus::Committed).await;
        self.cleanup_after_completion(status, TransactionState::Committed).await
    }

    pub async fn rollback(&self, status: &mut TransactionStatus) -> Result<()> {
        if status.is_completed() {
            return Err(TransactionError::AlreadyCompleted.into());
        }
        self.process_rollback(status).await
    }

    async fn process_rollback(&self, status: &mut TransactionStatus) -> Result<()> {
        self.trigger_before_completion(status).await;

        if status.is_new_transaction() {
            debug!("Initiating transaction rollback");
            if let Err(err) = self.do_rollback(status).await {
                self.trigger_after_completion(status, CompletionStatus::Unknown).await;
                self.cleanup_quietly(status, TransactionState::RolledBack).await;
                return Err(err);
            }
        } else if self.scope.is_actual_transaction_active().await {
            debug!("Participating transaction failed - marking existing transaction as rollback-only");
            self.scope.set_rollback_only().await;
        }

        self.trigger_after_completion(status, CompletionStatus::RolledBack).await;
        self.cleanup_after_completion(status, TransactionState::RolledBack).await
    }

    /// Run `work` inside a transaction: commit on `Ok`, roll back on `Err`.
    pub async fn execute<T, F, Fut>(&self, definition: &TransactionDefinition, work: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut status = self.begin(definition).await?;
        match work().await {
            Ok(value) => {
                self.commit(&mut status).await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback(&mut status).await {
                    warn!("Rollback after application error failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    async fn do_commit(&self, status: &TransactionStatus) -> Result<()> {
        let Some(transaction) = &status.connection else {
            return Ok(());
        };
        let connection = transaction.holder.connection();
        debug!("Committing transaction on connection [{:?}]", connection);
        connection.commit().await.map_err(|err| {
            Error::from(TransactionError::System(format!(
                "Could not commit transaction: {}",
                err
            )))
        })
    }

    async fn do_rollback(&self, status: &TransactionStatus) -> Result<()> {
        let Some(transaction) = &status.connection else {
            return Ok(());
        };
        let connection = transaction.holder.connection();
        debug!("Rolling back transaction on connection [{:?}]", connection);
        connection.rollback().await.map_err(|err| {
            Error::from(TransactionError::System(format!(
                "Could not roll back transaction: {}",
                err
            )))
        })
    }

    async fn trigger_before_commit(&self, status: &TransactionStatus) -> Result<()> {
        if !status.is_new_synchronization() {
            return Ok(());
        }
        for synchronization in self.scope.synchronizations().await? {
            synchronization.before_commit(status.is_read_only()).await?;
        }
        Ok(())
    }

    async fn trigger_before_completion(&self, status: &TransactionStatus) {
        if !status.is_new_synchronization() {
            return;
        }
        let synchronizations = match self.scope.synchronizations().await {
            Ok(synchronizations) => synchronizations,
            Err(err) => {
                warn!("Skipping before-completion callbacks: {}", err);
                return;
            }
        };
        for synchronization in synchronizations {
            if let Err(err) = synchronization.before_completion().await {
                warn!("TransactionSynchronization.before_completion failed: {}", err);
            }
        }
    }

    async fn trigger_after_completion(&self, status: &TransactionStatus, completion: CompletionStatus) {
        if !status.is_new_synchronization() {
            return;
        }
        let synchronizations = match self.scope.synchronizations().await {
            Ok(synchronizations) => synchronizations,
            Err(err) => {
                warn!("Skipping after-completion callbacks: {}", err);
                return;
            }
        };
        // Deactivate first so callbacks cannot register new synchronizations.
        if let Err(err) = self.scope.clear_synchronization().await {
            warn!("Could not deactivate synchronization: {}", err);
        }
        for synchronization in synchronizations {
            if let Err(err) = synchronization.after_completion(completion).await {
                warn!("TransactionSynchronization.after_completion failed: {}", err);
            }
        }
    }

    async fn cleanup_after_completion(
        &self,
        status: &mut TransactionStatus,
        state: TransactionState,
    ) -> Result<()> {
        status.complete(state);
        if status.is_new_synchronization() {
            self.scope.clear().await;
        }
        if status.is_new_transaction() {
            if let Some(transaction) = status.connection.take() {
                self.release_transaction_connection(transaction).await;
            }
        }
        if let Some(suspended) = status.suspended.take() {
            debug!("Resuming suspended transaction after completion of inner transaction");
            self.resume(suspended).await?;
        }
        Ok(())
    }

    async fn cleanup_quietly(&self, status: &mut TransactionStatus, state: TransactionState) {
        if let Err(err) = self.cleanup_after_completion(status, state).await {
            warn!("Cleanup after failed completion failed: {}", err);
        }
    }

    async fn release_transaction_connection(&self, transaction: TransactionConnection) {
        if let Some(data_source) = &self.data_source {
            self.scope.unbind_resource_if_possible(data_source.key()).await;
        }
        let connection = Arc::clone(transaction.holder.connection());
        if transaction.must_restore_auto_commit {
            if let Err(err) = connection.set_auto_commit(true).await {
                warn!("Could not reset auto-commit on connection [{:?}]: {}", connection, err);
            }
        }
        debug!("Releasing connection [{:?}] after transaction", connection);
        if let Err(err) = connection.close().await {
            warn!("Could not close connection [{:?}]: {}", connection, err);
        }
        transaction.holder.reset();
    }
}
