use super::SessionHolder;
use crate::core::{Error, ResourceKey, Result};
use crate::transaction::{
    CONNECTION_SYNCHRONIZATION_ORDER, CompletionStatus, TransactionRegistry,
    TransactionSynchronization,
};
use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;

/// Lifecycle of a `CompletionListener`
///
/// ```text
/// Active <──resume── Suspended
///   │  └───suspend───────^
///   └──before/after_completion──> Completed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Active,
    Suspended,
    Completed,
}

/// Flushes and closes the transaction's session when the transaction
/// completes. One per bound `SessionHolder`.
pub struct CompletionListener {
    holder: Arc<SessionHolder>,
    key: ResourceKey,
    registry: Arc<dyn TransactionRegistry>,
    state: Mutex<ListenerState>,
}

impl CompletionListener {
    pub fn new(
        holder: Arc<SessionHolder>,
        key: ResourceKey,
        registry: Arc<dyn TransactionRegistry>,
    ) -> Self {
        Self {
            holder,
            key,
            registry,
            state: Mutex::new(ListenerState::Active),
        }
    }

    pub fn state(&self) -> ListenerState {
        *self.state.lock()
    }

    pub fn holder(&self) -> &Arc<SessionHolder> {
        &self.holder
    }

    /// Move `from` -> `to`; false if the listener was not in `from`
    fn transition(&self, from: ListenerState, to: ListenerState) -> bool {
        let mut state = self.state.lock();
        if *state != from {
            return false;
        }
        *state = to;
        true
    }

    /// Mark completed unless already completed; true if this call did it
    fn complete(&self) -> bool {
        let mut state = self.state.lock();
        if *state == ListenerState::Completed {
            return false;
        }
        *state = ListenerState::Completed;
        true
    }
}

#[async_trait]
impl TransactionSynchronization for CompletionListener {
    /// Just ahead of the connection synchronization, so batched statements
    /// reach the connection before it commits.
    fn order(&self) -> i32 {
        CONNECTION_SYNCHRONIZATION_ORDER - 1
    }

    async fn suspend(&self) -> Result<()> {
        if self.transition(ListenerState::Active, ListenerState::Suspended) {
            debug!("Transaction synchronization suspending session [{:?}]", self.holder.session());
            self.registry.unbind_resource(self.key).await?;
        }
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        if self.transition(ListenerState::Suspended, ListenerState::Active) {
            debug!("Transaction synchronization resuming session [{:?}]", self.holder.session());
            self.registry.bind_resource(self.key, self.holder.clone()).await?;
        }
        Ok(())
    }

    async fn before_commit(&self, _read_only: bool) -> Result<()> {
        // Flush batched statements even for read-only transactions. A commit
        // that fails below us leaves the second-level cache ahead of the
        // database; nothing here can undo that.
        if !self.registry.is_actual_transaction_active().await {
            return Ok(());
        }
        debug!("Transaction synchronization committing session [{:?}]", self.holder.session());
        match self.holder.session().commit(false).await {
            Ok(()) => Ok(()),
            Err(Error::Session(native)) => match self.holder.translator() {
                Some(translator) => Err(translator.translate(native).unwrap_or_else(Error::Session)),
                None => Err(Error::Session(native)),
            },
            Err(err) => Err(err),
        }
    }

    async fn before_completion(&self) -> Result<()> {
        // Connection release may happen on another thread; if nobody holds
        // the session any more, close it while we still own the scope.
        // Only an unbind that succeeded completes the listener; otherwise
        // after_completion is left to close the session.
        if !self.holder.is_open() && self.state() != ListenerState::Completed {
            debug!("Transaction synchronization deregistering session [{:?}]", self.holder.session());
            self.registry.unbind_resource(self.key).await?;
            if self.complete() {
                debug!("Transaction synchronization closing session [{:?}]", self.holder.session());
                self.holder.session().close().await?;
            }
        }
        Ok(())
    }

    async fn after_completion(&self, _status: CompletionStatus) -> Result<()> {
        let result = if self.complete() {
            debug!("Transaction synchronization deregistering session [{:?}]", self.holder.session());
            self.registry.unbind_resource_if_possible(self.key).await;
            debug!("Transaction synchronization closing session [{:?}]", self.holder.session());
            self.holder.session().close().await
        } else {
            Ok(())
        };
        self.holder.reset();
        result
    }
}

impl std::fmt::Debug for CompletionListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionListener")
            .field("key", &self.key)
            .field("state", &self.state())
            .finish()
    }
}
