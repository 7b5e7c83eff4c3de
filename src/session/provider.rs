use super::{CompletionListener, Session, SessionFactory, SessionHolder, same_session};
use crate::core::{DataAccessError, ExecutorMode, Result};
use crate::datasource::ConnectionHolder;
use crate::transaction::{TransactionRegistry, typed_resource};
use crate::translate::ErrorTranslator;
use log::{debug, warn};
use std::sync::Arc;

/// Acquires and releases sessions against the ambient transaction.
///
/// While synchronization is active, the first `acquire` for a factory binds
/// a `SessionHolder`; later acquisitions in the same transaction get the
/// same session back. Without a transaction every `acquire` opens a fresh
/// session and `release` closes it.
#[derive(Clone)]
pub struct SessionProvider {
    registry: Arc<dyn TransactionRegistry>,
}

impl SessionProvider {
    pub fn new(registry: Arc<dyn TransactionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<dyn TransactionRegistry> {
        &self.registry
    }

    /// Get the transaction's session for `factory`, or open a new one.
    ///
    /// # Errors
    /// `DataAccessError::TransientResource` if the bound session uses a
    /// different executor mode, or if a transaction is running that this
    /// factory's transaction strategy cannot join.
    pub async fn acquire(
        &self,
        factory: &dyn SessionFactory,
        executor_mode: ExecutorMode,
        translator: Option<Arc<dyn ErrorTranslator>>,
    ) -> Result<Arc<dyn Session>> {
        if let Some(holder) = typed_resource::<SessionHolder>(self.registry.as_ref(), factory.key()).await? {
            if holder.is_synchronized_with_transaction() {
                return join(&holder, executor_mode);
            }
        }

        debug!("Creating a new session");
        let session = factory.open_session(executor_mode).await?;

        let joined = match self
            .register_holder(factory, executor_mode, translator, &session)
            .await
        {
            Ok(None) => return Ok(session),
            Ok(Some(winner)) => join(&winner, executor_mode),
            Err(err) => Err(err),
        };
        if let Err(close_err) = session.close().await {
            warn!("Could not close session [{:?}] after failed registration: {}", session, close_err);
        }
        joined
    }

    /// `acquire` with the factory's default executor mode and no translator
    pub async fn acquire_default(&self, factory: &dyn SessionFactory) -> Result<Arc<dyn Session>> {
        let mode = factory.configuration().default_executor_mode;
        self.acquire(factory, mode, None).await
    }

    async fn register_holder(
        &self,
        factory: &dyn SessionFactory,
        executor_mode: ExecutorMode,
        translator: Option<Arc<dyn ErrorTranslator>>,
        session: &Arc<dyn Session>,
    ) -> Result<Option<Arc<SessionHolder>>> {
        if !self.registry.is_synchronization_active().await {
            debug!(
                "Session [{:?}] was not registered for synchronization because synchronization is not active",
                session
            );
            return Ok(None);
        }

        let environment = &factory.configuration().environment;
        let data_source_key = environment.data_source.key();

        if !environment.transaction_strategy.is_managed() {
            if self.registry.get_resource(data_source_key).await.is_some() {
                return Err(DataAccessError::TransientResource(
                    "SessionFactory must be using a managed transaction strategy in order to use transaction synchronization".into(),
                )
                .into());
            }
            debug!(
                "Session [{:?}] was not registered for synchronization because the data source is not transactional",
                session
            );
            return Ok(None);
        }

        debug!("Registering transaction synchronization for session [{:?}]", session);
        let holder = Arc::new(SessionHolder::new(Arc::clone(session), executor_mode, translator));
        if let Some(connection) =
            typed_resource::<ConnectionHolder>(self.registry.as_ref(), data_source_key).await?
        {
            holder.set_deadline(connection.deadline());
        }

        // Visible as joinable the moment it is bound.
        holder.set_synchronized_with_transaction(true);
        holder.requested();

        let key = factory.key();
        if let Err(err) = self.registry.bind_resource(key, holder.clone()).await {
            // Another participant opened its session first; use that one.
            return match typed_resource::<SessionHolder>(self.registry.as_ref(), key).await? {
                Some(winner) if winner.is_synchronized_with_transaction() => {
                    debug!("Session for key [{}] was bound concurrently, joining it", key);
                    Ok(Some(winner))
                }
                _ => Err(err),
            };
        }
        let listener = CompletionListener::new(holder.clone(), key, Arc::clone(&self.registry));
        if let Err(err) = self.registry.register_synchronization(Arc::new(listener)).await {
            self.registry.unbind_resource_if_possible(key).await;
            holder.reset();
            return Err(err);
        }
        Ok(None)
    }

    /// Give a session back. A transaction's session only has its reference
    /// count decremented; any other session is closed.
    pub async fn release(&self, session: &Arc<dyn Session>, factory: &dyn SessionFactory) -> Result<()> {
        match typed_resource::<SessionHolder>(self.registry.as_ref(), factory.key()).await? {
            Some(holder) if same_session(holder.session(), session) => {
                debug!("Releasing transactional session [{:?}]", session);
                holder.released()?;
                Ok(())
            }
            _ => {
                debug!("Closing non transactional session [{:?}]", session);
                session.close().await
            }
        }
    }

    /// Whether `session` is the one bound to the current transaction
    pub async fn is_managed(&self, session: &Arc<dyn Session>, factory: &dyn SessionFactory) -> bool {
        matches!(
            typed_resource::<SessionHolder>(self.registry.as_ref(), factory.key()).await,
            Ok(Some(holder)) if same_session(holder.session(), session)
        )
    }
}

/// Hand out the session of an already bound holder
fn join(holder: &SessionHolder, executor_mode: ExecutorMode) -> Result<Arc<dyn Session>> {
    if holder.executor_mode() != executor_mode {
        return Err(DataAccessError::TransientResource(
            "Cannot change the ExecutorMode when there is an existing transaction".into(),
        )
        .into());
    }
    holder.requested();
    debug!("Fetched session [{:?}] from current transaction", holder.session());
    Ok(Arc::clone(holder.session()))
}

impl std::fmt::Debug for SessionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionProvider").finish_non_exhaustive()
    }
}
