use super::{Configuration, Session, SessionFactory, SessionProvider};
use crate::core::{
    BatchResult, Cursor, DataAccessError, Error, ExecutorMode, Result, RowBounds,
};
use crate::datasource::Connection;
use crate::support::Mapper;
use crate::transaction::TransactionRegistry;
use crate::translate::{ErrorTranslator, SessionErrorTranslator};
use async_trait::async_trait;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Thread-safe session facade.
///
/// Every call acquires the current transaction's session (or a fresh one),
/// runs the statement, commits if no transaction owns the session, and
/// releases it. Manual `commit`, `rollback` and `close` are rejected:
/// transaction boundaries belong to the transaction manager.
///
/// ```ignore
/// let template = SessionTemplate::new(factory, scope.clone());
/// let user = template.select_one("UserMapper.find", Some(&json!({"id": 1}))).await?;
/// ```
pub struct SessionTemplate {
    factory: Arc<dyn SessionFactory>,
    executor_mode: ExecutorMode,
    translator: Option<Arc<dyn ErrorTranslator>>,
    provider: SessionProvider,
}

pub struct SessionTemplateBuilder {
    factory: Arc<dyn SessionFactory>,
    registry: Arc<dyn TransactionRegistry>,
    executor_mode: Option<ExecutorMode>,
    translator: Option<Arc<dyn ErrorTranslator>>,
    default_translator: bool,
}

impl SessionTemplateBuilder {
    pub fn executor_mode(mut self, mode: ExecutorMode) -> Self {
        self.executor_mode = Some(mode);
        self
    }

    pub fn translator(mut self, translator: Arc<dyn ErrorTranslator>) -> Self {
        self.translator = Some(translator);
        self.default_translator = false;
        self
    }

    /// Surface native session errors as they are
    pub fn without_translator(mut self) -> Self {
        self.translator = None;
        self.default_translator = false;
        self
    }

    pub fn build(self) -> SessionTemplate {
        let config = self.factory.configuration();
        let executor_mode = self.executor_mode.unwrap_or(config.default_executor_mode);
        let translator = if self.default_translator {
            let data_source = Arc::clone(&config.environment.data_source);
            Some(Arc::new(SessionErrorTranslator::new(
                Some(data_source),
                config.lazy_translator_init,
            )) as Arc<dyn ErrorTranslator>)
        } else {
            self.translator
        };

        SessionTemplate {
            factory: self.factory,
            executor_mode,
            translator,
            provider: SessionProvider::new(self.registry),
        }
    }
}

impl SessionTemplate {
    /// Template with the factory's default executor mode and translator
    pub fn new(factory: Arc<dyn SessionFactory>, registry: Arc<dyn TransactionRegistry>) -> Self {
        Self::builder(factory, registry).build()
    }

    pub fn builder(
        factory: Arc<dyn SessionFactory>,
        registry: Arc<dyn TransactionRegistry>,
    ) -> SessionTemplateBuilder {
        SessionTemplateBuilder {
            factory,
            registry,
            executor_mode: None,
            translator: None,
            default_translator: true,
        }
    }

    pub fn session_factory(&self) -> &Arc<dyn SessionFactory> {
        &self.factory
    }

    pub fn configuration(&self) -> &Configuration {
        self.factory.configuration()
    }

    pub fn executor_mode(&self) -> ExecutorMode {
        self.executor_mode
    }

    pub fn translator(&self) -> Option<&Arc<dyn ErrorTranslator>> {
        self.translator.as_ref()
    }

    pub fn provider(&self) -> &SessionProvider {
        &self.provider
    }

    /// Disposal hook for containers; the template owns nothing to close.
    pub fn destroy(&self) {}

    /// Run `operation` on the current session: acquire, invoke, commit if
    /// unmanaged, release. Errors are unwrapped and translated; the session
    /// is released either way.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn Session>) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let factory = self.factory.as_ref();
        let session = self
            .provider
            .acquire(factory, self.executor_mode, self.translator.clone())
            .await?;

        let outcome = match operation(Arc::clone(&session)).await {
            Ok(value) => self.commit_if_unmanaged(&session).await.map(|_| value),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(value) => {
                self.provider.release(&session, factory).await?;
                Ok(value)
            }
            Err(err) => {
                let err = err.unwrap_nested();
                if let Err(release_err) = self.provider.release(&session, factory).await {
                    warn!("Could not release session [{:?}]: {}", session, release_err);
                }
                Err(self.translate(err))
            }
        }
    }

    async fn commit_if_unmanaged(&self, session: &Arc<dyn Session>) -> Result<()> {
        if self.provider.is_managed(session, self.factory.as_ref()).await {
            return Ok(());
        }
        // Some drivers refuse to hand a connection back without an explicit
        // commit or rollback, even after a plain select.
        debug!("Force committing non transactional session [{:?}]", session);
        session.commit(true).await
    }

    fn translate(&self, err: Error) -> Error {
        match (err, &self.translator) {
            (Error::Session(native), Some(translator)) => {
                translator.translate(native).unwrap_or_else(Error::Session)
            }
            (err, _) => err,
        }
    }

    pub async fn select_one_as<T: DeserializeOwned>(
        &self,
        statement: &str,
        parameter: Option<&Value>,
    ) -> Result<Option<T>> {
        self.select_one(statement, parameter)
            .await?
            .map(|row| from_row(statement, row))
            .transpose()
    }

    pub async fn select_list_as<T: DeserializeOwned>(
        &self,
        statement: &str,
        parameter: Option<&Value>,
        bounds: RowBounds,
    ) -> Result<Vec<T>> {
        self.select_list(statement, parameter, bounds)
            .await?
            .into_iter()
            .map(|row| from_row(statement, row))
            .collect()
    }

    /// Mapper bound to this template
    ///
    /// # Errors
    /// `InvalidArgument` if the mapper's namespace is not registered
    pub fn mapper<M: Mapper>(self: &Arc<Self>) -> Result<M> {
        if !self.configuration().has_mapper(M::NAMESPACE) {
            return Err(Error::InvalidArgument(format!(
                "Mapper {} is not known to the configuration",
                M::NAMESPACE
            )));
        }
        Ok(M::bind(Arc::clone(self)))
    }
}

pub(crate) fn from_row<T: DeserializeOwned>(statement: &str, row: Value) -> Result<T> {
    serde_json::from_value(row).map_err(|e| {
        DataAccessError::InvalidResourceUsage(format!(
            "Could not map result of {}: {}",
            statement, e
        ))
        .into()
    })
}

fn manual_transaction_control() -> Error {
    Error::UnsupportedOperation("Manual commit/rollback/close is not allowed over a managed session".into())
}

#[async_trait]
impl Session for SessionTemplate {
    async fn select_one(&self, statement: &str, parameter: Option<&Value>) -> Result<Option<Value>> {
        self.execute(move |session| async move { session.select_one(statement, parameter).await })
            .await
    }

    async fn select_list(
        &self,
        statement: &str,
        parameter: Option<&Value>,
        bounds: RowBounds,
    ) -> Result<Vec<Value>> {
        self.execute(move |session| async move {
            session.select_list(statement, parameter, bounds).await
        })
        .await
    }

    async fn select_map(
        &self,
        statement: &str,
        parameter: Option<&Value>,
        map_key: &str,
        bounds: RowBounds,
    ) -> Result<HashMap<String, Value>> {
        self.execute(move |session| async move {
            session.select_map(statement, parameter, map_key, bounds).await
        })
        .await
    }

    async fn select_cursor(
        &self,
        statement: &str,
        parameter: Option<&Value>,
        bounds: RowBounds,
    ) -> Result<Cursor> {
        self.execute(move |session| async move {
            session.select_cursor(statement, parameter, bounds).await
        })
        .await
    }

    async fn insert(&self, statement: &str, parameter: Option<&Value>) -> Result<u64> {
        self.execute(move |session| async move { session.insert(statement, parameter).await })
            .await
    }

    async fn update(&self, statement: &str, parameter: Option<&Value>) -> Result<u64> {
        self.execute(move |session| async move { session.update(statement, parameter).await })
            .await
    }

    async fn delete(&self, statement: &str, parameter: Option<&Value>) -> Result<u64> {
        self.execute(move |session| async move { session.delete(statement, parameter).await })
            .await
    }

    async fn commit(&self, _force: bool) -> Result<()> {
        Err(manual_transaction_control())
    }

    async fn rollback(&self, _force: bool) -> Result<()> {
        Err(manual_transaction_control())
    }

    async fn flush_statements(&self) -> Result<Vec<BatchResult>> {
        self.execute(|session| async move { session.flush_statements().await })
            .await
    }

    async fn clear_cache(&self) -> Result<()> {
        self.execute(|session| async move { session.clear_cache().await })
            .await
    }

    async fn connection(&self) -> Result<Arc<dyn Connection>> {
        self.execute(|session| async move { session.connection().await })
            .await
    }

    async fn close(&self) -> Result<()> {
        Err(manual_transaction_control())
    }
}

impl std::fmt::Debug for SessionTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTemplate")
            .field("factory", &self.factory.key())
            .field("executor_mode", &self.executor_mode)
            .field("has_translator", &self.translator.is_some())
            .finish()
    }
}
