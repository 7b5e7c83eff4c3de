#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use txsession::core::{BatchResult, Cursor, ExecutorMode, ResourceKey, RowBounds};
use txsession::{
    Configuration, Connection, DataSource, Environment, Error, ErrorTranslator, Result, Session,
    SessionError, SessionErrorTranslator, SessionFactory, SessionTemplate, TransactionManager,
    TransactionScope, TransactionStrategy,
};

#[derive(Debug)]
pub struct RecordingConnection {
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub closes: AtomicUsize,
    auto_commit: AtomicBool,
}

impl RecordingConnection {
    fn new() -> Self {
        Self {
            commits: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            auto_commit: AtomicBool::new(true),
        }
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    async fn commit(&self) -> Result<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit.load(Ordering::SeqCst)
    }

    async fn set_auto_commit(&self, auto_commit: bool) -> Result<()> {
        self.auto_commit.store(auto_commit, Ordering::SeqCst);
        Ok(())
    }
}

pub struct RecordingDataSource {
    key: ResourceKey,
    product: Option<String>,
    pub product_name_calls: AtomicUsize,
    connections: Mutex<Vec<Arc<RecordingConnection>>>,
}

impl RecordingDataSource {
    pub fn new(product: Option<&str>) -> Self {
        Self {
            key: ResourceKey::new(),
            product: product.map(str::to_string),
            product_name_calls: AtomicUsize::new(0),
            connections: Mutex::new(Vec::new()),
        }
    }

    pub fn opened(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn connection_at(&self, index: usize) -> Arc<RecordingConnection> {
        self.connections.lock()[index].clone()
    }
}

#[async_trait]
impl DataSource for RecordingDataSource {
    fn key(&self) -> ResourceKey {
        self.key
    }

    fn product_name(&self) -> Option<String> {
        self.product_name_calls.fetch_add(1, Ordering::SeqCst);
        self.product.clone()
    }

    async fn connection(&self) -> Result<Arc<dyn Connection>> {
        let connection = Arc::new(RecordingConnection::new());
        self.connections.lock().push(connection.clone());
        Ok(connection)
    }
}

/// Knobs shared by every session a factory opens
#[derive(Default)]
pub struct Script {
    pub rows: Mutex<Vec<Value>>,
    pub fail_next: Mutex<Option<SessionError>>,
    pub fail_commit: Mutex<Option<SessionError>>,
    /// Update count reported per batched statement on flush
    pub batch_counts: Mutex<Option<Vec<u64>>>,
    /// Yield once in `open_session` so concurrent openers interleave
    pub yield_on_open: AtomicBool,
}

pub struct RecordingSession {
    pub id: usize,
    pub mode: ExecutorMode,
    script: Arc<Script>,
    pub commits: AtomicUsize,
    pub forced_commits: AtomicUsize,
    pub closes: AtomicUsize,
    pub statements: Mutex<Vec<(String, Option<Value>)>>,
    pending: Mutex<Vec<String>>,
}

impl std::fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RecordingSession#{}", self.id)
    }
}

impl RecordingSession {
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn forced_commits(&self) -> usize {
        self.forced_commits.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn parameters(&self) -> Vec<Option<Value>> {
        self.statements.lock().iter().map(|(_, p)| p.clone()).collect()
    }

    fn run(&self, statement: &str, parameter: Option<&Value>) -> Result<Vec<Value>> {
        if let Some(error) = self.script.fail_next.lock().take() {
            return Err(Error::Session(error));
        }
        self.statements
            .lock()
            .push((statement.to_string(), parameter.cloned()));
        Ok(self.script.rows.lock().clone())
    }

    fn modify(&self, statement: &str, parameter: Option<&Value>) -> Result<u64> {
        self.run(statement, parameter)?;
        if self.mode == ExecutorMode::Batch {
            self.pending.lock().push(statement.to_string());
            return Ok(0);
        }
        Ok(1)
    }
}

#[async_trait]
impl Session for RecordingSession {
    async fn select_one(&self, statement: &str, parameter: Option<&Value>) -> Result<Option<Value>> {
        Ok(self.run(statement, parameter)?.into_iter().next())
    }

    async fn select_list(
        &self,
        statement: &str,
        parameter: Option<&Value>,
        bounds: RowBounds,
    ) -> Result<Vec<Value>> {
        let rows = self.run(statement, parameter)?;
        // Paging parameters select a window of the scripted rows.
        let (skip, take) = match parameter {
            Some(p) if p.get("_skiprows").is_some() => (
                p["_skiprows"].as_u64().unwrap_or(0) as usize,
                p["_pagesize"].as_u64().unwrap_or(0) as usize,
            ),
            _ => (bounds.offset, bounds.limit),
        };
        Ok(rows.into_iter().skip(skip).take(take).collect())
    }

    async fn select_map(
        &self,
        statement: &str,
        parameter: Option<&Value>,
        map_key: &str,
        _bounds: RowBounds,
    ) -> Result<HashMap<String, Value>> {
        Ok(self
            .run(statement, parameter)?
            .into_iter()
            .map(|row| (row[map_key].to_string(), row))
            .collect())
    }

    async fn select_cursor(
        &self,
        statement: &str,
        parameter: Option<&Value>,
        _bounds: RowBounds,
    ) -> Result<Cursor> {
        Ok(Cursor::new(self.run(statement, parameter)?))
    }

    async fn insert(&self, statement: &str, parameter: Option<&Value>) -> Result<u64> {
        self.modify(statement, parameter)
    }

    async fn update(&self, statement: &str, parameter: Option<&Value>) -> Result<u64> {
        self.modify(statement, parameter)
    }

    async fn delete(&self, statement: &str, parameter: Option<&Value>) -> Result<u64> {
        self.modify(statement, parameter)
    }

    async fn commit(&self, force: bool) -> Result<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        if force {
            self.forced_commits.fetch_add(1, Ordering::SeqCst);
        }
        match self.script.fail_commit.lock().take() {
            Some(error) => Err(Error::Session(error)),
            None => Ok(()),
        }
    }

    async fn rollback(&self, _force: bool) -> Result<()> {
        Ok(())
    }

    async fn flush_statements(&self) -> Result<Vec<BatchResult>> {
        let pending: Vec<String> = self.pending.lock().drain(..).collect();
        let Some(statement) = pending.first() else {
            return Ok(Vec::new());
        };
        let counts = self
            .script
            .batch_counts
            .lock()
            .clone()
            .unwrap_or_else(|| vec![1; pending.len()]);
        Ok(vec![BatchResult::new(statement.clone(), counts)])
    }

    async fn clear_cache(&self) -> Result<()> {
        Ok(())
    }

    async fn connection(&self) -> Result<Arc<dyn Connection>> {
        Ok(Arc::new(RecordingConnection::new()))
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct RecordingFactory {
    key: ResourceKey,
    pub data_source: Arc<RecordingDataSource>,
    configuration: Configuration,
    pub script: Arc<Script>,
    sessions: Mutex<Vec<Arc<RecordingSession>>>,
}

impl RecordingFactory {
    pub fn new(data_source: Arc<RecordingDataSource>, strategy: TransactionStrategy) -> Self {
        let environment = Environment::new("test", strategy, data_source.clone());
        Self {
            key: ResourceKey::new(),
            data_source,
            configuration: Configuration::new(environment),
            script: Arc::new(Script::default()),
            sessions: Mutex::new(Vec::new()),
        }
    }

    pub fn opened(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn session(&self, index: usize) -> Arc<RecordingSession> {
        self.sessions.lock()[index].clone()
    }

    pub fn last_session(&self) -> Arc<RecordingSession> {
        let sessions = self.sessions.lock();
        sessions[sessions.len() - 1].clone()
    }

    pub fn fail_next(&self, error: SessionError) {
        *self.script.fail_next.lock() = Some(error);
    }

    pub fn fail_commit(&self, error: SessionError) {
        *self.script.fail_commit.lock() = Some(error);
    }

    pub fn set_rows(&self, rows: Vec<Value>) {
        *self.script.rows.lock() = rows;
    }
}

#[async_trait]
impl SessionFactory for RecordingFactory {
    fn key(&self) -> ResourceKey {
        self.key
    }

    fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    async fn open_session(&self, mode: ExecutorMode) -> Result<Arc<dyn Session>> {
        if self.script.yield_on_open.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        let mut sessions = self.sessions.lock();
        let session = Arc::new(RecordingSession {
            id: sessions.len(),
            mode,
            script: self.script.clone(),
            commits: AtomicUsize::new(0),
            forced_commits: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            statements: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
        });
        sessions.push(session.clone());
        Ok(session)
    }
}

/// A scope, a transaction manager over it, and a managed factory
pub struct Fixture {
    pub scope: Arc<TransactionScope>,
    pub manager: TransactionManager,
    pub data_source: Arc<RecordingDataSource>,
    pub factory: Arc<RecordingFactory>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_strategy(TransactionStrategy::Managed)
    }

    pub fn with_strategy(strategy: TransactionStrategy) -> Self {
        let scope = Arc::new(TransactionScope::new());
        let data_source = Arc::new(RecordingDataSource::new(None));
        let manager = TransactionManager::with_data_source(scope.clone(), data_source.clone());
        let factory = Arc::new(RecordingFactory::new(data_source.clone(), strategy));
        Self {
            scope,
            manager,
            data_source,
            factory,
        }
    }

    pub fn template(&self) -> SessionTemplate {
        SessionTemplate::new(self.factory.clone(), self.scope.clone())
    }

    pub fn template_with_translator(&self, translator: Arc<dyn ErrorTranslator>) -> SessionTemplate {
        SessionTemplate::builder(self.factory.clone(), self.scope.clone())
            .translator(translator)
            .build()
    }
}

/// Notes the latest session's close count whenever it translates, then
/// defers to a `SessionErrorTranslator`
pub struct ClosesAtTranslation {
    factory: Arc<RecordingFactory>,
    inner: SessionErrorTranslator,
    seen: Mutex<Vec<usize>>,
}

impl ClosesAtTranslation {
    pub fn new(factory: Arc<RecordingFactory>) -> Arc<Self> {
        Arc::new(Self {
            factory,
            inner: SessionErrorTranslator::new(None, true),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn seen(&self) -> Vec<usize> {
        self.seen.lock().clone()
    }
}

impl ErrorTranslator for ClosesAtTranslation {
    fn translate(&self, error: SessionError) -> std::result::Result<Error, SessionError> {
        self.seen.lock().push(self.factory.last_session().closes());
        self.inner.translate(error)
    }
}
