//! In-memory doubles for unit tests.

use crate::core::{
    BatchResult, Cursor, Error, ExecutorMode, ResourceKey, Result, RowBounds, SessionError,
};
use crate::datasource::{Connection, DataSource};
use crate::session::{Configuration, Environment, Session, SessionFactory, TransactionStrategy};
use crate::transaction::{CompletionStatus, TransactionSynchronization};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug)]
pub struct MockConnection {
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    closes: AtomicUsize,
    auto_commit: AtomicBool,
}

impl MockConnection {
    pub fn new(auto_commit: bool) -> Self {
        Self {
            commits: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            auto_commit: AtomicBool::new(auto_commit),
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
impl Connection for MockConnection {
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

pub struct MockDataSource {
    key: ResourceKey,
    product: Option<String>,
    auto_commit: AtomicBool,
    product_name_calls: AtomicUsize,
    opened: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockDataSource {
    pub fn new() -> Self {
        Self {
            key: ResourceKey::new(),
            product: None,
            auto_commit: AtomicBool::new(true),
            product_name_calls: AtomicUsize::new(0),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn with_product(product: &str) -> Self {
        Self {
            product: Some(product.to_string()),
            ..Self::new()
        }
    }

    pub fn set_auto_commit(&self, auto_commit: bool) {
        self.auto_commit.store(auto_commit, Ordering::SeqCst);
    }

    pub fn opened(&self) -> usize {
        self.opened.lock().len()
    }

    pub fn last_connection(&self) -> Option<Arc<MockConnection>> {
        self.opened.lock().last().cloned()
    }

    pub fn product_name_calls(&self) -> usize {
        self.product_name_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataSource for MockDataSource {
    fn key(&self) -> ResourceKey {
        self.key
    }

    fn product_name(&self) -> Option<String> {
        self.product_name_calls.fetch_add(1, Ordering::SeqCst);
        self.product.clone()
    }

    async fn connection(&self) -> Result<Arc<dyn Connection>> {
        let connection = Arc::new(MockConnection::new(self.auto_commit.load(Ordering::SeqCst)));
        self.opened.lock().push(connection.clone());
        Ok(connection)
    }
}

/// State shared between a factory and the sessions it opens
#[derive(Default)]
struct Behavior {
    rows: Mutex<Vec<Value>>,
    fail_next: Mutex<Option<SessionError>>,
}

#[derive(Debug)]
pub struct MockSession {
    mode: ExecutorMode,
    behavior: Arc<Behavior>,
    commits: AtomicUsize,
    forced_commits: AtomicUsize,
    rollbacks: AtomicUsize,
    closes: AtomicUsize,
    fail_commit: Mutex<Option<SessionError>>,
    statements: Mutex<Vec<String>>,
    pending: Mutex<Vec<String>>,
}

impl std::fmt::Debug for Behavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Behavior").finish_non_exhaustive()
    }
}

impl MockSession {
    pub fn new() -> Self {
        Self::with_behavior(ExecutorMode::Simple, Arc::new(Behavior::default()))
    }

    fn with_behavior(mode: ExecutorMode, behavior: Arc<Behavior>) -> Self {
        Self {
            mode,
            behavior,
            commits: AtomicUsize::new(0),
            forced_commits: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            fail_commit: Mutex::new(None),
            statements: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn mode(&self) -> ExecutorMode {
        self.mode
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn forced_commits(&self) -> usize {
        self.forced_commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }

    pub fn fail_commit(&self, error: SessionError) {
        *self.fail_commit.lock() = Some(error);
    }

    fn run(&self, statement: &str) -> Result<Vec<Value>> {
        if let Some(error) = self.behavior.fail_next.lock().take() {
            return Err(Error::Session(error));
        }
        self.statements.lock().push(statement.to_string());
        Ok(self.behavior.rows.lock().clone())
    }

    fn modify(&self, statement: &str) -> Result<u64> {
        self.run(statement)?;
        if self.mode == ExecutorMode::Batch {
            self.pending.lock().push(statement.to_string());
            return Ok(0);
        }
        Ok(1)
    }
}

#[async_trait]
impl Session for MockSession {
    async fn select_one(&self, statement: &str, _parameter: Option<&Value>) -> Result<Option<Value>> {
        Ok(self.run(statement)?.into_iter().next())
    }

    async fn select_list(
        &self,
        statement: &str,
        _parameter: Option<&Value>,
        bounds: RowBounds,
    ) -> Result<Vec<Value>> {
        Ok(self
            .run(statement)?
            .into_iter()
            .skip(bounds.offset)
            .take(bounds.limit)
            .collect())
    }

    async fn select_map(
        &self,
        statement: &str,
        _parameter: Option<&Value>,
        map_key: &str,
        _bounds: RowBounds,
    ) -> Result<HashMap<String, Value>> {
        Ok(self
            .run(statement)?
            .into_iter()
            .map(|row| (row[map_key].to_string(), row))
            .collect())
    }

    async fn select_cursor(
        &self,
        statement: &str,
        _parameter: Option<&Value>,
        _bounds: RowBounds,
    ) -> Result<Cursor> {
        Ok(Cursor::new(self.run(statement)?))
    }

    async fn insert(&self, statement: &str, _parameter: Option<&Value>) -> Result<u64> {
        self.modify(statement)
    }

    async fn update(&self, statement: &str, _parameter: Option<&Value>) -> Result<u64> {
        self.modify(statement)
    }

    async fn delete(&self, statement: &str, _parameter: Option<&Value>) -> Result<u64> {
        self.modify(statement)
    }

    async fn commit(&self, force: bool) -> Result<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        if force {
            self.forced_commits.fetch_add(1, Ordering::SeqCst);
        }
        match self.fail_commit.lock().take() {
            Some(error) => Err(Error::Session(error)),
            None => Ok(()),
        }
    }

    async fn rollback(&self, _force: bool) -> Result<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn flush_statements(&self) -> Result<Vec<BatchResult>> {
        let pending: Vec<String> = self.pending.lock().drain(..).collect();
        match pending.first() {
            Some(statement) => Ok(vec![BatchResult::new(statement.clone(), vec![1; pending.len()])]),
            None => Ok(Vec::new()),
        }
    }

    async fn clear_cache(&self) -> Result<()> {
        Ok(())
    }

    async fn connection(&self) -> Result<Arc<dyn Connection>> {
        Ok(Arc::new(MockConnection::new(false)))
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockFactory {
    key: ResourceKey,
    data_source: Arc<MockDataSource>,
    configuration: Configuration,
    behavior: Arc<Behavior>,
    sessions: Mutex<Vec<Arc<MockSession>>>,
    yield_on_open: AtomicBool,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::with_strategy(TransactionStrategy::Managed)
    }

    pub fn with_strategy(strategy: TransactionStrategy) -> Self {
        let data_source = Arc::new(MockDataSource::new());
        let environment = Environment::new("test", strategy, data_source.clone());
        Self {
            key: ResourceKey::new(),
            data_source,
            configuration: Configuration::new(environment),
            behavior: Arc::new(Behavior::default()),
            sessions: Mutex::new(Vec::new()),
            yield_on_open: AtomicBool::new(false),
        }
    }

    /// Give up the task once inside `open_session`, so concurrent callers interleave
    pub fn yield_on_open(self) -> Self {
        self.yield_on_open.store(true, Ordering::SeqCst);
        self
    }

    pub fn session(&self, index: usize) -> Arc<MockSession> {
        self.sessions.lock()[index].clone()
    }

    pub fn data_source(&self) -> Arc<MockDataSource> {
        self.data_source.clone()
    }

    pub fn opened(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn last_session(&self) -> Option<Arc<MockSession>> {
        self.sessions.lock().last().cloned()
    }

    /// The next statement run by any session of this factory fails
    pub fn fail_next(&self, error: SessionError) {
        *self.behavior.fail_next.lock() = Some(error);
    }

    pub fn set_rows(&self, rows: Vec<Value>) {
        *self.behavior.rows.lock() = rows;
    }
}

#[async_trait]
impl SessionFactory for MockFactory {
    fn key(&self) -> ResourceKey {
        self.key
    }

    fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    async fn open_session(&self, mode: ExecutorMode) -> Result<Arc<dyn Session>> {
        if self.yield_on_open.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        let session = Arc::new(MockSession::with_behavior(mode, self.behavior.clone()));
        self.sessions.lock().push(session.clone());
        Ok(session)
    }
}

/// Appends `name:callback` to a shared log
pub struct RecordingSynchronization {
    name: String,
    order: i32,
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingSynchronization {
    pub fn new(name: &str, order: i32, events: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            order,
            events,
        }
    }

    fn record(&self, event: &str) {
        self.events.lock().push(format!("{}:{}", self.name, event));
    }
}

#[async_trait]
impl TransactionSynchronization for RecordingSynchronization {
    fn order(&self) -> i32 {
        self.order
    }

    async fn suspend(&self) -> Result<()> {
        self.record("suspend");
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.record("resume");
        Ok(())
    }

    async fn before_commit(&self, _read_only: bool) -> Result<()> {
        self.record("before_commit");
        Ok(())
    }

    async fn before_completion(&self) -> Result<()> {
        self.record("before_completion");
        Ok(())
    }

    async fn after_completion(&self, status: CompletionStatus) -> Result<()> {
        self.record(&format!("after_completion:{}", status));
        Ok(())
    }
}
