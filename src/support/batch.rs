use crate::core::{Cursor, DataAccessError, Error, ExecutorMode, Result, RowBounds};
use crate::session::template::from_row;
use crate::session::{Session, SessionFactory, SessionTemplate};
use crate::transaction::TransactionRegistry;
use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;

type ItemConverter<T> = Box<dyn Fn(&T) -> Result<Value> + Send + Sync>;

/// Writes items as one batched update statement per chunk.
pub struct BatchItemWriter<T> {
    template: Arc<SessionTemplate>,
    statement_id: String,
    assert_updates: bool,
    converter: ItemConverter<T>,
}

impl<T: Serialize + 'static> BatchItemWriter<T> {
    /// # Errors
    /// `InvalidArgument` unless the template runs in `Batch` mode
    pub fn new(template: Arc<SessionTemplate>, statement_id: &str) -> Result<Self> {
        if template.executor_mode() != ExecutorMode::Batch {
            return Err(Error::InvalidArgument(
                "SessionTemplate's executor mode must be BATCH".into(),
            ));
        }
        Ok(Self {
            template,
            statement_id: statement_id.to_string(),
            assert_updates: true,
            converter: Box::new(|item| {
                serde_json::to_value(item)
                    .map_err(|e| Error::InvalidArgument(format!("Could not convert item: {}", e)))
            }),
        })
    }

    pub fn from_factory(
        factory: Arc<dyn SessionFactory>,
        registry: Arc<dyn TransactionRegistry>,
        statement_id: &str,
    ) -> Result<Self> {
        let template = SessionTemplate::builder(factory, registry)
            .executor_mode(ExecutorMode::Batch)
            .build();
        Self::new(Arc::new(template), statement_id)
    }

    /// Check that every item updated at least one row (on by default)
    pub fn assert_updates(mut self, assert_updates: bool) -> Self {
        self.assert_updates = assert_updates;
        self
    }

    /// Replace the default serde conversion of items into statement parameters
    pub fn item_converter<F>(mut self, converter: F) -> Self
    where
        F: Fn(&T) -> Result<Value> + Send + Sync + 'static,
    {
        self.converter = Box::new(converter);
        self
    }

    pub async fn write(&self, items: &[T]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        debug!("Executing batch with {} items.", items.len());

        for item in items {
            let parameter = (self.converter)(item)?;
            self.template.update(&self.statement_id, Some(&parameter)).await?;
        }
        let results = self.template.flush_statements().await?;

        if self.assert_updates {
            if results.len() != 1 {
                return Err(DataAccessError::InvalidResourceUsage(format!(
                    "Batch execution returned invalid results. Expected 1 but number of BatchResult objects returned was {}",
                    results.len()
                ))
                .into());
            }
            let counts = &results[0].update_counts;
            if let Some(index) = counts.iter().position(|count| *count == 0) {
                let item = items
                    .get(index)
                    .and_then(|item| serde_json::to_string(item).ok())
                    .unwrap_or_default();
                return Err(DataAccessError::EmptyResult {
                    message: format!(
                        "Item {} of {} did not update any rows: [{}]",
                        index,
                        counts.len(),
                        item
                    ),
                    expected: 1,
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Reads a query page by page.
///
/// The statement receives the configured parameter values plus `_page`,
/// `_pagesize` and `_skiprows`.
pub struct PagingItemReader<T> {
    template: SessionTemplate,
    query_id: String,
    page_size: usize,
    parameter_values: Map<String, Value>,
    page: usize,
    buffer: VecDeque<T>,
    exhausted: bool,
}

impl<T: DeserializeOwned> PagingItemReader<T> {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        registry: Arc<dyn TransactionRegistry>,
        query_id: &str,
    ) -> Self {
        Self {
            template: SessionTemplate::builder(factory, registry)
                .executor_mode(ExecutorMode::Batch)
                .build(),
            query_id: query_id.to_string(),
            page_size: 10,
            parameter_values: Map::new(),
            page: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn parameter_values(mut self, values: Map<String, Value>) -> Self {
        self.parameter_values = values;
        self
    }

    /// Pages fetched so far
    pub fn page(&self) -> usize {
        self.page
    }

    pub async fn read(&mut self) -> Result<Option<T>> {
        if self.page_size == 0 {
            return Err(Error::InvalidArgument("Page size must be greater than zero".into()));
        }
        if self.buffer.is_empty() && !self.exhausted {
            let rows = self.read_page().await?;
            self.exhausted = rows.len() < self.page_size;
            self.page += 1;
            self.buffer.extend(rows);
        }
        Ok(self.buffer.pop_front())
    }

    async fn read_page(&self) -> Result<Vec<T>> {
        let mut parameters = self.parameter_values.clone();
        parameters.insert("_page".into(), Value::from(self.page));
        parameters.insert("_pagesize".into(), Value::from(self.page_size));
        parameters.insert("_skiprows".into(), Value::from(self.page * self.page_size));
        debug!("Reading page {} of {}", self.page, self.query_id);
        self.template
            .select_list_as(&self.query_id, Some(&Value::Object(parameters)), RowBounds::DEFAULT)
            .await
    }
}

/// Streams a query through a cursor on a session of its own.
///
/// The session is opened straight from the factory, outside any transaction
/// binding, and lives from `open` to `close`.
pub struct CursorItemReader<T> {
    factory: Arc<dyn SessionFactory>,
    query_id: String,
    parameter_values: Option<Value>,
    session: Option<Arc<dyn Session>>,
    cursor: Option<Cursor>,
    _item: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> CursorItemReader<T> {
    pub fn new(factory: Arc<dyn SessionFactory>, query_id: &str) -> Self {
        Self {
            factory,
            query_id: query_id.to_string(),
            parameter_values: None,
            session: None,
            cursor: None,
            _item: PhantomData,
        }
    }

    pub fn parameter_values(mut self, values: Value) -> Self {
        self.parameter_values = Some(values);
        self
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub async fn open(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Err(Error::IllegalState("Cursor reader is already open".into()));
        }
        let session = self.factory.open_session(ExecutorMode::Simple).await?;
        match session
            .select_cursor(&self.query_id, self.parameter_values.as_ref(), RowBounds::DEFAULT)
            .await
        {
            Ok(cursor) => {
                self.cursor = Some(cursor);
                self.session = Some(session);
                Ok(())
            }
            Err(err) => {
                session.close().await?;
                Err(err)
            }
        }
    }

    pub async fn read(&mut self) -> Result<Option<T>> {
        let cursor = self
            .cursor
            .as_mut()
            .ok_or_else(|| Error::IllegalState("Cursor reader must be opened before reading".into()))?;
        cursor.next().map(|row| from_row(&self.query_id, row)).transpose()
    }

    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
        }
        if let Some(session) = self.session.take() {
            session.close().await?;
        }
        Ok(())
    }
}
