use crate::core::{Error, ExecutorMode, Result};
use crate::datasource::DataSource;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Who commits the session's connection
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStrategy {
    /// Defers to the ambient transaction; the only strategy sessions can
    /// be synchronized under
    #[default]
    Managed,
    /// The session commits its own connection
    Jdbc,
    /// Anything else, by name
    External(String),
}

impl TransactionStrategy {
    pub fn is_managed(&self) -> bool {
        matches!(self, TransactionStrategy::Managed)
    }
}

impl std::fmt::Display for TransactionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStrategy::Managed => write!(f, "managed"),
            TransactionStrategy::Jdbc => write!(f, "jdbc"),
            TransactionStrategy::External(name) => write!(f, "{}", name),
        }
    }
}

/// Where a session factory gets its connections and how it commits them
#[derive(Clone)]
pub struct Environment {
    pub id: String,
    pub transaction_strategy: TransactionStrategy,
    pub data_source: Arc<dyn DataSource>,
}

impl Environment {
    pub fn new(
        id: &str,
        transaction_strategy: TransactionStrategy,
        data_source: Arc<dyn DataSource>,
    ) -> Self {
        Self {
            id: id.to_string(),
            transaction_strategy,
            data_source,
        }
    }

    pub fn managed(id: &str, data_source: Arc<dyn DataSource>) -> Self {
        Self::new(id, TransactionStrategy::Managed, data_source)
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("id", &self.id)
            .field("transaction_strategy", &self.transaction_strategy)
            .field("data_source", &self.data_source.key())
            .finish()
    }
}

/// Session factory configuration
#[derive(Debug)]
pub struct Configuration {
    pub environment: Environment,
    pub default_executor_mode: ExecutorMode,
    /// Defer loading vendor error codes until the first translation
    pub lazy_translator_init: bool,
    mappers: RwLock<HashSet<String>>,
}

impl Configuration {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            default_executor_mode: ExecutorMode::default(),
            lazy_translator_init: true,
            mappers: RwLock::new(HashSet::new()),
        }
    }

    pub fn default_executor_mode(mut self, mode: ExecutorMode) -> Self {
        self.default_executor_mode = mode;
        self
    }

    pub fn lazy_translator_init(mut self, lazy: bool) -> Self {
        self.lazy_translator_init = lazy;
        self
    }

    pub fn from_settings(settings: &SessionSettings, data_source: Arc<dyn DataSource>) -> Self {
        let environment = Environment::new(
            &settings.environment_id,
            settings.transaction_strategy.clone(),
            data_source,
        );
        Self::new(environment)
            .default_executor_mode(settings.default_executor_mode)
            .lazy_translator_init(settings.lazy_translator_init)
    }

    /// Register a mapper namespace
    ///
    /// # Errors
    /// `InvalidArgument` if the namespace is already registered
    pub fn add_mapper(&self, namespace: &str) -> Result<()> {
        if !self.mappers.write().insert(namespace.to_string()) {
            return Err(Error::InvalidArgument(format!(
                "Mapper {} is already known to the configuration",
                namespace
            )));
        }
        Ok(())
    }

    pub fn has_mapper(&self, namespace: &str) -> bool {
        self.mappers.read().contains(namespace)
    }
}

/// Serializable subset of `Configuration`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub environment_id: String,
    pub default_executor_mode: ExecutorMode,
    pub transaction_strategy: TransactionStrategy,
    pub lazy_translator_init: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            environment_id: "default".to_string(),
            default_executor_mode: ExecutorMode::Simple,
            transaction_strategy: TransactionStrategy::Managed,
            lazy_translator_init: true,
        }
    }
}

impl SessionSettings {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::InvalidArgument(format!("Invalid session settings: {}", e)))
    }
}
