use super::types::ResourceKey;
use thiserror::Error;

/// Low-level driver fault (what a JDBC-style driver would raise).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (SQL state: {}, error code: {})",
    .sql_state.as_deref().unwrap_or("n/a"),
    .error_code.map(|c| c.to_string()).unwrap_or_else(|| "n/a".into()))]
pub struct SqlError {
    pub message: String,
    pub sql_state: Option<String>,
    pub error_code: Option<i32>,
}

impl SqlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sql_state: None,
            error_code: None,
        }
    }

    pub fn with_sql_state(mut self, state: impl Into<String>) -> Self {
        self.sql_state = Some(state.into());
        self
    }

    pub fn with_error_code(mut self, code: i32) -> Self {
        self.error_code = Some(code);
        self
    }
}

/// Errors raised by the ambient transaction machinery.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("No transaction is active")]
    NoTransaction,

    #[error("Transaction is already completed - do not call commit or rollback more than once")]
    AlreadyCompleted,

    #[error("Transaction rolled back because it has been marked as rollback-only")]
    UnexpectedRollback,

    #[error("Transaction timed out: {0}")]
    Timeout(String),

    #[error("Transaction system error: {0}")]
    System(String),
}

/// The session's own error type.
///
/// A session wraps whatever went wrong underneath it; the embedded cause is
/// what the translator inspects.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("{message}")]
    Sql {
        message: String,
        #[source]
        source: SqlError,
    },

    #[error("{message}")]
    Transaction {
        message: String,
        #[source]
        source: TransactionError,
    },

    #[error("{message}")]
    Wrapped {
        message: String,
        #[source]
        source: Box<SessionError>,
    },

    #[error("{0}")]
    Other(String),
}

impl SessionError {
    pub fn sql(message: impl Into<String>, source: SqlError) -> Self {
        Self::Sql {
            message: message.into(),
            source,
        }
    }

    pub fn transaction(message: impl Into<String>, source: TransactionError) -> Self {
        Self::Transaction {
            message: message.into(),
            source,
        }
    }

    pub fn wrap(message: impl Into<String>, source: SessionError) -> Self {
        Self::Wrapped {
            message: message.into(),
            source: Box::new(source),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Sql { message, .. }
            | Self::Transaction { message, .. }
            | Self::Wrapped { message, .. } => message,
            Self::Other(message) => message,
        }
    }
}

/// Coarse classification of a normalized error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Retryable or configuration mismatch; surfaced immediately, never retried here.
    TransientResource,
    /// Raised by the ambient transaction manager; propagated unchanged.
    Transactional,
    /// Recognized driver fault that will fail again if retried.
    NonTransient,
    /// Anything else, with the original kept as cause.
    Uncategorized,
}

/// Normalized data-access errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataAccessError {
    #[error("Transient resource error: {0}")]
    TransientResource(String),

    #[error("Bad SQL grammar: {message}")]
    BadSqlGrammar {
        message: String,
        #[source]
        source: SqlError,
    },

    #[error("Duplicate key: {message}")]
    DuplicateKey {
        message: String,
        #[source]
        source: SqlError,
    },

    #[error("Data integrity violation: {message}")]
    DataIntegrityViolation {
        message: String,
        #[source]
        source: SqlError,
    },

    #[error("Data access resource failure: {message}")]
    DataAccessResourceFailure {
        message: String,
        #[source]
        source: SqlError,
    },

    #[error("Transient data access resource error: {message}")]
    TransientDataAccessResource {
        message: String,
        #[source]
        source: SqlError,
    },

    #[error("Cannot acquire lock: {message}")]
    CannotAcquireLock {
        message: String,
        #[source]
        source: SqlError,
    },

    #[error("Deadlock loser: {message}")]
    DeadlockLoser {
        message: String,
        #[source]
        source: SqlError,
    },

    #[error("Cannot serialize transaction: {message}")]
    CannotSerializeTransaction {
        message: String,
        #[source]
        source: SqlError,
    },

    #[error("Uncategorized SQL error: {message}")]
    UncategorizedSql {
        message: String,
        #[source]
        source: SqlError,
    },

    #[error("Uncategorized session error: {source}")]
    Uncategorized {
        #[source]
        source: SessionError,
    },

    #[error("Invalid resource usage: {0}")]
    InvalidResourceUsage(String),

    #[error("Empty result: {message} (expected {expected})")]
    EmptyResult { message: String, expected: usize },
}

impl DataAccessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TransientResource(_)
            | Self::TransientDataAccessResource { .. }
            | Self::CannotAcquireLock { .. }
            | Self::DeadlockLoser { .. }
            | Self::CannotSerializeTransaction { .. } => ErrorKind::TransientResource,
            Self::BadSqlGrammar { .. }
            | Self::DuplicateKey { .. }
            | Self::DataIntegrityViolation { .. }
            | Self::DataAccessResourceFailure { .. }
            | Self::InvalidResourceUsage(_)
            | Self::EmptyResult { .. } => ErrorKind::NonTransient,
            Self::UncategorizedSql { .. } | Self::Uncategorized { .. } => ErrorKind::Uncategorized,
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    DataAccess(#[from] DataAccessError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Strips every `Context` layer and returns the innermost error.
    pub fn unwrap_nested(self) -> Error {
        let mut current = self;
        while let Error::Context { source, .. } = current {
            current = *source;
        }
        current
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::DataAccess(err) => Some(err.kind()),
            Error::Transaction(_) => Some(ErrorKind::Transactional),
            Error::Context { source, .. } => source.kind(),
            _ => None,
        }
    }

    pub(crate) fn already_bound(key: ResourceKey) -> Self {
        Error::IllegalState(format!("Already value bound for key [{}]", key))
    }

    pub(crate) fn not_bound(key: ResourceKey) -> Self {
        Error::IllegalState(format!("No value for key [{}] bound", key))
    }
}
