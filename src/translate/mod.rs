// ============================================================================
// Error Translation
// ============================================================================
//
// Maps the session's native errors onto the normalized `DataAccessError`
// taxonomy. Driver faults go through a vendor error-code table that is
// loaded at most once, on first use unless configured otherwise.
//
// ============================================================================

pub mod sql_state;

pub use sql_state::SqlErrorCodes;

use crate::core::{DataAccessError, Error, SessionError, SqlError, TransactionError};
use crate::datasource::DataSource;
use log::debug;
use once_cell::sync::OnceCell;
use std::sync::Arc;

pub trait ErrorTranslator: Send + Sync {
    /// Translate a native session error. `Err` hands the error back when
    /// the translator doesn't recognize it.
    fn translate(&self, error: SessionError) -> std::result::Result<Error, SessionError>;
}

enum Cause {
    Sql(SqlError),
    Transaction(TransactionError),
    Other,
}

/// Default translator: SQL faults via vendor codes, transaction faults
/// unchanged, everything else uncategorized.
pub struct SessionErrorTranslator {
    data_source: Option<Arc<dyn DataSource>>,
    codes: OnceCell<SqlErrorCodes>,
}

impl SessionErrorTranslator {
    pub fn new(data_source: Option<Arc<dyn DataSource>>, lazy_init: bool) -> Self {
        let translator = Self {
            data_source,
            codes: OnceCell::new(),
        };
        if !lazy_init {
            translator.codes();
        }
        translator
    }

    pub fn is_initialized(&self) -> bool {
        self.codes.get().is_some()
    }

    fn codes(&self) -> &SqlErrorCodes {
        self.codes.get_or_init(|| {
            let product = self.data_source.as_ref().and_then(|ds| ds.product_name());
            let codes = SqlErrorCodes::for_product(product.as_deref());
            debug!("Loaded {} SQL error codes for product {:?}", codes.database(), product);
            codes
        })
    }
}

impl ErrorTranslator for SessionErrorTranslator {
    fn translate(&self, error: SessionError) -> std::result::Result<Error, SessionError> {
        let mut root = &error;
        while let SessionError::Wrapped { source, .. } = root {
            root = source;
        }
        let cause = match root {
            SessionError::Sql { source, .. } => Cause::Sql(source.clone()),
            SessionError::Transaction { source, .. } => Cause::Transaction(source.clone()),
            _ => Cause::Other,
        };

        Ok(match cause {
            Cause::Sql(sql) => Error::DataAccess(self.codes().translate(error.message(), sql)),
            Cause::Transaction(tx) => Error::Transaction(tx),
            Cause::Other => Error::DataAccess(DataAccessError::Uncategorized { source: error }),
        })
    }
}

impl std::fmt::Debug for SessionErrorTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionErrorTranslator")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDataSource;

    #[test]
    fn test_lazy_initialization() {
        let ds = Arc::new(MockDataSource::with_product("PostgreSQL"));
        let translator = SessionErrorTranslator::new(Some(ds.clone()), true);
        assert!(!translator.is_initialized());
        assert_eq!(ds.product_name_calls(), 0);

        let translated = translator
            .translate(SessionError::sql("insert", SqlError::new("dup").with_sql_state("23505")))
            .unwrap();
        assert!(matches!(
            translated,
            Error::DataAccess(DataAccessError::DuplicateKey { .. })
        ));
        assert!(translator.is_initialized());

        translator
            .translate(SessionError::sql("insert", SqlError::new("dup").with_sql_state("23505")))
            .unwrap();
        assert_eq!(ds.product_name_calls(), 1);
    }

    #[test]
    fn test_eager_initialization() {
        let ds = Arc::new(MockDataSource::new());
        let translator = SessionErrorTranslator::new(Some(ds.clone()), false);
        assert!(translator.is_initialized());
        assert_eq!(ds.product_name_calls(), 1);
    }

    #[test]
    fn test_transaction_fault_passes_through_unchanged() {
        let translator = SessionErrorTranslator::new(None, true);
        let err = SessionError::wrap(
            "flush failed",
            SessionError::transaction("commit", TransactionError::UnexpectedRollback),
        );

        let translated = translator.translate(err).unwrap();
        assert!(matches!(
            translated,
            Error::Transaction(TransactionError::UnexpectedRollback)
        ));
    }

    #[test]
    fn test_other_fault_is_uncategorized_with_cause() {
        let translator = SessionErrorTranslator::new(None, true);
        let original = SessionError::Other("mapping failed".into());

        match translator.translate(original.clone()).unwrap() {
            Error::DataAccess(DataAccessError::Uncategorized { source }) => {
                assert_eq!(source, original)
            }
            other => panic!("unexpected translation: {:?}", other),
        }
        assert!(!translator.is_initialized());
    }
}
