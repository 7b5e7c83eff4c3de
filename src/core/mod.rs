pub mod error;
pub mod types;

pub use error::{
    DataAccessError, Error, ErrorKind, Result, SessionError, SqlError, TransactionError,
};
pub use types::{BatchResult, Cursor, ExecutorMode, ResourceKey, RowBounds};
