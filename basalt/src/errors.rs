use crate::lock_manager::LockError;
use thiserror::Error;

/// Errors surfaced by the storage engine and the operators built on it.
#[derive(Error, Debug)]
pub enum DbError {
    /// A lock could not be acquired in time. The caller is expected to
    /// finish the transaction with `transaction_complete(tid, false)`.
    #[error("transaction aborted")]
    TransactionAborted,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A lookup missed: unknown table, unknown field name, bad field index.
    #[error("no such element: {0}")]
    NoSuchElement(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A programming or resource error inside the engine: no clean eviction
    /// victim, lock released without being held, schema mismatch on insert,
    /// page number out of range.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<LockError> for DbError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Timeout => DbError::TransactionAborted,
        }
    }
}
