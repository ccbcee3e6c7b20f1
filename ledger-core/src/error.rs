//! Error types for the ledger

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Address does not exist
    #[error("Unknown address: {0}")]
    UnknownAddress(String),

    /// Address already has an account
    #[error("Account already exists: {0}")]
    AccountExists(String),

    /// Sender balance cannot cover amount + fee
    #[error("Insufficient balance for {address}: {balance} < {required}")]
    InsufficientBalance {
        /// Sender address
        address: String,
        /// Current balance
        balance: Decimal,
        /// Amount + fee required
        required: Decimal,
    },

    /// Frozen accounts cannot send
    #[error("Account frozen: {0}")]
    AccountFrozen(String),

    /// Invalid transaction (non-positive amount, self-transfer, etc.)
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    /// Transaction not found
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Concurrency error (worker mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl Error {
    /// Transient failures are worth retrying; rejections are not
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Storage(_) | Error::Concurrency(_) | Error::Io(_) | Error::Serialization(_)
        )
    }
}
