//! Error types for the transfer engine

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Transfer engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger store error
    #[error(transparent)]
    Ledger(#[from] ledger_core::Error),

    /// Risk control rejection
    #[error(transparent)]
    Risk(#[from] risk_engine::Error),

    /// Request validation failure (never retried)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Queue/worker channel failure
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Retry budget exhausted; the task was dead-lettered
    #[error("Retry exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// Attempts made (initial + retries)
        attempts: u32,
        /// Last error
        last_error: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Transient failures get re-queued; rejections return to the caller
    /// immediately and are never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Ledger(e) => e.is_transient(),
            Error::Concurrency(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_not_retryable() {
        assert!(!Error::Validation("bad".to_string()).is_retryable());
        assert!(!Error::Risk(risk_engine::Error::DailyLimitExceeded("cap".to_string()))
            .is_retryable());
        assert!(!Error::Ledger(ledger_core::Error::InsufficientBalance {
            address: "AG_A".to_string(),
            balance: Default::default(),
            required: Default::default(),
        })
        .is_retryable());
    }

    #[test]
    fn test_transient_store_errors_retryable() {
        assert!(Error::Ledger(ledger_core::Error::Storage("lock contention".to_string()))
            .is_retryable());
        assert!(Error::Concurrency("mailbox closed".to_string()).is_retryable());
    }
}
