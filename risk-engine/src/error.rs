//! Error types for the risk engine

use thiserror::Error;

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Risk engine errors
#[derive(Debug, Error)]
pub enum Error {
    /// A daily or single-transfer limit would be exceeded
    #[error("Daily limit exceeded: {0}")]
    DailyLimitExceeded(String),

    /// Circuit breaker is open; includes a retry-after hint
    #[error("Circuit open ({reason}), retry in {retry_after_secs}s")]
    CircuitOpen {
        /// Trip or rejection reason
        reason: String,
        /// Seconds until the cooldown elapses
        retry_after_secs: i64,
    },

    /// Per-address flow window exceeded (local rejection, breaker stays closed)
    #[error("Address flow exceeded for {address}: {reason}")]
    AddressFlowExceeded {
        /// Sending address
        address: String,
        /// Rejection reason
        reason: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
