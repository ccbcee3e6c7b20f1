//! Risk Engine for Mintbook
//!
//! Proactive flow controls for the transfer path: per-address daily
//! spending limits with a large-transfer cooldown, and a circuit breaker
//! that halts transfers when abnormal volume or failure patterns appear.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod alert;
pub mod breaker;
pub mod error;
pub mod limits;

pub use alert::{AlertSink, LogSink, TripAlert, WebhookSink};
pub use breaker::{
    BreakerStateRecord, BreakerStateStore, BreakerStatus, CircuitBreaker, CircuitBreakerConfig,
};
pub use error::{Error, Result};
pub use limits::{DailyLimitTracker, LimitPolicy, LimitUsage};

/// Default circuit breaker failure threshold (consecutive failures before trip)
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default circuit breaker cooldown (minutes before auto-reset)
pub const DEFAULT_COOLDOWN_MINUTES: i64 = 30;

/// Default rolling window length (minutes)
pub const DEFAULT_WINDOW_MINUTES: i64 = 10;
