//! Circuit breaker for abnormal value flow
//!
//! State machine: Closed (normal) → Open (transfers rejected) → Closed
//! (auto after cooldown, or keyed manual reset). One global rolling
//! window plus one window per sending address; a per-address violation
//! is a local rejection and never opens the global breaker.
//!
//! All counters live behind a single mutex: `can_execute`,
//! `record_success` and `record_failure` are the only critical sections.

use crate::alert::{AlertSink, LogSink, TripAlert};
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use ledger_core::types::Address;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Rolling window length (minutes)
    pub time_window_minutes: i64,

    /// Global outflow cap per window
    pub amount_threshold: Decimal,

    /// Per-address outflow cap per window
    pub per_address_threshold: Decimal,

    /// Consecutive failures before trip
    pub failure_threshold: u32,

    /// Cooldown before auto-reset (minutes)
    pub cooldown_minutes: i64,

    /// Maximum transactions per window
    pub max_transactions_per_hour: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            time_window_minutes: crate::DEFAULT_WINDOW_MINUTES,
            amount_threshold: Decimal::from(500),
            per_address_threshold: Decimal::from(200),
            failure_threshold: crate::DEFAULT_FAILURE_THRESHOLD,
            cooldown_minutes: crate::DEFAULT_COOLDOWN_MINUTES,
            max_transactions_per_hour: 1000,
        }
    }
}

/// Rolling accumulation window
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FlowWindow {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    total_amount: Decimal,
    transaction_count: u32,
    tx_ids: Vec<String>,
}

impl FlowWindow {
    fn new(now: DateTime<Utc>, window_minutes: i64) -> Self {
        Self {
            start_time: now,
            end_time: now + Duration::minutes(window_minutes),
            total_amount: Decimal::ZERO,
            transaction_count: 0,
            tx_ids: Vec::new(),
        }
    }

    fn expired(&self, now: DateTime<Utc>) -> bool {
        now > self.end_time
    }

    fn add(&mut self, amount: Decimal, tx_id: &str) {
        self.total_amount += amount;
        self.transaction_count += 1;
        self.tx_ids.push(tx_id.to_string());
    }
}

/// Mutable breaker state (single-mutex critical section)
#[derive(Debug)]
struct BreakerState {
    is_open: bool,
    opened_at: Option<DateTime<Utc>>,
    failure_count: u32,
    global_window: FlowWindow,
    address_windows: HashMap<Address, FlowWindow>,
}

/// Durable snapshot of the open/closed lifecycle. Windows are
/// deliberately not persisted; they rebuild within one window length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerStateRecord {
    /// Whether the breaker was open
    pub is_open: bool,

    /// When it opened
    pub opened_at: Option<DateTime<Utc>>,

    /// Consecutive failures at snapshot time
    pub failure_count: u32,
}

/// Durable store for the breaker lifecycle record. Implementations
/// swallow their own failures; persistence must never block a trip.
pub trait BreakerStateStore: Send + Sync {
    /// Persist the snapshot
    fn save(&self, record: &BreakerStateRecord);
}

/// Snapshot of the breaker for status queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerStatus {
    /// Whether transfers are currently rejected
    pub is_open: bool,

    /// When the breaker opened
    pub opened_at: Option<DateTime<Utc>>,

    /// Consecutive failures so far
    pub failure_count: u32,

    /// Global window outflow
    pub window_total: Decimal,

    /// Global window transaction count
    pub window_count: u32,

    /// Global window start
    pub window_start: DateTime<Utc>,

    /// Global window end
    pub window_end: DateTime<Utc>,
}

/// Circuit breaker guarding the transfer path
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
    alerts: Arc<dyn AlertSink>,
    reset_key: Option<String>,
    store: Option<Arc<dyn BreakerStateStore>>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker").field("config", &self.config).finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Create a breaker with a log-only alert sink and no reset key
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_alerts(config, Arc::new(LogSink), None)
    }

    /// Create a breaker with an alert sink and manual-reset key
    pub fn with_alerts(
        config: CircuitBreakerConfig,
        alerts: Arc<dyn AlertSink>,
        reset_key: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let state = BreakerState {
            is_open: false,
            opened_at: None,
            failure_count: 0,
            global_window: FlowWindow::new(now, config.time_window_minutes),
            address_windows: HashMap::new(),
        };
        Self {
            config,
            state: Mutex::new(state),
            alerts,
            reset_key,
            store: None,
        }
    }

    /// Attach a durable state store and restore a prior snapshot. An
    /// open breaker stays open across restarts until its cooldown
    /// elapses (or a keyed manual reset).
    pub fn with_state_store(
        mut self,
        store: Arc<dyn BreakerStateStore>,
        restored: Option<BreakerStateRecord>,
    ) -> Self {
        if let Some(record) = restored {
            let mut state = self.state.lock();
            state.is_open = record.is_open;
            state.opened_at = record.opened_at;
            state.failure_count = record.failure_count;
            if record.is_open {
                tracing::warn!(opened_at = ?record.opened_at, "Circuit breaker restored in open state");
            }
        }
        self.store = Some(store);
        self
    }

    /// Check whether a transfer may execute.
    ///
    /// Evaluation order: open-state (with cooldown auto-reset), then the
    /// sender's own window, then the global amount and rate checks. The
    /// per-address check runs first so a single hot address is rejected
    /// locally without opening the breaker for everyone else.
    pub fn can_execute(&self, from: &Address, amount: Decimal) -> Result<()> {
        let now = Utc::now();
        let mut state = self.state.lock();

        if state.is_open {
            if self.cooldown_elapsed(&state, now) {
                tracing::info!("Circuit breaker cooldown elapsed, auto-resetting");
                self.reset_locked(&mut state, now);
            } else {
                return Err(Error::CircuitOpen {
                    reason: "circuit open".to_string(),
                    retry_after_secs: self.retry_after_secs(&state, now),
                });
            }
        }

        // Per-address window first (local rejection, no trip)
        let window_minutes = self.config.time_window_minutes;
        let addr_window = state
            .address_windows
            .entry(from.clone())
            .or_insert_with(|| FlowWindow::new(now, window_minutes));
        if addr_window.expired(now) {
            *addr_window = FlowWindow::new(now, window_minutes);
        }
        if addr_window.total_amount + amount > self.config.per_address_threshold {
            tracing::warn!(address = %from, amount = %amount, "Per-address flow window exceeded");
            return Err(Error::AddressFlowExceeded {
                address: from.to_string(),
                reason: format!(
                    "{} + {} exceeds per-address cap {}",
                    addr_window.total_amount, amount, self.config.per_address_threshold
                ),
            });
        }

        // Global window
        if state.global_window.expired(now) {
            state.global_window = FlowWindow::new(now, window_minutes);
        }
        if state.global_window.total_amount + amount > self.config.amount_threshold {
            self.trip(&mut state, now, "window amount exceeded");
            return Err(Error::CircuitOpen {
                reason: "window amount exceeded".to_string(),
                retry_after_secs: self.retry_after_secs(&state, now),
            });
        }

        if state.global_window.transaction_count >= self.config.max_transactions_per_hour {
            self.trip(&mut state, now, "transaction rate exceeded");
            return Err(Error::CircuitOpen {
                reason: "transaction rate exceeded".to_string(),
                retry_after_secs: self.retry_after_secs(&state, now),
            });
        }

        Ok(())
    }

    /// Record a successful transfer; resets the consecutive-failure count
    pub fn record_success(&self, from: &Address, amount: Decimal, tx_id: &str) {
        let now = Utc::now();
        let mut state = self.state.lock();

        if state.global_window.expired(now) {
            state.global_window = FlowWindow::new(now, self.config.time_window_minutes);
        }
        state.global_window.add(amount, tx_id);

        let window_minutes = self.config.time_window_minutes;
        let addr_window = state
            .address_windows
            .entry(from.clone())
            .or_insert_with(|| FlowWindow::new(now, window_minutes));
        if addr_window.expired(now) {
            *addr_window = FlowWindow::new(now, window_minutes);
        }
        addr_window.add(amount, tx_id);

        state.failure_count = 0;
    }

    /// Record an execution failure; trips the breaker at the threshold
    pub fn record_failure(&self, reason: &str) {
        let now = Utc::now();
        let mut state = self.state.lock();

        state.failure_count += 1;
        tracing::warn!(
            failure_count = state.failure_count,
            threshold = self.config.failure_threshold,
            reason,
            "Transfer failure recorded"
        );

        if state.failure_count >= self.config.failure_threshold {
            let detail = format!("{} consecutive failures", state.failure_count);
            self.trip(&mut state, now, &detail);
        }
    }

    /// Current breaker status
    pub fn status(&self) -> BreakerStatus {
        let state = self.state.lock();
        BreakerStatus {
            is_open: state.is_open,
            opened_at: state.opened_at,
            failure_count: state.failure_count,
            window_total: state.global_window.total_amount,
            window_count: state.global_window.transaction_count,
            window_start: state.global_window.start_time,
            window_end: state.global_window.end_time,
        }
    }

    /// Manual reset bypassing the cooldown. Returns `true` only when the
    /// provided key matches the configured secret; any mismatch (or an
    /// unconfigured key) is a no-op returning `false`.
    pub fn manual_reset(&self, key: &str) -> bool {
        match &self.reset_key {
            Some(expected) if expected == key => {
                let mut state = self.state.lock();
                self.reset_locked(&mut state, Utc::now());
                tracing::info!("Circuit breaker manually reset");
                true
            }
            _ => {
                tracing::warn!("Circuit breaker manual reset rejected: bad key");
                false
            }
        }
    }

    fn cooldown_elapsed(&self, state: &BreakerState, now: DateTime<Utc>) -> bool {
        match state.opened_at {
            Some(opened_at) => now - opened_at > Duration::minutes(self.config.cooldown_minutes),
            None => true,
        }
    }

    fn retry_after_secs(&self, state: &BreakerState, now: DateTime<Utc>) -> i64 {
        match state.opened_at {
            Some(opened_at) => {
                let deadline = opened_at + Duration::minutes(self.config.cooldown_minutes);
                (deadline - now).num_seconds().max(0)
            }
            None => 0,
        }
    }

    fn reset_locked(&self, state: &mut BreakerState, now: DateTime<Utc>) {
        state.is_open = false;
        state.opened_at = None;
        state.failure_count = 0;
        state.global_window = FlowWindow::new(now, self.config.time_window_minutes);
        state.address_windows.clear();
        self.persist(state);
    }

    fn persist(&self, state: &BreakerState) {
        if let Some(store) = &self.store {
            store.save(&BreakerStateRecord {
                is_open: state.is_open,
                opened_at: state.opened_at,
                failure_count: state.failure_count,
            });
        }
    }

    fn trip(&self, state: &mut BreakerState, now: DateTime<Utc>, reason: &str) {
        state.is_open = true;
        state.opened_at = Some(now);
        self.persist(state);

        tracing::error!(reason, window_total = %state.global_window.total_amount, "Circuit breaker tripped");

        let alert = TripAlert {
            reason: reason.to_string(),
            opened_at: now,
            window_total: state.global_window.total_amount,
            transaction_count: state.global_window.transaction_count,
            cooldown_minutes: self.config.cooldown_minutes,
        };

        // Fire-and-forget: a sink failure (or the absence of a runtime)
        // must never block the trip.
        let sink = Arc::clone(&self.alerts);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                sink.notify(&alert).await;
            });
        } else {
            tracing::debug!("No async runtime, trip alert logged only");
        }
    }
}
