//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `ledger_transfers_total` - Total confirmed transfers
//! - `ledger_transfers_rejected_total` - Total rejected transfers
//! - `ledger_transfer_duration_seconds` - Histogram of transfer latencies
//! - `ledger_accounts_total` - Accounts created
//! - `ledger_total_supply` - Current minted supply

use prometheus::{Gauge, Histogram, HistogramOpts, IntCounter, Opts, Registry};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Total confirmed transfers
    pub transfers_total: IntCounter,

    /// Total rejected transfers
    pub transfers_rejected_total: IntCounter,

    /// Transfer latency histogram
    pub transfer_duration: Histogram,

    /// Accounts created
    pub accounts_total: IntCounter,

    /// Current minted supply
    pub total_supply: Gauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transfers_total = IntCounter::with_opts(Opts::new(
            "ledger_transfers_total",
            "Total confirmed transfers",
        ))?;
        registry.register(Box::new(transfers_total.clone()))?;

        let transfers_rejected_total = IntCounter::with_opts(Opts::new(
            "ledger_transfers_rejected_total",
            "Total rejected transfers",
        ))?;
        registry.register(Box::new(transfers_rejected_total.clone()))?;

        let transfer_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_transfer_duration_seconds",
                "Histogram of transfer latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(transfer_duration.clone()))?;

        let accounts_total = IntCounter::with_opts(Opts::new(
            "ledger_accounts_total",
            "Accounts created",
        ))?;
        registry.register(Box::new(accounts_total.clone()))?;

        let total_supply = Gauge::with_opts(Opts::new(
            "ledger_total_supply",
            "Current minted supply",
        ))?;
        registry.register(Box::new(total_supply.clone()))?;

        Ok(Self {
            transfers_total,
            transfers_rejected_total,
            transfer_duration,
            accounts_total,
            total_supply,
            registry,
        })
    }

    /// Record a confirmed transfer and its latency
    pub fn record_transfer(&self, duration_seconds: f64) {
        self.transfers_total.inc();
        self.transfer_duration.observe(duration_seconds);
    }

    /// Record a rejected transfer
    pub fn record_transfer_rejected(&self) {
        self.transfers_rejected_total.inc();
    }

    /// Record account creation
    pub fn record_account_created(&self) {
        self.accounts_total.inc();
    }

    /// Update the supply gauge
    pub fn update_total_supply(&self, supply: Decimal) {
        self.total_supply.set(supply.to_f64().unwrap_or(0.0));
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}
