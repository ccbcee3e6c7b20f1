//! Transfer orchestration
//!
//! The engine composes the risk controls and the ledger store as plain
//! pre-conditions in a linear flow: validation → daily limits → circuit
//! breaker → atomic ledger mutation → counter updates. A rejection at
//! any step leaves balances and every counter exactly as they were.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::task::{GameRequest, RewardRequest, Task, TaskOutput, TaskPayload, TransferRequest};
use async_trait::async_trait;
use chrono::Utc;
use ledger_core::types::{date_key, Address, SpendCategory, TxType};
use ledger_core::Ledger;
use risk_engine::{
    AlertSink, BreakerStateRecord, BreakerStateStore, BreakerStatus, CircuitBreaker,
    DailyLimitTracker, LimitUsage, LogSink, WebhookSink,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

/// Orchestrates limit checks, the circuit breaker and the ledger store
pub struct TransferEngine {
    ledger: Arc<Ledger>,
    limits: DailyLimitTracker,
    breaker: CircuitBreaker,
}

impl std::fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferEngine").finish_non_exhaustive()
    }
}

impl TransferEngine {
    /// Create the engine, hydrating the daily limit tracker from today's
    /// persisted counters so limits survive a restart.
    pub fn new(ledger: Arc<Ledger>, config: &Config) -> Result<Arc<Self>> {
        let alerts: Arc<dyn AlertSink> = match &config.alert_webhook_url {
            Some(url) => Arc::new(WebhookSink::new(url.clone())),
            None => Arc::new(LogSink),
        };

        let restored = ledger
            .load_breaker_state()?
            .and_then(|bytes| serde_json::from_slice::<BreakerStateRecord>(&bytes).ok());

        let breaker = CircuitBreaker::with_alerts(
            config.breaker.clone(),
            alerts,
            config.reset_key.clone(),
        )
        .with_state_store(
            Arc::new(LedgerStateStore {
                ledger: ledger.clone(),
            }),
            restored,
        );
        let limits = DailyLimitTracker::new(config.limits.clone());

        let today = date_key(Utc::now());
        for record in ledger.daily_limit_records()? {
            if record.date == today {
                limits.seed(record);
            }
        }
        tracing::info!(tracked = limits.tracked_addresses(), "Daily limit tracker hydrated");

        Ok(Arc::new(Self {
            ledger,
            limits,
            breaker,
        }))
    }

    /// Underlying ledger store
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    // Mutating flows (invoked by the queue worker, one at a time)

    fn execute_transfer(&self, req: &TransferRequest) -> Result<TaskOutput> {
        validate_transfer(req)?;

        let now = Utc::now();
        self.limits.check_transfer(&req.from, req.amount, now)?;
        self.breaker.can_execute(&req.from, req.amount)?;

        match self.ledger.transfer(
            &req.from,
            &req.to,
            req.amount,
            req.fee,
            TxType::Transfer,
            req.metadata.clone(),
        ) {
            Ok(record) => {
                self.limits.record_transfer(&req.from, &req.to, req.amount, now);
                self.persist_daily(&req.from, SpendCategory::TransferSent, req.amount);
                self.persist_daily(&req.to, SpendCategory::TransferReceived, req.amount);
                if req.amount >= self.limits.policy().large_transfer_threshold {
                    if let Err(e) = self.ledger.record_large_transfer(&req.from, now) {
                        tracing::warn!(error = %e, "Failed to persist large-transfer anchor");
                    }
                }
                self.breaker.record_success(&req.from, req.amount, &record.tx_id);

                tracing::info!(
                    tx_id = %record.tx_id,
                    from = %req.from,
                    to = %req.to,
                    amount = %req.amount,
                    "Transfer confirmed"
                );
                Ok(TaskOutput::Transfer { tx_id: record.tx_id })
            }
            Err(e) => {
                self.breaker.record_failure(&e.to_string());
                Err(e.into())
            }
        }
    }

    fn execute_game(&self, req: &GameRequest) -> Result<TaskOutput> {
        if req.bet <= Decimal::ZERO {
            return Err(Error::Validation("Bet must be positive".to_string()));
        }
        if req.payout < Decimal::ZERO {
            return Err(Error::Validation("Payout cannot be negative".to_string()));
        }

        let now = Utc::now();
        self.limits.check_game_bet(&req.player, req.bet, now)?;
        if req.payout > Decimal::ZERO {
            self.limits.check_game_win(&req.player, req.payout, now)?;
        }

        let pool = self.ledger.game_pool_address();
        let metadata: HashMap<String, String> =
            HashMap::from([("game".to_string(), req.game.clone())]);

        let bet_record = self.ledger.transfer(
            &req.player,
            &pool,
            req.bet,
            Decimal::ZERO,
            TxType::Game,
            metadata.clone(),
        )?;

        let payout_tx_id = if req.payout > Decimal::ZERO {
            let payout_record = self.ledger.transfer(
                &pool,
                &req.player,
                req.payout,
                Decimal::ZERO,
                TxType::Game,
                metadata,
            )?;
            Some(payout_record.tx_id)
        } else {
            None
        };

        self.limits.record_game(&req.player, req.bet, req.payout, now);
        self.persist_daily(&req.player, SpendCategory::GameSpent, req.bet);
        if req.payout > Decimal::ZERO {
            self.persist_daily(&req.player, SpendCategory::GameWon, req.payout);
        }

        Ok(TaskOutput::Game {
            bet_tx_id: bet_record.tx_id,
            payout_tx_id,
        })
    }

    fn execute_reward(&self, req: &RewardRequest) -> Result<TaskOutput> {
        if req.amount <= Decimal::ZERO {
            return Err(Error::Validation("Reward must be positive".to_string()));
        }

        let metadata: HashMap<String, String> =
            HashMap::from([("reward_type".to_string(), req.reward_type.clone())]);

        let record = self.ledger.transfer(
            &self.ledger.system_address(),
            &req.to,
            req.amount,
            Decimal::ZERO,
            TxType::Reward,
            metadata,
        )?;

        self.limits
            .record_transfer(&self.ledger.system_address(), &req.to, req.amount, Utc::now());
        self.persist_daily(&req.to, SpendCategory::TransferReceived, req.amount);

        Ok(TaskOutput::Reward { tx_id: record.tx_id })
    }

    /// Best-effort write-behind of the persisted counters. The in-memory
    /// tracker is already updated; a storage hiccup here must not fail a
    /// transfer that has committed.
    fn persist_daily(&self, address: &Address, category: SpendCategory, amount: Decimal) {
        if let Err(e) = self.ledger.accumulate_daily(address, category, amount, Utc::now()) {
            tracing::warn!(address = %address, error = %e, "Failed to persist daily counter");
        }
    }

    // Read-side API (no queue round-trip)

    /// Balance of an address, 0 if unknown
    pub fn balance(&self, address: &Address) -> Result<Decimal> {
        Ok(self.ledger.get_balance(address)?)
    }

    /// Daily usage for an (address, category)
    pub fn daily_limit(&self, address: &Address, category: SpendCategory) -> LimitUsage {
        self.limits.usage(address, category, Utc::now())
    }

    /// Circuit breaker status snapshot
    pub fn breaker_status(&self) -> BreakerStatus {
        self.breaker.status()
    }

    /// Keyed manual breaker reset; mismatches are a no-op returning false
    pub fn manual_reset_breaker(&self, key: &str) -> bool {
        self.breaker.manual_reset(key)
    }
}

#[async_trait]
impl crate::queue::TaskExecutor for TransferEngine {
    async fn execute(&self, task: &Task) -> Result<TaskOutput> {
        tracing::debug!(
            task_id = %task.task_id,
            task_type = task.payload.kind(),
            "Executing task"
        );

        match &task.payload {
            TaskPayload::Transfer(req) => self.execute_transfer(req),
            TaskPayload::Game(req) => self.execute_game(req),
            TaskPayload::Reward(req) => self.execute_reward(req),
        }
    }
}

/// Writes breaker lifecycle snapshots into the ledger's meta records.
/// Persistence failures are swallowed; they must never block a trip.
struct LedgerStateStore {
    ledger: Arc<Ledger>,
}

impl BreakerStateStore for LedgerStateStore {
    fn save(&self, record: &BreakerStateRecord) {
        match serde_json::to_vec(record) {
            Ok(bytes) => {
                if let Err(e) = self.ledger.save_breaker_state(&bytes) {
                    tracing::warn!(error = %e, "Failed to persist breaker state");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialize breaker state"),
        }
    }
}

fn validate_transfer(req: &TransferRequest) -> Result<()> {
    if req.amount <= Decimal::ZERO {
        return Err(Error::Validation("Amount must be positive".to_string()));
    }
    if req.fee < Decimal::ZERO {
        return Err(Error::Validation("Fee cannot be negative".to_string()));
    }
    if req.from.is_empty() || req.to.is_empty() {
        return Err(Error::Validation("Addresses cannot be empty".to_string()));
    }
    if req.from == req.to {
        return Err(Error::Validation("Sender and recipient must differ".to_string()));
    }
    Ok(())
}
