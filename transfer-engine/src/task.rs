//! Task types for the queue
//!
//! Payloads are tagged variants so dispatch in the engine is exhaustive;
//! an unknown task type cannot exist at runtime.

use chrono::{DateTime, Utc};
use ledger_core::types::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Agent-to-agent transfer request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Sender
    pub from: Address,

    /// Recipient
    pub to: Address,

    /// Amount
    pub amount: Decimal,

    /// Fee (routed to the treasury), defaults to zero
    #[serde(default)]
    pub fee: Decimal,

    /// Free-form metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Game round request. Outcome generation happens upstream; the engine
/// only moves the bet and the already-decided payout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRequest {
    /// Player address
    pub player: Address,

    /// Bet amount (player → game pool)
    pub bet: Decimal,

    /// Payout amount (game pool → player), zero on a loss
    #[serde(default)]
    pub payout: Decimal,

    /// Game name (slot, dice, ...)
    pub game: String,
}

/// System reward request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardRequest {
    /// Recipient address
    pub to: Address,

    /// Reward amount (system account → recipient)
    pub amount: Decimal,

    /// Reward type label (engagement, vesting, ...)
    pub reward_type: String,
}

/// Balance-mutating task payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TaskPayload {
    /// Agent-to-agent transfer
    Transfer(TransferRequest),
    /// Game bet + payout
    Game(GameRequest),
    /// System reward
    Reward(RewardRequest),
}

impl TaskPayload {
    /// Task type name (for logs and dead letters)
    pub fn kind(&self) -> &'static str {
        match self {
            TaskPayload::Transfer(_) => "transfer",
            TaskPayload::Game(_) => "game",
            TaskPayload::Reward(_) => "reward",
        }
    }
}

/// A queued unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task id
    pub task_id: Uuid,

    /// What to execute
    pub payload: TaskPayload,

    /// Priority; higher dequeues first
    pub priority: u8,

    /// Retries performed so far
    pub retry_count: u32,

    /// Retry budget
    pub max_retries: u32,

    /// Submission timestamp
    pub submitted_at: DateTime<Utc>,
}

impl Task {
    /// Create a task with a fresh id
    pub fn new(payload: TaskPayload, priority: u8, max_retries: u32) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            payload,
            priority,
            retry_count: 0,
            max_retries,
            submitted_at: Utc::now(),
        }
    }
}

/// Result of a completed task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskOutput {
    /// Transfer completed
    Transfer {
        /// Confirmed transaction id
        tx_id: String,
    },
    /// Game round completed
    Game {
        /// Bet transaction id
        bet_tx_id: String,
        /// Payout transaction id (None on a loss)
        payout_tx_id: Option<String>,
    },
    /// Reward paid
    Reward {
        /// Confirmed transaction id
        tx_id: String,
    },
}
