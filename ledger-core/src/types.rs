//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for money)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Account identifier (agent address)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Create new address
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Empty addresses are never valid senders or recipients
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Normal operation
    Active,
    /// Frozen accounts cannot send
    Frozen,
}

/// Account record, owned exclusively by the ledger store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique address
    pub address: Address,

    /// Current balance (never negative)
    pub balance: Decimal,

    /// Account status
    pub status: AccountStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new active account with zero balance
    pub fn new(address: Address, now: DateTime<Utc>) -> Self {
        Self {
            address,
            balance: Decimal::ZERO,
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Transaction type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxType {
    /// Agent-to-agent transfer
    Transfer,
    /// System reward payout
    Reward,
    /// Game bet or payout
    Game,
    /// Initial supply mint
    Genesis,
    /// Supply burn
    Burn,
}

impl TxType {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::Transfer => "transfer",
            TxType::Reward => "reward",
            TxType::Game => "game",
            TxType::Genesis => "genesis",
            TxType::Burn => "burn",
        }
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    /// In flight (never produced by the atomic transfer path)
    Pending,
    /// Terminal: applied
    Confirmed,
    /// Terminal: rejected
    Failed,
}

impl TxStatus {
    /// Check if status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Confirmed | TxStatus::Failed)
    }
}

/// Immutable transaction record (append-only audit log)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Unique id, derived from content + time
    pub tx_id: String,

    /// Sender address
    pub from_address: Address,

    /// Recipient address
    pub to_address: Address,

    /// Transferred amount
    pub amount: Decimal,

    /// Fee deducted from the sender (routed to the treasury)
    pub fee: Decimal,

    /// Transaction type
    pub tx_type: TxType,

    /// Transaction status
    pub status: TxStatus,

    /// Sender balance before the transfer
    pub balance_before_from: Decimal,

    /// Sender balance after the transfer
    pub balance_after_from: Decimal,

    /// Recipient balance before the transfer
    pub balance_before_to: Decimal,

    /// Recipient balance after the transfer
    pub balance_after_to: Decimal,

    /// Free-form metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Confirmation timestamp (None while pending)
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl TransactionRecord {
    /// Verify the before/after bookkeeping of a confirmed record
    pub fn reconciles(&self) -> bool {
        self.balance_after_from == self.balance_before_from - self.amount - self.fee
            && self.balance_after_to == self.balance_before_to + self.amount
    }
}

/// Per-day spending category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendCategory {
    /// Value spent on game bets
    GameSpent,
    /// Value won from games
    GameWon,
    /// Value sent via transfers
    TransferSent,
    /// Value received via transfers
    TransferReceived,
}

/// Daily limit counters, keyed by (address, date)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyLimitRecord {
    /// Address the counters belong to
    pub address: Address,

    /// Calendar day (UTC, `%Y-%m-%d`)
    pub date: String,

    /// Value spent on game bets today
    pub game_spent: Decimal,

    /// Value won from games today
    pub game_won: Decimal,

    /// Value sent via transfers today
    pub transfer_sent: Decimal,

    /// Value received via transfers today
    pub transfer_received: Decimal,

    /// Time of the last large transfer (cooldown anchor)
    pub last_large_transfer: Option<DateTime<Utc>>,
}

impl DailyLimitRecord {
    /// Empty record for (address, date)
    pub fn new(address: Address, date: impl Into<String>) -> Self {
        Self {
            address,
            date: date.into(),
            game_spent: Decimal::ZERO,
            game_won: Decimal::ZERO,
            transfer_sent: Decimal::ZERO,
            transfer_received: Decimal::ZERO,
            last_large_transfer: None,
        }
    }

    /// Counter for a category
    pub fn get(&self, category: SpendCategory) -> Decimal {
        match category {
            SpendCategory::GameSpent => self.game_spent,
            SpendCategory::GameWon => self.game_won,
            SpendCategory::TransferSent => self.transfer_sent,
            SpendCategory::TransferReceived => self.transfer_received,
        }
    }

    /// Add to a category counter
    pub fn accumulate(&mut self, category: SpendCategory, amount: Decimal) {
        match category {
            SpendCategory::GameSpent => self.game_spent += amount,
            SpendCategory::GameWon => self.game_won += amount,
            SpendCategory::TransferSent => self.transfer_sent += amount,
            SpendCategory::TransferReceived => self.transfer_received += amount,
        }
    }
}

/// Dead-lettered task (retry budget exhausted)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Task id
    pub task_id: String,

    /// Task type name
    pub task_type: String,

    /// Serialized payload (JSON)
    pub payload: String,

    /// Submission priority
    pub priority: u8,

    /// Retries performed before giving up
    pub retry_count: u32,

    /// Last failure reason
    pub error: String,

    /// Failure timestamp
    pub failed_at: DateTime<Utc>,
}

/// Today's date key (UTC)
pub fn date_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_tx_status_terminal() {
        assert!(!TxStatus::Pending.is_terminal());
        assert!(TxStatus::Confirmed.is_terminal());
        assert!(TxStatus::Failed.is_terminal());
    }

    #[test]
    fn test_record_reconciles() {
        let now = Utc::now();
        let record = TransactionRecord {
            tx_id: "abc".to_string(),
            from_address: Address::new("AG_A"),
            to_address: Address::new("AG_B"),
            amount: dec!(100),
            fee: dec!(1),
            tx_type: TxType::Transfer,
            status: TxStatus::Confirmed,
            balance_before_from: dec!(500),
            balance_after_from: dec!(399),
            balance_before_to: dec!(200),
            balance_after_to: dec!(300),
            metadata: HashMap::new(),
            created_at: now,
            confirmed_at: Some(now),
        };
        assert!(record.reconciles());

        let mut bad = record;
        bad.balance_after_from = dec!(400);
        assert!(!bad.reconciles());
    }

    #[test]
    fn test_daily_limit_accumulate() {
        let mut record = DailyLimitRecord::new(Address::new("AG_A"), "2026-08-06");
        record.accumulate(SpendCategory::GameSpent, dec!(40));
        record.accumulate(SpendCategory::GameSpent, dec!(40));
        assert_eq!(record.get(SpendCategory::GameSpent), dec!(80));
        assert_eq!(record.get(SpendCategory::GameWon), Decimal::ZERO);
    }

    #[test]
    fn test_date_key_format() {
        let ts = DateTime::parse_from_rfc3339("2026-08-06T13:45:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(date_key(ts), "2026-08-06");
    }
}
