//! Main ledger orchestration layer
//!
//! Ties storage and supply bookkeeping into the high-level store API:
//! balances, atomic transfers, burns and the log queries the auditor
//! reads. Mutations are expected to arrive through a single consumer
//! (the task queue); balance reads may run concurrently with it.

use crate::{
    config::Config,
    error::{Error, Result},
    metrics::Metrics,
    storage::{Storage, StorageStats},
    types::{
        date_key, Account, AccountStatus, Address, DailyLimitRecord, DeadLetter, SpendCategory,
        TransactionRecord, TxStatus, TxType,
    },
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

/// Main ledger store interface
pub struct Ledger {
    storage: Arc<Storage>,
    config: Config,
    metrics: Metrics,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Ledger {
    /// Open the ledger, creating the well-known accounts and minting the
    /// initial supply on a fresh store.
    pub fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to register metrics: {}", e)))?;

        let ledger = Self { storage, config, metrics };
        ledger.bootstrap()?;
        Ok(ledger)
    }

    /// System account address (genesis recipient, reward source)
    pub fn system_address(&self) -> Address {
        Address::new(self.config.supply.system_address.clone())
    }

    /// Treasury account address (fee collector)
    pub fn treasury_address(&self) -> Address {
        Address::new(self.config.supply.treasury_address.clone())
    }

    /// Game pool account address
    pub fn game_pool_address(&self) -> Address {
        Address::new(self.config.supply.game_pool_address.clone())
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn bootstrap(&self) -> Result<()> {
        let now = Utc::now();
        let system = self.system_address();

        for address in [
            system.clone(),
            self.treasury_address(),
            self.game_pool_address(),
        ] {
            if self.storage.get_account(&address)?.is_none() {
                self.storage.put_account(&Account::new(address, now))?;
            }
        }

        // Fresh store: mint the initial supply to the system account
        if self.storage.total_minted()? == Decimal::ZERO
            && self.config.supply.initial_supply > Decimal::ZERO
        {
            let supply = self.config.supply.initial_supply;
            let mut account = self
                .storage
                .get_account(&system)?
                .ok_or_else(|| Error::UnknownAddress(system.to_string()))?;

            let record = TransactionRecord {
                tx_id: derive_tx_id(&system, &system, supply, now),
                from_address: system.clone(),
                to_address: system.clone(),
                amount: supply,
                fee: Decimal::ZERO,
                tx_type: TxType::Genesis,
                status: TxStatus::Confirmed,
                balance_before_from: Decimal::ZERO,
                balance_after_from: supply,
                balance_before_to: Decimal::ZERO,
                balance_after_to: supply,
                metadata: HashMap::new(),
                created_at: now,
                confirmed_at: Some(now),
            };

            account.balance = supply;
            account.updated_at = now;

            self.storage.commit_transfer(&[&account], &record)?;
            self.storage.put_total_minted(supply)?;
            self.metrics.update_total_supply(supply);

            tracing::info!(supply = %supply, "Genesis supply minted");
        }

        Ok(())
    }

    // Account operations

    /// Create a new account with zero balance
    pub fn create_account(&self, address: &Address) -> Result<Account> {
        if address.is_empty() {
            return Err(Error::InvalidTransaction("Empty address".to_string()));
        }
        if self.storage.get_account(address)?.is_some() {
            return Err(Error::AccountExists(address.to_string()));
        }

        let account = Account::new(address.clone(), Utc::now());
        self.storage.put_account(&account)?;
        self.metrics.record_account_created();

        tracing::info!(address = %address, "Account created");
        Ok(account)
    }

    /// Get account by address
    pub fn get_account(&self, address: &Address) -> Result<Option<Account>> {
        self.storage.get_account(address)
    }

    /// Get balance, 0 if the address is unknown
    pub fn get_balance(&self, address: &Address) -> Result<Decimal> {
        Ok(self
            .storage
            .get_account(address)?
            .map(|a| a.balance)
            .unwrap_or(Decimal::ZERO))
    }

    /// Freeze or unfreeze an account
    pub fn set_account_status(&self, address: &Address, status: AccountStatus) -> Result<()> {
        let mut account = self
            .storage
            .get_account(address)?
            .ok_or_else(|| Error::UnknownAddress(address.to_string()))?;
        account.status = status;
        account.updated_at = Utc::now();
        self.storage.put_account(&account)
    }

    // Transfer (core, atomic)

    /// Execute an atomic transfer.
    ///
    /// Reads both balances, validates sufficiency, writes both new
    /// balances (plus the treasury when `fee > 0`) and appends the
    /// confirmed transaction record as one indivisible batch. On any
    /// rejection no state changes and no record is created.
    pub fn transfer(
        &self,
        from: &Address,
        to: &Address,
        amount: Decimal,
        fee: Decimal,
        tx_type: TxType,
        metadata: HashMap<String, String>,
    ) -> Result<TransactionRecord> {
        let timer = std::time::Instant::now();

        if amount <= Decimal::ZERO {
            self.metrics.record_transfer_rejected();
            return Err(Error::InvalidTransaction("Amount must be positive".to_string()));
        }
        if fee < Decimal::ZERO {
            self.metrics.record_transfer_rejected();
            return Err(Error::InvalidTransaction("Fee cannot be negative".to_string()));
        }
        if from == to {
            self.metrics.record_transfer_rejected();
            return Err(Error::InvalidTransaction("Self-transfer not allowed".to_string()));
        }

        let mut sender = self
            .storage
            .get_account(from)?
            .ok_or_else(|| Error::UnknownAddress(from.to_string()))?;
        if sender.status == AccountStatus::Frozen {
            self.metrics.record_transfer_rejected();
            return Err(Error::AccountFrozen(from.to_string()));
        }

        let required = amount + fee;
        if sender.balance < required {
            self.metrics.record_transfer_rejected();
            return Err(Error::InsufficientBalance {
                address: from.to_string(),
                balance: sender.balance,
                required,
            });
        }

        let mut recipient = self
            .storage
            .get_account(to)?
            .ok_or_else(|| Error::UnknownAddress(to.to_string()))?;

        let now = Utc::now();
        let balance_before_from = sender.balance;
        let balance_before_to = recipient.balance;

        sender.balance = balance_before_from - required;
        sender.updated_at = now;
        recipient.balance = balance_before_to + amount;
        recipient.updated_at = now;

        let record = TransactionRecord {
            tx_id: derive_tx_id(from, to, amount, now),
            from_address: from.clone(),
            to_address: to.clone(),
            amount,
            fee,
            tx_type,
            status: TxStatus::Confirmed,
            balance_before_from,
            balance_after_from: sender.balance,
            balance_before_to,
            balance_after_to: recipient.balance,
            metadata,
            created_at: now,
            confirmed_at: Some(now),
        };

        // Route the fee to the treasury inside the same batch so
        // conservation holds with non-zero fees.
        if fee > Decimal::ZERO {
            let treasury_addr = self.treasury_address();
            let mut treasury = self
                .storage
                .get_account(&treasury_addr)?
                .ok_or_else(|| Error::UnknownAddress(treasury_addr.to_string()))?;
            treasury.balance += fee;
            treasury.updated_at = now;
            self.storage.commit_transfer(&[&sender, &recipient, &treasury], &record)?;
        } else {
            self.storage.commit_transfer(&[&sender, &recipient], &record)?;
        }

        self.metrics.record_transfer(timer.elapsed().as_secs_f64());

        Ok(record)
    }

    /// Burn value from an account (debits the sender, credits nothing)
    pub fn burn(&self, from: &Address, amount: Decimal) -> Result<TransactionRecord> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidTransaction("Amount must be positive".to_string()));
        }

        let mut sender = self
            .storage
            .get_account(from)?
            .ok_or_else(|| Error::UnknownAddress(from.to_string()))?;
        if sender.balance < amount {
            return Err(Error::InsufficientBalance {
                address: from.to_string(),
                balance: sender.balance,
                required: amount,
            });
        }

        let now = Utc::now();
        let burn_sink = Address::new(self.config.supply.burn_address.clone());
        let balance_before_from = sender.balance;
        sender.balance = balance_before_from - amount;
        sender.updated_at = now;

        let record = TransactionRecord {
            tx_id: derive_tx_id(from, &burn_sink, amount, now),
            from_address: from.clone(),
            to_address: burn_sink,
            amount,
            fee: Decimal::ZERO,
            tx_type: TxType::Burn,
            status: TxStatus::Confirmed,
            balance_before_from,
            balance_after_from: sender.balance,
            balance_before_to: Decimal::ZERO,
            balance_after_to: Decimal::ZERO,
            metadata: HashMap::new(),
            created_at: now,
            confirmed_at: Some(now),
        };

        let total_burned = self.storage.total_burned()? + amount;
        self.storage.commit_burn(&sender, &record, total_burned)?;

        tracing::info!(from = %from, amount = %amount, "Supply burned");
        Ok(record)
    }

    // Log queries

    /// Transaction by id
    pub fn get_transaction(&self, tx_id: &str) -> Result<TransactionRecord> {
        self.storage.get_transaction(tx_id)
    }

    /// Recent transactions, newest first
    pub fn recent_transactions(&self, limit: usize) -> Result<Vec<TransactionRecord>> {
        self.storage.recent_transactions(limit)
    }

    /// Transactions touching an address, newest first
    pub fn transaction_history(
        &self,
        address: &Address,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>> {
        self.storage.transaction_history(address, limit)
    }

    /// Pending transactions older than the cutoff
    pub fn pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<TransactionRecord>> {
        self.storage.pending_older_than(cutoff)
    }

    // Daily limit persistence (the in-memory tracker hydrates from these)

    /// Accumulate a daily counter for (address, today)
    pub fn accumulate_daily(
        &self,
        address: &Address,
        category: SpendCategory,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let date = date_key(now);
        let mut record = self
            .storage
            .get_daily_limit(address, &date)?
            .unwrap_or_else(|| DailyLimitRecord::new(address.clone(), date));
        record.accumulate(category, amount);
        self.storage.put_daily_limit(&record)
    }

    /// Record a large-transfer timestamp for the cooldown check
    pub fn record_large_transfer(&self, address: &Address, at: DateTime<Utc>) -> Result<()> {
        let date = date_key(at);
        let mut record = self
            .storage
            .get_daily_limit(address, &date)?
            .unwrap_or_else(|| DailyLimitRecord::new(address.clone(), date));
        record.last_large_transfer = Some(at);
        self.storage.put_daily_limit(&record)
    }

    /// Daily counters for (address, date)
    pub fn daily_limit(&self, address: &Address, date: &str) -> Result<Option<DailyLimitRecord>> {
        self.storage.get_daily_limit(address, date)
    }

    /// All persisted daily counters
    pub fn daily_limit_records(&self) -> Result<Vec<DailyLimitRecord>> {
        self.storage.daily_limit_records()
    }

    // Circuit-breaker state record

    /// Persist the breaker lifecycle record (opaque bytes)
    pub fn save_breaker_state(&self, bytes: &[u8]) -> Result<()> {
        self.storage.put_breaker_state(bytes)
    }

    /// Load the persisted breaker lifecycle record
    pub fn load_breaker_state(&self) -> Result<Option<Vec<u8>>> {
        self.storage.get_breaker_state()
    }

    // Dead letters

    /// Append a dead-lettered task
    pub fn append_dead_letter(&self, letter: &DeadLetter) -> Result<()> {
        self.storage.append_dead_letter(letter)
    }

    /// All dead letters
    pub fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        self.storage.dead_letters()
    }

    // Supply and statistics

    /// Sum of all account balances
    pub fn sum_balances(&self) -> Result<Decimal> {
        self.storage.sum_balances()
    }

    /// All accounts
    pub fn accounts(&self) -> Result<Vec<Account>> {
        self.storage.accounts()
    }

    /// Total minted supply
    pub fn total_minted(&self) -> Result<Decimal> {
        self.storage.total_minted()
    }

    /// Total burned supply
    pub fn total_burned(&self) -> Result<Decimal> {
        self.storage.total_burned()
    }

    /// Storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        self.storage.stats()
    }
}

/// Derive a transaction id from content + time (sha256 hex)
fn derive_tx_id(from: &Address, to: &Address, amount: Decimal, now: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(from.as_str().as_bytes());
    hasher.update(to.as_str().as_bytes());
    hasher.update(amount.to_string().as_bytes());
    hasher.update(now.timestamp_nanos_opt().unwrap_or(0).to_be_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn create_test_ledger() -> (Ledger, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Ledger::open(config).unwrap(), temp_dir)
    }

    fn funded(ledger: &Ledger, address: &str, amount: Decimal) -> Address {
        let addr = Address::new(address);
        ledger.create_account(&addr).unwrap();
        ledger
            .transfer(
                &ledger.system_address(),
                &addr,
                amount,
                Decimal::ZERO,
                TxType::Genesis,
                HashMap::new(),
            )
            .unwrap();
        addr
    }

    #[test]
    fn test_genesis_bootstrap() {
        let (ledger, _temp) = create_test_ledger();

        assert_eq!(ledger.get_balance(&ledger.system_address()).unwrap(), dec!(1000000));
        assert_eq!(ledger.total_minted().unwrap(), dec!(1000000));
        assert_eq!(ledger.sum_balances().unwrap(), dec!(1000000));
    }

    #[test]
    fn test_balance_unknown_address_is_zero() {
        let (ledger, _temp) = create_test_ledger();
        assert_eq!(ledger.get_balance(&Address::new("AG_NOBODY")).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_transfer_exact_bookkeeping() {
        let (ledger, _temp) = create_test_ledger();
        let a = funded(&ledger, "AG_A", dec!(500));
        let b = funded(&ledger, "AG_B", dec!(200));

        let record = ledger
            .transfer(&a, &b, dec!(100), Decimal::ZERO, TxType::Transfer, HashMap::new())
            .unwrap();

        assert_eq!(ledger.get_balance(&a).unwrap(), dec!(400));
        assert_eq!(ledger.get_balance(&b).unwrap(), dec!(300));
        assert_eq!(record.balance_before_from, dec!(500));
        assert_eq!(record.balance_after_from, dec!(400));
        assert_eq!(record.balance_before_to, dec!(200));
        assert_eq!(record.balance_after_to, dec!(300));
        assert_eq!(record.status, TxStatus::Confirmed);
        assert!(record.reconciles());
    }

    #[test]
    fn test_transfer_insufficient_balance_no_state_change() {
        let (ledger, _temp) = create_test_ledger();
        let a = funded(&ledger, "AG_A", dec!(50));
        let b = funded(&ledger, "AG_B", dec!(0));

        let err = ledger
            .transfer(&a, &b, dec!(100), Decimal::ZERO, TxType::Transfer, HashMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));

        assert_eq!(ledger.get_balance(&a).unwrap(), dec!(50));
        assert_eq!(ledger.get_balance(&b).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_transfer_unknown_address() {
        let (ledger, _temp) = create_test_ledger();
        let a = funded(&ledger, "AG_A", dec!(100));

        let err = ledger
            .transfer(&a, &Address::new("AG_GHOST"), dec!(10), Decimal::ZERO, TxType::Transfer, HashMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::UnknownAddress(_)));
    }

    #[test]
    fn test_transfer_fee_routes_to_treasury() {
        let (ledger, _temp) = create_test_ledger();
        let a = funded(&ledger, "AG_A", dec!(500));
        let b = funded(&ledger, "AG_B", dec!(0));
        let before_total = ledger.sum_balances().unwrap();

        let record = ledger
            .transfer(&a, &b, dec!(100), dec!(2), TxType::Transfer, HashMap::new())
            .unwrap();

        assert_eq!(ledger.get_balance(&a).unwrap(), dec!(398));
        assert_eq!(ledger.get_balance(&b).unwrap(), dec!(100));
        assert_eq!(ledger.get_balance(&ledger.treasury_address()).unwrap(), dec!(2));
        assert!(record.reconciles());
        // Conservation: fees stay inside the system
        assert_eq!(ledger.sum_balances().unwrap(), before_total);
    }

    #[test]
    fn test_transfer_insufficient_for_amount_plus_fee() {
        let (ledger, _temp) = create_test_ledger();
        let a = funded(&ledger, "AG_A", dec!(100));
        let b = funded(&ledger, "AG_B", dec!(0));

        let err = ledger
            .transfer(&a, &b, dec!(100), dec!(1), TxType::Transfer, HashMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));
    }

    #[test]
    fn test_frozen_account_cannot_send() {
        let (ledger, _temp) = create_test_ledger();
        let a = funded(&ledger, "AG_A", dec!(100));
        let b = funded(&ledger, "AG_B", dec!(0));

        ledger.set_account_status(&a, AccountStatus::Frozen).unwrap();
        let err = ledger
            .transfer(&a, &b, dec!(10), Decimal::ZERO, TxType::Transfer, HashMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::AccountFrozen(_)));

        // Frozen accounts can still receive
        ledger
            .transfer(&ledger.system_address(), &a, dec!(5), Decimal::ZERO, TxType::Reward, HashMap::new())
            .unwrap();
        assert_eq!(ledger.get_balance(&a).unwrap(), dec!(105));
    }

    #[test]
    fn test_burn_reduces_supply() {
        let (ledger, _temp) = create_test_ledger();
        let a = funded(&ledger, "AG_A", dec!(100));

        ledger.burn(&a, dec!(30)).unwrap();

        assert_eq!(ledger.get_balance(&a).unwrap(), dec!(70));
        assert_eq!(ledger.total_burned().unwrap(), dec!(30));
        assert_eq!(
            ledger.sum_balances().unwrap(),
            ledger.total_minted().unwrap() - ledger.total_burned().unwrap()
        );
    }

    #[test]
    fn test_self_transfer_rejected() {
        let (ledger, _temp) = create_test_ledger();
        let a = funded(&ledger, "AG_A", dec!(100));

        let err = ledger
            .transfer(&a, &a, dec!(10), Decimal::ZERO, TxType::Transfer, HashMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransaction(_)));
    }

    #[test]
    fn test_daily_accumulation_and_hydration_source() {
        let (ledger, _temp) = create_test_ledger();
        let a = Address::new("AG_A");
        let now = Utc::now();

        ledger.accumulate_daily(&a, SpendCategory::TransferSent, dec!(100), now).unwrap();
        ledger.accumulate_daily(&a, SpendCategory::TransferSent, dec!(50), now).unwrap();

        let record = ledger.daily_limit(&a, &date_key(now)).unwrap().unwrap();
        assert_eq!(record.transfer_sent, dec!(150));
    }

    #[test]
    fn test_transaction_history() {
        let (ledger, _temp) = create_test_ledger();
        let a = funded(&ledger, "AG_A", dec!(500));
        let b = funded(&ledger, "AG_B", dec!(0));

        for _ in 0..3 {
            ledger
                .transfer(&a, &b, dec!(10), Decimal::ZERO, TxType::Transfer, HashMap::new())
                .unwrap();
        }

        let history = ledger.transaction_history(&a, 10).unwrap();
        // 3 transfers + funding
        assert_eq!(history.len(), 4);
    }
}
