//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `accounts` - Account records (key: address)
//! - `transactions` - Append-only transaction log (key: tx_id)
//! - `tx_time_index` - Secondary index (key: created_at_nanos || tx_id)
//! - `daily_limits` - Daily counters (key: address || '|' || date)
//! - `dead_letters` - Dead-lettered tasks (key: failed_at_nanos || task_id)
//! - `meta` - Supply bookkeeping (total_minted, total_burned)

use crate::{
    error::{Error, Result},
    types::{Account, Address, DailyLimitRecord, DeadLetter, TransactionRecord, TxStatus},
    Config,
};
use chrono::{DateTime, Utc};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Column family names
const CF_ACCOUNTS: &str = "accounts";
const CF_TRANSACTIONS: &str = "transactions";
const CF_TX_TIME_INDEX: &str = "tx_time_index";
const CF_DAILY_LIMITS: &str = "daily_limits";
const CF_DEAD_LETTERS: &str = "dead_letters";
const CF_META: &str = "meta";

/// Meta keys
const META_TOTAL_MINTED: &str = "total_minted";
const META_TOTAL_BURNED: &str = "total_burned";
const META_BREAKER_STATE: &str = "breaker_state";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Universal compaction for the append-heavy transaction log
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Self::cf_options_accounts()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_transactions()),
            ColumnFamilyDescriptor::new(CF_TX_TIME_INDEX, Self::cf_options_index()),
            ColumnFamilyDescriptor::new(CF_DAILY_LIMITS, Self::cf_options_accounts()),
            ColumnFamilyDescriptor::new(CF_DEAD_LETTERS, Self::cf_options_transactions()),
            ColumnFamilyDescriptor::new(CF_META, Self::cf_options_accounts()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB ledger store");

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_accounts() -> Options {
        let mut opts = Options::default();
        // Frequently read, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_transactions() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_index() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Account operations

    /// Get account by address
    pub fn get_account(&self, address: &Address) -> Result<Option<Account>> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        match self.db.get_cf(cf, address.as_str().as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Put account record
    pub fn put_account(&self, account: &Account) -> Result<()> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        let value = bincode::serialize(account)?;
        self.db.put_cf(cf, account.address.as_str().as_bytes(), value)?;
        Ok(())
    }

    /// Iterate all accounts
    pub fn accounts(&self) -> Result<Vec<Account>> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        let mut accounts = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            accounts.push(bincode::deserialize(&value)?);
        }
        Ok(accounts)
    }

    /// Sum of all account balances
    pub fn sum_balances(&self) -> Result<Decimal> {
        let mut total = Decimal::ZERO;
        for account in self.accounts()? {
            total += account.balance;
        }
        Ok(total)
    }

    // Transfer commit (atomic)

    /// Commit a transfer: all touched accounts, the confirmed record and
    /// its time-index entry land in a single write batch.
    pub fn commit_transfer(
        &self,
        accounts: &[&Account],
        record: &TransactionRecord,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_accounts = self.cf_handle(CF_ACCOUNTS)?;
        for account in accounts {
            let value = bincode::serialize(account)?;
            batch.put_cf(cf_accounts, account.address.as_str().as_bytes(), value);
        }

        let cf_tx = self.cf_handle(CF_TRANSACTIONS)?;
        let tx_value = bincode::serialize(record)?;
        batch.put_cf(cf_tx, record.tx_id.as_bytes(), tx_value);

        let cf_index = self.cf_handle(CF_TX_TIME_INDEX)?;
        batch.put_cf(cf_index, Self::time_index_key(record), b"");

        self.db.write(batch)?;

        tracing::debug!(
            tx_id = %record.tx_id,
            from = %record.from_address,
            to = %record.to_address,
            amount = %record.amount,
            "Transfer committed"
        );

        Ok(())
    }

    /// Commit a burn: sender account, burn record and the bumped
    /// total_burned counter in one batch.
    pub fn commit_burn(
        &self,
        account: &Account,
        record: &TransactionRecord,
        total_burned: Decimal,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_accounts = self.cf_handle(CF_ACCOUNTS)?;
        batch.put_cf(
            cf_accounts,
            account.address.as_str().as_bytes(),
            bincode::serialize(account)?,
        );

        let cf_tx = self.cf_handle(CF_TRANSACTIONS)?;
        batch.put_cf(cf_tx, record.tx_id.as_bytes(), bincode::serialize(record)?);

        let cf_index = self.cf_handle(CF_TX_TIME_INDEX)?;
        batch.put_cf(cf_index, Self::time_index_key(record), b"");

        let cf_meta = self.cf_handle(CF_META)?;
        batch.put_cf(cf_meta, META_TOTAL_BURNED, bincode::serialize(&total_burned)?);

        self.db.write(batch)?;
        Ok(())
    }

    // Transaction log queries

    /// Get transaction by id
    pub fn get_transaction(&self, tx_id: &str) -> Result<TransactionRecord> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let value = self
            .db
            .get_cf(cf, tx_id.as_bytes())?
            .ok_or_else(|| Error::TransactionNotFound(tx_id.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Most recent transactions, newest first
    pub fn recent_transactions(&self, limit: usize) -> Result<Vec<TransactionRecord>> {
        let cf_index = self.cf_handle(CF_TX_TIME_INDEX)?;
        let mut records = Vec::with_capacity(limit);

        for item in self.db.iterator_cf(cf_index, IteratorMode::End) {
            if records.len() >= limit {
                break;
            }
            let (key, _) = item?;
            if let Some(tx_id) = Self::tx_id_from_index_key(&key) {
                records.push(self.get_transaction(&tx_id)?);
            }
        }

        Ok(records)
    }

    /// Transactions touching an address, newest first
    pub fn transaction_history(
        &self,
        address: &Address,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>> {
        let cf_index = self.cf_handle(CF_TX_TIME_INDEX)?;
        let mut records = Vec::with_capacity(limit);

        for item in self.db.iterator_cf(cf_index, IteratorMode::End) {
            if records.len() >= limit {
                break;
            }
            let (key, _) = item?;
            if let Some(tx_id) = Self::tx_id_from_index_key(&key) {
                let record = self.get_transaction(&tx_id)?;
                if &record.from_address == address || &record.to_address == address {
                    records.push(record);
                }
            }
        }

        Ok(records)
    }

    /// Pending transactions created before the cutoff (orphan candidates)
    pub fn pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<TransactionRecord>> {
        let cf_index = self.cf_handle(CF_TX_TIME_INDEX)?;
        let cutoff_nanos = cutoff.timestamp_nanos_opt().unwrap_or(i64::MAX);
        let mut orphans = Vec::new();

        for item in self
            .db
            .iterator_cf(cf_index, IteratorMode::From(&[], Direction::Forward))
        {
            let (key, _) = item?;
            if Self::nanos_from_index_key(&key) >= cutoff_nanos {
                break;
            }
            if let Some(tx_id) = Self::tx_id_from_index_key(&key) {
                let record = self.get_transaction(&tx_id)?;
                if record.status == TxStatus::Pending {
                    orphans.push(record);
                }
            }
        }

        Ok(orphans)
    }

    // Daily limit operations

    /// Get daily counters for (address, date)
    pub fn get_daily_limit(
        &self,
        address: &Address,
        date: &str,
    ) -> Result<Option<DailyLimitRecord>> {
        let cf = self.cf_handle(CF_DAILY_LIMITS)?;
        match self.db.get_cf(cf, Self::daily_limit_key(address, date))? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Put daily counters for (address, date)
    pub fn put_daily_limit(&self, record: &DailyLimitRecord) -> Result<()> {
        let cf = self.cf_handle(CF_DAILY_LIMITS)?;
        let key = Self::daily_limit_key(&record.address, &record.date);
        self.db.put_cf(cf, key, bincode::serialize(record)?)?;
        Ok(())
    }

    /// Iterate all daily limit records
    pub fn daily_limit_records(&self) -> Result<Vec<DailyLimitRecord>> {
        let cf = self.cf_handle(CF_DAILY_LIMITS)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            records.push(bincode::deserialize(&value)?);
        }
        Ok(records)
    }

    // Dead letter operations

    /// Append a dead letter (append-only)
    pub fn append_dead_letter(&self, letter: &DeadLetter) -> Result<()> {
        let cf = self.cf_handle(CF_DEAD_LETTERS)?;
        let mut key = letter
            .failed_at
            .timestamp_nanos_opt()
            .unwrap_or(0)
            .to_be_bytes()
            .to_vec();
        key.extend_from_slice(letter.task_id.as_bytes());
        self.db.put_cf(cf, key, bincode::serialize(letter)?)?;

        tracing::warn!(task_id = %letter.task_id, error = %letter.error, "Task dead-lettered");
        Ok(())
    }

    /// All dead letters, oldest first
    pub fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let cf = self.cf_handle(CF_DEAD_LETTERS)?;
        let mut letters = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            letters.push(bincode::deserialize(&value)?);
        }
        Ok(letters)
    }

    // Supply bookkeeping

    /// Total minted supply
    pub fn total_minted(&self) -> Result<Decimal> {
        self.get_meta_decimal(META_TOTAL_MINTED)
    }

    /// Record minted supply
    pub fn put_total_minted(&self, total: Decimal) -> Result<()> {
        let cf = self.cf_handle(CF_META)?;
        self.db.put_cf(cf, META_TOTAL_MINTED, bincode::serialize(&total)?)?;
        Ok(())
    }

    /// Total burned supply
    pub fn total_burned(&self) -> Result<Decimal> {
        self.get_meta_decimal(META_TOTAL_BURNED)
    }

    fn get_meta_decimal(&self, key: &str) -> Result<Decimal> {
        let cf = self.cf_handle(CF_META)?;
        match self.db.get_cf(cf, key)? {
            Some(value) => Ok(bincode::deserialize(&value)?),
            None => Ok(Decimal::ZERO),
        }
    }

    /// Persist the circuit-breaker lifecycle record (opaque to the store)
    pub fn put_breaker_state(&self, bytes: &[u8]) -> Result<()> {
        let cf = self.cf_handle(CF_META)?;
        self.db.put_cf(cf, META_BREAKER_STATE, bytes)?;
        Ok(())
    }

    /// Load the persisted circuit-breaker lifecycle record
    pub fn get_breaker_state(&self) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_handle(CF_META)?;
        Ok(self.db.get_cf(cf, META_BREAKER_STATE)?)
    }

    // Statistics

    /// Approximate record counts
    pub fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            total_accounts: self.approximate_count(CF_ACCOUNTS)?,
            total_transactions: self.approximate_count(CF_TRANSACTIONS)?,
            total_dead_letters: self.dead_letters()?.len() as u64,
        })
    }

    fn approximate_count(&self, cf_name: &str) -> Result<u64> {
        let cf = self.cf_handle(cf_name)?;
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);
        Ok(prop)
    }

    // Key helpers

    fn time_index_key(record: &TransactionRecord) -> Vec<u8> {
        let nanos = record.created_at.timestamp_nanos_opt().unwrap_or(0);
        let mut key = nanos.to_be_bytes().to_vec();
        key.extend_from_slice(record.tx_id.as_bytes());
        key
    }

    fn tx_id_from_index_key(key: &[u8]) -> Option<String> {
        if key.len() > 8 {
            String::from_utf8(key[8..].to_vec()).ok()
        } else {
            None
        }
    }

    fn nanos_from_index_key(key: &[u8]) -> i64 {
        if key.len() >= 8 {
            i64::from_be_bytes(key[..8].try_into().unwrap_or([0u8; 8]))
        } else {
            0
        }
    }

    fn daily_limit_key(address: &Address, date: &str) -> Vec<u8> {
        let mut key = address.as_str().as_bytes().to_vec();
        key.push(b'|');
        key.extend_from_slice(date.as_bytes());
        key
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Approximate account count
    pub total_accounts: u64,
    /// Approximate transaction count
    pub total_transactions: u64,
    /// Dead letter count
    pub total_dead_letters: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountStatus, TxType};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn test_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (config, temp_dir)
    }

    fn test_account(address: &str, balance: Decimal) -> Account {
        Account {
            address: Address::new(address),
            balance,
            status: AccountStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn test_record(tx_id: &str, from: &str, to: &str, amount: Decimal) -> TransactionRecord {
        let now = Utc::now();
        TransactionRecord {
            tx_id: tx_id.to_string(),
            from_address: Address::new(from),
            to_address: Address::new(to),
            amount,
            fee: Decimal::ZERO,
            tx_type: TxType::Transfer,
            status: TxStatus::Confirmed,
            balance_before_from: dec!(500),
            balance_after_from: dec!(500) - amount,
            balance_before_to: dec!(200),
            balance_after_to: dec!(200) + amount,
            metadata: HashMap::new(),
            created_at: now,
            confirmed_at: Some(now),
        }
    }

    #[test]
    fn test_storage_open() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        assert!(storage.db.cf_handle(CF_ACCOUNTS).is_some());
        assert!(storage.db.cf_handle(CF_TRANSACTIONS).is_some());
    }

    #[test]
    fn test_put_and_get_account() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let account = test_account("AG_A", dec!(100));
        storage.put_account(&account).unwrap();

        let retrieved = storage.get_account(&Address::new("AG_A")).unwrap().unwrap();
        assert_eq!(retrieved.balance, dec!(100));
        assert!(storage.get_account(&Address::new("AG_X")).unwrap().is_none());
    }

    #[test]
    fn test_commit_transfer_atomic() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let from = test_account("AG_A", dec!(400));
        let to = test_account("AG_B", dec!(300));
        let record = test_record("tx1", "AG_A", "AG_B", dec!(100));

        storage.commit_transfer(&[&from, &to], &record).unwrap();

        assert_eq!(
            storage.get_account(&Address::new("AG_A")).unwrap().unwrap().balance,
            dec!(400)
        );
        let retrieved = storage.get_transaction("tx1").unwrap();
        assert_eq!(retrieved.amount, dec!(100));
        assert_eq!(retrieved.status, TxStatus::Confirmed);
    }

    #[test]
    fn test_recent_transactions_ordering() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        for i in 0..5 {
            let mut record = test_record(&format!("tx{}", i), "AG_A", "AG_B", dec!(10));
            record.created_at = Utc::now() + chrono::Duration::milliseconds(i);
            storage
                .commit_transfer(
                    &[&test_account("AG_A", dec!(100)), &test_account("AG_B", dec!(0))],
                    &record,
                )
                .unwrap();
        }

        let recent = storage.recent_transactions(3).unwrap();
        assert_eq!(recent.len(), 3);
        // Newest first
        assert_eq!(recent[0].tx_id, "tx4");
    }

    #[test]
    fn test_pending_older_than() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let mut stale = test_record("tx_stale", "AG_A", "AG_B", dec!(10));
        stale.status = TxStatus::Pending;
        stale.created_at = Utc::now() - chrono::Duration::hours(2);
        stale.confirmed_at = None;
        storage
            .commit_transfer(&[&test_account("AG_A", dec!(100))], &stale)
            .unwrap();

        let mut fresh = test_record("tx_fresh", "AG_A", "AG_B", dec!(10));
        fresh.status = TxStatus::Pending;
        fresh.confirmed_at = None;
        storage
            .commit_transfer(&[&test_account("AG_A", dec!(100))], &fresh)
            .unwrap();

        let orphans = storage
            .pending_older_than(Utc::now() - chrono::Duration::hours(1))
            .unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].tx_id, "tx_stale");
    }

    #[test]
    fn test_daily_limits_roundtrip() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let mut record = DailyLimitRecord::new(Address::new("AG_A"), "2026-08-06");
        record.transfer_sent = dec!(150);
        storage.put_daily_limit(&record).unwrap();

        let loaded = storage
            .get_daily_limit(&Address::new("AG_A"), "2026-08-06")
            .unwrap()
            .unwrap();
        assert_eq!(loaded.transfer_sent, dec!(150));
        assert_eq!(storage.daily_limit_records().unwrap().len(), 1);
    }

    #[test]
    fn test_dead_letter_log() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let letter = DeadLetter {
            task_id: "task-1".to_string(),
            task_type: "transfer".to_string(),
            payload: "{}".to_string(),
            priority: 5,
            retry_count: 3,
            error: "always fails".to_string(),
            failed_at: Utc::now(),
        };
        storage.append_dead_letter(&letter).unwrap();

        let letters = storage.dead_letters().unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].retry_count, 3);
    }

    #[test]
    fn test_supply_meta() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        assert_eq!(storage.total_minted().unwrap(), Decimal::ZERO);
        storage.put_total_minted(dec!(1000000)).unwrap();
        assert_eq!(storage.total_minted().unwrap(), dec!(1000000));
        assert_eq!(storage.total_burned().unwrap(), Decimal::ZERO);
    }
}
