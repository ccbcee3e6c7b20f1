//! Mintbook Ledger Core
//!
//! Durable account ledger with an append-only transaction log.
//!
//! # Architecture
//!
//! - **Single Writer**: all balance mutations flow through one consumer
//! - **Atomic Transfers**: both balances and the transaction record commit
//!   in one RocksDB write batch, or not at all
//! - **Append-Only Log**: confirmed transactions are never updated in place
//!
//! # Invariants
//!
//! - Conservation: Σ(balance) == total_minted − total_burned
//! - No account balance is ever negative
//! - Every confirmed record reconciles: after_from == before_from − amount − fee

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use storage::Storage;
pub use types::{
    Account, AccountStatus, Address, DailyLimitRecord, DeadLetter, SpendCategory,
    TransactionRecord, TxStatus, TxType,
};
