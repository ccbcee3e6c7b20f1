//! Configuration for the ledger

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Metrics listen address
    pub metrics_listen_addr: String,

    /// Supply bootstrapping
    pub supply: SupplyConfig,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/ledger"),
            service_name: "ledger-core".to_string(),
            metrics_listen_addr: "0.0.0.0:9090".to_string(),
            supply: SupplyConfig::default(),
            rocksdb: RocksDBConfig::default(),
        }
    }
}

/// Supply and well-known account configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplyConfig {
    /// Amount minted to the system account on first open
    pub initial_supply: Decimal,

    /// System account (genesis recipient, reward source)
    pub system_address: String,

    /// Fee collector account
    pub treasury_address: String,

    /// Game pool account (bets in, payouts out)
    pub game_pool_address: String,

    /// Burn sink recorded on burn transactions (never an account)
    pub burn_address: String,
}

impl Default for SupplyConfig {
    fn default() -> Self {
        Self {
            initial_supply: Decimal::from(1_000_000),
            system_address: "SYSTEM".to_string(),
            treasury_address: "TREASURY".to_string(),
            game_pool_address: "GAME_POOL".to_string(),
            burn_address: "BURN".to_string(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            target_file_size_mb: 64,
            max_background_jobs: 4,
            enable_statistics: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(addr) = std::env::var("LEDGER_METRICS_ADDR") {
            config.metrics_listen_addr = addr;
        }

        if let Ok(supply) = std::env::var("LEDGER_INITIAL_SUPPLY") {
            config.supply.initial_supply = supply
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid initial supply: {}", e)))?;
        }

        Ok(config)
    }
}
