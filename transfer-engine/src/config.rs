//! Configuration for the transfer engine

use risk_engine::{CircuitBreakerConfig, LimitPolicy};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Transfer engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Webhook URL for breaker trip alerts (log-only when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_webhook_url: Option<String>,

    /// Manual breaker reset key. Loaded from the
    /// `CIRCUIT_BREAKER_RESET_KEY` environment variable, never from files.
    #[serde(skip)]
    pub reset_key: Option<String>,

    /// Ledger store configuration
    pub ledger: ledger_core::Config,

    /// Daily limit policy
    pub limits: LimitPolicy,

    /// Circuit breaker configuration
    pub breaker: CircuitBreakerConfig,

    /// Task queue configuration
    pub queue: QueueConfig,

    /// Integrity audit configuration
    pub audit: AuditConfig,
}

/// Task queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Mailbox capacity (backpressure bound)
    pub capacity: usize,

    /// Default retry budget for submitted tasks
    pub max_retries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            max_retries: 3,
        }
    }
}

/// Integrity audit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Confirmed transactions to reconcile per run
    pub recent_window: usize,

    /// Pending transactions older than this are orphans (hours)
    pub orphan_threshold_hours: i64,

    /// Conservation tolerance (rounding slack for imported balances)
    pub epsilon: Decimal,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            recent_window: 100,
            orphan_threshold_hours: 1,
            epsilon: Decimal::new(1, 2), // 0.01
        }
    }
}

impl Config {
    /// Load from file, then apply environment overrides
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config: {}", e)))?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.apply_env();
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("CIRCUIT_BREAKER_RESET_KEY") {
            if !key.is_empty() {
                self.reset_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("ALERT_WEBHOOK_URL") {
            if !url.is_empty() {
                self.alert_webhook_url = Some(url);
            }
        }
        if let Ok(dir) = std::env::var("LEDGER_DATA_DIR") {
            self.ledger.data_dir = dir.into();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.queue.max_retries, 3);
        assert_eq!(config.audit.recent_window, 100);
        assert!(config.reset_key.is_none());
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.queue.capacity, config.queue.capacity);
        assert_eq!(parsed.audit.epsilon, config.audit.epsilon);
    }
}
