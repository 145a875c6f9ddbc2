//! Configuration for the record ledger

use crate::validator::BalancePolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Storage backend
    pub backend: StorageBackend,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Invariant policy
    pub policy: PolicyConfig,

    /// History reads
    pub history: HistoryConfig,

    /// Dispatcher actor
    pub actor: ActorConfig,

    /// Log output
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/kyc-ledger"),
            service_name: "kyc-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            backend: StorageBackend::RocksDb,
            rocksdb: RocksDBConfig::default(),
            policy: PolicyConfig::default(),
            history: HistoryConfig::default(),
            actor: ActorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-memory, lost on exit
    Memory,
    /// RocksDB under `data_dir`
    RocksDb,
}

impl StorageBackend {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Some(StorageBackend::Memory),
            "rocksdb" => Some(StorageBackend::RocksDb),
            _ => None,
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 3,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}

/// Invariant policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Allow seeds and moves to produce negative balances
    pub allow_negative_balances: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allow_negative_balances: true,
        }
    }
}

impl PolicyConfig {
    /// Balance policy for the validator
    pub fn balance_policy(&self) -> BalancePolicy {
        if self.allow_negative_balances {
            BalancePolicy::Permissive
        } else {
            BalancePolicy::NonNegative
        }
    }
}

/// History configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Log and drop unreadable entries instead of failing the read
    pub skip_corrupt_entries: bool,

    /// Page size when a caller passes 0
    pub default_page_size: usize,

    /// Upper bound on a single page
    pub max_page_size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            skip_corrupt_entries: false,
            default_page_size: 100,
            max_page_size: 1_000,
        }
    }
}

/// Actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    /// Bounded mailbox size
    pub mailbox_capacity: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1_000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// In-memory configuration (tests, scripting)
    pub fn in_memory() -> Self {
        Self {
            backend: StorageBackend::Memory,
            ..Default::default()
        }
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse from TOML text
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("KYC_LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(backend) = std::env::var("KYC_LEDGER_BACKEND") {
            config.backend = StorageBackend::from_str(&backend).ok_or_else(|| {
                crate::Error::Config(format!("Unknown storage backend: {}", backend))
            })?;
        }

        if let Ok(flag) = std::env::var("KYC_LEDGER_ALLOW_NEGATIVE") {
            config.policy.allow_negative_balances = parse_flag("KYC_LEDGER_ALLOW_NEGATIVE", &flag)?;
        }

        if let Ok(flag) = std::env::var("KYC_LEDGER_SKIP_CORRUPT_HISTORY") {
            config.history.skip_corrupt_entries =
                parse_flag("KYC_LEDGER_SKIP_CORRUPT_HISTORY", &flag)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the ledger cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.history.max_page_size == 0 {
            return Err(crate::Error::Config(
                "history.max_page_size must be positive".to_string(),
            ));
        }
        if self.history.default_page_size == 0
            || self.history.default_page_size > self.history.max_page_size
        {
            return Err(crate::Error::Config(format!(
                "history.default_page_size must be in 1..={}",
                self.history.max_page_size
            )));
        }
        if self.actor.mailbox_capacity == 0 {
            return Err(crate::Error::Config(
                "actor.mailbox_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(name: &str, value: &str) -> crate::Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(crate::Error::Config(format!(
            "{} must be a boolean, got {:?}",
            name, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "kyc-ledger");
        assert_eq!(config.backend, StorageBackend::RocksDb);
        assert!(config.policy.allow_negative_balances);
        assert!(!config.history.skip_corrupt_entries);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml(
            r#"
            backend = "memory"

            [policy]
            allow_negative_balances = false

            [history]
            max_page_size = 50
            default_page_size = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.backend, StorageBackend::Memory);
        assert_eq!(config.policy.balance_policy(), BalancePolicy::NonNegative);
        assert_eq!(config.history.max_page_size, 50);
        assert_eq!(config.actor.mailbox_capacity, 1_000);
    }

    #[test]
    fn test_invalid_page_sizes() {
        let result = Config::from_toml(
            r#"
            [history]
            max_page_size = 5
            default_page_size = 10
            "#,
        );
        assert!(matches!(result, Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_backend_and_flag_parsing() {
        assert_eq!(StorageBackend::from_str("RocksDB"), Some(StorageBackend::RocksDb));
        assert_eq!(StorageBackend::from_str("memory"), Some(StorageBackend::Memory));
        assert_eq!(StorageBackend::from_str("sled"), None);
        assert!(parse_flag("X", "yes").unwrap());
        assert!(parse_flag("X", "maybe").is_err());
    }
}
