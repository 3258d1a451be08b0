use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::fs;
use std::path::Path;

use super::block::MAX_DIFFICULTY;

/// Errors that can occur while loading chain configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Tunable parameters of a chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Number of leading zero hex digits a mined block hash must have
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,

    /// Amount minted to the miner of each block
    #[serde(default = "default_mining_reward")]
    pub mining_reward: f64,

    /// Require exactly one coinbase per block, paying exactly `mining_reward`
    #[serde(default)]
    pub strict_coinbase: bool,

    /// Upper bound on nonces tried per block; unbounded when absent
    #[serde(default)]
    pub max_mining_attempts: Option<u64>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            mining_reward: default_mining_reward(),
            strict_coinbase: false,
            max_mining_attempts: None,
        }
    }
}

impl ChainConfig {
    /// Parses a TOML document; missing keys take their defaults
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: ChainConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_str = fs::read_to_string(path)?;
        Self::from_toml_str(&config_str)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(ConfigError::Invalid(format!(
                "difficulty must be at most {}, got {}",
                MAX_DIFFICULTY, self.difficulty
            )));
        }

        if !self.mining_reward.is_finite() || self.mining_reward < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "mining_reward must be a non-negative number, got {}",
                self.mining_reward
            )));
        }

        Ok(())
    }
}

fn default_difficulty() -> u8 {
    2
}

fn default_mining_reward() -> f64 {
    100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChainConfig::default();
        assert_eq!(config.difficulty, 2);
        assert_eq!(config.mining_reward, 100.0);
        assert!(!config.strict_coinbase);
        assert_eq!(config.max_mining_attempts, None);
    }

    #[test]
    fn test_empty_document_gives_defaults() {
        assert_eq!(ChainConfig::from_toml_str("").unwrap(), ChainConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config = ChainConfig::from_toml_str(
            r#"
            difficulty = 3
            strict_coinbase = true
            max_mining_attempts = 1000000
            "#,
        )
        .unwrap();

        assert_eq!(config.difficulty, 3);
        assert_eq!(config.mining_reward, 100.0);
        assert!(config.strict_coinbase);
        assert_eq!(config.max_mining_attempts, Some(1_000_000));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            ChainConfig::from_toml_str("difficulty = 65"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ChainConfig::from_toml_str("mining_reward = -1.0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ChainConfig::from_toml_str("difficulty = \"high\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            ChainConfig::load("/nonexistent/pow_ledger.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
