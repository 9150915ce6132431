//! Ledger configuration.

use std::path::Path;

use herald_core::{Address, Amount, Domain};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One token in base units (18 decimals).
pub const TOKEN: Amount = 1_000_000_000_000_000_000;

/// Default minimum pool contribution: 50 tokens.
pub const DEFAULT_MIN_POOL_CONTRIBUTION: Amount = 50 * TOKEN;

/// Default maximum pool contribution: 250,000 times the minimum.
pub const DEFAULT_MAX_POOL_CONTRIBUTION: Amount = 250_000 * 50 * TOKEN;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// The typed-data signing domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Contract name bound into every signature.
    pub name: String,

    /// Chain id bound into every signature.
    pub chain_id: u64,

    /// Verifying contract address, as `0x`-prefixed hex.
    #[serde(with = "hex_address")]
    pub verifying_contract: Address,
}

impl DomainConfig {
    /// Build the signing domain.
    pub fn to_domain(&self) -> Domain {
        Domain::new(self.name.clone(), self.chain_id, self.verifying_contract)
    }
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            name: "Herald Core".to_string(),
            chain_id: 1,
            verifying_contract: Address::ZERO,
        }
    }
}

/// Whether a user may subscribe again after leaving a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResubscribePolicy {
    /// Leaving toggles the membership off; subscribing toggles it back on.
    #[default]
    Allow,
    /// A membership that has been left cannot be re-entered.
    Deny,
}

/// Configuration for the Ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Typed-data domain for meta-transactions.
    pub domain: DomainConfig,

    /// Smallest accepted channel pool contribution. Also the amount
    /// retained when a channel is deactivated.
    pub min_pool_contribution: Amount,

    /// Largest accepted channel pool contribution.
    pub max_pool_contribution: Amount,

    /// Re-subscription policy.
    pub resubscribe: ResubscribePolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            domain: DomainConfig::default(),
            min_pool_contribution: DEFAULT_MIN_POOL_CONTRIBUTION,
            max_pool_contribution: DEFAULT_MAX_POOL_CONTRIBUTION,
            resubscribe: ResubscribePolicy::Allow,
        }
    }
}

impl LedgerConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domain.name.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "domain name cannot be empty".to_string(),
            ));
        }

        if self.min_pool_contribution == 0 {
            return Err(ConfigError::ValidationFailed(
                "min_pool_contribution must be greater than 0".to_string(),
            ));
        }

        if self.min_pool_contribution > self.max_pool_contribution {
            return Err(ConfigError::ValidationFailed(format!(
                "min_pool_contribution ({}) exceeds max_pool_contribution ({})",
                self.min_pool_contribution, self.max_pool_contribution
            )));
        }

        Ok(())
    }
}

mod hex_address {
    use herald_core::Address;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(address: &Address, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&address.to_hex())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Address, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
