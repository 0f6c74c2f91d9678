//! # Protocol Configuration & Constants
//!
//! Every magic number lives here, next to the serde structs that let a
//! deployment override the ones that are meant to be tunable. Config
//! documents are JSON; they are validated on load so that a bad file fails
//! at startup rather than on the first deposit.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::identity::Address;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Address length in bytes. Same width as the OEP-4 account addresses the
/// token contract was originally written against.
pub const ADDRESS_LENGTH: usize = 20;

// ---------------------------------------------------------------------------
// Token Defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_TOKEN_NAME: &str = "Red Packet Token";

pub const DEFAULT_TOKEN_SYMBOL: &str = "RPT";

/// Display precision. The ledger itself never divides by this.
pub const DEFAULT_TOKEN_DECIMALS: u8 = 6;

/// One whole token in smallest units (10^DEFAULT_TOKEN_DECIMALS).
pub const TOKEN_FACTOR: u64 = 1_000_000;

/// One billion whole tokens, minted to the admin on `init`.
pub const DEFAULT_TOTAL_SUPPLY: u64 = 1_000_000_000 * TOKEN_FACTOR;

/// Upper bound on `decimals`. Anything above this can't be displayed
/// meaningfully with a `u64` supply anyway.
pub const MAX_TOKEN_DECIMALS: u8 = 18;

/// Longest batch accepted by `transfer_multi`.
pub const MAX_TRANSFER_BATCH: usize = 64;

// ---------------------------------------------------------------------------
// Distributor Defaults
// ---------------------------------------------------------------------------

/// Label the distributor contract is deployed under; its address is
/// derived from this.
pub const DEFAULT_DISTRIBUTOR_LABEL: &str = "red-packet";

/// Label the token contract is deployed under.
pub const DEFAULT_TOKEN_LABEL: &str = "oep4-token";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Implemented by every config struct that can be loaded from a document.
pub trait Validate {
    fn validate(&self) -> Result<(), ConfigError>;
}

/// Parse and validate a JSON config document.
pub fn from_json_str<T: DeserializeOwned + Validate>(json: &str) -> Result<T, ConfigError> {
    let config: T = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

/// Read, parse and validate a JSON config file.
pub fn from_json_file<T: DeserializeOwned + Validate>(
    path: impl AsRef<Path>,
) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    from_json_str(&raw)
}

// ---------------------------------------------------------------------------
// TokenConfig
// ---------------------------------------------------------------------------

/// Metadata and supply for a [`TokenLedger`](crate::ledger::TokenLedger).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub name: String,
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    #[serde(default = "default_total_supply")]
    pub total_supply: u64,
    /// Receives the whole supply on `init`, and is the only account allowed
    /// to call it.
    pub admin: Address,
}

fn default_decimals() -> u8 {
    DEFAULT_TOKEN_DECIMALS
}

fn default_total_supply() -> u64 {
    DEFAULT_TOTAL_SUPPLY
}

impl TokenConfig {
    /// Default metadata and supply, administered by `admin`.
    pub fn new(admin: Address) -> Self {
        Self {
            name: DEFAULT_TOKEN_NAME.to_string(),
            symbol: DEFAULT_TOKEN_SYMBOL.to_string(),
            decimals: DEFAULT_TOKEN_DECIMALS,
            total_supply: DEFAULT_TOTAL_SUPPLY,
            admin,
        }
    }

    pub fn with_total_supply(mut self, total_supply: u64) -> Self {
        self.total_supply = total_supply;
        self
    }
}

impl Validate for TokenConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("token name is empty".into()));
        }
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::Invalid("token symbol is empty".into()));
        }
        if self.decimals > MAX_TOKEN_DECIMALS {
            return Err(ConfigError::Invalid(format!(
                "decimals {} exceeds maximum {}",
                self.decimals, MAX_TOKEN_DECIMALS
            )));
        }
        if self.total_supply == 0 {
            return Err(ConfigError::Invalid("total supply must be positive".into()));
        }
        if self.admin.is_zero() {
            return Err(ConfigError::Invalid("admin cannot be the zero address".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DistributorConfig
// ---------------------------------------------------------------------------

/// Tunables for the split-payment distributor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributorConfig {
    /// Optional cap on the share count of a single deposit. `None` accepts
    /// any positive count.
    pub max_share_count: Option<u64>,
}

impl Validate for DistributorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_share_count == Some(0) {
            return Err(ConfigError::Invalid("max_share_count must be positive".into()));
        }
        Ok(())
    }
}
