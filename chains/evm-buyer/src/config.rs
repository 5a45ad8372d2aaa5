use anyhow::{Context, Result};
use config::{Config, Environment, File};
use core_logic::{ConfigError, GasConfig, GasConfigToml, PacingConfig, WatchdogConfig};
use ethers::signers::LocalWallet;
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::swap::resolve_router;
use crate::utils::eth_to_wei;

pub const MAX_WALLETS: u32 = 1000;

/// Per-run operation parameters. Snapshotted into the ledger without the
/// master key.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub token_address: String,
    pub wallet_count: u32,
    #[serde(default, skip_serializing)]
    pub master_private_key: String,
    pub target_address: String,
    pub gas_reserve_eth: f64,
    pub min_purchase_eth: f64,
    pub max_purchase_eth: f64,
    #[serde(default)]
    pub min_kept_tokens: f64,
    pub chain: String,
    pub dex: String,
    pub rpc_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_address: Option<String>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("token_address", &self.token_address)
            .field("wallet_count", &self.wallet_count)
            .field("master_private_key", &"[REDACTED]")
            .field("target_address", &self.target_address)
            .field("gas_reserve_eth", &self.gas_reserve_eth)
            .field("min_purchase_eth", &self.min_purchase_eth)
            .field("max_purchase_eth", &self.max_purchase_eth)
            .field("min_kept_tokens", &self.min_kept_tokens)
            .field("chain", &self.chain)
            .field("dex", &self.dex)
            .field("rpc_url", &self.rpc_url)
            .field("router_address", &self.router_address)
            .finish()
    }
}

/// Typed view of an [`AppConfig`] that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub token: Address,
    pub target: Address,
    pub master: LocalWallet,
    pub router: Address,
    pub wallet_count: usize,
    pub gas_reserve: U256,
    pub min_purchase: U256,
    pub max_purchase: U256,
    pub min_kept_tokens: f64,
}

pub fn parse_address(field: &str, value: &str) -> Result<Address, ConfigError> {
    let invalid = || ConfigError::InvalidAddress {
        field: field.to_string(),
        value: value.to_string(),
    };
    let value = value.trim();
    let hex_part = value.strip_prefix("0x").ok_or_else(invalid)?;
    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    Address::from_str(hex_part).map_err(|_| invalid())
}

pub fn validate_rpc_url(value: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidRpcUrl {
        url: value.to_string(),
    };
    let url = url::Url::parse(value.trim()).map_err(|_| invalid())?;
    match url.scheme() {
        "http" | "https" | "ws" | "wss" if url.host_str().is_some() => Ok(()),
        _ => Err(invalid()),
    }
}

fn positive_wei(field: &str, value: f64) -> Result<U256, ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    let wei = eth_to_wei(field, value)?;
    if wei.is_zero() {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: "rounds to zero wei".to_string(),
        });
    }
    Ok(wei)
}

fn parse_master_key(value: &str) -> Result<LocalWallet, ConfigError> {
    let key = value.trim();
    if key.is_empty() {
        return Err(ConfigError::MissingField {
            field: "master_private_key".to_string(),
        });
    }
    let key = key.strip_prefix("0x").unwrap_or(key);
    // Never echo the key back in the error
    LocalWallet::from_str(key).map_err(|_| ConfigError::InvalidValue {
        field: "master_private_key".to_string(),
        reason: "not a valid secp256k1 private key".to_string(),
    })
}

impl AppConfig {
    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        if self.wallet_count == 0 || self.wallet_count > MAX_WALLETS {
            return Err(ConfigError::InvalidValue {
                field: "wallet_count".to_string(),
                reason: format!("must be between 1 and {}", MAX_WALLETS),
            });
        }

        let token = parse_address("token_address", &self.token_address)?;
        let target = parse_address("target_address", &self.target_address)?;
        validate_rpc_url(&self.rpc_url)?;

        let gas_reserve = positive_wei("gas_reserve_eth", self.gas_reserve_eth)?;
        let min_purchase = positive_wei("min_purchase_eth", self.min_purchase_eth)?;
        let max_purchase = positive_wei("max_purchase_eth", self.max_purchase_eth)?;
        if min_purchase > max_purchase {
            return Err(ConfigError::InvalidValue {
                field: "min_purchase_eth".to_string(),
                reason: format!(
                    "{} exceeds max_purchase_eth {}",
                    self.min_purchase_eth, self.max_purchase_eth
                ),
            });
        }

        if !self.min_kept_tokens.is_finite() || self.min_kept_tokens < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "min_kept_tokens".to_string(),
                reason: "must not be negative".to_string(),
            });
        }

        let master = parse_master_key(&self.master_private_key)?;
        let router = resolve_router(&self.chain, &self.dex, self.router_address.as_deref())?;

        Ok(ValidatedConfig {
            token,
            target,
            master,
            router,
            wallet_count: self.wallet_count as usize,
            gas_reserve,
            min_purchase,
            max_purchase,
            min_kept_tokens: self.min_kept_tokens,
        })
    }
}

fn default_db_path() -> String {
    "buyer.db".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_confirmation_timeout() -> u64 {
    120
}

fn default_slippage() -> f64 {
    0.5
}

/// Whole config file: the operation block plus runtime tuning.
#[derive(Debug, Deserialize)]
pub struct BuyerConfig {
    pub operation: AppConfig,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_slippage")]
    pub slippage_percent: f64,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub gas: GasConfigToml,
}

impl BuyerConfig {
    pub fn load(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("BUYER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config from {}", path))?;

        settings
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path, e))
    }

    pub fn gas_config(&self) -> GasConfig {
        self.gas.clone().into()
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn valid() -> AppConfig {
        AppConfig {
            token_address: "0x1f9840a85d5aF5bf1D1762F925BDADdC4201F984".to_string(),
            wallet_count: 3,
            master_private_key: KEY.to_string(),
            target_address: "0x000000000000000000000000000000000000dEaD".to_string(),
            gas_reserve_eth: 0.002,
            min_purchase_eth: 0.01,
            max_purchase_eth: 0.02,
            min_kept_tokens: 0.0,
            chain: "sepolia".to_string(),
            dex: "uniswap_v2".to_string(),
            rpc_url: "https://rpc.sepolia.org".to_string(),
            router_address: None,
        }
    }

    #[test]
    fn test_valid_config() {
        let v = valid().validate().unwrap();
        assert_eq!(v.wallet_count, 3);
        assert_eq!(v.min_purchase, U256::exp10(16));
        assert_eq!(v.gas_reserve, U256::from(2u64) * U256::exp10(15));
    }

    #[test]
    fn test_wallet_count_bounds() {
        for count in [0, 1001] {
            let mut c = valid();
            c.wallet_count = count;
            assert!(matches!(c.validate(), Err(ConfigError::InvalidValue { field, .. }) if field == "wallet_count"));
        }
        let mut c = valid();
        c.wallet_count = 1000;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_addresses() {
        let mut c = valid();
        c.token_address = "0x1234".to_string();
        assert!(matches!(c.validate(), Err(ConfigError::InvalidAddress { .. })));

        let mut c = valid();
        c.target_address = "000000000000000000000000000000000000dEaD".to_string();
        assert!(matches!(c.validate(), Err(ConfigError::InvalidAddress { .. })));
    }

    #[test]
    fn test_rpc_url_schemes() {
        assert!(validate_rpc_url("wss://mainnet.example.org/ws").is_ok());
        assert!(validate_rpc_url("http://127.0.0.1:8545").is_ok());
        assert!(validate_rpc_url("ftp://example.org").is_err());
        assert!(validate_rpc_url("not a url").is_err());
    }

    #[test]
    fn test_purchase_bounds() {
        let mut c = valid();
        c.min_purchase_eth = 0.05;
        assert!(c.validate().is_err());

        let mut c = valid();
        c.gas_reserve_eth = 0.0;
        assert!(c.validate().is_err());

        let mut c = valid();
        c.min_kept_tokens = -1.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_master_key_errors_do_not_leak() {
        let mut c = valid();
        c.master_private_key = "0xdeadbeef".to_string();
        let err = c.validate().unwrap_err().to_string();
        assert!(!err.contains("deadbeef"));

        c.master_private_key = String::new();
        assert!(matches!(c.validate(), Err(ConfigError::MissingField { .. })));
    }

    #[test]
    fn test_unknown_route() {
        let mut c = valid();
        c.dex = "spookyswap".to_string();
        assert!(matches!(c.validate(), Err(ConfigError::UnsupportedRoute { .. })));

        c.router_address = Some("0x1111111111111111111111111111111111111111".to_string());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_snapshot_never_contains_key() {
        let json = serde_json::to_value(valid()).unwrap();
        assert!(json.get("master_private_key").is_none());
        assert!(!format!("{:?}", valid()).contains("4c0883"));

        let restored: AppConfig = serde_json::from_value(json).unwrap();
        assert!(restored.master_private_key.is_empty());
        assert_eq!(restored.wallet_count, 3);
    }
}
