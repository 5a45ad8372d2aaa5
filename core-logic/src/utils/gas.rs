//! # Core Logic - Gas Configuration
//!
//! Chain-agnostic gas limits and reserve safety margins. Chain crates turn
//! these into wei amounts using live fee data.

use serde::Deserialize;

/// Fixed gas-limit estimates for the operations the orchestrator submits.
#[derive(Debug, Clone, Copy)]
pub struct StandardGasLimits {
    pub transfer: u64,
    pub token_transfer: u64,
    pub swap: u64,
}

impl Default for StandardGasLimits {
    fn default() -> Self {
        Self {
            transfer: 21_000,
            token_transfer: 100_000,
            swap: 250_000,
        }
    }
}

/// Configuration for gas reserves
#[derive(Debug, Clone, Copy)]
pub struct GasConfig {
    /// Reserve multiplier in percent; never below 100.
    pub safety_multiplier_pct: u64,
    pub limits: StandardGasLimits,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            safety_multiplier_pct: 120,
            limits: StandardGasLimits::default(),
        }
    }
}

impl GasConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_safety_multiplier(mut self, pct: u64) -> Self {
        self.safety_multiplier_pct = pct.max(100);
        self
    }

    pub fn safety_multiplier_pct(&self) -> u64 {
        self.safety_multiplier_pct.max(100)
    }

    pub fn limit_transfer(&self) -> u64 {
        self.limits.transfer
    }

    pub fn limit_token_transfer(&self) -> u64 {
        self.limits.token_transfer
    }

    pub fn limit_swap(&self) -> u64 {
        self.limits.swap
    }
}

/// Deserialize helper for GasConfig from TOML
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GasConfigToml {
    pub safety_multiplier_pct: Option<u64>,
    pub limit_transfer: Option<u64>,
    pub limit_token_transfer: Option<u64>,
    pub limit_swap: Option<u64>,
}

impl From<GasConfigToml> for GasConfig {
    fn from(toml: GasConfigToml) -> Self {
        let defaults = StandardGasLimits::default();
        Self {
            safety_multiplier_pct: toml.safety_multiplier_pct.unwrap_or(120).max(100),
            limits: StandardGasLimits {
                transfer: toml.limit_transfer.unwrap_or(defaults.transfer),
                token_transfer: toml.limit_token_transfer.unwrap_or(defaults.token_transfer),
                swap: toml.limit_swap.unwrap_or(defaults.swap),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gas_config_defaults() {
        let config = GasConfig::default();
        assert_eq!(config.safety_multiplier_pct(), 120);
        assert_eq!(config.limit_transfer(), 21_000);
        assert_eq!(config.limit_swap(), 250_000);
    }

    #[test]
    fn test_multiplier_never_below_one() {
        let config = GasConfig::new().with_safety_multiplier(80);
        assert_eq!(config.safety_multiplier_pct(), 100);
    }

    #[test]
    fn test_from_toml_partial() {
        let config: GasConfig = GasConfigToml {
            safety_multiplier_pct: Some(150),
            limit_swap: Some(300_000),
            ..Default::default()
        }
        .into();
        assert_eq!(config.safety_multiplier_pct(), 150);
        assert_eq!(config.limit_swap(), 300_000);
        assert_eq!(config.limit_token_transfer(), 100_000);
    }
}
