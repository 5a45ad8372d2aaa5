use core_logic::{ConfigError, GasConfig};
use ethers::types::U256;
use ethers::utils::{format_units, parse_units};

/// Gas cost of one transaction at `fee_per_gas`, scaled by the safety multiplier.
pub fn gas_reserve_wei(gas_limit: u64, fee_per_gas: U256, gas: &GasConfig) -> U256 {
    U256::from(gas_limit)
        .saturating_mul(fee_per_gas)
        .saturating_mul(U256::from(gas.safety_multiplier_pct()))
        / U256::from(100u64)
}

/// Decimal ETH amount from config into wei.
pub fn eth_to_wei(field: &str, amount: f64) -> Result<U256, ConfigError> {
    to_base_units(field, amount, 18)
}

/// Decimal token amount into base units for a token with `decimals`.
pub fn to_base_units(field: &str, amount: f64, decimals: u8) -> Result<U256, ConfigError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("{} is not a non-negative number", amount),
        });
    }
    // f64 Display never uses exponent notation, so this is a plain decimal
    let text = truncate_decimals(&amount.to_string(), decimals as usize);
    parse_units(text, decimals as u32)
        .map(Into::into)
        .map_err(|e| ConfigError::InvalidValue {
            field: field.to_string(),
            reason: e.to_string(),
        })
}

fn truncate_decimals(text: &str, decimals: usize) -> String {
    match text.split_once('.') {
        Some((whole, frac)) if frac.len() > decimals => {
            if decimals == 0 {
                whole.to_string()
            } else {
                format!("{}.{}", whole, &frac[..decimals])
            }
        }
        _ => text.to_string(),
    }
}

pub fn format_eth(amount: U256) -> String {
    ethers::utils::format_ether(amount)
}

/// Human-readable token amount; falls back to raw base units.
pub fn format_token(amount: U256, decimals: u8) -> String {
    format_units(amount, decimals as u32).unwrap_or_else(|_| amount.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_applies_multiplier() {
        let gas = GasConfig::default();
        let gwei = U256::exp10(9);
        assert_eq!(
            gas_reserve_wei(21_000, gwei, &gas),
            U256::from(25_200u64) * gwei
        );
    }

    #[test]
    fn test_eth_to_wei() {
        assert_eq!(eth_to_wei("x", 0.1).unwrap(), U256::exp10(17));
        assert_eq!(eth_to_wei("x", 0.00001).unwrap(), U256::exp10(13));
        assert!(eth_to_wei("x", -1.0).is_err());
        assert!(eth_to_wei("x", f64::NAN).is_err());
    }

    #[test]
    fn test_token_units_respect_decimals() {
        assert_eq!(to_base_units("x", 1.5, 6).unwrap(), U256::from(1_500_000u64));
        assert_eq!(to_base_units("x", 0.1234567, 2).unwrap(), U256::from(12u64));
        assert_eq!(to_base_units("x", 7.9, 0).unwrap(), U256::from(7u64));
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_eth(U256::exp10(18)), "1.000000000000000000");
        assert_eq!(format_token(U256::from(1_500_000u64), 6), "1.500000");
    }
}
