//! Randomized split of a purchase budget across sub-wallets.

use core_logic::{ConfigError, OperationError};
use ethers::types::U256;
use ethers::utils::format_ether;
use rand::Rng;
use tracing::warn;

/// Split `total` wei into `n` amounts, each within `[min, max]`.
///
/// When the budget fits, the amounts sum to exactly `total`. When it exceeds
/// `n * max` every wallet gets `max` and the excess stays with the caller.
pub fn allocate<R: Rng + ?Sized>(
    n: usize,
    total: U256,
    min: U256,
    max: U256,
    rng: &mut R,
) -> Result<Vec<U256>, OperationError> {
    if n == 0 {
        return Err(ConfigError::InvalidValue {
            field: "wallet_count".to_string(),
            reason: "cannot allocate across zero wallets".to_string(),
        }
        .into());
    }
    if min > max {
        return Err(ConfigError::InvalidValue {
            field: "min_purchase_eth".to_string(),
            reason: "exceeds max_purchase_eth".to_string(),
        }
        .into());
    }

    let count = U256::from(n);
    let floor = min.saturating_mul(count);
    if total < floor {
        return Err(OperationError::InsufficientFunds {
            required: format_ether(floor),
            available: format_ether(total),
        });
    }

    let ceiling = max.saturating_mul(count);
    if total > ceiling {
        warn!(
            "Budget {} ETH exceeds {} wallets x max {} ETH; {} ETH stays unallocated",
            format_ether(total),
            n,
            format_ether(max),
            format_ether(total - ceiling)
        );
        return Ok(vec![max; n]);
    }

    let span = max - min;
    let mut remaining = total - floor;
    let mut amounts = Vec::with_capacity(n);

    for i in 0..n - 1 {
        let slots_after = U256::from(n - 1 - i);
        // Leave no more than the later slots can absorb
        let lo = remaining.saturating_sub(slots_after.saturating_mul(span));
        let hi = span.min(remaining);
        let extra = uniform(rng, lo, hi);
        amounts.push(min + extra);
        remaining -= extra;
    }
    amounts.push(min + remaining);

    Ok(amounts)
}

/// Uniform draw from `[lo, hi]`. Ranges wider than u128 are drawn on a
/// coarser grid.
fn uniform<R: Rng + ?Sized>(rng: &mut R, lo: U256, hi: U256) -> U256 {
    if hi <= lo {
        return lo;
    }
    let width = hi - lo;
    if width <= U256::from(u128::MAX - 1) {
        lo + U256::from(rng.gen_range(0..=width.as_u128()))
    } else {
        let scale = width / U256::from(u128::MAX) + U256::one();
        let draw = U256::from(rng.gen_range(0..=(width / scale).as_u128()));
        (lo + draw * scale).min(hi)
    }
}
