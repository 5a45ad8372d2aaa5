//! Moving a sub-wallet's tokens and ETH to the target address.
//!
//! Shared by phase 5, the cleanup sweep and out-of-band transfer-back so all
//! three apply the same dust and reserve rules.

use core_logic::{
    GasConfig, Ledger, OperationError, TransactionRecord, TransactionType, TransactionUpdate,
    WalletUpdate,
};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, U256};
use ethers::utils::to_checksum;
use serde::Serialize;
use serde_json::json;

use super::events::EventSink;
use crate::chain::ChainClient;
use crate::utils::{format_eth, format_token, gas_reserve_wei, to_base_units};

/// Thresholds below which a consolidation transfer is not worth its gas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DustPolicy {
    /// Wallets at or below this ETH balance are not swept at all.
    pub min_eth_balance: U256,
    /// ETH left after the gas reserve must exceed this.
    pub eth_dust: U256,
    /// Token excess over the kept amount must exceed this (base units).
    pub token_dust: U256,
}

impl Default for DustPolicy {
    fn default() -> Self {
        Self {
            // 0.00005 ETH
            min_eth_balance: U256::from(50_000_000_000_000u64),
            // 0.00001 ETH
            eth_dust: U256::from(10_000_000_000_000u64),
            token_dust: U256::zero(),
        }
    }
}

/// Result of one consolidation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StepResult {
    Transferred { tx_hash: String, amount: String },
    Skipped { reason: String },
    Failed { error: String },
    /// Balance or fee could not be read; nothing was attempted.
    Unreadable { error: String },
}

impl StepResult {
    pub fn is_transferred(&self) -> bool {
        matches!(self, StepResult::Transferred { .. })
    }

    pub fn is_unreadable(&self) -> bool {
        matches!(self, StepResult::Unreadable { .. })
    }

    pub fn attempted(&self) -> bool {
        matches!(
            self,
            StepResult::Transferred { .. } | StepResult::Failed { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsolidationReport {
    pub wallet_id: i64,
    pub address: String,
    pub token: StepResult,
    pub eth: StepResult,
}

impl ConsolidationReport {
    /// Both balances were read, so the wallet may be marked completed.
    pub fn is_complete(&self) -> bool {
        !self.token.is_unreadable() && !self.eth.is_unreadable()
    }

    pub fn submitted_any(&self) -> bool {
        self.token.attempted() || self.eth.attempted()
    }
}

/// Inputs that stay fixed across every wallet of one consolidation pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SweepTarget {
    pub token: Address,
    pub target: Address,
    pub min_kept_tokens: f64,
    pub gas_limit_override: Option<u64>,
}

pub(crate) struct Consolidator<'a> {
    pub chain: &'a dyn ChainClient,
    pub ledger: &'a dyn Ledger,
    pub events: &'a EventSink,
    pub gas: &'a GasConfig,
    pub dust: &'a DustPolicy,
}

impl Consolidator<'_> {
    /// Token step then ETH step. Transfer failures are recorded and reported,
    /// never returned; only ledger failures escape.
    pub async fn consolidate(
        &self,
        wallet_id: i64,
        wallet: &LocalWallet,
        sweep: &SweepTarget,
    ) -> Result<ConsolidationReport, OperationError> {
        let address = to_checksum(&wallet.address(), None);
        let mut update = WalletUpdate::default();

        let token = self.token_step(wallet, &address, sweep, &mut update).await?;
        let eth = self.eth_step(wallet, &address, sweep, &mut update).await?;

        if update.eth_balance.is_some() || update.token_balance.is_some() {
            self.ledger
                .update_wallet(wallet_id, &update)
                .await
                .map_err(OperationError::Fatal)?;
        }

        Ok(ConsolidationReport {
            wallet_id,
            address,
            token,
            eth,
        })
    }

    async fn token_step(
        &self,
        wallet: &LocalWallet,
        address: &str,
        sweep: &SweepTarget,
        update: &mut WalletUpdate,
    ) -> Result<StepResult, OperationError> {
        let balance = match self.chain.token_balance(sweep.token, wallet.address()).await {
            Ok(b) => b,
            Err(e) => {
                let error = format!("{:#}", e);
                self.events
                    .error(
                        format!("Token balance unreadable for {}: {}", address, error),
                        None,
                    )
                    .await;
                return Ok(StepResult::Unreadable { error });
            }
        };

        if balance.is_zero() {
            update.token_balance = Some("0".to_string());
            return Ok(self.skip(address, "no tokens to transfer").await);
        }

        let decimals = match self.chain.token_decimals(sweep.token).await {
            Ok(d) => d,
            Err(e) => {
                let error = format!("{:#}", e);
                self.events
                    .error(
                        format!("Token decimals unreadable for {}: {}", address, error),
                        None,
                    )
                    .await;
                return Ok(StepResult::Unreadable { error });
            }
        };
        update.token_balance = Some(format_token(balance, decimals));

        let min_kept = to_base_units("min_kept_tokens", sweep.min_kept_tokens, decimals)
            .map_err(OperationError::from)?;
        let excess = balance.saturating_sub(min_kept);
        if excess <= self.dust.token_dust {
            return Ok(self.skip(address, "token excess below dust threshold").await);
        }

        let amount = format_token(excess, decimals);
        let record = TransactionRecord::pending(
            TransactionType::TokenTransfer,
            address,
            to_checksum(&sweep.target, None),
            amount.clone(),
            to_checksum(&sweep.token, None),
        );
        let tx_id = self
            .ledger
            .save_transaction(&record)
            .await
            .map_err(OperationError::Fatal)?;

        match self
            .chain
            .transfer_token(wallet, sweep.token, sweep.target, excess)
            .await
        {
            Ok(outcome) => {
                self.ledger
                    .update_transaction(
                        tx_id,
                        &TransactionUpdate::success(
                            &outcome.tx_hash,
                            outcome.gas_used.map(|g| g.to_string()),
                        ),
                    )
                    .await
                    .map_err(OperationError::Fatal)?;
                self.events
                    .info(format!(
                        "Token transfer SUCCESS: {} tokens from {} ({})",
                        amount, address, outcome.tx_hash
                    ))
                    .await;
                Ok(StepResult::Transferred {
                    tx_hash: outcome.tx_hash,
                    amount,
                })
            }
            Err(e) => {
                let error = e.to_string();
                self.ledger
                    .update_transaction(tx_id, &TransactionUpdate::failed(&error))
                    .await
                    .map_err(OperationError::Fatal)?;
                self.events
                    .error(
                        format!("Token transfer FAILED from {}: {}", address, error),
                        Some(json!({ "wallet": address, "step": "token_transfer" })),
                    )
                    .await;
                Ok(StepResult::Failed { error })
            }
        }
    }

    async fn eth_step(
        &self,
        wallet: &LocalWallet,
        address: &str,
        sweep: &SweepTarget,
        update: &mut WalletUpdate,
    ) -> Result<StepResult, OperationError> {
        let balance = match self.chain.balance(wallet.address()).await {
            Ok(b) => b,
            Err(e) => {
                let error = format!("{:#}", e);
                self.events
                    .error(format!("ETH balance unreadable for {}: {}", address, error), None)
                    .await;
                return Ok(StepResult::Unreadable { error });
            }
        };
        update.eth_balance = Some(format_eth(balance));

        if balance <= self.dust.min_eth_balance {
            return Ok(self.skip(address, "ETH balance below minimum").await);
        }

        let fees = match self.chain.fee_data().await {
            Ok(f) => f,
            Err(e) => {
                let error = format!("{:#}", e);
                self.events
                    .error(format!("Fee data unavailable for {}: {}", address, error), None)
                    .await;
                return Ok(StepResult::Unreadable { error });
            }
        };

        let gas_limit = sweep
            .gas_limit_override
            .unwrap_or_else(|| self.gas.limit_transfer());
        let reserve = gas_reserve_wei(gas_limit, fees.effective_price(), self.gas);
        let amount = balance.saturating_sub(reserve);
        if amount <= self.dust.eth_dust {
            return Ok(self.skip(address, "ETH after gas reserve below dust threshold").await);
        }

        let amount_text = format_eth(amount);
        let record = TransactionRecord::pending(
            TransactionType::EthTransfer,
            address,
            to_checksum(&sweep.target, None),
            amount_text.clone(),
            "ETH",
        );
        let tx_id = self
            .ledger
            .save_transaction(&record)
            .await
            .map_err(OperationError::Fatal)?;

        match self
            .chain
            .transfer_native(wallet, sweep.target, amount, Some(U256::from(gas_limit)))
            .await
        {
            Ok(outcome) => {
                self.ledger
                    .update_transaction(
                        tx_id,
                        &TransactionUpdate::success(
                            &outcome.tx_hash,
                            outcome.gas_used.map(|g| g.to_string()),
                        ),
                    )
                    .await
                    .map_err(OperationError::Fatal)?;
                self.events
                    .info(format!(
                        "ETH transfer SUCCESS: {} ETH from {} ({})",
                        amount_text, address, outcome.tx_hash
                    ))
                    .await;
                Ok(StepResult::Transferred {
                    tx_hash: outcome.tx_hash,
                    amount: amount_text,
                })
            }
            Err(e) => {
                let error = e.to_string();
                self.ledger
                    .update_transaction(tx_id, &TransactionUpdate::failed(&error))
                    .await
                    .map_err(OperationError::Fatal)?;
                self.events
                    .error(
                        format!("ETH transfer FAILED from {}: {}", address, error),
                        Some(json!({ "wallet": address, "step": "eth_transfer" })),
                    )
                    .await;
                Ok(StepResult::Failed { error })
            }
        }
    }

    async fn skip(&self, address: &str, reason: &str) -> StepResult {
        self.events
            .info(format!("Skipping transfer from {}: {}", address, reason))
            .await;
        StepResult::Skipped {
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dust_policy() {
        let dust = DustPolicy::default();
        assert_eq!(dust.min_eth_balance, U256::from(5u64) * U256::exp10(13));
        assert_eq!(dust.eth_dust, U256::exp10(13));
        assert!(dust.token_dust.is_zero());
    }

    #[test]
    fn test_report_completeness() {
        let report = ConsolidationReport {
            wallet_id: 1,
            address: "0xabc".to_string(),
            token: StepResult::Skipped {
                reason: "none".to_string(),
            },
            eth: StepResult::Failed {
                error: "reverted".to_string(),
            },
        };
        assert!(report.is_complete());
        assert!(report.submitted_any());

        let unreadable = ConsolidationReport {
            eth: StepResult::Unreadable {
                error: "timeout".to_string(),
            },
            ..report
        };
        assert!(!unreadable.is_complete());
        assert!(!unreadable.submitted_any());
    }
}
