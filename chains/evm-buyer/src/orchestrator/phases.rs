use core_logic::{
    OperationError, TransactionRecord, TransactionType, TransactionUpdate, WalletError,
    WalletRecord, WalletStatus, WalletUpdate,
};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::U256;
use ethers::utils::to_checksum;
use serde_json::json;
use zeroize::Zeroizing;

use super::consolidation::SweepTarget;
use super::{pause, Flow, Orchestrator, Run, SubWallet};
use crate::allocation::allocate;
use crate::utils::{format_eth, gas_reserve_wei};

impl Orchestrator {
    /// Move a wallet forward, persisting the new status before the in-memory
    /// copy changes.
    async fn advance(
        &self,
        wallet: &mut SubWallet,
        next: WalletStatus,
    ) -> Result<(), OperationError> {
        if !wallet.status.can_transition_to(next) {
            return Err(WalletError::IllegalTransition {
                id: wallet.id,
                from: wallet.status.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        self.ledger
            .update_wallet(wallet.id, &WalletUpdate::status(next))
            .await
            .map_err(OperationError::Fatal)?;
        wallet.status = next;
        Ok(())
    }

    pub(super) async fn create_wallets(&self, run: &mut Run<'_>) -> Result<Flow, OperationError> {
        let snapshot = serde_json::to_value(run.app).map_err(OperationError::fatal)?;
        self.ledger
            .save_config(&snapshot)
            .await
            .map_err(OperationError::Fatal)?;

        let total = run.total();
        for index in 0..total {
            if run.cancelled() {
                return Ok(Flow::Cancelled);
            }
            run.progress
                .begin(format!("Creating wallet {}/{}", index + 1, total))
                .await;

            let signer = LocalWallet::new(&mut rand::thread_rng());
            let secret = Zeroizing::new(hex::encode(signer.signer().to_bytes()));
            let encrypted = self.seal(secret, run.password).await?;

            let label = to_checksum(&signer.address(), None);
            let id = self
                .ledger
                .save_wallet(&WalletRecord::new(label.clone(), encrypted))
                .await
                .map_err(OperationError::Fatal)?;

            run.events
                .info(format!("Created wallet {} ({})", id, label))
                .await;
            run.wallets.push(SubWallet {
                id,
                signer,
                label,
                status: WalletStatus::Created,
                allocation: U256::zero(),
            });
            run.progress.wallet_created();
            run.progress.finish_step().await;

            pause(&run.token, self.settings.pacing.create_delay()).await;
        }
        Ok(Flow::Continue)
    }

    pub(super) async fn fund_wallets(&self, run: &mut Run<'_>) -> Result<Flow, OperationError> {
        let config = run.config;
        let master = &config.master;
        let balance = self
            .chain
            .balance(master.address())
            .await
            .map_err(OperationError::Fatal)?;
        let total = run.total();
        let count = U256::from(total);
        let overhead = self
            .funding_overhead(config)
            .await?
            .saturating_mul(count);
        let budget = balance.checked_sub(overhead).ok_or_else(|| {
            OperationError::InsufficientFunds {
                required: format_eth(
                    overhead.saturating_add(run.config.min_purchase.saturating_mul(count)),
                ),
                available: format_eth(balance),
            }
        })?;

        let allocations = {
            let mut rng = rand::thread_rng();
            allocate(
                total,
                budget,
                run.config.min_purchase,
                run.config.max_purchase,
                &mut rng,
            )?
        };
        for (wallet, amount) in run.wallets.iter_mut().zip(&allocations) {
            wallet.allocation = *amount;
        }
        run.events
            .info(format!(
                "Allocated {} ETH across {} wallets",
                format_eth(allocations.iter().fold(U256::zero(), |acc, a| acc + *a)),
                total
            ))
            .await;

        let from = to_checksum(&master.address(), None);
        for index in 0..run.wallets.len() {
            if run.cancelled() {
                return Ok(Flow::Cancelled);
            }
            run.progress
                .begin(format!("Funding wallet {}/{}", index + 1, total))
                .await;

            let amount = run.config.gas_reserve + run.wallets[index].allocation;
            let recipient = run.wallets[index].address();
            let label = run.wallets[index].label.clone();

            let tx_id = self
                .ledger
                .save_transaction(&TransactionRecord::pending(
                    TransactionType::FundTransfer,
                    from.clone(),
                    label.clone(),
                    format_eth(amount),
                    "ETH",
                ))
                .await
                .map_err(OperationError::Fatal)?;
            self.advance(&mut run.wallets[index], WalletStatus::Funded)
                .await?;

            match self
                .chain
                .transfer_native(master, recipient, amount, None)
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
                    run.progress.eth_transferred();
                    run.events
                        .info(format!(
                            "Funding SUCCESS: {} ETH to {} ({})",
                            format_eth(amount),
                            label,
                            outcome.tx_hash
                        ))
                        .await;
                }
                Err(e) => {
                    let error = e.to_string();
                    self.ledger
                        .update_transaction(tx_id, &TransactionUpdate::failed(&error))
                        .await
                        .map_err(OperationError::Fatal)?;
                    self.advance(&mut run.wallets[index], WalletStatus::Created)
                        .await?;
                    run.events
                        .error(
                            format!("Funding FAILED for {}: {}", label, error),
                            Some(json!({ "wallet": label, "step": "fund" })),
                        )
                        .await;
                }
            }
            run.progress.finish_step().await;

            pause(&run.token, self.settings.pacing.transfer_delay()).await;
        }
        Ok(Flow::Continue)
    }

    pub(super) async fn swap_wallets(&self, run: &mut Run<'_>) -> Result<Flow, OperationError> {
        let total = run.total();
        let token = to_checksum(&run.config.token, None);

        for index in 0..run.wallets.len() {
            if run.cancelled() {
                return Ok(Flow::Cancelled);
            }
            run.progress
                .begin(format!("Swapping wallet {}/{}", index + 1, total))
                .await;

            let label = run.wallets[index].label.clone();
            if run.wallets[index].status != WalletStatus::Funded {
                run.events
                    .info(format!("Skipping swap for {}: not funded", label))
                    .await;
                run.progress.finish_step().await;
                continue;
            }

            let signer = run.wallets[index].signer.clone();
            let Some(amount) = self.swap_amount(run, index).await else {
                run.progress.finish_step().await;
                continue;
            };

            let tx_id = self
                .ledger
                .save_transaction(&TransactionRecord::pending(
                    TransactionType::TokenSwap,
                    label.clone(),
                    to_checksum(&run.config.router, None),
                    format_eth(amount),
                    token.clone(),
                ))
                .await
                .map_err(OperationError::Fatal)?;

            match self
                .router
                .swap(&signer, run.config.token, amount, self.settings.slippage_percent)
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
                    self.advance(&mut run.wallets[index], WalletStatus::Swapped)
                        .await?;
                    run.progress.swap_completed();
                    run.events
                        .info(format!(
                            "Swap SUCCESS: {} ETH from {} ({}), expected output {}",
                            format_eth(amount),
                            label,
                            outcome.tx_hash,
                            outcome.estimated_output
                        ))
                        .await;
                }
                Err(e) => {
                    let error = e.to_string();
                    self.ledger
                        .update_transaction(tx_id, &TransactionUpdate::failed(&error))
                        .await
                        .map_err(OperationError::Fatal)?;
                    run.events
                        .error(
                            format!("Swap FAILED for {}: {}", label, error),
                            Some(json!({ "wallet": label, "step": "swap" })),
                        )
                        .await;
                }
            }
            run.progress.finish_step().await;

            pause(&run.token, self.settings.pacing.swap_delay()).await;
        }
        Ok(Flow::Continue)
    }

    /// Allocation capped by what the wallet can spend after swap gas. `None`
    /// when the balance is unreadable or nothing is left to swap.
    async fn swap_amount(&self, run: &Run<'_>, index: usize) -> Option<U256> {
        let wallet = &run.wallets[index];
        let balance = match self.chain.balance(wallet.address()).await {
            Ok(b) => b,
            Err(e) => {
                run.events
                    .error(
                        format!("Swap skipped for {}, balance unreadable: {:#}", wallet.label, e),
                        None,
                    )
                    .await;
                return None;
            }
        };
        let fees = match self.chain.fee_data().await {
            Ok(f) => f,
            Err(e) => {
                run.events
                    .error(
                        format!("Swap skipped for {}, fee data unavailable: {:#}", wallet.label, e),
                        None,
                    )
                    .await;
                return None;
            }
        };

        let reserve = gas_reserve_wei(
            self.settings.gas.limit_swap(),
            fees.effective_price(),
            &self.settings.gas,
        );
        let amount = wallet.allocation.min(balance.saturating_sub(reserve));
        if amount.is_zero() {
            run.events
                .warn(format!(
                    "Swap skipped for {}: balance {} ETH does not cover swap gas",
                    wallet.label,
                    format_eth(balance)
                ))
                .await;
            return None;
        }
        Some(amount)
    }

    pub(super) async fn consolidate_wallets(
        &self,
        run: &mut Run<'_>,
    ) -> Result<Flow, OperationError> {
        let total = run.total();
        let events = run.events.clone();
        let consolidator = self.consolidator(&events);
        let sweep = SweepTarget {
            token: run.config.token,
            target: run.config.target,
            min_kept_tokens: run.config.min_kept_tokens,
            gas_limit_override: None,
        };

        for index in 0..run.wallets.len() {
            if run.cancelled() {
                return Ok(Flow::Cancelled);
            }
            run.progress
                .begin(format!("Consolidating wallet {}/{}", index + 1, total))
                .await;

            if !run.wallets[index].status.is_funded() {
                events
                    .info(format!(
                        "Skipping consolidation for {}: never funded",
                        run.wallets[index].label
                    ))
                    .await;
                run.progress.finish_step().await;
                continue;
            }

            let id = run.wallets[index].id;
            let signer = run.wallets[index].signer.clone();
            let report = consolidator.consolidate(id, &signer, &sweep).await?;

            if report.token.is_transferred() {
                run.progress.tokens_transferred();
            }
            if report.token.is_transferred() || report.eth.is_transferred() {
                self.advance(&mut run.wallets[index], WalletStatus::Transferred)
                    .await?;
            }
            if report.is_complete() {
                self.advance(&mut run.wallets[index], WalletStatus::Completed)
                    .await?;
            } else {
                events
                    .warn(format!(
                        "Wallet {} left incomplete, balances unreadable",
                        report.address
                    ))
                    .await;
            }
            run.progress.finish_step().await;

            if report.submitted_any() {
                pause(&run.token, self.settings.pacing.transfer_delay()).await;
            }
        }
        Ok(Flow::Continue)
    }
}
