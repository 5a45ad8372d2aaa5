//! # Operation Orchestrator
//!
//! Runs one buy operation at a time through five phases: validate, create,
//! fund, swap and consolidate. Each phase walks every wallet in creation
//! order before the next phase starts. Per-wallet failures are logged and
//! recorded in the ledger; only [`OperationError`] classes reach the caller.
//!
//! A failure escaping phases 2-5 triggers a best-effort cleanup sweep over
//! every wallet the ledger does not list as completed. Cancellation is
//! cooperative and skips the sweep.

mod consolidation;
mod events;
mod phases;
mod state;
mod watchdog;

pub use consolidation::{ConsolidationReport, DustPolicy, StepResult};
pub use events::{EventSink, LogEvent, LogLevel, OperationEvent, OperationStatus};
pub use state::RunState;
pub use watchdog::{Heartbeat, Watchdog};

use core_logic::{
    ConfigError, GasConfig, KeyVault, Ledger, OperationError, PacingConfig, WalletError,
    WalletRecord, WalletStatus, WalletUpdate, WatchdogConfig,
};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, U256};
use serde_json::json;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use zeroize::Zeroizing;

use crate::chain::ChainClient;
use crate::config::{parse_address, AppConfig, ValidatedConfig};
use crate::swap::SwapRouter;
use crate::utils::{format_eth, gas_reserve_wei};
use consolidation::{Consolidator, SweepTarget};
use events::Progress;
use state::RunControl;

/// Tuning that stays fixed for the orchestrator's lifetime.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub pacing: PacingConfig,
    pub watchdog: WatchdogConfig,
    pub gas: GasConfig,
    pub dust: DustPolicy,
    pub slippage_percent: f64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            pacing: PacingConfig::default(),
            watchdog: WatchdogConfig::default(),
            gas: GasConfig::default(),
            dust: DustPolicy::default(),
            slippage_percent: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    Completed(OperationStatus),
    Cancelled(OperationStatus),
}

impl OperationOutcome {
    pub fn status(&self) -> &OperationStatus {
        match self {
            OperationOutcome::Completed(s) | OperationOutcome::Cancelled(s) => s,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, OperationOutcome::Cancelled(_))
    }
}

/// Whether a phase ran to its end or stopped on the cancel token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Cancelled,
}

/// A generated wallet as tracked in memory during one run.
struct SubWallet {
    id: i64,
    signer: LocalWallet,
    label: String,
    status: WalletStatus,
    allocation: U256,
}

impl SubWallet {
    fn address(&self) -> Address {
        self.signer.address()
    }
}

/// Per-run working set handed through the phases.
struct Run<'a> {
    app: &'a AppConfig,
    config: &'a ValidatedConfig,
    password: &'a str,
    token: CancellationToken,
    events: EventSink,
    progress: Progress,
    wallets: Vec<SubWallet>,
}

impl Run<'_> {
    fn cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn total(&self) -> usize {
        self.config.wallet_count
    }
}

pub struct Orchestrator {
    chain: Arc<dyn ChainClient>,
    router: Arc<dyn SwapRouter>,
    ledger: Arc<dyn Ledger>,
    vault: Arc<dyn KeyVault>,
    settings: OrchestratorSettings,
    control: RunControl,
    events: Mutex<EventSink>,
    status: Arc<Mutex<OperationStatus>>,
}

impl Orchestrator {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        router: Arc<dyn SwapRouter>,
        ledger: Arc<dyn Ledger>,
        vault: Arc<dyn KeyVault>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            chain,
            router,
            ledger,
            vault,
            settings,
            control: RunControl::default(),
            events: Mutex::new(EventSink::tracing_only()),
            status: Arc::new(Mutex::new(OperationStatus::default())),
        }
    }

    /// Route events of subsequent runs to a new bounded channel. Events are
    /// always mirrored to tracing regardless.
    pub fn subscribe(&self, capacity: usize) -> mpsc::Receiver<OperationEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        *self.events.lock().unwrap_or_else(PoisonError::into_inner) = EventSink::new(tx);
        rx
    }

    fn sink(&self) -> EventSink {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Last published status snapshot.
    pub fn status(&self) -> OperationStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_operation_running(&self) -> bool {
        self.control.state().is_active()
    }

    pub fn run_state(&self) -> RunState {
        self.control.state()
    }

    /// Ask the running operation to stop at its next checkpoint.
    pub fn stop_operation(&self) -> bool {
        let stopped = self.control.stop();
        if stopped {
            warn!(target: "operation", "Stop requested, finishing current step");
        }
        stopped
    }

    pub async fn execute_operation(
        &self,
        config: AppConfig,
        password: &str,
    ) -> Result<OperationOutcome, OperationError> {
        let guard = self.control.begin()?;
        let events = self.sink();

        let heartbeat = Heartbeat::new("Validating configuration");
        let _watchdog = Watchdog::start(self.settings.watchdog, heartbeat.clone(), events.clone());
        let mut progress = Progress::new(
            config.wallet_count as usize,
            self.status.clone(),
            events.clone(),
            heartbeat,
        );

        progress.begin("Validating configuration").await;
        let validated = match self.validate(&config, password).await {
            Ok(v) => v,
            Err(err) => {
                events
                    .error(
                        format!("Validation FAILED: {}", err),
                        Some(json!({ "class": err.class() })),
                    )
                    .await;
                progress.finish("Validation failed").await;
                return Err(err);
            }
        };
        events
            .info(format!(
                "Starting operation: {} wallets, token {:?} on {}/{}",
                validated.wallet_count, validated.token, config.chain, config.dex
            ))
            .await;

        let mut run = Run {
            app: &config,
            config: &validated,
            password,
            token: guard.token().clone(),
            events: events.clone(),
            progress,
            wallets: Vec::with_capacity(validated.wallet_count),
        };

        match self.run_phases(&mut run).await {
            Ok(Flow::Continue) => {
                let status = run.progress.finish("Completed").await;
                events
                    .info(format!(
                        "Operation SUCCESS: {} swaps, {} token transfers",
                        status.swaps_completed, status.tokens_transferred
                    ))
                    .await;
                Ok(OperationOutcome::Completed(status))
            }
            Ok(Flow::Cancelled) => {
                let status = run.progress.finish("Cancelled").await;
                events
                    .warn(format!(
                        "Operation cancelled after {} of {} wallets were created",
                        status.wallets_created, validated.wallet_count
                    ))
                    .await;
                Ok(OperationOutcome::Cancelled(status))
            }
            Err(err) => {
                events
                    .error(
                        format!("Operation FAILED: {}", err),
                        Some(json!({ "class": err.class() })),
                    )
                    .await;
                guard.enter_cleanup();
                run.progress.begin("Cleanup sweep").await;
                self.cleanup_sweep(&validated, password, &events).await;
                run.progress.finish("Failed").await;
                Err(err)
            }
        }
    }

    async fn validate(
        &self,
        config: &AppConfig,
        password: &str,
    ) -> Result<ValidatedConfig, OperationError> {
        let validated = config.validate()?;
        if password.is_empty() {
            return Err(ConfigError::MissingField {
                field: "wallet password".to_string(),
            }
            .into());
        }

        let master_balance = self
            .chain
            .balance(validated.master.address())
            .await
            .map_err(OperationError::Fatal)?;
        let overhead = self.funding_overhead(&validated).await?;
        let required = (overhead + validated.min_purchase)
            .saturating_mul(U256::from(validated.wallet_count));
        if master_balance < required {
            return Err(OperationError::InsufficientFunds {
                required: format_eth(required),
                available: format_eth(master_balance),
            });
        }
        Ok(validated)
    }

    /// Per-wallet cost of funding on top of the purchase: the wallet's gas
    /// reserve plus the master's own transfer fee.
    pub(super) async fn funding_overhead(
        &self,
        config: &ValidatedConfig,
    ) -> Result<U256, OperationError> {
        let fees = self.chain.fee_data().await.map_err(OperationError::Fatal)?;
        let transfer_fee = gas_reserve_wei(
            self.settings.gas.limit_transfer(),
            fees.effective_price(),
            &self.settings.gas,
        );
        Ok(config.gas_reserve + transfer_fee)
    }

    async fn run_phases(&self, run: &mut Run<'_>) -> Result<Flow, OperationError> {
        run.events.info("Phase 2: creating wallets").await;
        if self.create_wallets(run).await? == Flow::Cancelled {
            return Ok(Flow::Cancelled);
        }

        run.events.info("Phase 3: funding wallets").await;
        if run.cancelled() || self.fund_wallets(run).await? == Flow::Cancelled {
            return Ok(Flow::Cancelled);
        }

        run.events.info("Phase 4: swapping ETH for tokens").await;
        if run.cancelled() || self.swap_wallets(run).await? == Flow::Cancelled {
            return Ok(Flow::Cancelled);
        }

        run.events.info("Phase 5: consolidating to target").await;
        if run.cancelled() || self.consolidate_wallets(run).await? == Flow::Cancelled {
            return Ok(Flow::Cancelled);
        }

        Ok(Flow::Continue)
    }

    fn consolidator<'a>(&'a self, events: &'a EventSink) -> Consolidator<'a> {
        Consolidator {
            chain: self.chain.as_ref(),
            ledger: self.ledger.as_ref(),
            events,
            gas: &self.settings.gas,
            dust: &self.settings.dust,
        }
    }

    /// Encrypt a fresh key. Key derivation runs on the blocking pool.
    async fn seal(
        &self,
        secret: Zeroizing<String>,
        password: &str,
    ) -> Result<String, OperationError> {
        let vault = self.vault.clone();
        let password = Zeroizing::new(password.to_string());
        tokio::task::spawn_blocking(move || vault.encrypt(&secret, &password))
            .await
            .map_err(OperationError::fatal)?
            .map_err(|e| OperationError::fatal(anyhow::anyhow!("wallet encryption failed: {}", e)))
    }

    /// Decrypt a stored wallet and check it matches its recorded address.
    async fn unlock(
        &self,
        record: &WalletRecord,
        password: &str,
    ) -> Result<LocalWallet, WalletError> {
        let failed = |reason: String| WalletError::DecryptionFailed {
            address: record.address.clone(),
            reason,
        };
        let vault = self.vault.clone();
        let ciphertext = record.encrypted_secret.clone();
        let password = Zeroizing::new(password.to_string());
        let secret = tokio::task::spawn_blocking(move || vault.decrypt(&ciphertext, &password))
            .await
            .map_err(|e| failed(e.to_string()))?
            .map_err(|e| failed(e.to_string()))?;
        let secret = Zeroizing::new(secret);
        let signer = LocalWallet::from_str(secret.trim_start_matches("0x"))
            .map_err(|_| WalletError::InvalidKeyFormat)?;

        let recorded = parse_address("wallet address", &record.address).ok();
        if recorded != Some(signer.address()) {
            return Err(WalletError::DecryptionFailed {
                address: record.address.clone(),
                reason: "decrypted key does not match the recorded address".to_string(),
            });
        }
        Ok(signer)
    }

    /// Best effort: every failure is logged and the sweep moves on.
    async fn cleanup_sweep(&self, config: &ValidatedConfig, password: &str, events: &EventSink) {
        events.warn("Starting cleanup sweep of incomplete wallets").await;

        let wallets = match self.ledger.get_all_wallets().await {
            Ok(w) => w,
            Err(e) => {
                events
                    .critical(
                        format!("Cleanup sweep aborted, ledger unavailable: {:#}", e),
                        None,
                    )
                    .await;
                return;
            }
        };

        let pending: Vec<WalletRecord> = wallets
            .into_iter()
            .filter(|w| w.status != WalletStatus::Completed)
            .collect();
        let sweep = SweepTarget {
            token: config.token,
            target: config.target,
            min_kept_tokens: config.min_kept_tokens,
            gas_limit_override: None,
        };
        let consolidator = self.consolidator(events);
        let mut completed = 0usize;

        for record in &pending {
            let signer = match self.unlock(record, password).await {
                Ok(s) => s,
                Err(e) => {
                    events
                        .error(format!("Cleanup skipped wallet {}: {}", record.id, e), None)
                        .await;
                    continue;
                }
            };

            match consolidator.consolidate(record.id, &signer, &sweep).await {
                Ok(report) if report.is_complete() => {
                    match self
                        .ledger
                        .update_wallet(record.id, &WalletUpdate::status(WalletStatus::Completed))
                        .await
                    {
                        Ok(()) => completed += 1,
                        Err(e) => {
                            events
                                .error(
                                    format!("Cleanup could not complete wallet {}: {:#}", record.id, e),
                                    None,
                                )
                                .await
                        }
                    }
                }
                Ok(_) => {
                    events
                        .warn(format!(
                            "Cleanup left wallet {} incomplete, balances unreadable",
                            record.id
                        ))
                        .await
                }
                Err(e) => {
                    events
                        .error(format!("Cleanup FAILED for wallet {}: {}", record.id, e), None)
                        .await
                }
            }
        }

        events
            .info(format!(
                "Cleanup sweep finished: {}/{} wallets completed",
                completed,
                pending.len()
            ))
            .await;
    }

    /// Consolidate one stored wallet out of band, using the token and kept
    /// amount of the last saved operation config.
    pub async fn transfer_back_from_wallet(
        &self,
        wallet_id: i64,
        password: &str,
        target_address: &str,
        gas_limit_override: Option<u64>,
    ) -> Result<ConsolidationReport, OperationError> {
        let _guard = self.control.begin()?;
        let events = self.sink();

        let target = parse_address("target_address", target_address)?;
        let record = self
            .ledger
            .get_wallet(wallet_id)
            .await
            .map_err(OperationError::Fatal)?
            .ok_or(WalletError::NotFound { id: wallet_id })?;

        let saved = self
            .ledger
            .get_config()
            .await
            .map_err(OperationError::Fatal)?
            .ok_or_else(|| ConfigError::MissingField {
                field: "saved operation config".to_string(),
            })?;
        let saved: AppConfig =
            serde_json::from_value(saved).map_err(|e| ConfigError::InvalidValue {
                field: "saved operation config".to_string(),
                reason: e.to_string(),
            })?;
        let token = parse_address("token_address", &saved.token_address)?;

        let signer = self.unlock(&record, password).await?;
        events
            .info(format!(
                "Transferring back wallet {} ({}) to {:?}",
                record.id, record.address, target
            ))
            .await;

        let sweep = SweepTarget {
            token,
            target,
            min_kept_tokens: saved.min_kept_tokens,
            gas_limit_override,
        };
        let report = self
            .consolidator(&events)
            .consolidate(record.id, &signer, &sweep)
            .await?;

        if report.is_complete() && record.status != WalletStatus::Completed {
            self.ledger
                .update_wallet(record.id, &WalletUpdate::status(WalletStatus::Completed))
                .await
                .map_err(OperationError::Fatal)?;
        }
        Ok(report)
    }
}

/// Sleep that returns early on cancellation.
async fn pause(token: &CancellationToken, delay: Duration) {
    if delay.is_zero() {
        return;
    }
    tokio::select! {
        _ = token.cancelled() => {}
        _ = tokio::time::sleep(delay) => {}
    }
}
