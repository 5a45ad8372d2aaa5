#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use core_logic::{
    ChainError, DatabaseManager, KeyVault, Ledger, PacingConfig, SecurityError, SecurityUtils,
    SwapError, TransactionRecord, TransactionUpdate, WalletRecord, WalletUpdate,
};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, U256};
use ethers::utils::parse_ether;
use evm_buyer::{
    AppConfig, ChainClient, FeeData, Orchestrator, OrchestratorSettings, SwapOutcome, SwapRouter,
    TxOutcome,
};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const MASTER_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
pub const TOKEN: &str = "0x1f9840a85d5aF5bf1D1762F925BDADdC4201F984";
pub const TARGET: &str = "0x000000000000000000000000000000000000dEaD";
pub const ROUTER: &str = "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D";
pub const PASSWORD: &str = "correct horse battery staple";

pub fn gwei() -> U256 {
    U256::exp10(9)
}

pub fn eth(value: &str) -> U256 {
    parse_ether(value).unwrap()
}

pub fn master_address() -> Address {
    LocalWallet::from_str(MASTER_KEY).unwrap().address()
}

pub fn target_address() -> Address {
    Address::from_str(TARGET).unwrap()
}

pub fn app_config(wallet_count: u32) -> AppConfig {
    AppConfig {
        token_address: TOKEN.to_string(),
        wallet_count,
        master_private_key: MASTER_KEY.to_string(),
        target_address: TARGET.to_string(),
        gas_reserve_eth: 0.002,
        min_purchase_eth: 0.01,
        max_purchase_eth: 0.02,
        min_kept_tokens: 0.0,
        chain: "ethereum".to_string(),
        dex: "uniswap_v2".to_string(),
        rpc_url: "http://127.0.0.1:8545".to_string(),
        router_address: Some(ROUTER.to_string()),
    }
}

pub fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        pacing: PacingConfig::immediate(),
        ..Default::default()
    }
}

#[derive(Default)]
struct ChainState {
    eth: HashMap<Address, U256>,
    tokens: HashMap<Address, U256>,
    native_calls: usize,
    fail_native_calls: HashSet<usize>,
    token_calls: usize,
    fail_token_calls: HashSet<usize>,
    submissions: usize,
}

/// In-memory chain with a single token and a fixed 1 gwei legacy gas price.
/// Fees are charged at the gas limit.
#[derive(Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
}

impl MockChain {
    pub const TOKEN_TRANSFER_GAS: u64 = 100_000;

    pub fn set_eth(&self, address: Address, amount: U256) {
        self.state.lock().unwrap().eth.insert(address, amount);
    }

    pub fn eth_of(&self, address: Address) -> U256 {
        self.state.lock().unwrap().eth.get(&address).copied().unwrap_or_default()
    }

    pub fn tokens_of(&self, address: Address) -> U256 {
        self.state.lock().unwrap().tokens.get(&address).copied().unwrap_or_default()
    }

    /// Fail the n-th native transfer (1-based) at submission.
    pub fn fail_native_call(&self, n: usize) {
        self.state.lock().unwrap().fail_native_calls.insert(n);
    }

    /// Fail the n-th token transfer (1-based) at submission.
    pub fn fail_token_call(&self, n: usize) {
        self.state.lock().unwrap().fail_token_calls.insert(n);
    }

    pub fn submissions(&self) -> usize {
        self.state.lock().unwrap().submissions
    }

    fn next_hash(state: &mut ChainState) -> String {
        state.submissions += 1;
        format!("0x{:064x}", state.submissions)
    }

    /// Debit `amount + fee` from `from`, or fail without touching balances.
    fn debit(state: &mut ChainState, from: Address, amount: U256, fee: U256) -> Result<(), ChainError> {
        let balance = state.eth.get(&from).copied().unwrap_or_default();
        let needed = amount + fee;
        if balance < needed {
            return Err(ChainError::Submission {
                reason: "insufficient funds for gas * price + value".to_string(),
            });
        }
        state.eth.insert(from, balance - needed);
        Ok(())
    }

    pub fn swap(&self, from: Address, amount_in: U256, gas: u64, tokens_out: U256) -> Result<String, ChainError> {
        let mut state = self.state.lock().unwrap();
        Self::debit(&mut state, from, amount_in, U256::from(gas) * gwei())?;
        *state.tokens.entry(from).or_default() += tokens_out;
        Ok(Self::next_hash(&mut state))
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn balance(&self, address: Address) -> Result<U256> {
        Ok(self.eth_of(address))
    }

    async fn token_balance(&self, _token: Address, owner: Address) -> Result<U256> {
        Ok(self.tokens_of(owner))
    }

    async fn token_decimals(&self, _token: Address) -> Result<u8> {
        Ok(18)
    }

    async fn fee_data(&self) -> Result<FeeData> {
        Ok(FeeData::legacy(gwei()))
    }

    async fn transfer_native(
        &self,
        wallet: &LocalWallet,
        to: Address,
        amount: U256,
        gas_limit: Option<U256>,
    ) -> Result<TxOutcome, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.native_calls += 1;
        if state.fail_native_calls.contains(&state.native_calls) {
            return Err(ChainError::Submission {
                reason: "nonce too low".to_string(),
            });
        }

        let gas = gas_limit.unwrap_or_else(|| U256::from(21_000u64));
        Self::debit(&mut state, wallet.address(), amount, gas * gwei())?;
        *state.eth.entry(to).or_default() += amount;
        Ok(TxOutcome {
            tx_hash: Self::next_hash(&mut state),
            gas_used: Some(gas),
        })
    }

    async fn transfer_token(
        &self,
        wallet: &LocalWallet,
        _token: Address,
        to: Address,
        amount: U256,
    ) -> Result<TxOutcome, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.token_calls += 1;
        if state.fail_token_calls.contains(&state.token_calls) {
            return Err(ChainError::Submission {
                reason: "replacement transaction underpriced".to_string(),
            });
        }
        let from = wallet.address();
        let held = state.tokens.get(&from).copied().unwrap_or_default();
        if held < amount {
            return Err(ChainError::Reverted {
                tx_hash: "0x0".to_string(),
            });
        }
        Self::debit(&mut state, from, U256::zero(), U256::from(Self::TOKEN_TRANSFER_GAS) * gwei())?;
        state.tokens.insert(from, held - amount);
        *state.tokens.entry(to).or_default() += amount;
        Ok(TxOutcome {
            tx_hash: Self::next_hash(&mut state),
            gas_used: Some(U256::from(Self::TOKEN_TRANSFER_GAS)),
        })
    }
}

/// Fixed-rate router backed by [`MockChain`] balances.
pub struct MockRouter {
    chain: Arc<MockChain>,
    pub tokens_per_wei: U256,
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
    fail_calls: HashSet<usize>,
}

impl MockRouter {
    pub const SWAP_GAS: u64 = 250_000;

    pub fn new(chain: Arc<MockChain>) -> Self {
        Self {
            chain,
            tokens_per_wei: U256::from(1000u64),
            delay: None,
            calls: AtomicUsize::new(0),
            fail_calls: HashSet::new(),
        }
    }

    /// Revert the n-th swap (1-based) without touching balances.
    pub fn failing_call(mut self, n: usize) -> Self {
        self.fail_calls.insert(n);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl SwapRouter for MockRouter {
    async fn swap(
        &self,
        wallet: &LocalWallet,
        _token: Address,
        amount_in: U256,
        _slippage_percent: f64,
    ) -> Result<SwapOutcome, SwapError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_calls.contains(&call) {
            return Err(SwapError::Reverted {
                reason: "execution reverted: UniswapV2: K".to_string(),
            });
        }
        let out = amount_in * self.tokens_per_wei;
        let tx_hash = self
            .chain
            .swap(wallet.address(), amount_in, Self::SWAP_GAS, out)
            .map_err(SwapError::from)?;
        Ok(SwapOutcome {
            tx_hash,
            gas_used: Some(U256::from(Self::SWAP_GAS)),
            estimated_output: out,
        })
    }
}

/// Ledger wrapper that fails the n-th `save_transaction` call (1-based).
pub struct FlakyLedger {
    inner: Arc<DatabaseManager>,
    fail_save_at: usize,
    saves: AtomicUsize,
}

impl FlakyLedger {
    pub fn new(inner: Arc<DatabaseManager>, fail_save_at: usize) -> Self {
        Self {
            inner,
            fail_save_at,
            saves: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Ledger for FlakyLedger {
    async fn save_wallet(&self, record: &WalletRecord) -> Result<i64> {
        self.inner.save_wallet(record).await
    }

    async fn get_wallet(&self, id: i64) -> Result<Option<WalletRecord>> {
        self.inner.get_wallet(id).await
    }

    async fn get_all_wallets(&self) -> Result<Vec<WalletRecord>> {
        self.inner.get_all_wallets().await
    }

    async fn update_wallet(&self, id: i64, update: &WalletUpdate) -> Result<()> {
        self.inner.update_wallet(id, update).await
    }

    async fn clear_wallets(&self) -> Result<u64> {
        self.inner.clear_wallets().await
    }

    async fn save_transaction(&self, record: &TransactionRecord) -> Result<i64> {
        let n = self.saves.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_save_at {
            return Err(anyhow!("disk I/O error"));
        }
        self.inner.save_transaction(record).await
    }

    async fn get_all_transactions(&self) -> Result<Vec<TransactionRecord>> {
        self.inner.get_all_transactions().await
    }

    async fn update_transaction(&self, id: i64, update: &TransactionUpdate) -> Result<()> {
        self.inner.update_transaction(id, update).await
    }

    async fn save_config(&self, config: &serde_json::Value) -> Result<()> {
        self.inner.save_config(config).await
    }

    async fn get_config(&self) -> Result<Option<serde_json::Value>> {
        self.inner.get_config().await
    }
}

/// Vault that holds the calling thread for `delay` on every call.
pub struct SlowVault {
    inner: SecurityUtils,
    delay: Duration,
}

impl SlowVault {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: SecurityUtils::with_log_n(4),
            delay,
        }
    }
}

impl KeyVault for SlowVault {
    fn encrypt(&self, plaintext: &str, password: &str) -> Result<String, SecurityError> {
        std::thread::sleep(self.delay);
        self.inner.encrypt(plaintext, password)
    }

    fn decrypt(&self, ciphertext: &str, password: &str) -> Result<String, SecurityError> {
        std::thread::sleep(self.delay);
        self.inner.decrypt(ciphertext, password)
    }
}

pub struct Harness {
    pub chain: Arc<MockChain>,
    pub router: Arc<MockRouter>,
    pub db: Arc<DatabaseManager>,
    pub orchestrator: Arc<Orchestrator>,
    _dir: TempDir,
}

pub async fn open_db() -> (TempDir, Arc<DatabaseManager>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("buyer.db");
    let db = DatabaseManager::new(path.to_str().unwrap()).await.unwrap();
    (dir, Arc::new(db))
}

pub struct HarnessBuilder {
    settings: OrchestratorSettings,
    master_balance: U256,
    swap_delay: Option<Duration>,
    fail_swap_at: Option<usize>,
    fail_save_at: Option<usize>,
    vault: Option<Arc<dyn KeyVault>>,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            settings: fast_settings(),
            master_balance: eth("1"),
            swap_delay: None,
            fail_swap_at: None,
            fail_save_at: None,
            vault: None,
        }
    }
}

impl HarnessBuilder {
    pub fn settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn master_balance(mut self, balance: U256) -> Self {
        self.master_balance = balance;
        self
    }

    pub fn swap_delay(mut self, delay: Duration) -> Self {
        self.swap_delay = Some(delay);
        self
    }

    pub fn fail_swap(mut self, n: usize) -> Self {
        self.fail_swap_at = Some(n);
        self
    }

    pub fn vault(mut self, vault: Arc<dyn KeyVault>) -> Self {
        self.vault = Some(vault);
        self
    }

    pub fn fail_transaction_save(mut self, n: usize) -> Self {
        self.fail_save_at = Some(n);
        self
    }

    pub async fn build(self) -> Harness {
        let (dir, db) = open_db().await;
        let chain = Arc::new(MockChain::default());
        chain.set_eth(master_address(), self.master_balance);

        let mut router = MockRouter::new(chain.clone());
        if let Some(delay) = self.swap_delay {
            router = router.with_delay(delay);
        }
        if let Some(n) = self.fail_swap_at {
            router = router.failing_call(n);
        }
        let router = Arc::new(router);

        let ledger: Arc<dyn Ledger> = match self.fail_save_at {
            Some(n) => Arc::new(FlakyLedger::new(db.clone(), n)),
            None => db.clone(),
        };

        let orchestrator = Orchestrator::new(
            chain.clone(),
            router.clone(),
            ledger,
            self.vault
                .unwrap_or_else(|| Arc::new(SecurityUtils::with_log_n(4))),
            self.settings,
        );

        Harness {
            chain,
            router,
            db,
            orchestrator: Arc::new(orchestrator),
            _dir: dir,
        }
    }
}

pub async fn harness() -> Harness {
    HarnessBuilder::default().build().await
}
