//! Chain access: balances, fee data and signed transfers with confirmation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use core_logic::{with_retry, ChainError, GasConfig, RetryConfig};
use ethers::contract::{BaseContract, Contract};
use ethers::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::contracts;

/// Fee snapshot used both for submission and for reserve math.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeData {
    pub gas_price: U256,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
}

impl FeeData {
    pub fn legacy(gas_price: U256) -> Self {
        Self {
            gas_price,
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
        }
    }

    /// Upper bound for the price of one unit of gas.
    pub fn effective_price(&self) -> U256 {
        self.max_fee_per_gas.unwrap_or(self.gas_price)
    }

    pub fn priority_fee(&self) -> U256 {
        self.max_priority_fee_per_gas
            .unwrap_or(self.gas_price)
            .min(self.effective_price())
    }
}

/// Confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutcome {
    pub tx_hash: String,
    pub gas_used: Option<U256>,
}

impl From<&TransactionReceipt> for TxOutcome {
    fn from(receipt: &TransactionReceipt) -> Self {
        Self {
            tx_hash: format!("{:?}", receipt.transaction_hash),
            gas_used: receipt.gas_used,
        }
    }
}

/// Read access plus signed transfers. Reads may be retried by the
/// implementation, submissions are attempted exactly once.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn balance(&self, address: Address) -> Result<U256>;

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256>;

    async fn token_decimals(&self, token: Address) -> Result<u8>;

    async fn fee_data(&self) -> Result<FeeData>;

    /// Send native ETH and wait for a successful receipt.
    async fn transfer_native(
        &self,
        wallet: &LocalWallet,
        to: Address,
        amount: U256,
        gas_limit: Option<U256>,
    ) -> Result<TxOutcome, ChainError>;

    /// ERC-20 `transfer` and wait for a successful receipt.
    async fn transfer_token(
        &self,
        wallet: &LocalWallet,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<TxOutcome, ChainError>;
}

/// ethers-backed client over any JSON-RPC transport.
#[derive(Debug)]
pub struct EthersChainClient<P = Http> {
    provider: Arc<Provider<P>>,
    chain_id: u64,
    gas: GasConfig,
    retry: RetryConfig,
    confirmation_timeout: Duration,
    erc20: BaseContract,
}

impl EthersChainClient<Http> {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub async fn connect_http(
        rpc_url: &str,
        gas: GasConfig,
        confirmation_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        let url = reqwest::Url::parse(rpc_url).context("Invalid RPC URL")?;
        let provider = Provider::new(Http::new_with_client(url, client));
        Self::from_provider(provider, gas, confirmation_timeout).await
    }
}

impl EthersChainClient<Ws> {
    pub async fn connect_ws(
        rpc_url: &str,
        gas: GasConfig,
        confirmation_timeout: Duration,
    ) -> Result<Self> {
        let provider = Provider::<Ws>::connect(rpc_url)
            .await
            .with_context(|| format!("Failed to open websocket to {}", rpc_url))?;
        Self::from_provider(provider, gas, confirmation_timeout).await
    }
}

impl<P> EthersChainClient<P>
where
    P: JsonRpcClient + Clone + 'static,
{
    pub async fn from_provider(
        provider: Provider<P>,
        gas: GasConfig,
        confirmation_timeout: Duration,
    ) -> Result<Self> {
        let chain_id = provider
            .get_chainid()
            .await
            .context("Failed to query chain id")?
            .as_u64();
        debug!("Connected to chain {}", chain_id);

        Ok(Self {
            provider: Arc::new(provider),
            chain_id,
            gas,
            retry: RetryConfig::default(),
            confirmation_timeout,
            erc20: contracts::erc20()?,
        })
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn provider(&self) -> Arc<Provider<P>> {
        self.provider.clone()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn gas(&self) -> &GasConfig {
        &self.gas
    }

    pub fn retry(&self) -> RetryConfig {
        self.retry
    }

    pub(crate) fn eip1559_request(
        &self,
        from: Address,
        to: Address,
        fees: &FeeData,
        gas_limit: U256,
    ) -> Eip1559TransactionRequest {
        Eip1559TransactionRequest::new()
            .from(from)
            .to(to)
            .gas(gas_limit)
            .max_fee_per_gas(fees.effective_price())
            .max_priority_fee_per_gas(fees.priority_fee())
            .chain_id(self.chain_id)
    }

    /// Sign, submit once and wait for the receipt within the confirmation timeout.
    pub(crate) async fn send_and_confirm(
        &self,
        wallet: &LocalWallet,
        tx: Eip1559TransactionRequest,
    ) -> Result<TransactionReceipt, ChainError> {
        let signer = wallet.clone().with_chain_id(self.chain_id);
        let client = SignerMiddleware::new(self.provider.as_ref().clone(), signer);

        let pending = client
            .send_transaction(tx, None)
            .await
            .map_err(|e| ChainError::Submission {
                reason: e.to_string(),
            })?;
        let tx_hash = format!("{:?}", pending.tx_hash());
        debug!("Submitted {} from {:?}", tx_hash, wallet.address());

        let receipt = match tokio::time::timeout(self.confirmation_timeout, pending).await {
            Err(_) => {
                return Err(ChainError::ConfirmationTimeout {
                    tx_hash,
                    timeout_secs: self.confirmation_timeout.as_secs(),
                })
            }
            Ok(Err(e)) => {
                return Err(ChainError::Submission {
                    reason: format!("{} while waiting for {}", e, tx_hash),
                })
            }
            Ok(Ok(None)) => return Err(ChainError::Dropped { tx_hash }),
            Ok(Ok(Some(receipt))) => receipt,
        };

        if receipt.status != Some(U64::from(1)) {
            return Err(ChainError::Reverted { tx_hash });
        }
        Ok(receipt)
    }

    async fn submission_fees(&self) -> Result<FeeData, ChainError> {
        self.fee_data().await.map_err(|e| ChainError::Submission {
            reason: format!("fee data unavailable: {:#}", e),
        })
    }
}

#[async_trait]
impl<P> ChainClient for EthersChainClient<P>
where
    P: JsonRpcClient + Clone + 'static,
{
    async fn balance(&self, address: Address) -> Result<U256> {
        with_retry(self.retry, "get_balance", || async {
            self.provider
                .get_balance(address, None)
                .await
                .map_err(anyhow::Error::from)
        })
        .await
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256> {
        let contract = Contract::new(token, self.erc20.clone(), self.provider.clone());
        with_retry(self.retry, "balanceOf", || async {
            let balance: U256 = contract.method("balanceOf", owner)?.call().await?;
            Ok(balance)
        })
        .await
    }

    async fn token_decimals(&self, token: Address) -> Result<u8> {
        let contract = Contract::new(token, self.erc20.clone(), self.provider.clone());
        with_retry(self.retry, "decimals", || async {
            let decimals: u8 = contract.method("decimals", ())?.call().await?;
            Ok(decimals)
        })
        .await
    }

    async fn fee_data(&self) -> Result<FeeData> {
        let gas_price = with_retry(self.retry, "gas_price", || async {
            self.provider.get_gas_price().await.map_err(anyhow::Error::from)
        })
        .await?;

        // Chains without EIP-1559 fee history fall back to the legacy price
        match self.provider.estimate_eip1559_fees(None).await {
            Ok((max_fee, priority)) => Ok(FeeData {
                gas_price,
                max_fee_per_gas: Some(max_fee),
                max_priority_fee_per_gas: Some(priority),
            }),
            Err(e) => {
                debug!("EIP-1559 fee estimation unavailable: {}", e);
                Ok(FeeData::legacy(gas_price))
            }
        }
    }

    async fn transfer_native(
        &self,
        wallet: &LocalWallet,
        to: Address,
        amount: U256,
        gas_limit: Option<U256>,
    ) -> Result<TxOutcome, ChainError> {
        let fees = self.submission_fees().await?;
        let gas_limit = gas_limit.unwrap_or_else(|| U256::from(self.gas.limit_transfer()));
        let tx = self
            .eip1559_request(wallet.address(), to, &fees, gas_limit)
            .value(amount);

        let receipt = self.send_and_confirm(wallet, tx).await?;
        Ok(TxOutcome::from(&receipt))
    }

    async fn transfer_token(
        &self,
        wallet: &LocalWallet,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<TxOutcome, ChainError> {
        let data = self
            .erc20
            .encode("transfer", (to, amount))
            .map_err(|e| ChainError::Submission {
                reason: e.to_string(),
            })?;
        let fees = self.submission_fees().await?;
        let tx = self
            .eip1559_request(
                wallet.address(),
                token,
                &fees,
                U256::from(self.gas.limit_token_transfer()),
            )
            .data(data);

        let receipt = self.send_and_confirm(wallet, tx).await?;
        Ok(TxOutcome::from(&receipt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_price_prefers_max_fee() {
        let gwei = U256::exp10(9);
        let fees = FeeData {
            gas_price: gwei,
            max_fee_per_gas: Some(gwei * 3),
            max_priority_fee_per_gas: Some(gwei * 5),
        };
        assert_eq!(fees.effective_price(), gwei * 3);
        // priority never exceeds the cap
        assert_eq!(fees.priority_fee(), gwei * 3);
    }

    #[test]
    fn test_legacy_fees() {
        let fees = FeeData::legacy(U256::from(7u64));
        assert_eq!(fees.effective_price(), U256::from(7u64));
        assert_eq!(fees.priority_fee(), U256::from(7u64));
    }
}
