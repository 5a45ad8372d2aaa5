//! ETH -> token swaps through a Uniswap V2 style router.

use anyhow::Result;
use async_trait::async_trait;
use core_logic::{with_retry, ConfigError, SwapError};
use ethers::contract::{BaseContract, Contract};
use ethers::prelude::*;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::chain::{ChainClient, EthersChainClient};
use crate::contracts;

/// Deadline handed to the router, relative to submission.
const SWAP_DEADLINE_SECS: u64 = 20 * 60;
const BPS_DENOMINATOR: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapOutcome {
    pub tx_hash: String,
    pub gas_used: Option<U256>,
    /// Router quote at submission time, before slippage.
    pub estimated_output: U256,
}

#[async_trait]
pub trait SwapRouter: Send + Sync {
    /// Swap `amount_in` wei of the wallet's ETH for `token`.
    async fn swap(
        &self,
        wallet: &LocalWallet,
        token: Address,
        amount_in: U256,
        slippage_percent: f64,
    ) -> Result<SwapOutcome, SwapError>;
}

/// Known (chain, dex) router deployments.
const ROUTERS: &[(&str, &str, &str)] = &[
    ("ethereum", "uniswap_v2", "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D"),
    ("base", "uniswap_v2", "0x4752ba5DBc23f44D87826276BF6Fd6b1C372aD24"),
    ("arbitrum", "uniswap_v2", "0x4752ba5DBc23f44D87826276BF6Fd6b1C372aD24"),
    ("arbitrum", "sushiswap", "0x1b02dA8Cb0d097eB8D57A175b88c7D8b47997506"),
    ("bsc", "pancakeswap", "0x10ED43C718714eb63d5aA57B78B54704E256024E"),
    ("polygon", "quickswap", "0xa5E0829CaCEd8fFDD4De3c43696c57F7D7A678ff"),
    ("sepolia", "uniswap_v2", "0xeE567Fe1712Faf6149d80dA1E6934E354124CfE3"),
];

fn normalize(id: &str) -> String {
    id.trim().to_ascii_lowercase().replace(['-', ' '], "_")
}

pub fn default_router(chain: &str, dex: &str) -> Option<Address> {
    let (chain, dex) = (normalize(chain), normalize(dex));
    ROUTERS
        .iter()
        .find(|(c, d, _)| *c == chain && *d == dex)
        .and_then(|(_, _, addr)| Address::from_str(addr).ok())
}

/// Router for a chain/dex pair, preferring an explicit override.
pub fn resolve_router(
    chain: &str,
    dex: &str,
    override_address: Option<&str>,
) -> Result<Address, ConfigError> {
    match override_address.map(str::trim).filter(|s| !s.is_empty()) {
        Some(addr) => crate::config::parse_address("router_address", addr),
        None => default_router(chain, dex).ok_or_else(|| ConfigError::UnsupportedRoute {
            chain: chain.to_string(),
            dex: dex.to_string(),
        }),
    }
}

/// Slippage percent to basis points, clamped to [0, 100%].
pub fn slippage_bps(slippage_percent: f64) -> u64 {
    if !slippage_percent.is_finite() || slippage_percent <= 0.0 {
        return 0;
    }
    ((slippage_percent * 100.0).round() as u64).min(BPS_DENOMINATOR)
}

pub fn min_output(expected: U256, slippage_percent: f64) -> U256 {
    let bps = slippage_bps(slippage_percent);
    expected * U256::from(BPS_DENOMINATOR - bps) / U256::from(BPS_DENOMINATOR)
}

pub struct UniswapV2Router<P = Http> {
    chain: Arc<EthersChainClient<P>>,
    router: Address,
    abi: BaseContract,
}

impl<P> UniswapV2Router<P>
where
    P: JsonRpcClient + Clone + 'static,
{
    pub fn new(chain: Arc<EthersChainClient<P>>, router: Address) -> Result<Self> {
        Ok(Self {
            chain,
            router,
            abi: contracts::uniswap_v2_router()?,
        })
    }

    pub fn address(&self) -> Address {
        self.router
    }

    async fn quote(&self, token: Address, amount_in: U256) -> Result<(Vec<Address>, U256), SwapError> {
        let contract = Contract::new(self.router, self.abi.clone(), self.chain.provider());
        let retry = self.chain.retry();

        let weth: Address = with_retry(retry, "WETH", || async {
            let weth: Address = contract.method("WETH", ())?.call().await?;
            Ok(weth)
        })
        .await
        .map_err(|e| SwapError::Reverted {
            reason: format!("router WETH() failed: {:#}", e),
        })?;

        let path = vec![weth, token];
        let amounts: Vec<U256> = with_retry(retry, "getAmountsOut", || async {
            let amounts: Vec<U256> = contract
                .method("getAmountsOut", (amount_in, path.clone()))?
                .call()
                .await?;
            Ok(amounts)
        })
        .await
        .map_err(|e| SwapError::NoLiquidity {
            token: format!("{:?}", token),
            reason: format!("{:#}", e),
        })?;

        let expected = amounts.last().copied().unwrap_or_default();
        if expected.is_zero() {
            return Err(SwapError::NoLiquidity {
                token: format!("{:?}", token),
                reason: "router quoted zero output".to_string(),
            });
        }
        Ok((path, expected))
    }
}

#[async_trait]
impl<P> SwapRouter for UniswapV2Router<P>
where
    P: JsonRpcClient + Clone + 'static,
{
    async fn swap(
        &self,
        wallet: &LocalWallet,
        token: Address,
        amount_in: U256,
        slippage_percent: f64,
    ) -> Result<SwapOutcome, SwapError> {
        let (path, expected) = self.quote(token, amount_in).await?;
        let amount_out_min = min_output(expected, slippage_percent);

        let deadline = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
            + SWAP_DEADLINE_SECS;

        debug!(
            "Swap quote: {} wei -> {} (min {}) via {:?}",
            amount_in, expected, amount_out_min, self.router
        );

        let data = self
            .abi
            .encode(
                "swapExactETHForTokensSupportingFeeOnTransferTokens",
                (amount_out_min, path, wallet.address(), U256::from(deadline)),
            )
            .map_err(|e| SwapError::Reverted {
                reason: e.to_string(),
            })?;

        let fees = self.chain.fee_data().await.map_err(|e| SwapError::Reverted {
            reason: format!("fee data unavailable: {:#}", e),
        })?;
        let tx = self
            .chain
            .eip1559_request(
                wallet.address(),
                self.router,
                &fees,
                U256::from(self.chain.gas().limit_swap()),
            )
            .data(data)
            .value(amount_in);

        let receipt = self.chain.send_and_confirm(wallet, tx).await?;
        Ok(SwapOutcome {
            tx_hash: format!("{:?}", receipt.transaction_hash),
            gas_used: receipt.gas_used,
            estimated_output: expected,
        })
    }
}
