//! Minimal ABIs for the contracts the buyer talks to.

use anyhow::{Context, Result};
use ethers::abi::Abi;
use ethers::contract::BaseContract;

pub const ERC20_ABI: &str = r#"[
    {"constant":true,"inputs":[{"name":"_owner","type":"address"}],"name":"balanceOf","outputs":[{"name":"balance","type":"uint256"}],"type":"function"},
    {"constant":true,"inputs":[],"name":"decimals","outputs":[{"name":"","type":"uint8"}],"type":"function"},
    {"constant":false,"inputs":[{"name":"_to","type":"address"},{"name":"_value","type":"uint256"}],"name":"transfer","outputs":[{"name":"","type":"bool"}],"type":"function"}
]"#;

pub const UNISWAP_V2_ROUTER_ABI: &str = r#"[
    {"inputs":[],"name":"WETH","outputs":[{"internalType":"address","name":"","type":"address"}],"stateMutability":"pure","type":"function"},
    {"inputs":[{"internalType":"uint256","name":"amountIn","type":"uint256"},{"internalType":"address[]","name":"path","type":"address[]"}],"name":"getAmountsOut","outputs":[{"internalType":"uint256[]","name":"amounts","type":"uint256[]"}],"stateMutability":"view","type":"function"},
    {"inputs":[{"internalType":"uint256","name":"amountOutMin","type":"uint256"},{"internalType":"address[]","name":"path","type":"address[]"},{"internalType":"address","name":"to","type":"address"},{"internalType":"uint256","name":"deadline","type":"uint256"}],"name":"swapExactETHForTokensSupportingFeeOnTransferTokens","outputs":[],"stateMutability":"payable","type":"function"}
]"#;

pub fn erc20() -> Result<BaseContract> {
    parse(ERC20_ABI, "ERC20")
}

pub fn uniswap_v2_router() -> Result<BaseContract> {
    parse(UNISWAP_V2_ROUTER_ABI, "UniswapV2Router")
}

fn parse(json: &str, name: &str) -> Result<BaseContract> {
    let abi: Abi = serde_json::from_str(json).with_context(|| format!("Invalid {} ABI", name))?;
    Ok(BaseContract::from(abi))
}
