//! # EVM Buyer
//!
//! Spreads a token purchase across freshly generated wallets: creates them,
//! funds each from a master wallet with a randomized amount, swaps ETH for
//! the token through a Uniswap V2 style router and consolidates everything
//! to a target address.
//!
//! - [`allocation`] - Randomized budget split
//! - [`chain`] - Balance reads and transfer submission
//! - [`config`] - Operation config, validation and file/env loading
//! - [`contracts`] - ERC-20 and router ABIs
//! - [`orchestrator`] - Phase runner, watchdog, cleanup and transfer-back
//! - [`swap`] - Router registry and swap execution

pub mod allocation;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod orchestrator;
pub mod swap;
pub mod utils;

pub use allocation::allocate;
pub use chain::{ChainClient, EthersChainClient, FeeData, TxOutcome};
pub use config::{AppConfig, BuyerConfig, ValidatedConfig};
pub use orchestrator::{
    ConsolidationReport, DustPolicy, EventSink, LogEvent, LogLevel, OperationEvent,
    OperationOutcome, OperationStatus, Orchestrator, OrchestratorSettings, RunState, StepResult,
};
pub use swap::{resolve_router, SwapOutcome, SwapRouter, UniswapV2Router};
