//! # Core Logic - Shared Building Blocks for the Token Buyer
//!
//! Chain-agnostic pieces used by the chain crates: the persistent ledger,
//! the key vault, typed errors, timing configuration and logging.
//!
//! ## Modules
//!
//! - [`config`] - Pacing and watchdog timing
//! - [`database`] - SQLite ledger (WAL mode) implementing [`Ledger`]
//! - [`error`] - Typed error handling with thiserror
//! - [`records`] - Wallet and transaction records with status rules
//! - [`security`] - Password-based secret encryption implementing [`KeyVault`]
//! - [`traits`] - Storage and vault seams
//! - [`utils`] - Gas limits, logging and read retries

pub mod config;
pub mod database;
pub mod error;
pub mod records;
pub mod security;
pub mod traits;
pub(crate) mod utils;

pub use config::{PacingConfig, WatchdogConfig};
pub use database::DatabaseManager;
pub use error::{
    ChainError, ConfigError, DatabaseError, OperationError, SecurityError, SwapError, WalletError,
};
pub use records::{
    TransactionRecord, TransactionStatus, TransactionType, TransactionUpdate, WalletRecord,
    WalletStatus, WalletUpdate,
};
pub use security::SecurityUtils;
pub use traits::{KeyVault, Ledger};

pub use utils::{
    is_transient_error, setup_logger, with_retry, GasConfig, GasConfigToml, RetryConfig,
    StandardGasLimits, OPERATION_TARGET,
};
