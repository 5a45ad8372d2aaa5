//! # Core Error Types
//!
//! Centralized error definitions for the core-logic crate and the chain
//! crates built on top of it. All errors implement `std::error::Error` and
//! `std::fmt::Display`.

use thiserror::Error;

/// Failure returned to the caller of an operation.
///
/// Only these classes ever propagate out of the orchestrator. Per-wallet
/// failures are logged and recorded in the ledger instead.
#[derive(Error, Debug)]
pub enum OperationError {
    #[error("An operation is already in progress")]
    AlreadyRunning,

    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: String, available: String },

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error("Fatal error: {0:#}")]
    Fatal(anyhow::Error),
}

impl OperationError {
    pub fn fatal<E: Into<anyhow::Error>>(e: E) -> Self {
        OperationError::Fatal(e.into())
    }

    /// Short machine-friendly class name used in log payloads.
    pub fn class(&self) -> &'static str {
        match self {
            OperationError::AlreadyRunning => "already_running",
            OperationError::Configuration(_) => "configuration",
            OperationError::InsufficientFunds { .. } => "insufficient_funds",
            OperationError::Wallet(_) => "wallet",
            OperationError::Fatal(_) => "fatal",
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Invalid RPC URL format: '{url}'")]
    InvalidRpcUrl { url: String },

    #[error("Invalid address for '{field}': '{value}'")]
    InvalidAddress { field: String, value: String },

    #[error("Missing required configuration field: '{field}'")]
    MissingField { field: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("No router known for dex '{dex}' on chain '{chain}'")]
    UnsupportedRoute { chain: String, dex: String },
}

/// Wallet and key handling errors
#[derive(Error, Debug, Clone)]
pub enum WalletError {
    #[error("Decryption failed for wallet {address}: {reason}")]
    DecryptionFailed { address: String, reason: String },

    #[error("Wallet {id} not found")]
    NotFound { id: i64 },

    #[error("Invalid private key format: expected hex string")]
    InvalidKeyFormat,

    #[error("Illegal status transition for wallet {id}: {from} -> {to}")]
    IllegalTransition { id: i64, from: String, to: String },
}

/// Database operation errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection pool exhausted (max: {max_size})")]
    PoolExhausted { max_size: u32 },

    #[error("Transaction failed: {msg}")]
    TransactionFailed { msg: String },

    #[error("Query returned no rows for key: {key}")]
    NotFound { key: String },

    #[error("Invalid {table} row: {reason}")]
    InvalidRecord { table: String, reason: String },

    #[error("I/O error at {path}: {msg}")]
    Io { path: String, msg: String },
}

/// On-chain submission errors
#[derive(Error, Debug, Clone)]
pub enum ChainError {
    #[error("Transaction submission failed: {reason}")]
    Submission { reason: String },

    #[error("Transaction {tx_hash} reverted")]
    Reverted { tx_hash: String },

    #[error("Transaction {tx_hash} not confirmed within {timeout_secs}s")]
    ConfirmationTimeout { tx_hash: String, timeout_secs: u64 },

    #[error("Transaction {tx_hash} dropped from mempool")]
    Dropped { tx_hash: String },
}

/// DEX swap errors
#[derive(Error, Debug, Clone)]
pub enum SwapError {
    #[error("No liquidity for token {token}: {reason}")]
    NoLiquidity { token: String, reason: String },

    #[error("Swap reverted: {reason}")]
    Reverted { reason: String },

    #[error("Swap {tx_hash} not confirmed within {timeout_secs}s")]
    ConfirmationTimeout { tx_hash: String, timeout_secs: u64 },
}

impl From<ChainError> for SwapError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::ConfirmationTimeout {
                tx_hash,
                timeout_secs,
            } => SwapError::ConfirmationTimeout {
                tx_hash,
                timeout_secs,
            },
            other => SwapError::Reverted {
                reason: other.to_string(),
            },
        }
    }
}

/// Security-related errors
#[derive(Error, Debug, Clone)]
pub enum SecurityError {
    #[error("Password required but not provided")]
    PasswordRequired,

    #[error("Encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    #[error("Decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    #[error("Malformed ciphertext envelope: {reason}")]
    MalformedEnvelope { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_timeout_maps_to_swap_timeout() {
        let err: SwapError = ChainError::ConfirmationTimeout {
            tx_hash: "0xabc".to_string(),
            timeout_secs: 120,
        }
        .into();
        assert!(matches!(err, SwapError::ConfirmationTimeout { timeout_secs: 120, .. }));
    }

    #[test]
    fn test_operation_error_classes() {
        assert_eq!(OperationError::AlreadyRunning.class(), "already_running");
        let e = OperationError::fatal(anyhow::anyhow!("ledger unavailable"));
        assert_eq!(e.class(), "fatal");
        assert!(e.to_string().contains("ledger unavailable"));
    }
}
