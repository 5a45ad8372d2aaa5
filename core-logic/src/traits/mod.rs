use crate::error::SecurityError;
use crate::records::{
    TransactionRecord, TransactionUpdate, WalletRecord, WalletUpdate,
};
use anyhow::Result;
use async_trait::async_trait;

/// Durable store for wallets, transactions and the last-used configuration.
///
/// Implementations are accessed one call at a time by a single operation, so
/// they only need to be sequentially consistent.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Persist a new wallet and return its assigned id.
    async fn save_wallet(&self, record: &WalletRecord) -> Result<i64>;

    async fn get_wallet(&self, id: i64) -> Result<Option<WalletRecord>>;

    /// All wallets in creation order.
    async fn get_all_wallets(&self) -> Result<Vec<WalletRecord>>;

    async fn update_wallet(&self, id: i64, update: &WalletUpdate) -> Result<()>;

    /// Bulk admin clear. Returns the number of removed wallets.
    async fn clear_wallets(&self) -> Result<u64>;

    /// Persist a new transaction and return its assigned id.
    async fn save_transaction(&self, record: &TransactionRecord) -> Result<i64>;

    async fn get_all_transactions(&self) -> Result<Vec<TransactionRecord>>;

    async fn update_transaction(&self, id: i64, update: &TransactionUpdate) -> Result<()>;

    async fn save_config(&self, config: &serde_json::Value) -> Result<()>;

    async fn get_config(&self) -> Result<Option<serde_json::Value>>;
}

/// Password-based encryption of private key material.
pub trait KeyVault: Send + Sync {
    fn encrypt(&self, plaintext: &str, password: &str) -> Result<String, SecurityError>;

    fn decrypt(&self, ciphertext: &str, password: &str) -> Result<String, SecurityError>;
}
