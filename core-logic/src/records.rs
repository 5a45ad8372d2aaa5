//! Ledger record types shared by the storage layer and the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pipeline position of a generated wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletStatus {
    Created,
    Funded,
    Swapped,
    Transferred,
    Completed,
}

impl WalletStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletStatus::Created => "created",
            WalletStatus::Funded => "funded",
            WalletStatus::Swapped => "swapped",
            WalletStatus::Transferred => "transferred",
            WalletStatus::Completed => "completed",
        }
    }

    /// Status only moves forward. The single way back is `funded -> created`
    /// after a failed funding transfer; `completed` is terminal.
    pub fn can_transition_to(&self, next: WalletStatus) -> bool {
        match (self, next) {
            (WalletStatus::Completed, _) => false,
            (WalletStatus::Funded, WalletStatus::Created) => true,
            (current, next) => next > *current,
        }
    }

    /// True once the wallet received (or was believed to receive) funding.
    pub fn is_funded(&self) -> bool {
        *self >= WalletStatus::Funded
    }
}

impl fmt::Display for WalletStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(WalletStatus::Created),
            "funded" => Ok(WalletStatus::Funded),
            "swapped" => Ok(WalletStatus::Swapped),
            "transferred" => Ok(WalletStatus::Transferred),
            "completed" => Ok(WalletStatus::Completed),
            other => Err(format!("unknown wallet status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    FundTransfer,
    TokenSwap,
    TokenTransfer,
    EthTransfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::FundTransfer => "fund_transfer",
            TransactionType::TokenSwap => "token_swap",
            TransactionType::TokenTransfer => "token_transfer",
            TransactionType::EthTransfer => "eth_transfer",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fund_transfer" => Ok(TransactionType::FundTransfer),
            "token_swap" => Ok(TransactionType::TokenSwap),
            "token_transfer" => Ok(TransactionType::TokenTransfer),
            "eth_transfer" => Ok(TransactionType::EthTransfer),
            other => Err(format!("unknown transaction type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "success" => Ok(TransactionStatus::Success),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status '{}'", other)),
        }
    }
}

/// A generated sub-wallet. `id` is assigned by the ledger on save and is
/// ignored when the record is inserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    pub id: i64,
    pub address: String,
    pub encrypted_secret: String,
    pub created_at: DateTime<Utc>,
    pub eth_balance: Option<String>,
    pub token_balance: Option<String>,
    pub status: WalletStatus,
}

impl WalletRecord {
    pub fn new(address: impl Into<String>, encrypted_secret: impl Into<String>) -> Self {
        Self {
            id: 0,
            address: address.into(),
            encrypted_secret: encrypted_secret.into(),
            created_at: Utc::now(),
            eth_balance: None,
            token_balance: None,
            status: WalletStatus::Created,
        }
    }
}

/// Partial update applied to a wallet row. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct WalletUpdate {
    pub status: Option<WalletStatus>,
    pub eth_balance: Option<String>,
    pub token_balance: Option<String>,
}

impl WalletUpdate {
    pub fn status(status: WalletStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_eth_balance(mut self, balance: impl Into<String>) -> Self {
        self.eth_balance = Some(balance.into());
        self
    }

    pub fn with_token_balance(mut self, balance: impl Into<String>) -> Self {
        self.token_balance = Some(balance.into());
        self
    }
}

/// Audit entry for one on-chain action. Written `pending` before submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub tx_type: TransactionType,
    pub from_address: String,
    pub to_address: String,
    pub amount: String,
    pub token: String,
    pub tx_hash: Option<String>,
    pub status: TransactionStatus,
    pub error: Option<String>,
    pub gas_used: Option<String>,
}

impl TransactionRecord {
    pub fn pending(
        tx_type: TransactionType,
        from_address: impl Into<String>,
        to_address: impl Into<String>,
        amount: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            timestamp: Utc::now(),
            tx_type,
            from_address: from_address.into(),
            to_address: to_address.into(),
            amount: amount.into(),
            token: token.into(),
            tx_hash: None,
            status: TransactionStatus::Pending,
            error: None,
            gas_used: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransactionUpdate {
    pub status: Option<TransactionStatus>,
    pub tx_hash: Option<String>,
    pub error: Option<String>,
    pub gas_used: Option<String>,
}

impl TransactionUpdate {
    pub fn success(tx_hash: impl Into<String>, gas_used: Option<String>) -> Self {
        Self {
            status: Some(TransactionStatus::Success),
            tx_hash: Some(tx_hash.into()),
            error: None,
            gas_used,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(TransactionStatus::Failed),
            error: Some(error.into()),
            ..Default::default()
        }
    }
}
