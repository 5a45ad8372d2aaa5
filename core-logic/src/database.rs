use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::records::{
    TransactionRecord, TransactionUpdate, WalletRecord, WalletUpdate,
};
use crate::traits::Ledger;

/// SQLite-backed ledger (WAL mode).
#[derive(Debug, Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

#[derive(Debug, sqlx::FromRow)]
struct WalletRow {
    id: i64,
    address: String,
    encrypted_secret: String,
    created_at: i64,
    eth_balance: Option<String>,
    token_balance: Option<String>,
    status: String,
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    timestamp: i64,
    tx_type: String,
    from_address: String,
    to_address: String,
    amount: String,
    token: String,
    tx_hash: Option<String>,
    status: String,
    error: Option<String>,
    gas_used: Option<String>,
}

fn from_millis(table: &str, millis: i64) -> Result<DateTime<Utc>, DatabaseError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| DatabaseError::InvalidRecord {
            table: table.to_string(),
            reason: format!("bad timestamp {}", millis),
        })
}

impl TryFrom<WalletRow> for WalletRecord {
    type Error = DatabaseError;

    fn try_from(row: WalletRow) -> Result<Self, Self::Error> {
        let invalid = |reason: String| DatabaseError::InvalidRecord {
            table: "wallets".to_string(),
            reason,
        };
        Ok(WalletRecord {
            id: row.id,
            address: row.address,
            encrypted_secret: row.encrypted_secret,
            created_at: from_millis("wallets", row.created_at)?,
            eth_balance: row.eth_balance,
            token_balance: row.token_balance,
            status: row.status.parse().map_err(invalid)?,
        })
    }
}

impl TryFrom<TransactionRow> for TransactionRecord {
    type Error = DatabaseError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let invalid = |reason: String| DatabaseError::InvalidRecord {
            table: "transactions".to_string(),
            reason,
        };
        Ok(TransactionRecord {
            id: row.id,
            timestamp: from_millis("transactions", row.timestamp)?,
            tx_type: row.tx_type.parse().map_err(invalid)?,
            from_address: row.from_address,
            to_address: row.to_address,
            amount: row.amount,
            token: row.token,
            tx_hash: row.tx_hash,
            status: row.status.parse().map_err(invalid)?,
            error: row.error,
            gas_used: row.gas_used,
        })
    }
}

impl DatabaseManager {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
    pub const DEFAULT_TIMEOUT_MS: u64 = 30000;

    pub async fn new(db_path: &str) -> Result<Self> {
        if !Path::new(db_path).exists() {
            std::fs::File::create(db_path).map_err(|e| DatabaseError::Io {
                path: db_path.to_string(),
                msg: e.to_string(),
            })?;
            info!("Created new database file: {}", db_path);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(Self::DEFAULT_MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_millis(Self::DEFAULT_TIMEOUT_MS))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode=WAL;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA synchronous=NORMAL;")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(&format!("sqlite://{}", db_path))
            .await
            .map_err(|e| DatabaseError::TransactionFailed { msg: e.to_string() })?;

        let manager = Self { pool };
        manager.init_schema().await?;
        info!(
            "Ledger initialized at {} with pool size {} (WAL Mode)",
            db_path,
            Self::DEFAULT_MAX_CONNECTIONS
        );
        Ok(manager)
    }

    async fn init_schema(&self) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|_| DatabaseError::PoolExhausted {
                max_size: Self::DEFAULT_MAX_CONNECTIONS,
            })?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS wallets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                address TEXT NOT NULL,
                encrypted_secret TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                eth_balance TEXT,
                token_balance TEXT,
                status TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                tx_type TEXT NOT NULL,
                from_address TEXT NOT NULL,
                to_address TEXT NOT NULL,
                amount TEXT NOT NULL,
                token TEXT NOT NULL,
                tx_hash TEXT,
                status TEXT NOT NULL,
                error TEXT,
                gas_used TEXT
            );
            CREATE TABLE IF NOT EXISTS app_config (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                payload TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| DatabaseError::TransactionFailed { msg: e.to_string() })?;

        self.create_indexes().await?;

        info!("Database schema initialized with indexes.");
        Ok(())
    }

    async fn create_indexes(&self) -> Result<()> {
        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_wallets_status ON wallets(status);",
            "CREATE INDEX IF NOT EXISTS idx_transactions_from ON transactions(from_address);",
            "CREATE INDEX IF NOT EXISTS idx_transactions_type ON transactions(tx_type);",
        ];

        for idx_sql in indexes {
            if let Err(e) = sqlx::query(idx_sql).execute(&self.pool).await {
                debug!("Index creation skipped (may exist): {}", e);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Ledger for DatabaseManager {
    async fn save_wallet(&self, record: &WalletRecord) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO wallets (address, encrypted_secret, created_at, eth_balance, token_balance, status) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.address)
        .bind(&record.encrypted_secret)
        .bind(record.created_at.timestamp_millis())
        .bind(&record.eth_balance)
        .bind(&record.token_balance)
        .bind(record.status.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to insert wallet")?;

        Ok(result.last_insert_rowid())
    }

    async fn get_wallet(&self, id: i64) -> Result<Option<WalletRecord>> {
        let row: Option<WalletRow> = sqlx::query_as("SELECT * FROM wallets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch wallet")?;

        Ok(row.map(WalletRecord::try_from).transpose()?)
    }

    async fn get_all_wallets(&self) -> Result<Vec<WalletRecord>> {
        let rows: Vec<WalletRow> = sqlx::query_as("SELECT * FROM wallets ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch wallets")?;

        rows.into_iter()
            .map(|r| WalletRecord::try_from(r).map_err(anyhow::Error::from))
            .collect()
    }

    async fn update_wallet(&self, id: i64, update: &WalletUpdate) -> Result<()> {
        let result = sqlx::query(
            "UPDATE wallets SET
                status = COALESCE(?, status),
                eth_balance = COALESCE(?, eth_balance),
                token_balance = COALESCE(?, token_balance)
             WHERE id = ?",
        )
        .bind(update.status.map(|s| s.as_str()))
        .bind(&update.eth_balance)
        .bind(&update.token_balance)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update wallet")?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                key: format!("wallet {}", id),
            }
            .into());
        }
        Ok(())
    }

    async fn clear_wallets(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM wallets")
            .execute(&self.pool)
            .await
            .context("Failed to clear wallets")?;
        info!("Cleared {} wallet records", result.rows_affected());
        Ok(result.rows_affected())
    }

    async fn save_transaction(&self, record: &TransactionRecord) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO transactions (timestamp, tx_type, from_address, to_address, amount, token, tx_hash, status, error, gas_used) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.timestamp.timestamp_millis())
        .bind(record.tx_type.as_str())
        .bind(&record.from_address)
        .bind(&record.to_address)
        .bind(&record.amount)
        .bind(&record.token)
        .bind(&record.tx_hash)
        .bind(record.status.as_str())
        .bind(&record.error)
        .bind(&record.gas_used)
        .execute(&self.pool)
        .await
        .context("Failed to insert transaction")?;

        Ok(result.last_insert_rowid())
    }

    async fn get_all_transactions(&self) -> Result<Vec<TransactionRecord>> {
        let rows: Vec<TransactionRow> =
            sqlx::query_as("SELECT * FROM transactions ORDER BY id ASC")
                .fetch_all(&self.pool)
                .await
                .context("Failed to fetch transactions")?;

        rows.into_iter()
            .map(|r| TransactionRecord::try_from(r).map_err(anyhow::Error::from))
            .collect()
    }

    async fn update_transaction(&self, id: i64, update: &TransactionUpdate) -> Result<()> {
        let result = sqlx::query(
            "UPDATE transactions SET
                status = COALESCE(?, status),
                tx_hash = COALESCE(?, tx_hash),
                error = COALESCE(?, error),
                gas_used = COALESCE(?, gas_used)
             WHERE id = ?",
        )
        .bind(update.status.map(|s| s.as_str()))
        .bind(&update.tx_hash)
        .bind(&update.error)
        .bind(&update.gas_used)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update transaction")?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                key: format!("transaction {}", id),
            }
            .into());
        }
        Ok(())
    }

    async fn save_config(&self, config: &serde_json::Value) -> Result<()> {
        sqlx::query(
            "INSERT INTO app_config (id, payload, updated_at) VALUES (1, ?, ?)
             ON CONFLICT(id) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
        )
        .bind(config.to_string())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to save config")?;
        Ok(())
    }

    async fn get_config(&self) -> Result<Option<serde_json::Value>> {
        let payload: Option<(String,)> =
            sqlx::query_as("SELECT payload FROM app_config WHERE id = 1")
                .fetch_optional(&self.pool)
                .await
                .context("Failed to fetch config")?;

        payload
            .map(|(p,)| serde_json::from_str(&p).context("Stored config is not valid JSON"))
            .transpose()
    }
}
