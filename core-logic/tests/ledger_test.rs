use core_logic::{
    DatabaseManager, Ledger, TransactionRecord, TransactionStatus, TransactionType,
    TransactionUpdate, WalletRecord, WalletStatus, WalletUpdate,
};
use serde_json::json;
use tempfile::TempDir;

async fn open_ledger() -> (TempDir, DatabaseManager) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let db = DatabaseManager::new(path.to_str().unwrap()).await.unwrap();
    (dir, db)
}

#[tokio::test]
async fn test_wallet_ids_are_sequential() {
    let (_dir, db) = open_ledger().await;

    let first = db.save_wallet(&WalletRecord::new("0xaaa", "secret-a")).await.unwrap();
    let second = db.save_wallet(&WalletRecord::new("0xbbb", "secret-b")).await.unwrap();
    assert!(second > first);

    let wallets = db.get_all_wallets().await.unwrap();
    assert_eq!(wallets.len(), 2);
    assert_eq!(wallets[0].address, "0xaaa");
    assert_eq!(wallets[1].status, WalletStatus::Created);
}

#[tokio::test]
async fn test_wallet_update_is_partial() {
    let (_dir, db) = open_ledger().await;
    let id = db.save_wallet(&WalletRecord::new("0xaaa", "secret")).await.unwrap();

    db.update_wallet(id, &WalletUpdate::status(WalletStatus::Funded).with_eth_balance("0.5"))
        .await
        .unwrap();
    db.update_wallet(id, &WalletUpdate::default().with_token_balance("1000"))
        .await
        .unwrap();

    let wallet = db.get_wallet(id).await.unwrap().unwrap();
    assert_eq!(wallet.status, WalletStatus::Funded);
    assert_eq!(wallet.eth_balance.as_deref(), Some("0.5"));
    assert_eq!(wallet.token_balance.as_deref(), Some("1000"));
    assert_eq!(wallet.encrypted_secret, "secret");
}

#[tokio::test]
async fn test_update_missing_wallet_fails() {
    let (_dir, db) = open_ledger().await;
    assert!(db.get_wallet(42).await.unwrap().is_none());
    assert!(db
        .update_wallet(42, &WalletUpdate::status(WalletStatus::Completed))
        .await
        .is_err());
}

#[tokio::test]
async fn test_transaction_lifecycle() {
    let (_dir, db) = open_ledger().await;

    let record = TransactionRecord::pending(
        TransactionType::FundTransfer,
        "0xmaster",
        "0xaaa",
        "0.1",
        "ETH",
    );
    let id = db.save_transaction(&record).await.unwrap();
    db.update_transaction(id, &TransactionUpdate::success("0xhash", Some("21000".into())))
        .await
        .unwrap();

    let failed_id = db
        .save_transaction(&TransactionRecord::pending(
            TransactionType::TokenSwap,
            "0xaaa",
            "0xrouter",
            "0.1",
            "0xtoken",
        ))
        .await
        .unwrap();
    db.update_transaction(failed_id, &TransactionUpdate::failed("execution reverted"))
        .await
        .unwrap();

    let txs = db.get_all_transactions().await.unwrap();
    assert_eq!(txs.len(), 2);
    assert_eq!(txs[0].status, TransactionStatus::Success);
    assert_eq!(txs[0].tx_hash.as_deref(), Some("0xhash"));
    assert_eq!(txs[0].gas_used.as_deref(), Some("21000"));
    assert_eq!(txs[1].tx_type, TransactionType::TokenSwap);
    assert_eq!(txs[1].status, TransactionStatus::Failed);
    assert_eq!(txs[1].error.as_deref(), Some("execution reverted"));
    assert!(txs[1].tx_hash.is_none());
}

#[tokio::test]
async fn test_config_upsert_keeps_latest() {
    let (_dir, db) = open_ledger().await;
    assert!(db.get_config().await.unwrap().is_none());

    db.save_config(&json!({ "wallet_count": 3 })).await.unwrap();
    db.save_config(&json!({ "wallet_count": 5, "chain": "base" })).await.unwrap();

    let config = db.get_config().await.unwrap().unwrap();
    assert_eq!(config["wallet_count"], 5);
    assert_eq!(config["chain"], "base");
}

#[tokio::test]
async fn test_clear_wallets_keeps_transactions() {
    let (_dir, db) = open_ledger().await;
    db.save_wallet(&WalletRecord::new("0xaaa", "s")).await.unwrap();
    db.save_wallet(&WalletRecord::new("0xbbb", "s")).await.unwrap();
    db.save_transaction(&TransactionRecord::pending(
        TransactionType::EthTransfer,
        "0xaaa",
        "0xtarget",
        "0.01",
        "ETH",
    ))
    .await
    .unwrap();

    assert_eq!(db.clear_wallets().await.unwrap(), 2);
    assert!(db.get_all_wallets().await.unwrap().is_empty());
    assert_eq!(db.get_all_transactions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_ledger_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let path = path.to_str().unwrap();

    {
        let db = DatabaseManager::new(path).await.unwrap();
        db.save_wallet(&WalletRecord::new("0xaaa", "s")).await.unwrap();
    }

    let db = DatabaseManager::new(path).await.unwrap();
    assert_eq!(db.get_all_wallets().await.unwrap().len(), 1);
}
