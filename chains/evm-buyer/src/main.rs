use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use core_logic::{setup_logger, DatabaseManager, Ledger, SecurityUtils, OPERATION_TARGET};
use dialoguer::{theme::ColorfulTheme, Confirm, Password};
use dotenv::dotenv;
use ethers::types::Address;
use evm_buyer::{
    resolve_router, BuyerConfig, ChainClient, DustPolicy, EthersChainClient, OperationEvent,
    OperationOutcome, Orchestrator, OrchestratorSettings, SwapRouter, UniswapV2Router,
};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Spread a token purchase across generated wallets", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "chains/evm-buyer/config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full create, fund, swap and consolidate operation
    Run,
    /// Sweep one stored wallet's tokens and ETH to a target
    TransferBack {
        #[arg(long)]
        wallet_id: i64,
        /// Defaults to the configured target address
        #[arg(long)]
        target: Option<String>,
        /// Gas limit for the ETH transfer
        #[arg(long)]
        gas_limit: Option<u64>,
    },
    /// List stored wallets
    Wallets,
    /// List recorded transactions, newest first
    Transactions {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Delete all stored wallets (transactions are kept)
    ClearWallets {
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let loaded = BuyerConfig::load(&cli.config);
    let log_dir = loaded
        .as_ref()
        .map(|c| c.log_dir.clone())
        .unwrap_or_else(|_| "logs".to_string());
    let _log_guard = setup_logger(&log_dir);

    let mut config = loaded.map_err(|e| {
        error!("Failed to load config: {:#}", e);
        e
    })?;
    if let Ok(key) = env::var("MASTER_PRIVATE_KEY") {
        config.operation.master_private_key = key;
    }
    info!("Loaded config from {}", cli.config);

    let db = DatabaseManager::new(&config.db_path)
        .await
        .with_context(|| format!("Failed to open ledger at {}", config.db_path))?;

    match cli.command {
        Command::Run => run(config, db).await,
        Command::TransferBack {
            wallet_id,
            target,
            gas_limit,
        } => transfer_back(config, db, wallet_id, target, gas_limit).await,
        Command::Wallets => list_wallets(&db).await,
        Command::Transactions { limit } => list_transactions(&db, limit).await,
        Command::ClearWallets { yes } => clear_wallets(&db, yes).await,
    }
}

fn settings(config: &BuyerConfig) -> OrchestratorSettings {
    OrchestratorSettings {
        pacing: config.pacing,
        watchdog: config.watchdog,
        gas: config.gas_config(),
        dust: DustPolicy::default(),
        slippage_percent: config.slippage_percent,
    }
}

/// Environment first, interactive prompt as fallback.
fn wallet_password() -> Result<String> {
    if let Ok(password) = env::var("WALLET_PASSWORD") {
        if !password.is_empty() {
            return Ok(password);
        }
    }
    warn!("WALLET_PASSWORD is not set");
    Password::with_theme(&ColorfulTheme::default())
        .with_prompt("Enter wallet password")
        .interact()
        .context("Cannot prompt for password (not a terminal). Set WALLET_PASSWORD instead")
}

async fn connect(
    config: &BuyerConfig,
    router: Address,
) -> Result<(Arc<dyn ChainClient>, Arc<dyn SwapRouter>)> {
    let rpc_url = &config.operation.rpc_url;
    let gas = config.gas_config();
    let timeout = config.confirmation_timeout();

    if rpc_url.starts_with("ws://") || rpc_url.starts_with("wss://") {
        let chain = Arc::new(EthersChainClient::connect_ws(rpc_url, gas, timeout).await?);
        info!("Connected to chain {} over websocket", chain.chain_id());
        let swap: Arc<dyn SwapRouter> = Arc::new(UniswapV2Router::new(chain.clone(), router)?);
        let chain: Arc<dyn ChainClient> = chain;
        Ok((chain, swap))
    } else {
        let chain = Arc::new(EthersChainClient::connect_http(rpc_url, gas, timeout).await?);
        info!("Connected to chain {}", chain.chain_id());
        let swap: Arc<dyn SwapRouter> = Arc::new(UniswapV2Router::new(chain.clone(), router)?);
        let chain: Arc<dyn ChainClient> = chain;
        Ok((chain, swap))
    }
}

async fn build_orchestrator(config: &BuyerConfig, db: DatabaseManager) -> Result<Orchestrator> {
    let op = &config.operation;
    let router = resolve_router(&op.chain, &op.dex, op.router_address.as_deref())?;
    let (chain, swap) = connect(config, router).await?;
    Ok(Orchestrator::new(
        chain,
        swap,
        Arc::new(db),
        Arc::new(SecurityUtils::default()),
        settings(config),
    ))
}

async fn run(config: BuyerConfig, db: DatabaseManager) -> Result<()> {
    let password = wallet_password()?;
    let orchestrator = Arc::new(build_orchestrator(&config, db).await?);

    let mut events = orchestrator.subscribe(256);
    let printer = tokio::spawn(async move {
        let mut last_step = String::new();
        while let Some(event) = events.recv().await {
            if let OperationEvent::Status(status) = event {
                if status.current_step != last_step {
                    info!(
                        target: OPERATION_TARGET,
                        "[{:>5.1}%] {}", status.progress, status.current_step
                    );
                    last_step = status.current_step;
                }
            }
        }
    });

    let stopper = orchestrator.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.stop_operation();
        }
    });

    let result = orchestrator
        .execute_operation(config.operation.clone(), &password)
        .await;
    ctrl_c.abort();
    drop(orchestrator);
    // Sender clones die with the aborted tasks; don't hang on a straggler
    let _ = tokio::time::timeout(Duration::from_secs(2), printer).await;

    match result {
        Ok(OperationOutcome::Completed(status)) => {
            info!(
                "Done: {} wallets, {} funded, {} swaps, {} token transfers",
                status.wallets_created,
                status.eth_transferred,
                status.swaps_completed,
                status.tokens_transferred
            );
            Ok(())
        }
        Ok(OperationOutcome::Cancelled(status)) => {
            warn!(
                "Cancelled at '{}'. Use transfer-back to recover funded wallets",
                status.current_step
            );
            Ok(())
        }
        Err(e) => Err(e).context("Operation failed"),
    }
}

async fn transfer_back(
    config: BuyerConfig,
    db: DatabaseManager,
    wallet_id: i64,
    target: Option<String>,
    gas_limit: Option<u64>,
) -> Result<()> {
    let password = wallet_password()?;
    let target = target.unwrap_or_else(|| config.operation.target_address.clone());
    let orchestrator = build_orchestrator(&config, db).await?;

    let report = orchestrator
        .transfer_back_from_wallet(wallet_id, &password, &target, gas_limit)
        .await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn list_wallets(db: &DatabaseManager) -> Result<()> {
    let wallets = db.get_all_wallets().await?;
    if wallets.is_empty() {
        println!("No wallets stored.");
        return Ok(());
    }
    println!("{:>5}  {:<42}  {:<11}  {:>20}  {:>20}", "ID", "ADDRESS", "STATUS", "ETH", "TOKENS");
    for w in wallets {
        println!(
            "{:>5}  {:<42}  {:<11}  {:>20}  {:>20}",
            w.id,
            w.address,
            w.status,
            w.eth_balance.as_deref().unwrap_or("-"),
            w.token_balance.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn list_transactions(db: &DatabaseManager, limit: usize) -> Result<()> {
    let txs = db.get_all_transactions().await?;
    for tx in txs.iter().rev().take(limit) {
        println!(
            "{:>5}  {}  {:<14}  {:<8}  {} {}  {} -> {}  {}",
            tx.id,
            tx.timestamp.format("%Y-%m-%d %H:%M:%S"),
            tx.tx_type.as_str(),
            tx.status.as_str(),
            tx.amount,
            tx.token,
            tx.from_address,
            tx.to_address,
            tx.tx_hash
                .as_deref()
                .or(tx.error.as_deref())
                .unwrap_or("")
        );
    }
    Ok(())
}

async fn clear_wallets(db: &DatabaseManager, yes: bool) -> Result<()> {
    if !yes {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Delete all stored wallets? Funded wallets become unrecoverable")
            .default(false)
            .interact()
            .unwrap_or(false);
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }
    let removed = db.clear_wallets().await?;
    info!("Removed {} wallets", removed);
    Ok(())
}
