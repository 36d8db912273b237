//! Loan Monitor
//!
//! Watches collateralized loans on a Soroban lending pool.
//! Features:
//! - Health factor evaluation against one price snapshot per cycle
//! - Graduated on-chain warnings for loans drifting toward liquidation
//! - Profitability-gated liquidations with confirmation polling
//! - In-process metrics with periodic self checks

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use loan_monitor_api::{IndexerClient, RemoteSigner};
use loan_monitor_chain::{
    BorrowerId, BorrowerRegistry, ConfirmationPolicy, SorobanRpcClient, StaticBorrowerRegistry,
    TransactionExecutor,
};
use loan_monitor_core::{
    BotConfig, LoanMonitor, MetricsCollector, MonitorCollaborators, MonitorScheduler,
};

/// Environment variable names.
mod env {
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
    pub const STELLAR_RPC_URL: &str = "STELLAR_RPC_URL";
    pub const INDEXER_URL: &str = "INDEXER_URL";
    pub const SIGNER_URL: &str = "SIGNER_URL";
    pub const SIGNER_API_KEY: &str = "SIGNER_API_KEY";
    pub const LENDING_POOL_CONTRACT_ID: &str = "LENDING_POOL_CONTRACT_ID";
    pub const STRWA_TOKEN_ADDRESS: &str = "STRWA_TOKEN_ADDRESS";
    pub const BORROWERS: &str = "BORROWERS";
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    dotenvy::dotenv().ok();
    init_tracing();

    // BOT_PROFILE selects testing, production, or a TOML file path
    let mut bot_config = BotConfig::from_env()?;
    apply_env_overrides(&mut bot_config);
    bot_config.validate()?;
    bot_config.log_config();

    let metrics = Arc::new(MetricsCollector::new());
    let monitor = Arc::new(initialize_monitor(&bot_config, metrics.clone())?);

    let handle = MonitorScheduler::from_config(monitor, &bot_config.scanner)
        .with_metrics(metrics.clone())
        .start();

    info!("Loan monitor running, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("Shutdown requested");
    handle.stop().await;

    let summary = metrics.snapshot();
    info!(
        cycles = summary.total_cycles,
        aborted = summary.aborted_cycles,
        warnings = summary.total_warnings_issued,
        liquidations = summary.successful_liquidations,
        failed_liquidations = summary.failed_liquidations,
        total_profit = %summary.total_profit,
        average_health_factor = ?metrics.average_health_factor(),
        "Final metrics"
    );

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,loan_monitor_core=debug,loan_monitor_chain=debug")
    });
    let json = std::env::var(env::LOG_FORMAT)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

/// Environment variables take precedence over the selected profile.
fn apply_env_overrides(config: &mut BotConfig) {
    let network = &mut config.network;
    let overrides: [(&str, &mut String); 5] = [
        (env::STELLAR_RPC_URL, &mut network.rpc_url),
        (env::INDEXER_URL, &mut network.indexer_url),
        (env::SIGNER_URL, &mut network.signer_url),
        (env::LENDING_POOL_CONTRACT_ID, &mut network.lending_pool_contract),
        (env::STRWA_TOKEN_ADDRESS, &mut network.collateral_asset),
    ];
    for (name, field) in overrides {
        if let Ok(value) = std::env::var(name) {
            if !value.is_empty() {
                *field = value;
            }
        }
    }
}

fn initialize_monitor(config: &BotConfig, metrics: Arc<MetricsCollector>) -> Result<LoanMonitor> {
    info!("Initializing components...");
    let network = &config.network;

    if network.lending_pool_contract.is_empty() {
        warn!("No lending pool contract configured; signing requests will be rejected");
    }

    // Indexer serves prices, loans and (by default) the borrower list
    let indexer = Arc::new(IndexerClient::new(&network.indexer_url)?);
    info!(url = %indexer.base_url(), "Indexer client initialized");

    let registry: Arc<dyn BorrowerRegistry> = match std::env::var(env::BORROWERS) {
        Ok(list) if !list.trim().is_empty() => {
            let borrowers = list
                .split(',')
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .map(BorrowerId::from);
            let registry = StaticBorrowerRegistry::with_borrowers(borrowers)
                .with_debt_filter(indexer.clone());
            info!(borrowers = registry.len(), "Using static borrower registry");
            Arc::new(registry)
        }
        _ => {
            info!("Using indexer borrower registry");
            indexer.clone()
        }
    };

    let mut signer = RemoteSigner::builder(&network.signer_url, &network.lending_pool_contract)
        .network_passphrase(&network.network_passphrase);
    if let Ok(key) = std::env::var(env::SIGNER_API_KEY) {
        signer = signer.api_key(key);
    }
    let signer = Arc::new(signer.build()?);
    info!(contract = signer.contract_id(), "Remote signer initialized");

    let rpc = Arc::new(SorobanRpcClient::new(&network.rpc_url)?);
    info!(url = %rpc.url(), "Soroban RPC client initialized");

    let policy = ConfirmationPolicy {
        poll_interval: config.confirmation.poll_interval(),
        max_attempts: config.confirmation.max_attempts,
    };
    let executor = Arc::new(TransactionExecutor::new(signer, rpc, policy));
    info!(
        worst_case_secs = policy.worst_case().as_secs_f64(),
        "Transaction executor initialized"
    );

    let monitor = LoanMonitor::new(
        config,
        MonitorCollaborators {
            oracle: indexer.clone(),
            loans: indexer,
            registry,
            executor,
            sink: metrics,
        },
    );

    info!("All components initialized");
    Ok(monitor)
}

/// Print startup banner.
fn print_banner() {
    println!(
        r#"
    ╦  ┌─┐┌─┐┌┐┌  ╔╦╗┌─┐┌┐┌┬┌┬┐┌─┐┬─┐
    ║  │ │├─┤│││  ║║║│ │││││ │ │ │├┬┘
    ╩═╝└─┘┴ ┴┘└┘  ╩ ╩└─┘┘└┘┴ ┴ └─┘┴└─
    Loan Monitor v0.1.0
    "#
    );
}
