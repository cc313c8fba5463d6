//! Polytrader - entry point.
//!
//! Loads configuration, wires the adapters into the strategy harness,
//! and runs the built-in watcher strategy until Ctrl+C. Exits 0 on clean
//! shutdown and non-zero on unrecoverable configuration or credential
//! errors.

// Platform-specific allocator: jemalloc on Linux, system default on Windows
#[cfg(all(target_os = "linux", target_env = "gnu"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

mod adapters;
mod analytics;
mod config;
mod domain;
mod ports;
mod usecases;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::adapters::api::{ApiCredentials, ClobAuth, ClobExecution, GammaClient};
use crate::adapters::persistence::FileStore;
use crate::domain::{Market, TradingMode};
use crate::ports::VenueExecution;
use crate::usecases::{ExecutionEngine, Strategy, StrategyCtx, StrategyHarness};

/// Application version from Cargo.toml.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Built-in strategy: watches configured markets and logs price moves.
///
/// Serves as the default when the binary runs without a linked-in
/// strategy, and as a reference for writing one.
struct WatcherStrategy;

#[async_trait]
impl Strategy for WatcherStrategy {
    fn name(&self) -> &str {
        "watcher"
    }

    async fn on_price_update(&mut self, ctx: &mut StrategyCtx<'_>, market: &Market, price: f64) {
        info!(
            market = %market.slug,
            yes = market.price_yes,
            no = market.price_no,
            price,
            equity = ctx.equity(),
            "Price update"
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize structured logging
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(&log_filter)
        .with_target(true)
        .init();

    info!(
        version = VERSION,
        pid = std::process::id(),
        "Starting Polytrader runtime"
    );

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config =
        config::loader::load_config(&config_path).context("Failed to load configuration")?;

    // Wire adapters
    let storage = Arc::new(
        FileStore::open(&config.storage.data_dir)
            .await
            .context("Failed to open file store")?,
    );
    let metadata = Arc::new(GammaClient::new(&config.api).context("Failed to build Gamma client")?);

    let venue: Option<Arc<dyn VenueExecution>> = match config.mode {
        TradingMode::Live => {
            let auth = ClobAuth::new(ApiCredentials {
                api_key: config.api.api_key.clone(),
                api_secret: config.api.api_secret.clone(),
                api_passphrase: config.api.api_passphrase.clone(),
            })
            .context("Live mode credentials incomplete")?;
            Some(Arc::new(
                ClobExecution::new(&config.api, auth).context("Failed to build CLOB gateway")?,
            ))
        }
        TradingMode::Paper => None,
    };

    let engine = ExecutionEngine::new(config.mode, config.paper.clone(), storage, venue);

    info!(
        mode = %config.mode,
        markets = config.strategy.markets.len(),
        starting_balance = config.paper.starting_balance,
        "Runtime configured"
    );

    // Shutdown fan-out: Ctrl+C broadcasts to every task
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, stopping"),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
        let _ = shutdown_tx.send(());
    });

    let mut harness = StrategyHarness::new(config, WatcherStrategy, engine, metadata);
    harness.run(shutdown_rx).await?;

    let summary = analytics::summarize(harness.engine().trades());
    info!(
        version = VERSION,
        trades = summary.num_trades,
        volume = summary.total_volume,
        realized_pnl = harness.engine().realized_pnl(),
        "Runtime shutdown complete"
    );
    Ok(())
}
