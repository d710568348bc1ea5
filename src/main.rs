use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use avax_tipbot::bot::BotService;
use avax_tipbot::chain::{self, ChainGateway};
use avax_tipbot::config;
use avax_tipbot::db::Database;
use avax_tipbot::pricing::{CoinGeckoFeed, FeeRateResolver, FlatFeeRate, TieredFeeRate};

/// Custodial AVAX wallet bot
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Override DATABASE_URL
    #[arg(long)]
    database_url: Option<String>,

    /// Override AVALANCHE_RPC
    #[arg(long)]
    rpc_url: Option<String>,

    /// Read messages from stdin instead of Telegram
    #[arg(long)]
    console: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment variables
    dotenv().ok();

    // Initialize logging
    init_logger();

    let cli = Cli::parse();
    info!("Starting AVAX tip bot...");

    let mut config = config::load_config()?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }
    if let Some(url) = cli.rpc_url {
        config.rpc_url = url;
    }
    let registry = config::load_token_registry(&config)?;
    info!(
        "Configuration loaded, {} tokens registered",
        registry.tokens().count()
    );

    let rpc = chain::create_gateway_from_config(&config)?;
    match rpc.verify_chain_id().await {
        Ok(true) => {}
        Ok(false) => warn!("Node at {} is not on chain {}", rpc.rpc_url(), config.chain_id),
        Err(e) => warn!("Could not verify chain id: {}", e),
    }
    let gateway: Arc<dyn ChainGateway> = rpc;

    let db = Database::new(&config.database_url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))?;
    info!("Database initialized");

    let feed = Arc::new(CoinGeckoFeed::new(&config.price_api_url)?);
    let fees: Arc<dyn FeeRateResolver> = match config.fee_tier_token.as_deref() {
        Some(symbol) => {
            let token = registry
                .resolve_token(symbol)
                .with_context(|| format!("FEE_TIER_TOKEN {} is not a registered token", symbol))?;
            info!("Fee tiering on {} holdings", token.display_symbol());
            Arc::new(TieredFeeRate::new(
                gateway.clone(),
                token.contract,
                config.fee_tier_min_balance,
                config.low_fee_rate,
                config.high_fee_rate,
            ))
        }
        None => Arc::new(FlatFeeRate(config.high_fee_rate)),
    };

    let service = Arc::new(BotService::new(&config, &db, gateway, feed, fees, registry));

    // Hourly activity pruning
    let pruner = service.clone();
    let prune_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            if let Err(e) = pruner.prune_activity().await {
                error!("Activity pruning failed: {}", e);
            }
        }
    });

    tokio::select! {
        result = run_transport(&config, cli.console, service.clone()) => {
            if let Err(e) = result {
                error!("Transport stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    prune_handle.abort();
    info!("Shutting down...");
    Ok(())
}

#[cfg(feature = "telegram")]
async fn run_transport(config: &config::Config, console: bool, service: Arc<BotService>) -> Result<()> {
    match (&config.telegram_token, console) {
        (Some(token), false) => {
            avax_tipbot::bot::telegram::run(token.clone(), service).await;
            Ok(())
        }
        _ => avax_tipbot::bot::console::run(service).await,
    }
}

#[cfg(not(feature = "telegram"))]
async fn run_transport(config: &config::Config, console: bool, service: Arc<BotService>) -> Result<()> {
    if config.telegram_token.is_some() && !console {
        warn!("TELEGRAM_TOKEN is set but this build lacks the `telegram` feature, using the console");
    }
    avax_tipbot::bot::console::run(service).await
}

fn init_logger() {
    env_logger::init_from_env(env_logger::Env::default().filter_or("RUST_LOG", "info"));
}
