use alloy::primitives::Address;
use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use log::{error, info, warn};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use avax_tipbot::chain::signer::parse_private_key;
use avax_tipbot::config;
use avax_tipbot::db::Database;

/// Import a legacy wallets.json into the wallet table
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// JSON file shaped like `{"<user_id>": {"address": ..., "private_key": ...}}`
    #[arg(default_value = "wallets.json")]
    input: PathBuf,

    /// Override DATABASE_URL
    #[arg(long)]
    database_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LegacyWallet {
    address: String,
    private_key: String,
}

fn init_logger() {
    env_logger::init_from_env(env_logger::Env::default().filter_or("RUST_LOG", "info"));
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_logger();

    let cli = Cli::parse();
    let database_url = match cli.database_url {
        Some(url) => url,
        None => config::load_config()?.database_url,
    };

    let raw = tokio::fs::read_to_string(&cli.input)
        .await
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;
    let legacy: BTreeMap<String, LegacyWallet> =
        serde_json::from_str(&raw).with_context(|| format!("{} is not valid wallet JSON", cli.input.display()))?;
    info!("Loaded {} wallets from {}", legacy.len(), cli.input.display());

    let db = Database::new(&database_url)
        .await
        .with_context(|| format!("Failed to open database {}", database_url))?;
    let store = db.wallets();

    let mut imported = 0usize;
    for (user_id, wallet) in &legacy {
        let address = match Address::from_str(wallet.address.trim()) {
            Ok(address) => address,
            Err(e) => {
                warn!("Skipping user {}: bad address {:?} ({})", user_id, wallet.address, e);
                continue;
            }
        };
        match parse_private_key(&wallet.private_key) {
            Ok(signer) if signer.address() == address => {}
            Ok(_) => {
                warn!("Skipping user {}: private key does not match {}", user_id, address);
                continue;
            }
            Err(e) => {
                warn!("Skipping user {}: {}", user_id, e);
                continue;
            }
        }

        match store.save(user_id, address, &wallet.private_key).await {
            Ok(()) => imported += 1,
            Err(e) => error!("Failed to save wallet for user {}: {}", user_id, e),
        }
    }

    info!(
        "Imported {} of {} wallets, {} now on record",
        imported,
        legacy.len(),
        store.count().await?
    );
    Ok(())
}
