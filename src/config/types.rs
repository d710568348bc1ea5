use alloy::primitives::{address, Address, U256};
use anyhow::{Context, Result};
use log::warn;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::models::{TokenInfo, TokenRegistry};

/// Wrapped AVAX on C-Chain mainnet
pub const WAVAX: Address = address!("b31f66aa3c1e785363f0875a1b74e27b85fd66c7");

/// Trader Joe v1 router on C-Chain mainnet
pub const JOE_ROUTER: Address = address!("60ae616a2155ee3d9a68541ba4544862310933d4");

/// Configuration for the tip bot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Avalanche C-Chain RPC URL
    pub rpc_url: String,
    pub chain_id: u64,
    /// DEX router used for quotes and swaps
    pub router_address: Address,
    /// Wrapped native token used in swap paths
    pub wrapped_native_address: Address,
    /// SQLite URL or file path for wallets and activity
    pub database_url: String,
    /// JSON file holding the leaderboard
    pub leaderboard_path: String,
    pub telegram_token: Option<String>,
    /// Block explorer base URL, transaction links are `<base>/tx/<hash>`
    pub explorer_url: String,
    /// Fiat price API base URL
    pub price_api_url: String,
    pub price_cache_ttl_seconds: u64,
    pub slippage_tolerance: Decimal,
    pub deadline_offset_seconds: u64,
    /// How long `/sell` and approvals wait for a receipt
    pub receipt_timeout_seconds: u64,
    /// Fraction added to gas limit and gas price of single transactions
    pub gas_safety_margin: Decimal,
    pub fallback_gas_price_gwei: u64,
    /// Gas limit used when estimating a contract call fails
    pub fallback_contract_gas: u64,
    pub low_fee_rate: Decimal,
    pub high_fee_rate: Decimal,
    /// Token whose holders get the low fee rate
    pub fee_tier_token: Option<String>,
    /// Minimum balance of `fee_tier_token`, in smallest units
    pub fee_tier_min_balance: U256,
    pub activity_retention_hours: i64,
    /// Upper bound for the `/rain` lookback window
    pub max_rain_hours: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.avax.network/ext/bc/C/rpc".to_string(),
            chain_id: 43114,
            router_address: JOE_ROUTER,
            wrapped_native_address: WAVAX,
            database_url: "sqlite:tipbot.db".to_string(),
            leaderboard_path: "leaderboard.json".to_string(),
            telegram_token: None,
            explorer_url: "https://snowtrace.io".to_string(),
            price_api_url: "https://api.coingecko.com/api/v3".to_string(),
            price_cache_ttl_seconds: 60,
            slippage_tolerance: Decimal::new(5, 2),
            deadline_offset_seconds: 600,
            receipt_timeout_seconds: 180,
            gas_safety_margin: Decimal::new(2, 1),
            fallback_gas_price_gwei: 30,
            fallback_contract_gas: 200_000,
            low_fee_rate: Decimal::new(5, 4),
            high_fee_rate: Decimal::new(6942, 6),
            fee_tier_token: None,
            fee_tier_min_balance: U256::from(4_206_900_000u64),
            activity_retention_hours: 24,
            max_rain_hours: 24,
        }
    }
}

fn parse_var<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparseable value for {}: {:?}", key, raw);
            None
        }
    }
}

fn parse_address(key: &str, raw: &str) -> Result<Address> {
    Address::from_str(raw.trim()).with_context(|| format!("{} is not a valid address: {}", key, raw))
}

/// Loads configuration from environment variables, falling back to default values
pub fn load_config() -> Result<Config> {
    let mut config = Config::default();

    if let Ok(rpc_url) = env::var("AVALANCHE_RPC") {
        config.rpc_url = rpc_url;
    }

    if let Some(chain_id) = parse_var("CHAIN_ID") {
        config.chain_id = chain_id;
    }

    if let Ok(router) = env::var("ROUTER_CONTRACT_ADDRESS") {
        config.router_address = parse_address("ROUTER_CONTRACT_ADDRESS", &router)?;
    }

    if let Ok(wrapped) = env::var("WRAPPED_NATIVE_ADDRESS") {
        config.wrapped_native_address = parse_address("WRAPPED_NATIVE_ADDRESS", &wrapped)?;
    }

    if let Ok(database_url) = env::var("DATABASE_URL") {
        config.database_url = database_url;
    }

    if let Ok(path) = env::var("LEADERBOARD_PATH") {
        config.leaderboard_path = path;
    }

    if let Ok(token) = env::var("TELEGRAM_TOKEN") {
        if !token.trim().is_empty() {
            config.telegram_token = Some(token.trim().to_string());
        }
    }

    if let Ok(explorer) = env::var("EXPLORER_URL") {
        config.explorer_url = explorer;
    }

    if let Ok(api) = env::var("PRICE_API_URL") {
        config.price_api_url = api;
    }

    if let Some(ttl) = parse_var("PRICE_CACHE_TTL_SECONDS") {
        config.price_cache_ttl_seconds = ttl;
    }

    if let Some(slippage) = parse_var::<Decimal>("SLIPPAGE_TOLERANCE") {
        if slippage >= Decimal::ZERO && slippage < Decimal::ONE {
            config.slippage_tolerance = slippage;
        } else {
            warn!("SLIPPAGE_TOLERANCE must be in [0, 1), keeping {}", config.slippage_tolerance);
        }
    }

    if let Some(offset) = parse_var("DEADLINE_OFFSET_SECONDS") {
        config.deadline_offset_seconds = offset;
    }

    if let Some(timeout) = parse_var("RECEIPT_TIMEOUT_SECONDS") {
        config.receipt_timeout_seconds = timeout;
    }

    if let Some(margin) = parse_var::<Decimal>("GAS_SAFETY_MARGIN") {
        if !margin.is_sign_negative() {
            config.gas_safety_margin = margin;
        }
    }

    if let Some(gwei) = parse_var("FALLBACK_GAS_PRICE_GWEI") {
        config.fallback_gas_price_gwei = gwei;
    }

    if let Some(gas) = parse_var("FALLBACK_CONTRACT_GAS") {
        config.fallback_contract_gas = gas;
    }

    if let Some(rate) = parse_var("LOW_FEE_RATE") {
        config.low_fee_rate = rate;
    }

    if let Some(rate) = parse_var("HIGH_FEE_RATE") {
        config.high_fee_rate = rate;
    }

    if let Ok(token) = env::var("FEE_TIER_TOKEN") {
        if !token.trim().is_empty() {
            config.fee_tier_token = Some(token.trim().to_lowercase());
        }
    }

    if let Some(min_balance) = parse_var("FEE_TIER_MIN_BALANCE") {
        config.fee_tier_min_balance = min_balance;
    }

    if let Some(hours) = parse_var("ACTIVITY_RETENTION_HOURS") {
        config.activity_retention_hours = hours;
    }

    Ok(config)
}

/// Builds the token registry: the native coin plus every symbol listed in `TOKENS`.
///
/// Each listed token needs `<SYMBOL>_TOKEN_CONTRACT_ADDRESS`; `<SYMBOL>_DECIMALS`
/// defaults to 18 and `COINGECKO_ID_<symbol>` is optional.
pub fn load_token_registry(config: &Config) -> Result<TokenRegistry> {
    let native = TokenInfo::new("avax", config.wrapped_native_address, 18)
        .with_price_feed_id("avalanche-2");
    let mut registry = TokenRegistry::new(native);

    let symbols = env::var("TOKENS").unwrap_or_default();
    for symbol in symbols.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let lower = symbol.to_lowercase();
        if lower == "avax" {
            continue;
        }
        let upper = symbol.to_uppercase();

        let address_key = format!("{}_TOKEN_CONTRACT_ADDRESS", upper);
        let raw = env::var(&address_key)
            .with_context(|| format!("{} is listed in TOKENS but {} is not set", symbol, address_key))?;
        let contract = parse_address(&address_key, &raw)?;
        let decimals = parse_var::<u8>(&format!("{}_DECIMALS", upper)).unwrap_or(18);

        let mut token = TokenInfo::new(&lower, contract, decimals);
        let feed_key = format!("COINGECKO_ID_{}", lower);
        if let Ok(id) = env::var(&feed_key).or_else(|_| env::var(format!("COINGECKO_ID_{}", upper))) {
            token = token.with_price_feed_id(id.trim());
        }
        registry.register(token);
    }

    Ok(registry)
}
