use async_trait::async_trait;
use log::debug;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// External source of USD prices
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn usd_price(&self, feed_id: &str) -> Result<Decimal>;
}

/// CoinGecko `simple/price` endpoint
pub struct CoinGeckoFeed {
    client: reqwest::Client,
    base_url: String,
}

impl CoinGeckoFeed {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::PriceFeed(format!("build price feed client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Pull `body[feed_id]["usd"]` out of a `simple/price` response without going through f64
fn extract_usd(body: &Value, feed_id: &str) -> Result<Decimal> {
    let number = body
        .get(feed_id)
        .and_then(|entry| entry.get("usd"))
        .and_then(Value::as_number)
        .ok_or_else(|| Error::PriceFeed(format!("price feed has no USD price for {}", feed_id)))?;
    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| Error::PriceFeed(format!("unparseable price {} for {}: {}", text, feed_id, e)))
}

#[async_trait]
impl PriceFeed for CoinGeckoFeed {
    async fn usd_price(&self, feed_id: &str) -> Result<Decimal> {
        let url = format!("{}/simple/price", self.base_url);
        debug!("Fetching USD price for {}", feed_id);
        let body: Value = self
            .client
            .get(&url)
            .query(&[("ids", feed_id), ("vs_currencies", "usd")])
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| Error::PriceFeed(format!("price feed request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| Error::PriceFeed(format!("price feed returned bad JSON: {}", e)))?;
        extract_usd(&body, feed_id)
    }
}

/// Fixed prices for tests; counts calls so cache behaviour can be checked
#[cfg(test)]
pub(crate) struct StaticFeed {
    prices: std::collections::HashMap<String, Decimal>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl StaticFeed {
    pub fn new(prices: &[(&str, Decimal)]) -> Self {
        Self {
            prices: prices.iter().map(|(id, p)| (id.to_string(), *p)).collect(),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// A feed that fails every request
    pub fn down() -> Self {
        Self::new(&[])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl PriceFeed for StaticFeed {
    async fn usd_price(&self, feed_id: &str) -> Result<Decimal> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.prices
            .get(feed_id)
            .copied()
            .ok_or_else(|| Error::PriceFeed(format!("feed down for {}", feed_id)))
    }
}
