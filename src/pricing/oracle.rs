use alloy::primitives::{Address, U256};
use log::warn;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::chain::ChainGateway;
use crate::error::{Error, Result};
use crate::models::{Asset, TokenInfo};
use crate::pricing::PriceFeed;
use crate::utils::{from_base_units, to_base_units};

/// One side of a conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denomination {
    Usd,
    Asset(Asset),
}

impl Denomination {
    pub fn label(&self) -> String {
        match self {
            Denomination::Usd => "USD".to_string(),
            Denomination::Asset(asset) => asset.display_symbol(),
        }
    }
}

/// Router quotes plus a TTL-cached fiat feed
pub struct PriceOracle {
    gateway: Arc<dyn ChainGateway>,
    feed: Arc<dyn PriceFeed>,
    router: Address,
    native: TokenInfo,
    ttl: Duration,
    cache: Mutex<HashMap<String, (Decimal, Instant)>>,
}

impl PriceOracle {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        feed: Arc<dyn PriceFeed>,
        router: Address,
        native: TokenInfo,
        ttl: Duration,
    ) -> Self {
        Self {
            gateway,
            feed,
            router,
            native,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Router output for `amount_in` along `path`. A read-only call.
    pub async fn quote_on_chain(&self, amount_in: U256, path: &[Address]) -> Result<U256> {
        let amounts = self.gateway.amounts_out(self.router, amount_in, path).await?;
        amounts
            .last()
            .copied()
            .ok_or_else(|| Error::ChainRpc("router returned no amounts".to_string()))
    }

    /// USD price for a feed id, or `None` when the feed is unavailable.
    /// Successful answers are cached for the configured TTL.
    pub async fn quote_fiat(&self, feed_id: &str) -> Option<Decimal> {
        if let Ok(cache) = self.cache.lock() {
            if let Some((price, fetched_at)) = cache.get(feed_id) {
                if fetched_at.elapsed() < self.ttl {
                    return Some(*price);
                }
            }
        }

        match self.feed.usd_price(feed_id).await {
            Ok(price) => {
                if let Ok(mut cache) = self.cache.lock() {
                    cache.insert(feed_id.to_string(), (price, Instant::now()));
                }
                Some(price)
            }
            Err(e) => {
                warn!("USD price for {} unavailable: {}", feed_id, e);
                None
            }
        }
    }

    /// USD price of the native coin
    pub async fn native_usd_price(&self) -> Option<Decimal> {
        let id = self.native.price_feed_id.as_deref()?;
        self.quote_fiat(id).await
    }

    /// Display-unit router quote from one asset into another
    async fn quote_display(&self, amount: Decimal, from: &TokenInfo, to: &TokenInfo) -> Result<Decimal> {
        let units = to_base_units(amount, from.decimals)?;
        if units.is_zero() {
            return Ok(Decimal::ZERO);
        }
        let out = self.quote_on_chain(units, &[from.contract, to.contract]).await?;
        Ok(from_base_units(out, to.decimals))
    }

    /// Native coin received for one whole `token`, per the router
    pub async fn price_in_native(&self, token: &TokenInfo) -> Result<Decimal> {
        self.quote_display(Decimal::ONE, token, &self.native).await
    }

    /// USD value of `amount` of `asset`.
    ///
    /// Uses the asset's own feed id when it has one, otherwise routes through
    /// the native coin. `None` when the feed is down or the router can't quote.
    pub async fn usd_value(&self, asset: &Asset, amount: Decimal) -> Option<Decimal> {
        if let Some(id) = asset.info().price_feed_id.as_deref() {
            return self
                .quote_fiat(id)
                .await
                .and_then(|price| amount.checked_mul(price));
        }
        match self
            .convert(amount, &Denomination::Asset(asset.clone()), &Denomination::Usd)
            .await
        {
            Ok(value) => value,
            Err(e) => {
                warn!("Could not value {} {}: {}", amount, asset.display_symbol(), e);
                None
            }
        }
    }

    /// Convert between any two of {native, registered token, USD}.
    ///
    /// Every conversion goes through the native coin. `Ok(None)` means a USD
    /// leg was needed and the feed was unavailable.
    pub async fn convert(&self, amount: Decimal, from: &Denomination, to: &Denomination) -> Result<Option<Decimal>> {
        if from == to {
            return Ok(Some(amount));
        }

        let in_native = match from {
            Denomination::Usd => match self.native_usd_price().await {
                Some(price) if !price.is_zero() => amount.checked_div(price),
                _ => None,
            },
            Denomination::Asset(Asset::Native(_)) => Some(amount),
            Denomination::Asset(Asset::Erc20(token)) => Some(self.quote_display(amount, token, &self.native).await?),
        };
        let Some(in_native) = in_native else {
            return Ok(None);
        };

        let converted = match to {
            Denomination::Usd => self
                .native_usd_price()
                .await
                .and_then(|price| in_native.checked_mul(price)),
            Denomination::Asset(Asset::Native(_)) => Some(in_native),
            Denomination::Asset(Asset::Erc20(token)) => Some(self.quote_display(in_native, &self.native, token).await?),
        };
        Ok(converted)
    }
}
