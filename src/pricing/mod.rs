mod feed;
mod fees;
mod oracle;

pub use feed::CoinGeckoFeed;
pub use feed::PriceFeed;
pub use fees::FeeRateResolver;
pub use fees::FlatFeeRate;
pub use fees::TieredFeeRate;
pub use oracle::Denomination;
pub use oracle::PriceOracle;

#[cfg(test)]
pub(crate) use feed::StaticFeed;
