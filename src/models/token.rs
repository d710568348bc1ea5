use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Static information about a tradeable asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Lowercase ticker used in commands
    pub symbol: String,
    /// ERC-20 contract. For the native asset this is the wrapped-native contract used in swap paths.
    pub contract: Address,
    pub decimals: u8,
    /// Identifier at the fiat price feed
    pub price_feed_id: Option<String>,
}

impl TokenInfo {
    pub fn new(symbol: &str, contract: Address, decimals: u8) -> Self {
        Self {
            symbol: symbol.to_lowercase(),
            contract,
            decimals,
            price_feed_id: None,
        }
    }

    pub fn with_price_feed_id(mut self, id: impl Into<String>) -> Self {
        self.price_feed_id = Some(id.into());
        self
    }

    pub fn display_symbol(&self) -> String {
        self.symbol.to_uppercase()
    }
}

/// Either the chain's native coin or a registered ERC-20 token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Asset {
    Native(TokenInfo),
    Erc20(TokenInfo),
}

impl Asset {
    pub fn info(&self) -> &TokenInfo {
        match self {
            Asset::Native(info) | Asset::Erc20(info) => info,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Native(_))
    }

    pub fn decimals(&self) -> u8 {
        self.info().decimals
    }

    pub fn symbol(&self) -> &str {
        &self.info().symbol
    }

    pub fn display_symbol(&self) -> String {
        self.info().display_symbol()
    }

    /// Address used for this asset in router swap paths
    pub fn path_address(&self) -> Address {
        self.info().contract
    }
}

/// Registered assets, keyed by lowercase symbol
#[derive(Debug, Clone)]
pub struct TokenRegistry {
    native: TokenInfo,
    tokens: BTreeMap<String, TokenInfo>,
}

impl TokenRegistry {
    pub fn new(native: TokenInfo) -> Self {
        Self {
            native,
            tokens: BTreeMap::new(),
        }
    }

    pub fn with_token(mut self, token: TokenInfo) -> Self {
        self.register(token);
        self
    }

    pub fn register(&mut self, token: TokenInfo) {
        self.tokens.insert(token.symbol.clone(), token);
    }

    pub fn native(&self) -> &TokenInfo {
        &self.native
    }

    pub fn native_asset(&self) -> Asset {
        Asset::Native(self.native.clone())
    }

    /// ERC-20 tokens in symbol order
    pub fn tokens(&self) -> impl Iterator<Item = &TokenInfo> {
        self.tokens.values()
    }

    /// Look up an asset by symbol, case-insensitively
    pub fn resolve(&self, symbol: &str) -> Result<Asset> {
        let key = symbol.trim().to_lowercase();
        if key == self.native.symbol {
            return Ok(Asset::Native(self.native.clone()));
        }
        self.tokens
            .get(&key)
            .cloned()
            .map(Asset::Erc20)
            .ok_or_else(|| Error::UnknownToken(symbol.trim().to_string()))
    }

    /// Resolve a symbol that must name an ERC-20 token
    pub fn resolve_token(&self, symbol: &str) -> Result<TokenInfo> {
        match self.resolve(symbol)? {
            Asset::Erc20(info) => Ok(info),
            Asset::Native(_) => Err(Error::UserInput(format!(
                "{} is the native coin, please choose a token",
                self.native.display_symbol()
            ))),
        }
    }
}
