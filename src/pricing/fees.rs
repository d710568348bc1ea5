use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use log::warn;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::chain::ChainGateway;

/// Decides the service fee rate charged on a native -> token swap
#[async_trait]
pub trait FeeRateResolver: Send + Sync {
    async fn fee_rate(&self, sender: Address) -> Decimal;
}

/// Same rate for everyone
pub struct FlatFeeRate(pub Decimal);

#[async_trait]
impl FeeRateResolver for FlatFeeRate {
    async fn fee_rate(&self, _sender: Address) -> Decimal {
        self.0
    }
}

/// Low rate for holders of at least `min_balance` of a gating token, high rate otherwise
pub struct TieredFeeRate {
    gateway: Arc<dyn ChainGateway>,
    gate_token: Address,
    min_balance: U256,
    low_rate: Decimal,
    high_rate: Decimal,
}

impl TieredFeeRate {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        gate_token: Address,
        min_balance: U256,
        low_rate: Decimal,
        high_rate: Decimal,
    ) -> Self {
        Self {
            gateway,
            gate_token,
            min_balance,
            low_rate,
            high_rate,
        }
    }
}

#[async_trait]
impl FeeRateResolver for TieredFeeRate {
    async fn fee_rate(&self, sender: Address) -> Decimal {
        match self.gateway.token_balance(self.gate_token, sender).await {
            Ok(balance) if balance >= self.min_balance => self.low_rate,
            Ok(_) => self.high_rate,
            Err(e) => {
                warn!("Fee tier balance check for {} failed ({}), charging the high rate", sender, e);
                self.high_rate
            }
        }
    }
}
