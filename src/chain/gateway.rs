use alloy::primitives::{Address, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use log::{debug, warn};
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::models::ReceiptOutcome;

/// Default pause between receipt polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Everything the bot needs from the chain.
///
/// Implementations report failures as `Error::ChainRpc`, except `submit_raw`
/// which reports a rejected broadcast as `Error::Submission`.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    fn chain_id(&self) -> u64;

    async fn native_balance(&self, address: Address) -> Result<U256>;

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256>;

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256>;

    /// Router quote for `amount_in` along `path`, one entry per hop
    async fn amounts_out(&self, router: Address, amount_in: U256, path: &[Address]) -> Result<Vec<U256>>;

    async fn gas_price(&self) -> Result<u128>;

    /// Next nonce for `address`, counting pending transactions
    async fn nonce(&self, address: Address) -> Result<u64>;

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64>;

    async fn latest_block_timestamp(&self) -> Result<u64>;

    async fn submit_raw(&self, raw: &[u8]) -> Result<TxHash>;

    /// `None` while no receipt exists, otherwise whether execution succeeded
    async fn receipt_status(&self, tx_hash: TxHash) -> Result<Option<bool>>;

    fn poll_interval(&self) -> Duration {
        DEFAULT_POLL_INTERVAL
    }

    /// Current gas price, or `fallback` when the node can't say
    async fn gas_price_or(&self, fallback: u128) -> u128 {
        match self.gas_price().await {
            Ok(price) => price,
            Err(e) => {
                warn!("Gas price unavailable ({}), using fallback {} wei", e, fallback);
                fallback
            }
        }
    }

    /// Gas estimate for `tx`, or `fallback` when estimation fails
    async fn estimate_gas_or(&self, tx: &TransactionRequest, fallback: u64) -> u64 {
        match self.estimate_gas(tx).await {
            Ok(gas) => gas,
            Err(e) => {
                warn!("Gas estimation failed ({}), using fallback limit {}", e, fallback);
                fallback
            }
        }
    }

    /// Poll for a receipt until one appears or `timeout` elapses. Poll errors are retried.
    async fn wait_for_receipt(&self, tx_hash: TxHash, timeout: Duration) -> ReceiptOutcome {
        let start = Instant::now();
        loop {
            match self.receipt_status(tx_hash).await {
                Ok(Some(true)) => return ReceiptOutcome::Confirmed,
                Ok(Some(false)) => return ReceiptOutcome::Reverted,
                Ok(None) => debug!("No receipt yet for {}", tx_hash),
                Err(e) => debug!("Receipt poll for {} failed: {}", tx_hash, e),
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                warn!("Timed out after {:?} waiting for receipt of {}", timeout, tx_hash);
                return ReceiptOutcome::TimedOut;
            }
            tokio::time::sleep(self.poll_interval().min(timeout - elapsed)).await;
        }
    }
}
