use alloy::primitives::{TxHash, U256};
use log::{debug, error, info, warn};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::chain::{ChainGateway, PreparedCall, TxSigner};
use crate::error::{Error, Result};
use crate::models::{Asset, GasPlan, SubmissionResult, SubmissionStatus, TokenInfo, Wallet};
use crate::pipeline::{PipelineSettings, FALLBACK_TRANSFER_GAS};
use crate::utils::to_base_units;

/// Split `total` into `count` equal integer shares. Returns (share, dust).
pub fn split_evenly(total: U256, count: usize) -> (U256, U256) {
    if count == 0 {
        return (U256::ZERO, total);
    }
    let count = U256::from(count);
    (total / count, total % count)
}

/// What happened for one rain recipient
#[derive(Debug, Clone)]
pub struct RecipientOutcome {
    pub recipient: Wallet,
    pub result: SubmissionResult,
}

/// Per-recipient results of a rain
#[derive(Debug, Clone)]
pub struct RainReport {
    pub amount_per_recipient: U256,
    /// Remainder of the floor division, kept by the sender
    pub dust: U256,
    pub outcomes: Vec<RecipientOutcome>,
}

impl RainReport {
    pub fn successful(&self) -> impl Iterator<Item = &RecipientOutcome> {
        self.outcomes.iter().filter(|o| o.result.was_broadcast())
    }

    pub fn success_count(&self) -> usize {
        self.successful().count()
    }

    /// Transfers that went out but were never acknowledged by the node
    pub fn unconfirmed(&self) -> impl Iterator<Item = &RecipientOutcome> {
        self.outcomes
            .iter()
            .filter(|o| *o.result.status() == SubmissionStatus::Unknown)
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.len() - self.success_count() - self.unconfirmed().count()
    }

    pub fn first_tx_hash(&self) -> Option<TxHash> {
        self.successful().find_map(|o| o.result.tx_hash())
    }
}

/// Sends one transfer per recipient from a single sender with locally assigned nonces
pub struct BatchDistributor {
    gateway: Arc<dyn ChainGateway>,
    native: TokenInfo,
    settings: PipelineSettings,
}

impl BatchDistributor {
    pub fn new(gateway: Arc<dyn ChainGateway>, native: TokenInfo, settings: PipelineSettings) -> Self {
        Self {
            gateway,
            native,
            settings,
        }
    }

    fn fallback_gas(&self, asset: &Asset) -> u64 {
        if asset.is_native() {
            FALLBACK_TRANSFER_GAS
        } else {
            self.settings.fallback_contract_gas
        }
    }

    /// Split `total` of `asset` evenly between `recipients` and send each share.
    ///
    /// Balance and gas budget are checked for the whole batch before anything is
    /// sent. A recipient whose signing or broadcast fails is skipped and the
    /// batch carries on; the nonce only advances after a successful broadcast.
    /// When a broadcast goes unanswered the nonce is re-read from the node.
    pub async fn distribute(
        &self,
        sender: &Wallet,
        asset: &Asset,
        total: Decimal,
        recipients: &[Wallet],
    ) -> Result<RainReport> {
        if recipients.is_empty() {
            return Err(Error::UserInput("There is nobody to rain on".to_string()));
        }
        if total <= Decimal::ZERO {
            return Err(Error::UserInput("Amount must be greater than zero".to_string()));
        }

        let total_units = to_base_units(total, asset.decimals())?;
        let (per_recipient, dust) = split_evenly(total_units, recipients.len());
        if per_recipient.is_zero() {
            return Err(Error::UserInput(format!(
                "{} {} is too little to split between {} users",
                total,
                asset.display_symbol(),
                recipients.len()
            )));
        }
        let distributed = per_recipient * U256::from(recipients.len());

        // Sample estimate and gas price, computed once for the batch
        let fallback_gas = self.fallback_gas(asset);
        let sample = PreparedCall::transfer(asset, recipients[0].address, per_recipient)
            .to_request(sender.address);
        let sample_gas = self.gateway.estimate_gas_or(&sample, fallback_gas).await;
        let gas_price = self
            .gateway
            .gas_price_or(self.settings.fallback_gas_price)
            .await;
        let gas_budget = U256::from(sample_gas) * U256::from(gas_price) * U256::from(recipients.len());
        debug!(
            "Rain gas estimate {}, price {}, budget {}",
            sample_gas, gas_price, gas_budget
        );

        let native_balance = self.gateway.native_balance(sender.address).await?;
        let native_required = if asset.is_native() {
            gas_budget.saturating_add(distributed)
        } else {
            let token_balance = self
                .gateway
                .token_balance(asset.path_address(), sender.address)
                .await?;
            if token_balance < distributed {
                return Err(Error::InsufficientFunds {
                    asset: asset.display_symbol(),
                    decimals: asset.decimals(),
                    required: distributed,
                    available: token_balance,
                });
            }
            gas_budget
        };
        if native_balance < native_required {
            return Err(Error::InsufficientFunds {
                asset: self.native.display_symbol(),
                decimals: self.native.decimals,
                required: native_required,
                available: native_balance,
            });
        }

        let signer = TxSigner::from_wallet(sender, self.gateway.chain_id())?;
        let mut nonce = self.gateway.nonce(sender.address).await?;
        info!(
            "Raining {} units of {} on {} users from {} starting at nonce {}",
            per_recipient,
            asset.display_symbol(),
            recipients.len(),
            sender.user_id,
            nonce
        );

        let mut outcomes = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let call = PreparedCall::transfer(asset, recipient.address, per_recipient);
            let gas_limit = match self.gateway.estimate_gas(&call.to_request(sender.address)).await {
                Ok(gas) => gas,
                Err(e) => {
                    warn!(
                        "Gas estimation for {} failed ({}), using sample {}",
                        recipient.user_id, e, sample_gas
                    );
                    sample_gas
                }
            };
            let plan = GasPlan {
                gas_limit,
                gas_price,
                nonce,
            };

            let signed = match signer.sign(&call, &plan) {
                Ok(signed) => signed,
                Err(e) => {
                    error!("Signing rain transfer to {} failed: {}", recipient.user_id, e);
                    outcomes.push(RecipientOutcome {
                        recipient: recipient.clone(),
                        result: SubmissionResult::failed(e.to_string()),
                    });
                    continue;
                }
            };

            match self.gateway.submit_raw(&signed.raw).await {
                Ok(tx_hash) => {
                    info!(
                        "Sent {} to {} ({}), tx {}",
                        per_recipient, recipient.user_id, recipient.address, tx_hash
                    );
                    outcomes.push(RecipientOutcome {
                        recipient: recipient.clone(),
                        result: SubmissionResult::submitted(tx_hash, plan),
                    });
                    nonce += 1;
                }
                Err(Error::BroadcastUnknown { tx_hash, reason }) => {
                    warn!(
                        "Rain transfer to {} unanswered, tx {} may be on chain: {}",
                        recipient.user_id, tx_hash, reason
                    );
                    outcomes.push(RecipientOutcome {
                        recipient: recipient.clone(),
                        result: SubmissionResult::unacknowledged(tx_hash, plan),
                    });
                    match self.gateway.nonce(sender.address).await {
                        Ok(pending) => nonce = nonce.max(pending),
                        Err(e) => warn!("Could not re-read nonce after unanswered broadcast: {}", e),
                    }
                }
                Err(e) => {
                    error!("Rain transfer to {} failed: {}", recipient.user_id, e);
                    outcomes.push(RecipientOutcome {
                        recipient: recipient.clone(),
                        result: SubmissionResult::failed(e.to_string()),
                    });
                }
            }
        }

        Ok(RainReport {
            amount_per_recipient: per_recipient,
            dust,
            outcomes,
        })
    }
}
