use alloy::primitives::{TxHash, U256};
use log::{error, info, warn};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

use crate::chain::contracts::{
    approve_calldata, swap_native_for_tokens_calldata, swap_tokens_for_native_calldata,
};
use crate::chain::{ChainGateway, PreparedCall, TxSigner};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{
    GasPlan, IntentKind, SubmissionResult, SubmissionStatus, SubmitOptions, TokenInfo,
    TransactionIntent, Wallet,
};
use crate::pricing::FeeRateResolver;
use crate::utils::{gwei_to_wei, mul_decimal_floor};

/// Gas limit used for a plain transfer when estimation fails
pub const FALLBACK_TRANSFER_GAS: u64 = 21_000;

/// Tunables for the submission pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Fraction added to both gas limit and gas price
    pub gas_safety_margin: Decimal,
    pub fallback_gas_price: u128,
    pub fallback_contract_gas: u64,
    /// Receipt wait for approvals that gate a swap
    pub approval_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            gas_safety_margin: Decimal::new(2, 1),
            fallback_gas_price: gwei_to_wei(30),
            fallback_contract_gas: 200_000,
            approval_timeout: Duration::from_secs(180),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            gas_safety_margin: config.gas_safety_margin,
            fallback_gas_price: gwei_to_wei(config.fallback_gas_price_gwei),
            fallback_contract_gas: config.fallback_contract_gas,
            approval_timeout: Duration::from_secs(config.receipt_timeout_seconds),
        }
    }
}

/// Turns intents into signed, broadcast transactions.
///
/// Each attempt walks Quoted -> GasEstimated -> Signed -> Submitted and, when
/// asked to wait, on to Confirmed, Reverted or TimedOut. Nonces are read from
/// the node right before signing.
pub struct TransactionBuilder {
    gateway: Arc<dyn ChainGateway>,
    fees: Arc<dyn FeeRateResolver>,
    native: TokenInfo,
    settings: PipelineSettings,
}

impl TransactionBuilder {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        fees: Arc<dyn FeeRateResolver>,
        native: TokenInfo,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            gateway,
            fees,
            native,
            settings,
        }
    }

    /// Build, sign and broadcast the transaction(s) for `intent`
    pub async fn build_and_submit(
        &self,
        intent: &TransactionIntent,
        opts: SubmitOptions,
    ) -> Result<SubmissionResult> {
        let sender = intent.sender();
        info!(
            "Submitting {:?} of {} {} for user {}",
            intent.kind(),
            intent.amount(),
            intent.asset().display_symbol(),
            sender.user_id
        );

        match intent.kind() {
            IntentKind::NativeTransfer => {
                let call = PreparedCall::native_transfer(intent.target(), intent.amount_units());
                self.submit_call(sender, &call, intent.amount_units(), FALLBACK_TRANSFER_GAS, opts)
                    .await
            }
            IntentKind::TokenTransfer => {
                self.ensure_token_balance(intent).await?;
                let call = PreparedCall::token_transfer(
                    intent.asset().path_address(),
                    intent.target(),
                    intent.amount_units(),
                );
                self.submit_call(sender, &call, U256::ZERO, self.settings.fallback_contract_gas, opts)
                    .await
            }
            IntentKind::Approval => {
                let call = PreparedCall::contract_call(
                    intent.asset().path_address(),
                    U256::ZERO,
                    approve_calldata(intent.target(), intent.amount_units()),
                );
                self.submit_call(sender, &call, U256::ZERO, self.settings.fallback_contract_gas, opts)
                    .await
            }
            IntentKind::SwapNativeForToken => self.swap_native_for_token(intent, opts).await,
            IntentKind::SwapTokenForNative => self.swap_token_for_native(intent, opts).await,
        }
    }

    async fn swap_native_for_token(
        &self,
        intent: &TransactionIntent,
        opts: SubmitOptions,
    ) -> Result<SubmissionResult> {
        let sender = intent.sender();
        let amount_in = intent.amount_units();

        let min_output = self.quote_min_output(intent).await?;
        let rate = self.fees.fee_rate(sender.address).await;
        let fee = mul_decimal_floor(amount_in, rate);
        let deadline = self.deadline(intent).await;

        let call = PreparedCall::contract_call(
            intent.target(),
            amount_in,
            swap_native_for_tokens_calldata(min_output, intent.path(), sender.address, deadline),
        );
        let result = self
            .submit_call(
                sender,
                &call,
                amount_in.saturating_add(fee),
                self.settings.fallback_contract_gas,
                opts,
            )
            .await?;
        Ok(result.with_swap_details(min_output, fee))
    }

    async fn swap_token_for_native(
        &self,
        intent: &TransactionIntent,
        opts: SubmitOptions,
    ) -> Result<SubmissionResult> {
        let sender = intent.sender();
        self.ensure_token_balance(intent).await?;

        // The swap is only quoted and estimated once the allowance is on chain
        let approval_tx = self.ensure_allowance(intent).await?;
        let swapped = self.submit_token_swap(intent, opts).await;
        match approval_tx {
            None => swapped,
            Some(hash) => swapped.map(|result| result.with_approval(hash)).map_err(|e| {
                warn!("Approval {} confirmed but the swap failed: {}", hash, e);
                Error::SwapAfterApproval {
                    approval_tx: hash,
                    source: Box::new(e),
                }
            }),
        }
    }

    async fn submit_token_swap(
        &self,
        intent: &TransactionIntent,
        opts: SubmitOptions,
    ) -> Result<SubmissionResult> {
        let sender = intent.sender();
        let min_output = self.quote_min_output(intent).await?;
        let deadline = self.deadline(intent).await;
        let call = PreparedCall::contract_call(
            intent.target(),
            U256::ZERO,
            swap_tokens_for_native_calldata(
                intent.amount_units(),
                min_output,
                intent.path(),
                sender.address,
                deadline,
            ),
        );
        let result = self
            .submit_call(sender, &call, U256::ZERO, self.settings.fallback_contract_gas, opts)
            .await?;
        Ok(result.with_swap_details(min_output, U256::ZERO))
    }

    /// floor(quoted * (1 - slippage)); zero is rejected
    async fn quote_min_output(&self, intent: &TransactionIntent) -> Result<U256> {
        let amounts = self
            .gateway
            .amounts_out(intent.target(), intent.amount_units(), intent.path())
            .await?;
        let quoted = amounts
            .last()
            .copied()
            .ok_or_else(|| Error::ChainRpc("router returned no amounts".to_string()))?;
        let min_output = mul_decimal_floor(quoted, Decimal::ONE - intent.slippage());
        if min_output.is_zero() {
            return Err(Error::UserInput(format!(
                "Amount {} is too small to swap: the minimum output after slippage is zero",
                intent.amount()
            )));
        }
        Ok(min_output)
    }

    /// Latest block timestamp plus the intent's offset, wall clock if the node can't say
    async fn deadline(&self, intent: &TransactionIntent) -> U256 {
        let now = match self.gateway.latest_block_timestamp().await {
            Ok(ts) => ts,
            Err(e) => {
                warn!("Block timestamp unavailable ({}), using local clock for deadline", e);
                chrono::Utc::now().timestamp().max(0) as u64
            }
        };
        U256::from(now.saturating_add(intent.deadline_offset_secs()))
    }

    async fn ensure_token_balance(&self, intent: &TransactionIntent) -> Result<()> {
        let token = intent.asset();
        let available = self
            .gateway
            .token_balance(token.path_address(), intent.sender().address)
            .await?;
        if available < intent.amount_units() {
            info!(
                "User {} has {} {} units, needs {}",
                intent.sender().user_id,
                available,
                token.display_symbol(),
                intent.amount_units()
            );
            return Err(Error::InsufficientFunds {
                asset: token.display_symbol(),
                decimals: token.decimals(),
                required: intent.amount_units(),
                available,
            });
        }
        Ok(())
    }

    /// Approve the router for the maximum amount if the current allowance is short.
    /// Returns the approval hash only when one was sent and confirmed.
    async fn ensure_allowance(&self, intent: &TransactionIntent) -> Result<Option<TxHash>> {
        let sender = intent.sender();
        let token = intent.asset();
        let spender = intent.target();
        let current = self
            .gateway
            .allowance(token.path_address(), sender.address, spender)
            .await?;
        if current >= intent.amount_units() {
            return Ok(None);
        }

        info!(
            "Allowance of {} for {} is {}, approving router",
            token.display_symbol(),
            sender.user_id,
            current
        );
        let approval = TransactionIntent::approval(sender.clone(), token.clone(), spender, U256::MAX)?;
        let call = PreparedCall::contract_call(
            token.path_address(),
            U256::ZERO,
            approve_calldata(approval.target(), approval.amount_units()),
        );
        let result = self
            .submit_call(
                sender,
                &call,
                U256::ZERO,
                self.settings.fallback_contract_gas,
                SubmitOptions::wait(self.settings.approval_timeout),
            )
            .await?;

        let tx_hash = result
            .tx_hash()
            .ok_or_else(|| Error::Submission("approval was not broadcast".to_string()))?;
        match result.status() {
            SubmissionStatus::Confirmed => Ok(Some(tx_hash)),
            status => {
                warn!("Approval {} did not confirm: {}", tx_hash, status);
                Err(Error::ApprovalNotConfirmed {
                    tx_hash,
                    status: status.clone(),
                })
            }
        }
    }

    fn with_margin(&self, value: u128) -> u128 {
        let padded = mul_decimal_floor(U256::from(value), Decimal::ONE + self.settings.gas_safety_margin);
        u128::try_from(padded).unwrap_or(u128::MAX)
    }

    /// Estimate, guard, sign and broadcast one call
    async fn submit_call(
        &self,
        sender: &Wallet,
        call: &PreparedCall,
        native_required: U256,
        fallback_gas: u64,
        opts: SubmitOptions,
    ) -> Result<SubmissionResult> {
        // GasEstimated
        let request = call.to_request(sender.address);
        let gas_limit = self.gateway.estimate_gas_or(&request, fallback_gas).await;
        let gas_price = self
            .gateway
            .gas_price_or(self.settings.fallback_gas_price)
            .await;
        let nonce = self.gateway.nonce(sender.address).await?;
        let plan = GasPlan {
            gas_limit: u64::try_from(self.with_margin(gas_limit as u128)).unwrap_or(u64::MAX),
            gas_price: self.with_margin(gas_price),
            nonce,
        };

        let required = native_required.saturating_add(plan.max_fee());
        let available = self.gateway.native_balance(sender.address).await?;
        if available < required {
            info!(
                "User {} has {} wei, needs {} including gas",
                sender.user_id, available, required
            );
            return Err(Error::InsufficientFunds {
                asset: self.native.display_symbol(),
                decimals: self.native.decimals,
                required,
                available,
            });
        }

        // Signed
        let signer = TxSigner::from_wallet(sender, self.gateway.chain_id())?;
        let signed = signer.sign(call, &plan)?;

        // Submitted
        let tx_hash = self.gateway.submit_raw(&signed.raw).await.map_err(|e| {
            error!("Broadcast for user {} failed: {}", sender.user_id, e);
            e
        })?;
        info!(
            "Broadcast {} (nonce {}, gas {} @ {} wei)",
            tx_hash, plan.nonce, plan.gas_limit, plan.gas_price
        );
        let mut result = SubmissionResult::submitted(tx_hash, plan);

        if opts.wait_for_receipt {
            let outcome = self.gateway.wait_for_receipt(tx_hash, opts.timeout).await;
            info!("Transaction {} finished waiting: {:?}", tx_hash, outcome);
            result.apply_receipt(outcome);
        }

        Ok(result)
    }
}
