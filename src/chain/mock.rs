//! Scriptable in-memory chain used by unit tests.

use alloy::consensus::{Transaction, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{Address, Bytes, TxHash, TxKind, U256};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::chain::contracts::{approve_calldata, decode_transfer};
use crate::chain::gateway::ChainGateway;
use crate::error::{Error, Result};

/// How the mock answers receipt queries for a broadcast transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReceiptScript {
    Success,
    Revert,
    Never,
}

#[derive(Debug, Clone)]
pub(crate) struct SentTx {
    pub hash: TxHash,
    pub to: Address,
    /// Transfer recipient for ERC-20 transfers, otherwise `to`
    pub recipient: Address,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub value: U256,
    pub input: Bytes,
}

impl SentTx {
    pub fn is_approval(&self) -> bool {
        self.input.len() >= 4 && self.input[..4] == approve_calldata(Address::ZERO, U256::ZERO)[..4]
    }
}

pub(crate) struct MockState {
    pub native_balances: HashMap<Address, U256>,
    pub token_balances: HashMap<(Address, Address), U256>,
    pub allowances: HashMap<(Address, Address, Address), U256>,
    /// Output per unit of input for a (from, to) hop, as numerator / denominator
    pub rates: HashMap<(Address, Address), (U256, U256)>,
    pub gas_price: Option<u128>,
    pub estimate: Option<u64>,
    pub estimate_fails_for: HashSet<Address>,
    pub nonce: u64,
    pub block_timestamp: Option<u64>,
    pub receipt: ReceiptScript,
    pub approval_receipt: Option<ReceiptScript>,
    pub send_fails_for: HashSet<Address>,
    /// Transfers to these land on chain but the node never answers
    pub lost_ack_for: HashSet<Address>,
    pub rpc_down: bool,
    pub sent: Vec<SentTx>,
    pub nonce_queries: usize,
    pub quote_calls: usize,
    statuses: HashMap<TxHash, Option<bool>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            native_balances: HashMap::new(),
            token_balances: HashMap::new(),
            allowances: HashMap::new(),
            rates: HashMap::new(),
            gas_price: Some(25_000_000_000),
            estimate: Some(21_000),
            estimate_fails_for: HashSet::new(),
            nonce: 0,
            block_timestamp: Some(1_700_000_000),
            receipt: ReceiptScript::Success,
            approval_receipt: None,
            send_fails_for: HashSet::new(),
            lost_ack_for: HashSet::new(),
            rpc_down: false,
            sent: Vec::new(),
            nonce_queries: 0,
            quote_calls: 0,
            statuses: HashMap::new(),
        }
    }
}

pub(crate) struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn configure(&self, f: impl FnOnce(&mut MockState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn sent(&self) -> Vec<SentTx> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn nonce_queries(&self) -> usize {
        self.state.lock().unwrap().nonce_queries
    }

    pub fn quote_calls(&self) -> usize {
        self.state.lock().unwrap().quote_calls
    }

    fn check_up(state: &MockState) -> Result<()> {
        if state.rpc_down {
            return Err(Error::ChainRpc("mock node unreachable".to_string()));
        }
        Ok(())
    }
}

fn request_recipient(tx: &TransactionRequest) -> Option<Address> {
    let to = match tx.to {
        Some(TxKind::Call(to)) => to,
        _ => return None,
    };
    let input = tx.input.input().cloned().unwrap_or_default();
    Some(decode_transfer(&input).map(|(r, _)| r).unwrap_or(to))
}

#[async_trait]
impl ChainGateway for MockGateway {
    fn chain_id(&self) -> u64 {
        43114
    }

    async fn native_balance(&self, address: Address) -> Result<U256> {
        let state = self.state.lock().unwrap();
        Self::check_up(&state)?;
        Ok(state.native_balances.get(&address).copied().unwrap_or_default())
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256> {
        let state = self.state.lock().unwrap();
        Self::check_up(&state)?;
        Ok(state.token_balances.get(&(token, owner)).copied().unwrap_or_default())
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        let state = self.state.lock().unwrap();
        Self::check_up(&state)?;
        Ok(state
            .allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default())
    }

    async fn amounts_out(&self, _router: Address, amount_in: U256, path: &[Address]) -> Result<Vec<U256>> {
        let mut state = self.state.lock().unwrap();
        Self::check_up(&state)?;
        state.quote_calls += 1;
        let mut amounts = vec![amount_in];
        let mut current = amount_in;
        for hop in path.windows(2) {
            let (num, den) = state
                .rates
                .get(&(hop[0], hop[1]))
                .copied()
                .ok_or_else(|| Error::ChainRpc("no pair for path".to_string()))?;
            current = current * num / den;
            amounts.push(current);
        }
        Ok(amounts)
    }

    async fn gas_price(&self) -> Result<u128> {
        let state = self.state.lock().unwrap();
        state
            .gas_price
            .ok_or_else(|| Error::ChainRpc("gas price unavailable".to_string()))
    }

    async fn nonce(&self, _address: Address) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        Self::check_up(&state)?;
        state.nonce_queries += 1;
        Ok(state.nonce)
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64> {
        let state = self.state.lock().unwrap();
        if let Some(recipient) = request_recipient(tx) {
            if state.estimate_fails_for.contains(&recipient) {
                return Err(Error::ChainRpc("execution reverted".to_string()));
            }
        }
        state
            .estimate
            .ok_or_else(|| Error::ChainRpc("estimation unavailable".to_string()))
    }

    async fn latest_block_timestamp(&self) -> Result<u64> {
        let state = self.state.lock().unwrap();
        state
            .block_timestamp
            .ok_or_else(|| Error::ChainRpc("no block".to_string()))
    }

    async fn submit_raw(&self, raw: &[u8]) -> Result<TxHash> {
        let envelope = TxEnvelope::decode_2718(&mut &raw[..])
            .map_err(|e| Error::Submission(format!("undecodable tx: {}", e)))?;
        let to = envelope
            .to()
            .ok_or_else(|| Error::Submission("contract creation".to_string()))?;
        let input = envelope.input().clone();
        let recipient = decode_transfer(&input).map(|(r, _)| r).unwrap_or(to);
        let sent = SentTx {
            hash: *envelope.tx_hash(),
            to,
            recipient,
            nonce: envelope.nonce(),
            gas_limit: envelope.gas_limit(),
            gas_price: envelope.gas_price().unwrap_or_default(),
            value: envelope.value(),
            input,
        };

        let mut state = self.state.lock().unwrap();
        if state.rpc_down || state.send_fails_for.contains(&recipient) {
            return Err(Error::Submission("mock node rejected transaction".to_string()));
        }
        let script = if sent.is_approval() {
            state.approval_receipt.unwrap_or(state.receipt)
        } else {
            state.receipt
        };
        let status = match script {
            ReceiptScript::Success => Some(true),
            ReceiptScript::Revert => Some(false),
            ReceiptScript::Never => None,
        };
        state.statuses.insert(sent.hash, status);
        let hash = sent.hash;
        state.nonce = state.nonce.max(sent.nonce + 1);
        state.sent.push(sent);
        if state.lost_ack_for.contains(&recipient) {
            return Err(Error::BroadcastUnknown {
                tx_hash: hash,
                reason: "mock node dropped the connection".to_string(),
            });
        }
        Ok(hash)
    }

    async fn receipt_status(&self, tx_hash: TxHash) -> Result<Option<bool>> {
        let state = self.state.lock().unwrap();
        Ok(state.statuses.get(&tx_hash).copied().flatten())
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReceiptOutcome;

    #[tokio::test]
    async fn test_wait_for_receipt_times_out_when_never_mined() {
        let mock = MockGateway::new();
        mock.configure(|s| {
            s.statuses.insert(TxHash::repeat_byte(1), None);
        });
        let outcome = mock
            .wait_for_receipt(TxHash::repeat_byte(1), Duration::from_millis(20))
            .await;
        assert_eq!(outcome, ReceiptOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_wait_for_receipt_reports_revert() {
        let mock = MockGateway::new();
        mock.configure(|s| {
            s.statuses.insert(TxHash::repeat_byte(2), Some(false));
        });
        let outcome = mock
            .wait_for_receipt(TxHash::repeat_byte(2), Duration::from_secs(1))
            .await;
        assert_eq!(outcome, ReceiptOutcome::Reverted);
    }

    #[tokio::test]
    async fn test_soft_fallbacks() {
        let mock = MockGateway::new();
        mock.configure(|s| {
            s.gas_price = None;
            s.estimate = None;
        });
        assert_eq!(mock.gas_price_or(7).await, 7);
        assert_eq!(
            mock.estimate_gas_or(&TransactionRequest::default(), 200_000).await,
            200_000
        );
    }
}
