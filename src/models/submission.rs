use alloy::primitives::{TxHash, U256};
use std::fmt;
use std::time::Duration;

/// Gas parameters and nonce chosen for one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPlan {
    pub gas_limit: u64,
    pub gas_price: u128,
    pub nonce: u64,
}

impl GasPlan {
    /// Upper bound on the native coin this transaction can burn in gas
    pub fn max_fee(&self) -> U256 {
        U256::from(self.gas_limit) * U256::from(self.gas_price)
    }
}

/// Result of waiting for a receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptOutcome {
    Confirmed,
    Reverted,
    TimedOut,
}

/// Lifecycle status of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionStatus {
    /// Broadcast accepted, no receipt observed yet
    Pending,
    Confirmed,
    Reverted,
    /// Broadcast accepted but no receipt inside the wait window; outcome unknown
    TimedOut,
    /// Sent to the node but never acknowledged; it may or may not be on chain
    Unknown,
    /// Never broadcast
    Failed(String),
}

impl SubmissionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmissionStatus::Confirmed | SubmissionStatus::Reverted | SubmissionStatus::Failed(_)
        )
    }

    /// True when the transaction may still land on chain
    pub fn is_outcome_unknown(&self) -> bool {
        matches!(
            self,
            SubmissionStatus::Pending | SubmissionStatus::TimedOut | SubmissionStatus::Unknown
        )
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionStatus::Pending => write!(f, "pending"),
            SubmissionStatus::Confirmed => write!(f, "confirmed"),
            SubmissionStatus::Reverted => write!(f, "reverted"),
            SubmissionStatus::TimedOut => write!(f, "timed out"),
            SubmissionStatus::Unknown => write!(f, "unknown"),
            SubmissionStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

impl From<ReceiptOutcome> for SubmissionStatus {
    fn from(outcome: ReceiptOutcome) -> Self {
        match outcome {
            ReceiptOutcome::Confirmed => SubmissionStatus::Confirmed,
            ReceiptOutcome::Reverted => SubmissionStatus::Reverted,
            ReceiptOutcome::TimedOut => SubmissionStatus::TimedOut,
        }
    }
}

/// Whether to block on the receipt after broadcasting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOptions {
    pub wait_for_receipt: bool,
    pub timeout: Duration,
}

impl SubmitOptions {
    /// Return as soon as the node accepts the transaction
    pub fn fire_and_forget() -> Self {
        Self {
            wait_for_receipt: false,
            timeout: Duration::ZERO,
        }
    }

    pub fn wait(timeout: Duration) -> Self {
        Self {
            wait_for_receipt: true,
            timeout,
        }
    }
}

/// What came out of the submission pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionResult {
    tx_hash: Option<TxHash>,
    status: SubmissionStatus,
    gas_plan: Option<GasPlan>,
    approval_tx: Option<TxHash>,
    min_output: Option<U256>,
    fee: U256,
}

impl SubmissionResult {
    pub fn submitted(tx_hash: TxHash, gas_plan: GasPlan) -> Self {
        Self {
            tx_hash: Some(tx_hash),
            status: SubmissionStatus::Pending,
            gas_plan: Some(gas_plan),
            approval_tx: None,
            min_output: None,
            fee: U256::ZERO,
        }
    }

    /// A broadcast the node never answered. `tx_hash` is the locally computed hash.
    pub fn unacknowledged(tx_hash: TxHash, gas_plan: GasPlan) -> Self {
        Self {
            tx_hash: Some(tx_hash),
            status: SubmissionStatus::Unknown,
            gas_plan: Some(gas_plan),
            approval_tx: None,
            min_output: None,
            fee: U256::ZERO,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            tx_hash: None,
            status: SubmissionStatus::Failed(reason.into()),
            gas_plan: None,
            approval_tx: None,
            min_output: None,
            fee: U256::ZERO,
        }
    }

    pub fn with_approval(mut self, approval_tx: TxHash) -> Self {
        self.approval_tx = Some(approval_tx);
        self
    }

    pub fn with_swap_details(mut self, min_output: U256, fee: U256) -> Self {
        self.min_output = Some(min_output);
        self.fee = fee;
        self
    }

    /// Record a receipt. Terminal states are never overwritten.
    pub fn apply_receipt(&mut self, outcome: ReceiptOutcome) {
        if self.status.is_terminal() {
            return;
        }
        self.status = outcome.into();
    }

    pub fn tx_hash(&self) -> Option<TxHash> {
        self.tx_hash
    }

    pub fn status(&self) -> &SubmissionStatus {
        &self.status
    }

    pub fn gas_plan(&self) -> Option<&GasPlan> {
        self.gas_plan.as_ref()
    }

    pub fn approval_tx(&self) -> Option<TxHash> {
        self.approval_tx
    }

    /// Minimum router output accepted, for swaps
    pub fn min_output(&self) -> Option<U256> {
        self.min_output
    }

    /// Fee computed from the sender's fee tier, in native smallest units
    pub fn fee(&self) -> U256 {
        self.fee
    }

    /// Broadcast accepted by the node (whatever happened afterwards)
    pub fn was_broadcast(&self) -> bool {
        self.tx_hash.is_some() && self.status != SubmissionStatus::Unknown
    }
}
