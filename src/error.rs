use alloy::primitives::{TxHash, U256};
use thiserror::Error;

use crate::models::SubmissionStatus;
use crate::utils::{format_amount, from_base_units};

/// Errors produced by the wallet store and the transaction pipeline
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    UserInput(String),

    #[error("Unsupported or unknown token: {0}")]
    UnknownToken(String),

    #[error("No wallet on record for user {0}")]
    WalletNotFound(String),

    #[error("A wallet already exists for user {0}")]
    WalletExists(String),

    #[error("Insufficient {asset} balance: required {required}, available {available}")]
    InsufficientFunds {
        asset: String,
        decimals: u8,
        required: U256,
        available: U256,
    },

    #[error("Chain RPC error: {0}")]
    ChainRpc(String),

    #[error("Price feed error: {0}")]
    PriceFeed(String),

    /// The node answered with a rejection; nothing is on its way
    #[error("Submission failed: {0}")]
    Submission(String),

    /// The request may have reached the node but no answer came back
    #[error("Broadcast of {tx_hash} has unknown outcome: {reason}")]
    BroadcastUnknown { tx_hash: TxHash, reason: String },

    #[error("Approval transaction {tx_hash} did not confirm ({status})")]
    ApprovalNotConfirmed {
        tx_hash: TxHash,
        status: SubmissionStatus,
    },

    #[error("Approval {approval_tx} confirmed but the swap was not sent: {source}")]
    SwapAfterApproval {
        approval_tx: TxHash,
        source: Box<Error>,
    },

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// False when a transaction may already be on its way and a blind retry could duplicate it
    pub fn is_safe_to_retry(&self) -> bool {
        match self {
            Error::BroadcastUnknown { .. } => false,
            Error::ApprovalNotConfirmed { status, .. } => !status.is_outcome_unknown(),
            Error::SwapAfterApproval { source, .. } => source.is_safe_to_retry(),
            _ => true,
        }
    }

    /// Short cause without retry advice, for composing messages
    fn reason(&self) -> String {
        match self {
            Error::UserInput(msg) => msg.trim_end_matches('.').to_string(),
            Error::InsufficientFunds {
                asset,
                decimals,
                required,
                available,
            } => format!(
                "insufficient {} balance, {} needed including fees and you have {}",
                asset,
                format_amount(from_base_units(*required, *decimals), 6),
                format_amount(from_base_units(*available, *decimals), 6),
            ),
            Error::ChainRpc(_) => "the network is not responding".to_string(),
            Error::PriceFeed(_) => "price data is unavailable".to_string(),
            Error::Submission(_) => "the network rejected the transaction".to_string(),
            _ => "something went wrong on our side".to_string(),
        }
    }

    /// Text shown to the chat user
    pub fn user_message(&self) -> String {
        match self {
            Error::UserInput(msg) => msg.clone(),
            Error::UnknownToken(token) => format!("Unsupported or unknown token: {}", token),
            Error::WalletNotFound(_) => {
                "You don't have a wallet yet. Use /getwallet to create one.".to_string()
            }
            Error::WalletExists(_) => "You already have a wallet.".to_string(),
            Error::InsufficientFunds {
                asset,
                decimals,
                required,
                available,
            } => format!(
                "Insufficient {} balance: {} needed (including fees), you have {}. Nothing was sent.",
                asset,
                format_amount(from_base_units(*required, *decimals), 6),
                format_amount(from_base_units(*available, *decimals), 6),
            ),
            Error::ChainRpc(_) => {
                "The network is not responding right now. Nothing was sent, please try again later."
                    .to_string()
            }
            Error::PriceFeed(_) => "Price data is unavailable right now.".to_string(),
            Error::Submission(_) => {
                "The transaction could not be sent. Nothing was broadcast, it is safe to try again."
                    .to_string()
            }
            Error::BroadcastUnknown { tx_hash, .. } => format!(
                "Transaction {} may have been broadcast, the network did not answer. \
                 Check the explorer before trying again.",
                tx_hash
            ),
            Error::SwapAfterApproval { approval_tx, source } => match source.as_ref() {
                Error::BroadcastUnknown { .. } => format!(
                    "Your token approval {} is confirmed on chain. {}",
                    approval_tx,
                    source.user_message()
                ),
                _ => format!(
                    "Your token approval {} is confirmed on chain, but the sale was not sent ({}). \
                     You can try /sell again, no new approval is needed.",
                    approval_tx,
                    source.reason()
                ),
            },
            Error::ApprovalNotConfirmed { tx_hash, status } => match status {
                SubmissionStatus::Reverted => format!(
                    "The token approval {} was reverted. No tokens were sold, you can try again.",
                    tx_hash
                ),
                _ => format!(
                    "The token approval {} was broadcast but is not confirmed yet. \
                     No tokens were sold. Check the explorer before trying again.",
                    tx_hash
                ),
            },
            Error::CorruptRecord(_) | Error::Storage(_) | Error::Io(_) | Error::Serialization(_) => {
                "Something went wrong on our side. Nothing was sent, please try again later."
                    .to_string()
            }
        }
    }
}
