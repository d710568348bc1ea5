use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash, TxKind, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;

use crate::chain::contracts::transfer_calldata;
use crate::error::{Error, Result};
use crate::models::{Asset, GasPlan, Wallet};

/// A fresh key pair: checksum-capable address and 0x-prefixed hex secret
pub fn generate_keypair() -> (Address, String) {
    let signer = PrivateKeySigner::random();
    let key = format!("0x{}", hex::encode(signer.to_bytes()));
    (signer.address(), key)
}

/// Parse a hex secret key, with or without the 0x prefix
pub fn parse_private_key(key: &str) -> Result<PrivateKeySigner> {
    let trimmed = key.trim();
    let hex_key = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(hex_key)
        .map_err(|e| Error::Submission(format!("private key is not valid hex: {}", e)))?;
    PrivateKeySigner::from_slice(&bytes)
        .map_err(|e| Error::Submission(format!("invalid private key: {}", e)))
}

/// Destination, value and calldata of a transaction, before gas and nonce are chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCall {
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
}

impl PreparedCall {
    pub fn native_transfer(to: Address, value: U256) -> Self {
        Self {
            to,
            value,
            input: Bytes::new(),
        }
    }

    pub fn token_transfer(token: Address, to: Address, amount: U256) -> Self {
        Self {
            to: token,
            value: U256::ZERO,
            input: transfer_calldata(to, amount),
        }
    }

    pub fn contract_call(contract: Address, value: U256, input: Bytes) -> Self {
        Self {
            to: contract,
            value,
            input,
        }
    }

    /// Plain transfer of `asset` to `to`
    pub fn transfer(asset: &Asset, to: Address, amount: U256) -> Self {
        match asset {
            Asset::Native(_) => Self::native_transfer(to, amount),
            Asset::Erc20(info) => Self::token_transfer(info.contract, to, amount),
        }
    }

    /// Request shape used for gas estimation
    pub fn to_request(&self, from: Address) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(from)
            .with_to(self.to)
            .with_value(self.value)
            .with_input(self.input.clone())
    }
}

/// Raw signed bytes plus the hash they will be known by
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub raw: Vec<u8>,
    pub hash: TxHash,
}

/// Signs legacy transactions for one wallet on one chain
pub struct TxSigner {
    signer: PrivateKeySigner,
    chain_id: u64,
}

impl TxSigner {
    /// Load the wallet's key. Fails if the key does not derive the stored address.
    pub fn from_wallet(wallet: &Wallet, chain_id: u64) -> Result<Self> {
        let signer = parse_private_key(wallet.private_key())?;
        if signer.address() != wallet.address {
            return Err(Error::Submission(format!(
                "stored key for user {} does not match address {}",
                wallet.user_id,
                wallet.checksum_address()
            )));
        }
        Ok(Self { signer, chain_id })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn sign(&self, call: &PreparedCall, plan: &GasPlan) -> Result<SignedTransaction> {
        let tx = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce: plan.nonce,
            gas_price: plan.gas_price,
            gas_limit: plan.gas_limit,
            to: TxKind::Call(call.to),
            value: call.value,
            input: call.input.clone(),
        };
        let signature = self
            .signer
            .sign_hash_sync(&tx.signature_hash())
            .map_err(|e| Error::Submission(format!("signing failed: {}", e)))?;
        let signed = tx.into_signed(signature);
        let hash = *signed.hash();
        let raw = TxEnvelope::Legacy(signed).encoded_2718();
        Ok(SignedTransaction { raw, hash })
    }
}
