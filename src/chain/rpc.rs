use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{keccak256, Address, TxHash, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::client::RpcClient;
use alloy::rpc::types::TransactionRequest;
use alloy::transports::http::Http;
use alloy::transports::{RpcError, TransportError};
use async_trait::async_trait;
use log::{debug, info};
use std::time::Duration;

use crate::chain::contracts::{IJoeRouter, IERC20};
use crate::chain::gateway::ChainGateway;
use crate::error::{Error, Result};

const RPC_TIMEOUT: Duration = Duration::from_secs(20);
const RPC_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn rpc_err(context: &'static str) -> impl Fn(alloy::contract::Error) -> Error {
    move |e| Error::ChainRpc(format!("{}: {}", context, e))
}

fn transport_err<E: std::fmt::Display>(context: &'static str) -> impl Fn(E) -> Error {
    move |e| Error::ChainRpc(format!("{}: {}", context, e))
}

/// Sort a failed `eth_sendRawTransaction`.
///
/// An error response from the node, or a request that could not even be
/// serialized, means nothing was accepted. Any other failure may have
/// happened after the node took the transaction.
fn classify_send_error(e: TransportError, tx_hash: TxHash) -> Error {
    match &e {
        RpcError::ErrorResp(_) | RpcError::SerError(_) => {
            Error::Submission(format!("broadcast rejected: {}", e))
        }
        _ => Error::BroadcastUnknown {
            tx_hash,
            reason: e.to_string(),
        },
    }
}

/// JSON-RPC gateway to an EVM node over HTTP
pub struct RpcGateway {
    provider: RootProvider,
    chain_id: u64,
    rpc_url: String,
}

impl RpcGateway {
    /// Create a gateway for the given RPC URL. No request is made until first use.
    pub fn new(rpc_url: &str, chain_id: u64) -> Result<Self> {
        let url: reqwest::Url = rpc_url
            .parse()
            .map_err(|e| Error::ChainRpc(format!("invalid RPC url {}: {}", rpc_url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(RPC_TIMEOUT)
            .connect_timeout(RPC_CONNECT_TIMEOUT)
            .build()
            .map_err(transport_err("build RPC http client"))?;
        let http = Http::with_client(client, url);
        let provider = RootProvider::new(RpcClient::new(http, false));

        Ok(Self {
            provider,
            chain_id,
            rpc_url: rpc_url.to_string(),
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Ask the node for its chain id and compare with the configured one
    pub async fn verify_chain_id(&self) -> Result<bool> {
        let remote = self
            .provider
            .get_chain_id()
            .await
            .map_err(transport_err("get chain id"))?;
        info!("Connected to {} (chain id {})", self.rpc_url, remote);
        Ok(remote == self.chain_id)
    }
}

#[async_trait]
impl ChainGateway for RpcGateway {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn native_balance(&self, address: Address) -> Result<U256> {
        self.provider
            .get_balance(address)
            .await
            .map_err(transport_err("get balance"))
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256> {
        IERC20::new(token, &self.provider)
            .balanceOf(owner)
            .call()
            .await
            .map_err(rpc_err("erc20 balanceOf"))
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        IERC20::new(token, &self.provider)
            .allowance(owner, spender)
            .call()
            .await
            .map_err(rpc_err("erc20 allowance"))
    }

    async fn amounts_out(&self, router: Address, amount_in: U256, path: &[Address]) -> Result<Vec<U256>> {
        debug!("Quoting {} along {:?}", amount_in, path);
        IJoeRouter::new(router, &self.provider)
            .getAmountsOut(amount_in, path.to_vec())
            .call()
            .await
            .map_err(rpc_err("router getAmountsOut"))
    }

    async fn gas_price(&self) -> Result<u128> {
        self.provider
            .get_gas_price()
            .await
            .map_err(transport_err("get gas price"))
    }

    async fn nonce(&self, address: Address) -> Result<u64> {
        self.provider
            .get_transaction_count(address)
            .pending()
            .await
            .map_err(transport_err("get transaction count"))
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64> {
        self.provider
            .estimate_gas(tx.clone())
            .await
            .map_err(transport_err("estimate gas"))
    }

    async fn latest_block_timestamp(&self) -> Result<u64> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await
            .map_err(transport_err("get latest block"))?
            .ok_or_else(|| Error::ChainRpc("latest block not available".to_string()))?;
        Ok(block.header.timestamp)
    }

    async fn submit_raw(&self, raw: &[u8]) -> Result<TxHash> {
        // Hash of the EIP-2718 bytes, known before the node answers
        let tx_hash = keccak256(raw);
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| classify_send_error(e, tx_hash))?;
        Ok(*pending.tx_hash())
    }

    async fn receipt_status(&self, tx_hash: TxHash) -> Result<Option<bool>> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(transport_err("get transaction receipt"))?;
        Ok(receipt.map(|r| r.status()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::rpc::json_rpc::ErrorPayload;
    use alloy::transports::TransportErrorKind;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_rejects_malformed_url() {
        assert!(matches!(
            RpcGateway::new("not a url", 43114),
            Err(Error::ChainRpc(_))
        ));
    }

    #[test]
    fn test_builds_without_network() {
        let gateway = RpcGateway::new("https://api.avax.network/ext/bc/C/rpc", 43114).unwrap();
        assert_eq!(gateway.chain_id(), 43114);
        assert_eq!(gateway.rpc_url(), "https://api.avax.network/ext/bc/C/rpc");
    }

    #[test]
    fn test_node_error_response_is_a_rejection() {
        let payload = ErrorPayload {
            code: -32000,
            message: "nonce too low".into(),
            data: None,
        };
        let err = classify_send_error(RpcError::ErrorResp(payload), TxHash::repeat_byte(1));
        assert!(matches!(err, Error::Submission(_)));
        assert!(err.is_safe_to_retry());
    }

    #[test]
    fn test_transport_failure_is_unknown_outcome() {
        let hash = TxHash::repeat_byte(2);
        let err = classify_send_error(TransportErrorKind::custom_str("connection reset"), hash);
        assert!(!err.is_safe_to_retry());
        match err {
            Error::BroadcastUnknown { tx_hash, .. } => assert_eq!(tx_hash, hash),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_dropped_after_request_is_unknown_outcome() {
        // A node that reads the request and hangs up without answering
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 8192];
                let _ = socket.read(&mut buf).await;
            }
        });

        let gateway = RpcGateway::new(&format!("http://{}", addr), 43114).unwrap();
        let raw = [0xf8u8, 0x6c, 0x01, 0x02];
        let err = gateway.submit_raw(&raw).await.unwrap_err();

        assert!(!err.is_safe_to_retry());
        assert!(err.user_message().contains("may have been broadcast"));
        match err {
            Error::BroadcastUnknown { tx_hash, .. } => assert_eq!(tx_hash, keccak256(raw)),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
