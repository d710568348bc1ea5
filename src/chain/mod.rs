pub mod contracts;
pub mod gateway;
pub mod rpc;
pub mod signer;

#[cfg(test)]
pub(crate) mod mock;

pub use gateway::ChainGateway;
pub use rpc::RpcGateway;
pub use signer::generate_keypair;
pub use signer::PreparedCall;
pub use signer::TxSigner;

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;

/// Create the RPC gateway from the application configuration
pub fn create_gateway_from_config(config: &Config) -> Result<Arc<RpcGateway>> {
    Ok(Arc::new(RpcGateway::new(&config.rpc_url, config.chain_id)?))
}
