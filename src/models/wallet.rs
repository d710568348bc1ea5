use alloy::primitives::Address;
use std::fmt;

/// A custodial wallet owned by a chat user
#[derive(Clone, PartialEq, Eq)]
pub struct Wallet {
    pub user_id: String,
    pub address: Address,
    private_key: String,
}

impl Wallet {
    pub fn new(user_id: impl Into<String>, address: Address, private_key: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            address,
            private_key: private_key.into(),
        }
    }

    /// Hex-encoded secret key. Only the signer and the reveal flow read this.
    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    pub fn checksum_address(&self) -> String {
        self.address.to_checksum(None)
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("user_id", &self.user_id)
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .finish()
    }
}
