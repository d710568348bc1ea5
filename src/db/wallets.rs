use alloy::primitives::Address;
use log::info;
use sqlx::sqlite::SqlitePool;
use std::str::FromStr;

use crate::chain::generate_keypair;
use crate::error::{Error, Result};
use crate::models::Wallet;

/// Durable user -> wallet mapping. One wallet per user, never rotated.
#[derive(Clone)]
pub struct WalletStore {
    pool: SqlitePool,
}

fn wallet_from_row(user_id: &str, address: &str, private_key: String) -> Result<Wallet> {
    let address = Address::from_str(address).map_err(|e| {
        Error::CorruptRecord(format!("wallet of user {} has bad address {}: {}", user_id, address, e))
    })?;
    Ok(Wallet::new(user_id, address, private_key))
}

impl WalletStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Look up a user's wallet
    pub async fn get(&self, user_id: &str) -> Result<Option<Wallet>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT address, private_key FROM wallets WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(address, key)| wallet_from_row(user_id, &address, key))
            .transpose()
    }

    /// Like `get`, but a missing wallet is an error
    pub async fn require(&self, user_id: &str) -> Result<Wallet> {
        self.get(user_id)
            .await?
            .ok_or_else(|| Error::WalletNotFound(user_id.to_string()))
    }

    /// Generate and store a new wallet.
    ///
    /// A single INSERT guarded by the primary key, so two racing calls for the
    /// same user leave exactly one wallet and the loser gets `WalletExists`.
    pub async fn create(&self, user_id: &str) -> Result<Wallet> {
        let (address, private_key) = generate_keypair();

        let inserted = sqlx::query("INSERT INTO wallets (user_id, address, private_key) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(address.to_checksum(None))
            .bind(&private_key)
            .execute(&self.pool)
            .await;

        match inserted {
            Ok(_) => {
                info!("Created wallet {} for user {}", address, user_id);
                Ok(Wallet::new(user_id, address, private_key))
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(Error::WalletExists(user_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Existing wallet, or a new one. The flag is true when the wallet was just created.
    pub async fn get_or_create(&self, user_id: &str) -> Result<(Wallet, bool)> {
        if let Some(wallet) = self.get(user_id).await? {
            return Ok((wallet, false));
        }
        match self.create(user_id).await {
            Ok(wallet) => Ok((wallet, true)),
            Err(Error::WalletExists(_)) => Ok((self.require(user_id).await?, false)),
            Err(e) => Err(e),
        }
    }

    /// Idempotent upsert of address and key together, used by migrations
    pub async fn save(&self, user_id: &str, address: Address, private_key: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO wallets (user_id, address, private_key) VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                address = excluded.address,
                private_key = excluded.private_key",
        )
        .bind(user_id)
        .bind(address.to_checksum(None))
        .bind(private_key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM wallets")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::signer::parse_private_key;
    use crate::db::init_test_db;

    #[tokio::test]
    async fn test_create_then_get() {
        let store = init_test_db().await.unwrap().wallets();
        assert!(store.get("alice").await.unwrap().is_none());

        let created = store.create("alice").await.unwrap();
        let loaded = store.get("alice").await.unwrap().unwrap();
        assert_eq!(created, loaded);
        // The stored key derives the stored address
        assert_eq!(parse_private_key(loaded.private_key()).unwrap().address(), loaded.address);
    }

    #[tokio::test]
    async fn test_second_create_is_rejected() {
        let store = init_test_db().await.unwrap().wallets();
        let first = store.create("bob").await.unwrap();
        assert!(matches!(store.create("bob").await, Err(Error::WalletExists(_))));
        assert_eq!(store.require("bob").await.unwrap().address, first.address);
    }

    #[tokio::test]
    async fn test_concurrent_creates_leave_one_wallet() {
        let store = init_test_db().await.unwrap().wallets();
        let (a, b) = tokio::join!(store.create("carol"), store.create("carol"));
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        let winner = a.or(b).unwrap();
        assert_eq!(store.require("carol").await.unwrap(), winner);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_existing() {
        let store = init_test_db().await.unwrap().wallets();
        let (first, created) = store.get_or_create("dave").await.unwrap();
        assert!(created);
        let (second, created) = store.get_or_create("dave").await.unwrap();
        assert!(!created);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_save_is_idempotent_upsert() {
        let store = init_test_db().await.unwrap().wallets();
        let (address, key) = generate_keypair();
        store.save("erin", address, &key).await.unwrap();
        store.save("erin", address, &key).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.require("erin").await.unwrap().private_key(), key);
    }

    #[tokio::test]
    async fn test_require_missing_wallet() {
        let store = init_test_db().await.unwrap().wallets();
        assert!(matches!(
            store.require("nobody").await,
            Err(Error::WalletNotFound(id)) if id == "nobody"
        ));
    }
}
