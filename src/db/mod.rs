mod activity;
mod sqlite;
mod wallets;

pub use activity::ActiveUser;
pub use activity::ActivityLog;
pub use sqlite::Database;
pub use wallets::WalletStore;

#[cfg(test)]
pub use sqlite::init_test_db;
