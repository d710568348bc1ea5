mod types;

pub use types::load_config;
pub use types::load_token_registry;
pub use types::Config;
