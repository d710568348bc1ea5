mod convert;
mod format;

pub use convert::from_base_units;
pub use convert::gwei_to_wei;
pub use convert::mul_decimal_floor;
pub use convert::to_base_units;
pub use format::explorer_tx_url;
pub use format::format_address;
pub use format::format_amount;
