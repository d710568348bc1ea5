use alloy::primitives::{Address, TxHash};
use rust_decimal::{Decimal, RoundingStrategy};

/// Format an address for display (shortened)
pub fn format_address(address: &Address) -> String {
    let checksum = address.to_checksum(None);
    let len = checksum.len();
    format!("{}...{}", &checksum[0..6], &checksum[len - 4..len])
}

/// Format an amount with a fixed number of decimal places, truncating toward zero
pub fn format_amount(amount: Decimal, decimal_places: u32) -> String {
    let truncated = amount.round_dp_with_strategy(decimal_places, RoundingStrategy::ToZero);
    format!("{:.*}", decimal_places as usize, truncated)
}

/// Block explorer link for a transaction
pub fn explorer_tx_url(explorer_base: &str, tx_hash: &TxHash) -> String {
    format!("{}/tx/{}", explorer_base.trim_end_matches('/'), tx_hash)
}
