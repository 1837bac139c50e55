//! Wallet address validation and token unit helpers.
//!
//! Addresses are stored lowercased everywhere — the ledger treats
//! `0xAbC…` and `0xabc…` as the same wallet.

use once_cell::sync::Lazy;
use regex::Regex;

static ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("valid address regex"));

/// Number of decimals on the CGC token contract.
pub const CGC_DECIMALS: u32 = 18;

/// Returns `true` if `s` looks like a 20-byte hex address.
pub fn is_address(s: &str) -> bool {
    ADDRESS_RE.is_match(s)
}

/// Validate and lowercase a wallet address.
pub fn normalize(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if is_address(trimmed) {
        Some(trimmed.to_ascii_lowercase())
    } else {
        None
    }
}

/// Format a wei-denominated balance as a whole-token float.
///
/// Precision past f64 is irrelevant here — the value is display/ledger
/// bookkeeping, not a payout amount.
pub fn format_units(wei: u128) -> f64 {
    wei as f64 / 10f64.powi(CGC_DECIMALS as i32)
}
