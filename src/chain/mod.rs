//! Read-only on-chain access.
//!
//! Two reads, both plain `eth_call`s over JSON-RPC: the CGC balance of a
//! wallet (activation checks) and the owner set of a Gnosis Safe (admin
//! authorization). ABI encoding is done by hand — both call shapes are fixed,
//! a contract codegen stack would be dead weight here.

pub mod safe;

use anyhow::{anyhow, bail, Context as _, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::retry::{retry_with_backoff, RetryConfig};
use crate::wallet;

/// `balanceOf(address)` selector.
const BALANCE_OF_SELECTOR: &str = "70a08231";

/// Seam for everything that reads the chain. The JSON-RPC implementation is
/// the only production one; tests substitute a canned reader.
#[async_trait]
pub trait TokenReader: Send + Sync {
    /// CGC balance of `wallet` in wei.
    async fn balance_of(&self, wallet: &str) -> Result<u128>;

    /// Owner wallets of a Gnosis Safe, lowercased.
    async fn safe_owners(&self, safe_address: &str) -> Result<Vec<String>>;
}

// ─── JSON-RPC implementation ──────────────────────────────────────────────────

pub struct JsonRpcReader {
    client: reqwest::Client,
    rpc_url: String,
    token_address: String,
    retry: RetryConfig,
}

impl JsonRpcReader {
    pub fn new(rpc_url: impl Into<String>, token_address: impl Into<String>) -> Self {
        Self::with_retry(rpc_url, token_address, RetryConfig::default())
    }

    pub fn with_retry(
        rpc_url: impl Into<String>,
        token_address: impl Into<String>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            rpc_url: rpc_url.into(),
            token_address: token_address.into(),
            retry,
        }
    }

    /// One `eth_call` against `to` with pre-encoded calldata, retried with
    /// backoff. Returns the raw hex result string.
    async fn eth_call(&self, to: &str, data: &str) -> Result<String> {
        retry_with_backoff(&self.retry, || async {
            let body = json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "eth_call",
                "params": [{ "to": to, "data": data }, "latest"],
            });
            let response: Value = self
                .client
                .post(&self.rpc_url)
                .json(&body)
                .send()
                .await
                .context("eth_call request failed")?
                .json()
                .await
                .context("eth_call response was not JSON")?;

            if let Some(err) = response.get("error") {
                bail!("rpc error: {err}");
            }
            response
                .get("result")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| anyhow!("rpc response missing result"))
        })
        .await
    }
}

#[async_trait]
impl TokenReader for JsonRpcReader {
    async fn balance_of(&self, wallet: &str) -> Result<u128> {
        if self.token_address.is_empty() {
            debug!("no CGC token address configured — balance reads return zero");
            return Ok(0);
        }
        let data = encode_balance_of(wallet)?;
        let result = self.eth_call(&self.token_address, &data).await?;
        decode_uint(&result)
    }

    async fn safe_owners(&self, safe_address: &str) -> Result<Vec<String>> {
        let result = self
            .eth_call(safe_address, safe::GET_OWNERS_CALLDATA)
            .await?;
        safe::decode_owners(&result)
    }
}

// ─── ABI helpers ──────────────────────────────────────────────────────────────

/// Calldata for `balanceOf(address)`: selector + the address left-padded to
/// a 32-byte word.
fn encode_balance_of(wallet: &str) -> Result<String> {
    let normalized =
        wallet::normalize(wallet).ok_or_else(|| anyhow!("invalid wallet address: {wallet}"))?;
    let bare = normalized.trim_start_matches("0x");
    Ok(format!("0x{BALANCE_OF_SELECTOR}{:0>64}", bare))
}

/// Decode a single 256-bit unsigned word into u128.
///
/// Balances above u128::MAX are saturated — at 18 decimals that bound is
/// ~3.4e20 whole tokens, far past any real supply, and the value only feeds
/// a nonzero check plus display formatting.
pub(crate) fn decode_uint(result: &str) -> Result<u128> {
    let bare = result.trim_start_matches("0x");
    if bare.is_empty() {
        return Ok(0);
    }
    if !bare.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("malformed hex word: {result}");
    }
    let significant = bare.trim_start_matches('0');
    if significant.len() > 32 {
        return Ok(u128::MAX);
    }
    if significant.is_empty() {
        return Ok(0);
    }
    Ok(u128::from_str_radix(significant, 16)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_of_calldata_is_selector_plus_padded_address() {
        let data =
            encode_balance_of("0xD8dA6BF26964aF9D7eEd9e03E53415D37aA96045").unwrap();
        assert_eq!(
            data,
            "0x70a08231000000000000000000000000d8da6bf26964af9d7eed9e03e53415d37aa96045"
        );
        assert_eq!(data.len(), 2 + 8 + 64);
    }

    #[test]
    fn encode_rejects_bad_address() {
        assert!(encode_balance_of("0x123").is_err());
    }

    #[test]
    fn decode_uint_handles_zero_and_values() {
        let one_token = format!("0x{:064x}", 1_000_000_000_000_000_000u128);
        assert_eq!(decode_uint(&one_token).unwrap(), 1_000_000_000_000_000_000);
        assert_eq!(decode_uint("0x").unwrap(), 0);
        assert_eq!(
            decode_uint("0x0000000000000000000000000000000000000000000000000000000000000000")
                .unwrap(),
            0
        );
    }

    #[test]
    fn decode_uint_saturates_past_u128() {
        let huge = format!("0x{}", "f".repeat(64));
        assert_eq!(decode_uint(&huge).unwrap(), u128::MAX);
    }

    #[test]
    fn decode_uint_rejects_garbage() {
        assert!(decode_uint("0xnothex").is_err());
    }
}
