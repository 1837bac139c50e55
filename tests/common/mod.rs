//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use cgc_ledgerd::chain::TokenReader;
use cgc_ledgerd::config::LedgerConfig;
use cgc_ledgerd::AppContext;

pub const ADMIN: &str = "0xadadadadadadadadadadadadadadadadadadadad";
pub const REFERRER_A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
pub const REFERRER_B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
pub const CLAIMER: &str = "0xcccccccccccccccccccccccccccccccccccccccc";

/// In-memory chain: balances and Safe owners are whatever the test sets.
pub struct StubChain {
    balances: Mutex<HashMap<String, u128>>,
    owners: Vec<String>,
}

impl StubChain {
    pub fn new() -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            owners: Vec::new(),
        }
    }

    pub fn set_balance(&self, wallet: &str, wei: u128) {
        self.balances
            .lock()
            .unwrap()
            .insert(wallet.to_ascii_lowercase(), wei);
    }
}

#[async_trait]
impl TokenReader for StubChain {
    async fn balance_of(&self, wallet: &str) -> Result<u128> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&wallet.to_ascii_lowercase())
            .copied()
            .unwrap_or(0))
    }

    async fn safe_owners(&self, _safe: &str) -> Result<Vec<String>> {
        Ok(self.owners.clone())
    }
}

/// Config pointing at a per-test data directory, ADMIN as static admin,
/// no Safe, no webhook, default reward amounts.
pub fn test_config(data_dir: &Path) -> LedgerConfig {
    let mut config = LedgerConfig::new(Some(0), Some(data_dir.to_path_buf()), None, None);
    config.admin_wallets = vec![ADMIN.to_string()];
    config.chain.safe_address = None;
    config.discord_webhook_url = None;
    config
}

pub async fn test_ctx(data_dir: &Path) -> (Arc<AppContext>, Arc<StubChain>) {
    let chain = Arc::new(StubChain::new());
    let ctx = AppContext::init_with_chain(test_config(data_dir), chain.clone())
        .await
        .unwrap();
    (ctx, chain)
}
