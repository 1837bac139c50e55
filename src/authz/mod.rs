//! Wallet authorization.
//!
//! Admin rights come from the Gnosis Safe owner set on chain. The owner list
//! is cached in memory with an explicit TTL; the statically configured admin
//! wallets are only a fallback for when the chain is unreachable, so a Safe
//! membership change propagates within one TTL without a redeploy.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::chain::TokenReader;

struct CachedOwners {
    owners: Vec<String>,
    fetched_at: Instant,
}

pub struct AdminRegistry {
    chain: Arc<dyn TokenReader>,
    safe_address: Option<String>,
    /// Lowercased fallback list from config.
    fallback: Vec<String>,
    ttl: Duration,
    cache: RwLock<Option<CachedOwners>>,
}

impl AdminRegistry {
    pub fn new(
        chain: Arc<dyn TokenReader>,
        safe_address: Option<String>,
        fallback: Vec<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            chain,
            safe_address,
            fallback,
            ttl,
            cache: RwLock::new(None),
        }
    }

    /// Is `wallet` (already lowercased) an admin?
    ///
    /// Order: fresh cache → chain fetch → stale cache → config fallback.
    /// A failed fetch never locks admins out while the chain is down.
    pub async fn is_admin(&self, wallet: &str) -> bool {
        let safe_address = match &self.safe_address {
            Some(addr) => addr.clone(),
            None => return self.fallback.iter().any(|w| w == wallet),
        };

        if let Some(cached) = self.cache.read().await.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return cached.owners.iter().any(|w| w == wallet);
            }
        }

        match self.chain.safe_owners(&safe_address).await {
            Ok(owners) => {
                debug!(count = owners.len(), "refreshed safe owner set");
                let hit = owners.iter().any(|w| w == wallet);
                *self.cache.write().await = Some(CachedOwners {
                    owners,
                    fetched_at: Instant::now(),
                });
                hit
            }
            Err(e) => {
                warn!(err = ?e, "safe owners fetch failed — using stale cache or config fallback");
                let guard = self.cache.read().await;
                match guard.as_ref() {
                    Some(cached) => cached.owners.iter().any(|w| w == wallet),
                    None => self.fallback.iter().any(|w| w == wallet),
                }
            }
        }
    }
}

/// Static wallet allow-list for the grant endpoints.
/// An empty list leaves the surface open (mirrors how an unset allow-list
/// behaves elsewhere in the config).
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    wallets: Vec<String>,
}

impl AllowList {
    pub fn new(wallets: Vec<String>) -> Self {
        Self { wallets }
    }

    pub fn permits(&self, wallet: &str) -> bool {
        self.wallets.is_empty() || self.wallets.iter().any(|w| w == wallet)
    }
}
