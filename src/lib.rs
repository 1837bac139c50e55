pub mod authz;
pub mod chain;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod grants;
pub mod notify;
pub mod proposals;
pub mod referrals;
pub mod rest;
pub mod retry;
pub mod rewards;
pub mod storage;
pub mod tasks;
pub mod wallet;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use authz::{AdminRegistry, AllowList};
use chain::{JsonRpcReader, TokenReader};
use collaborators::StatsAggregator;
use config::LedgerConfig;
use grants::GrantDesk;
use notify::Notifier;
use proposals::ProposalEngine;
use referrals::invites::InviteService;
use referrals::ActivationChecker;
use rest::ratelimit::IpRateLimiter;
use rewards::RewardLedger;
use storage::Storage;
use tasks::TaskBoard;

/// Shared application state passed to every route handler.
pub struct AppContext {
    pub config: LedgerConfig,
    pub storage: Arc<Storage>,
    pub admins: AdminRegistry,
    pub grant_allow_list: AllowList,
    pub activation: ActivationChecker,
    pub invites: InviteService,
    pub rewards: Arc<RewardLedger>,
    pub proposals: ProposalEngine,
    pub tasks: TaskBoard,
    pub grants: GrantDesk,
    pub stats: StatsAggregator,
    pub notifier: Notifier,
    pub rate_limiter: IpRateLimiter,
    pub started_at: std::time::Instant,
}

impl AppContext {
    /// Wire every service against one storage handle and one chain reader.
    ///
    /// Takes the chain reader as a parameter so tests can substitute a mock;
    /// production callers pass [`JsonRpcReader`] built from the config.
    pub async fn init_with_chain(
        config: LedgerConfig,
        chain: Arc<dyn TokenReader>,
    ) -> Result<Arc<Self>> {
        let storage = Arc::new(
            Storage::new_with_slow_query(
                &config.data_dir,
                config.observability.slow_query_threshold_ms,
            )
            .await?,
        );
        let notifier = notify::spawn(config.discord_webhook_url.clone(), storage.clone());

        let admins = AdminRegistry::new(
            chain.clone(),
            config.chain.safe_address.clone(),
            config.admin_wallets.clone(),
            Duration::from_secs(config.chain.owners_ttl_secs),
        );
        let grant_allow_list = AllowList::new(config.allowed_wallets.clone());

        let rewards = Arc::new(RewardLedger::new(storage.clone()));
        let activation = ActivationChecker::new(
            storage.clone(),
            chain.clone(),
            config.rewards.clone(),
            notifier.clone(),
        );
        let invites = InviteService::new(storage.clone(), config.rewards.clone(), notifier.clone());
        let proposals = ProposalEngine::new(storage.clone(), notifier.clone());
        let tasks = TaskBoard::new(storage.clone(), rewards.clone(), notifier.clone());
        let grants = GrantDesk::new(storage.clone());
        let stats = StatsAggregator::new(storage.clone());
        let rate_limiter = IpRateLimiter::new(config.security.max_requests_per_minute_per_ip);

        Ok(Arc::new(Self {
            config,
            storage,
            admins,
            grant_allow_list,
            activation,
            invites,
            rewards,
            proposals,
            tasks,
            grants,
            stats,
            notifier,
            rate_limiter,
            started_at: std::time::Instant::now(),
        }))
    }

    pub async fn init(config: LedgerConfig) -> Result<Arc<Self>> {
        let chain = Arc::new(JsonRpcReader::new(
            config.chain.rpc_url.clone(),
            config.chain.cgc_token_address.clone(),
        ));
        Self::init_with_chain(config, chain).await
    }
}
