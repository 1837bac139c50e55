use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::error;

use crate::wallet;

const DEFAULT_PORT: u16 = 4310;
const DEFAULT_OWNERS_TTL_SECS: u64 = 300;
const DEFAULT_RPC_URL: &str = "https://ethereum-rpc.publicnode.com";

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

// ─── ChainConfig ──────────────────────────────────────────────────────────────

/// On-chain read configuration (`[chain]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    /// JSON-RPC endpoint used for all read-only calls.
    pub rpc_url: String,
    /// CGC token contract address. Empty = balance reads always return zero
    /// (activation becomes a no-op; useful for local development).
    pub cgc_token_address: String,
    /// Gnosis Safe whose owner set is the authoritative admin list.
    /// None = fall back to `admin_wallets` only.
    pub safe_address: Option<String>,
    /// How long a fetched Safe owner set stays valid (seconds). Default: 300.
    pub owners_ttl_secs: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            cgc_token_address: String::new(),
            safe_address: None,
            owners_ttl_secs: DEFAULT_OWNERS_TTL_SECS,
        }
    }
}

// ─── RewardAmounts ────────────────────────────────────────────────────────────

/// CGC amounts minted into the ledger per qualifying event
/// (`[rewards]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RewardAmounts {
    /// Paid to the claiming wallet on a first invite claim.
    pub signup_bonus: f64,
    /// Commissions paid up the referral chain on signup, by level.
    pub signup_commission_l1: f64,
    pub signup_commission_l2: f64,
    pub signup_commission_l3: f64,
    /// Paid to the referred wallet when its referral activates.
    pub activation_bonus: f64,
    /// Paid to the direct (level-1) referrer on activation.
    pub direct_bonus: f64,
    /// Paid to the level-2 referrer on activation.
    pub level2_bonus: f64,
    /// Paid to the level-3 referrer on activation.
    pub level3_bonus: f64,
}

impl Default for RewardAmounts {
    fn default() -> Self {
        Self {
            signup_bonus: 25.0,
            signup_commission_l1: 5.0,
            signup_commission_l2: 3.0,
            signup_commission_l3: 1.0,
            activation_bonus: 10.0,
            direct_bonus: 20.0,
            level2_bonus: 10.0,
            level3_bonus: 5.0,
        }
    }
}

impl RewardAmounts {
    /// Activation commission for a referral level (1-3). Zero for anything else.
    pub fn activation_commission(&self, level: i64) -> f64 {
        match level {
            1 => self.direct_bonus,
            2 => self.level2_bonus,
            3 => self.level3_bonus,
            _ => 0.0,
        }
    }

    /// Signup commission for a referral level (1-3). Zero for anything else.
    pub fn signup_commission(&self, level: i64) -> f64 {
        match level {
            1 => self.signup_commission_l1,
            2 => self.signup_commission_l2,
            3 => self.signup_commission_l3,
            _ => 0.0,
        }
    }
}

// ─── SecurityConfig ───────────────────────────────────────────────────────────

/// Request throttling (`[security]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Max requests per IP per minute (0 = unlimited; default: 120).
    pub max_requests_per_minute_per_ip: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute_per_ip: 120,
        }
    }
}

// ─── ObservabilityConfig ──────────────────────────────────────────────────────

/// Diagnostics knobs (`[observability]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log SQLite queries that exceed this threshold (milliseconds).
    /// Default: 100. Set to 0 to disable slow query logging.
    pub slow_query_threshold_ms: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            slow_query_threshold_ms: 100,
        }
    }
}

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `{data_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// REST server port (default: 4310).
    port: Option<u16>,
    /// Bind address (default: "127.0.0.1"; use "0.0.0.0" behind a proxy).
    bind_address: Option<String>,
    /// Log level filter string, e.g. "debug", "info,cgc_ledgerd=trace".
    log: Option<String>,
    /// Log output format: "pretty" (default) | "json".
    log_format: Option<String>,
    /// Fallback admin wallets, used when the Safe owner set is unreachable.
    admin_wallets: Option<Vec<String>>,
    /// Wallets allowed to use the grant endpoints. Empty = open to any wallet.
    allowed_wallets: Option<Vec<String>>,
    /// Discord webhook for approval/activation announcements. None = disabled.
    discord_webhook_url: Option<String>,
    /// On-chain read configuration (`[chain]`).
    chain: Option<ChainConfig>,
    /// Reward amounts (`[rewards]`).
    rewards: Option<RewardAmounts>,
    /// Request throttling (`[security]`).
    security: Option<SecurityConfig>,
    /// Diagnostics (`[observability]`).
    observability: Option<ObservabilityConfig>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

// ─── LedgerConfig ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub log: String,
    /// Log output format: "pretty" (default) | "json".
    pub log_format: String,
    /// Bind address for the REST server (LEDGERD_BIND env var).
    pub bind_address: String,
    /// Fallback admin wallets (lowercased at load time).
    pub admin_wallets: Vec<String>,
    /// Grant-endpoint allow-list (lowercased; empty = open).
    pub allowed_wallets: Vec<String>,
    /// Discord webhook URL (LEDGERD_DISCORD_WEBHOOK env var). None = disabled.
    pub discord_webhook_url: Option<String>,
    pub chain: ChainConfig,
    pub rewards: RewardAmounts,
    pub security: SecurityConfig,
    pub observability: ObservabilityConfig,
}

impl LedgerConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
        bind_address: Option<String>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);

        let toml = load_toml(&data_dir).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());

        let bind_address = bind_address
            .or(std::env::var("LEDGERD_BIND").ok().filter(|s| !s.is_empty()))
            .or(toml.bind_address)
            .unwrap_or_else(default_bind_address);

        let log_format = std::env::var("LEDGERD_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());

        let discord_webhook_url = std::env::var("LEDGERD_DISCORD_WEBHOOK")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.discord_webhook_url);

        let mut chain = toml.chain.unwrap_or_default();
        if let Ok(url) = std::env::var("LEDGERD_RPC_URL") {
            if !url.is_empty() {
                chain.rpc_url = url;
            }
        }

        let admin_wallets = normalize_wallets(toml.admin_wallets.unwrap_or_default());
        let allowed_wallets = normalize_wallets(toml.allowed_wallets.unwrap_or_default());

        Self {
            port,
            data_dir,
            log,
            log_format,
            bind_address,
            admin_wallets,
            allowed_wallets,
            discord_webhook_url,
            chain,
            rewards: toml.rewards.unwrap_or_default(),
            security: toml.security.unwrap_or_default(),
            observability: toml.observability.unwrap_or_default(),
        }
    }
}

/// Lowercase every valid address; drop (and log) anything malformed.
fn normalize_wallets(raw: Vec<String>) -> Vec<String> {
    raw.into_iter()
        .filter_map(|w| match wallet::normalize(&w) {
            Some(n) => Some(n),
            None => {
                error!(wallet = %w, "ignoring malformed wallet address in config");
                None
            }
        })
        .collect()
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("cgc-ledgerd");
        }
    }
    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("cgc-ledgerd");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("cgc-ledgerd");
        }
    }
    // Fallback
    PathBuf::from(".cgc-ledgerd")
}
