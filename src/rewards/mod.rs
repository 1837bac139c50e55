//! The reward ledger.
//!
//! Rows are minted by signup, activation, and task milestones, and are paid
//! out elsewhere — the processor here only records the externally supplied
//! transaction hash. Transitions are guarded: `pending → processing|paid|
//! failed`, with `paid` and `failed` terminal and never overwritten.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::storage::{
    NewReward, ProcessOutcome, RewardFilter, RewardRow, RewardSummary, Storage,
};
use crate::wallet;

static TX_HASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{64}$").expect("valid tx hash regex"));

/// Task-count milestones and the bonus minted when a collaborator reaches
/// each one. Checked on every completion; a milestone mints at most once
/// because the count passes each threshold exactly once.
const MILESTONES: [(i64, f64); 3] = [(5, 50.0), (10, 100.0), (25, 250.0)];

// ─── Reward vocabulary ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardType {
    DirectBonus,
    Level2Bonus,
    Level3Bonus,
    SignupBonus,
    SignupCommissionL1,
    SignupCommissionL2,
    SignupCommissionL3,
    ActivationBonus,
    SpecialBonus,
    /// `milestone_{tier}` — tier is the task count reached.
    Milestone(i64),
}

impl RewardType {
    /// Activation commission type for a referral level.
    pub fn activation_for_level(level: i64) -> Self {
        match level {
            2 => Self::Level2Bonus,
            3 => Self::Level3Bonus,
            _ => Self::DirectBonus,
        }
    }

    /// Signup commission type for a referral level.
    pub fn signup_commission_for_level(level: i64) -> Self {
        match level {
            2 => Self::SignupCommissionL2,
            3 => Self::SignupCommissionL3,
            _ => Self::SignupCommissionL1,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct_bonus" => Some(Self::DirectBonus),
            "level2_bonus" => Some(Self::Level2Bonus),
            "level3_bonus" => Some(Self::Level3Bonus),
            "signup_bonus" => Some(Self::SignupBonus),
            "signup_commission_l1" => Some(Self::SignupCommissionL1),
            "signup_commission_l2" => Some(Self::SignupCommissionL2),
            "signup_commission_l3" => Some(Self::SignupCommissionL3),
            "activation_bonus" => Some(Self::ActivationBonus),
            "special_bonus" => Some(Self::SpecialBonus),
            other => other
                .strip_prefix("milestone_")
                .and_then(|t| t.parse().ok())
                .map(Self::Milestone),
        }
    }
}

impl fmt::Display for RewardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DirectBonus => write!(f, "direct_bonus"),
            Self::Level2Bonus => write!(f, "level2_bonus"),
            Self::Level3Bonus => write!(f, "level3_bonus"),
            Self::SignupBonus => write!(f, "signup_bonus"),
            Self::SignupCommissionL1 => write!(f, "signup_commission_l1"),
            Self::SignupCommissionL2 => write!(f, "signup_commission_l2"),
            Self::SignupCommissionL3 => write!(f, "signup_commission_l3"),
            Self::ActivationBonus => write!(f, "activation_bonus"),
            Self::SpecialBonus => write!(f, "special_bonus"),
            Self::Milestone(tier) => write!(f, "milestone_{tier}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardStatus {
    Pending,
    Processing,
    Paid,
    Failed,
}

impl RewardStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "paid" => Some(Self::Paid),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

// ─── Ledger service ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub rewards: Vec<RewardRow>,
    pub summary: RewardSummary,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    pub processed: Vec<String>,
    pub already_processed: Vec<String>,
    pub not_found: Vec<String>,
}

pub struct RewardLedger {
    storage: Arc<Storage>,
}

impl RewardLedger {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// One page of a wallet's history plus aggregates over the full filtered
    /// set — the summary is intentionally independent of `limit`/`offset`.
    pub async fn history(
        &self,
        wallet: &str,
        status: Option<&str>,
        reward_type: Option<&str>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<HistoryPage, ApiError> {
        let wallet = wallet::normalize(wallet)
            .ok_or_else(|| ApiError::validation("invalid wallet address"))?;
        let status = match status {
            Some(raw) => Some(
                RewardStatus::parse(raw)
                    .ok_or_else(|| ApiError::validation("unknown reward status"))?
                    .as_str()
                    .to_string(),
            ),
            None => None,
        };
        let reward_type = match reward_type {
            Some(raw) => Some(
                RewardType::parse(raw)
                    .ok_or_else(|| ApiError::validation("unknown reward type"))?
                    .to_string(),
            ),
            None => None,
        };
        let limit = limit.unwrap_or(50).clamp(1, 200);
        let offset = offset.unwrap_or(0).max(0);

        let filter = RewardFilter {
            status,
            reward_type,
        };
        let rewards = self
            .storage
            .list_rewards(&wallet, &filter, limit, offset)
            .await?;
        let summary = self.storage.reward_summary(&wallet, &filter).await?;
        Ok(HistoryPage {
            rewards,
            summary,
            limit,
            offset,
        })
    }

    /// The payout queue: oldest pending rewards first.
    pub async fn pending(&self, limit: Option<i64>) -> Result<Vec<RewardRow>, ApiError> {
        Ok(self
            .storage
            .get_pending_rewards(limit.unwrap_or(100).clamp(1, 500))
            .await?)
    }

    /// Record a payout transaction against one reward.
    pub async fn process_single(
        &self,
        id: &str,
        tx_hash: &str,
        block_number: i64,
    ) -> Result<ProcessOutcome, ApiError> {
        validate_tx_hash(tx_hash)?;
        let outcome = self.storage.process_reward(id, tx_hash, block_number).await?;
        if outcome == ProcessOutcome::Processed {
            info!(reward = %id, tx = %tx_hash, "reward marked paid");
        }
        Ok(outcome)
    }

    /// Record one payout transaction against a batch of rewards.
    ///
    /// The batch is first claimed into `processing`, then each row is paid;
    /// rows that were already terminal or missing are reported, not failed.
    pub async fn process_batch(
        &self,
        ids: &[String],
        tx_hash: &str,
        block_number: i64,
    ) -> Result<BatchResult, ApiError> {
        validate_tx_hash(tx_hash)?;
        if ids.is_empty() {
            return Err(ApiError::validation("empty reward id list"));
        }
        self.storage.begin_processing(ids).await?;

        let mut result = BatchResult::default();
        for id in ids {
            match self.storage.process_reward(id, tx_hash, block_number).await? {
                ProcessOutcome::Processed => result.processed.push(id.clone()),
                ProcessOutcome::AlreadyProcessed => result.already_processed.push(id.clone()),
                ProcessOutcome::NotFound => result.not_found.push(id.clone()),
            }
        }
        info!(
            processed = result.processed.len(),
            skipped = result.already_processed.len() + result.not_found.len(),
            tx = %tx_hash,
            "reward batch processed"
        );
        Ok(result)
    }

    /// Mark a reward permanently failed.
    pub async fn fail(&self, id: &str, reason: &str) -> Result<ProcessOutcome, ApiError> {
        if reason.trim().is_empty() {
            return Err(ApiError::validation("failure reason is required"));
        }
        Ok(self.storage.mark_reward_failed(id, reason.trim()).await?)
    }

    /// Mint a milestone bonus when a collaborator's completed-task count
    /// lands exactly on a threshold.
    pub async fn maybe_mint_milestone(
        &self,
        wallet: &str,
        tasks_completed: i64,
    ) -> Result<Option<RewardRow>, ApiError> {
        let Some((tier, amount)) = MILESTONES
            .iter()
            .copied()
            .find(|(tier, _)| *tier == tasks_completed)
        else {
            return Ok(None);
        };
        let row = self
            .storage
            .create_reward(&NewReward {
                reward_type: RewardType::Milestone(tier).to_string(),
                amount,
                recipient: wallet.to_string(),
                referred: None,
            })
            .await?;
        info!(wallet = %wallet, tier, amount, "milestone bonus minted");
        Ok(Some(row))
    }
}

fn validate_tx_hash(tx_hash: &str) -> Result<(), ApiError> {
    if TX_HASH_RE.is_match(tx_hash) {
        Ok(())
    } else {
        Err(ApiError::validation("txHash must be a 32-byte hex hash"))
    }
}
