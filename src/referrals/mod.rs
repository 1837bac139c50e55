//! Referral activation.
//!
//! A referral chain stays `pending` until the referred wallet demonstrably
//! holds CGC. The checker reads the on-chain balance and, once it is nonzero,
//! flips every pending level for that wallet and mints the activation side of
//! the reward ledger.

pub mod invites;

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::chain::TokenReader;
use crate::config::RewardAmounts;
use crate::error::ApiError;
use crate::notify::{Notifier, OutboundEvent};
use crate::rewards::RewardType;
use crate::storage::{NewReward, Storage};
use crate::wallet;

#[derive(Debug, Clone, Serialize)]
pub struct ActivationOutcome {
    pub activated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
}

impl ActivationOutcome {
    fn skipped(reason: &str, balance: Option<f64>) -> Self {
        Self {
            activated: false,
            reason: Some(reason.to_string()),
            balance,
        }
    }
}

pub struct ActivationChecker {
    storage: Arc<Storage>,
    chain: Arc<dyn TokenReader>,
    amounts: RewardAmounts,
    notifier: Notifier,
}

impl ActivationChecker {
    pub fn new(
        storage: Arc<Storage>,
        chain: Arc<dyn TokenReader>,
        amounts: RewardAmounts,
        notifier: Notifier,
    ) -> Self {
        Self {
            storage,
            chain,
            amounts,
            notifier,
        }
    }

    /// Check a wallet's CGC balance and activate its pending referrals.
    ///
    /// Fail-closed: an RPC failure reads as a zero balance, which makes the
    /// whole call an idempotent no-op rather than an error — the external
    /// cron simply tries again later.
    pub async fn check_and_activate(&self, wallet: &str) -> Result<ActivationOutcome, ApiError> {
        let wallet = wallet::normalize(wallet)
            .ok_or_else(|| ApiError::validation("invalid wallet address"))?;

        let pending = self.storage.list_pending_referrals(&wallet).await?;
        if pending.is_empty() {
            return Ok(ActivationOutcome::skipped("no pending referrals", None));
        }

        let balance_wei = match self.chain.balance_of(&wallet).await {
            Ok(b) => b,
            Err(e) => {
                warn!(wallet = %wallet, err = ?e, "balance read failed — treating as zero");
                0
            }
        };
        if balance_wei == 0 {
            return Ok(ActivationOutcome::skipped("zero CGC balance", Some(0.0)));
        }

        // The activation side of the ledger: a bonus for the referred wallet
        // plus one commission per referral level.
        let mut rewards = vec![NewReward {
            reward_type: RewardType::ActivationBonus.to_string(),
            amount: self.amounts.activation_bonus,
            recipient: wallet.clone(),
            referred: None,
        }];
        for referral in &pending {
            let amount = self.amounts.activation_commission(referral.level);
            if amount <= 0.0 {
                continue;
            }
            rewards.push(NewReward {
                reward_type: RewardType::activation_for_level(referral.level).to_string(),
                amount,
                recipient: referral.referrer_address.clone(),
                referred: Some(wallet.clone()),
            });
        }

        // Flip and mint atomically: the flip is the idempotence guard, so a
        // committed flip without its rewards would lose them for good.
        let balance = wallet::format_units(balance_wei);
        let flipped = self
            .storage
            .activate_and_mint(&wallet, balance, &rewards)
            .await?;
        if flipped == 0 {
            // A concurrent activation won the conditional update; the rewards
            // were minted by that caller.
            return Ok(ActivationOutcome::skipped(
                "already activated",
                Some(balance),
            ));
        }

        // Best-effort referrer counter bump — failure is logged, never
        // propagated, and never unwinds the activation itself.
        if let Some(direct) = pending.iter().find(|r| r.level == 1) {
            if let Err(e) = self
                .storage
                .bump_referrals_activated(&direct.referrer_address)
                .await
            {
                warn!(referrer = %direct.referrer_address, err = ?e,
                      "referrer counter bump failed");
            }
        }

        info!(wallet = %wallet, levels = flipped, balance, "referral activated");
        self.notifier.send(OutboundEvent::new(
            "referral_activated",
            format!("Referral activated for {wallet} ({flipped} level(s), {balance} CGC held)"),
        ));

        Ok(ActivationOutcome {
            activated: true,
            reason: None,
            balance: Some(balance),
        })
    }
}
