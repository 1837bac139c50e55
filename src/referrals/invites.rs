//! Permanent invite claims.
//!
//! A claim is idempotent per `(invite_code, wallet)`: the unique constraint
//! on the claim row is the single guard for the whole signup flow, so the
//! bonus distribution can never run twice for the same pair.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::RewardAmounts;
use crate::error::ApiError;
use crate::notify::{Notifier, OutboundEvent};
use crate::rewards::RewardType;
use crate::storage::{InviteRow, NewReferral, NewReward, Storage};
use crate::wallet;

/// Referral chains stop at three levels.
const MAX_LEVELS: i64 = 3;

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ClaimResult {
    Claimed {
        #[serde(rename = "bonusDistributed")]
        bonus_distributed: bool,
        #[serde(rename = "referralLevels")]
        referral_levels: usize,
    },
    AlreadyClaimed {
        #[serde(rename = "alreadyClaimed")]
        already_claimed: bool,
    },
}

pub struct InviteService {
    storage: Arc<Storage>,
    amounts: RewardAmounts,
    notifier: Notifier,
}

impl InviteService {
    pub fn new(storage: Arc<Storage>, amounts: RewardAmounts, notifier: Notifier) -> Self {
        Self {
            storage,
            amounts,
            notifier,
        }
    }

    /// Create a permanent invite for a referrer wallet.
    /// A missing code gets a generated 8-character one.
    pub async fn create(
        &self,
        code: Option<String>,
        referrer_wallet: &str,
        max_claims: Option<i64>,
        expires_at: Option<String>,
    ) -> Result<InviteRow, ApiError> {
        let referrer = wallet::normalize(referrer_wallet)
            .ok_or_else(|| ApiError::validation("invalid referrer wallet"))?;
        let code = match code {
            Some(c) if !c.trim().is_empty() => c.trim().to_ascii_uppercase(),
            _ => generate_code(),
        };
        if let Some(expiry) = &expires_at {
            parse_expiry(expiry)?;
        }
        if self.storage.get_invite(&code).await?.is_some() {
            return Err(ApiError::validation("invite code already exists"));
        }
        Ok(self
            .storage
            .create_invite(&code, &referrer, max_claims, expires_at.as_deref())
            .await?)
    }

    /// Pause or reactivate an invite.
    pub async fn set_status(&self, code: &str, status: &str) -> Result<(), ApiError> {
        if status != "active" && status != "paused" {
            return Err(ApiError::validation("status must be 'active' or 'paused'"));
        }
        if !self.storage.set_invite_status(code, status).await? {
            return Err(ApiError::not_found("invite not found"));
        }
        Ok(())
    }

    /// Claim an invite for a wallet.
    ///
    /// First claim: creates the claim row, the referral chain (levels 1-3
    /// walked up from the invite's referrer), the signup bonus for the
    /// claimer and the per-level signup commissions, and bumps the invite's
    /// claim counter. Repeat claim: reports `alreadyClaimed` and touches
    /// nothing.
    pub async fn claim(
        &self,
        code: &str,
        claimed_by: &str,
        education_completed: bool,
        metadata: Option<&str>,
    ) -> Result<ClaimResult, ApiError> {
        let claimer = wallet::normalize(claimed_by)
            .ok_or_else(|| ApiError::validation("invalid claimedBy wallet"))?;
        let code = code.trim().to_ascii_uppercase();
        if code.is_empty() {
            return Err(ApiError::validation("missing invite code"));
        }

        let invite = self
            .storage
            .get_invite(&code)
            .await?
            .ok_or_else(|| ApiError::not_found("invite not found"))?;

        if invite.status != "active" {
            return Err(ApiError::validation("invite is paused"));
        }
        if let Some(expiry) = &invite.expires_at {
            if parse_expiry(expiry)? < Utc::now() {
                return Err(ApiError::validation("invite has expired"));
            }
        }
        if invite
            .max_claims
            .is_some_and(|max| invite.total_claims >= max)
        {
            return Err(ApiError::validation("invite claim limit reached"));
        }
        if claimer == invite.referrer_wallet {
            return Err(ApiError::validation("cannot claim your own invite"));
        }

        let inserted = self
            .storage
            .insert_invite_claim(&code, &claimer, education_completed, metadata)
            .await?;
        if !inserted {
            return Ok(ClaimResult::AlreadyClaimed {
                already_claimed: true,
            });
        }

        // Walk the chain upwards: the invite's referrer is level 1, their
        // direct referrer level 2, and so on. Cycles back to the claimer or
        // within the chain terminate the walk.
        let mut chain: Vec<String> = vec![invite.referrer_wallet.clone()];
        while (chain.len() as i64) < MAX_LEVELS {
            let top = chain.last().map(String::as_str).unwrap_or_default();
            match self.storage.direct_referrer_of(top).await? {
                Some(upline) if upline != claimer && !chain.contains(&upline) => {
                    chain.push(upline);
                }
                _ => break,
            }
        }

        let referrals: Vec<NewReferral> = chain
            .iter()
            .enumerate()
            .map(|(i, referrer)| NewReferral {
                referrer_address: referrer.clone(),
                referred_address: claimer.clone(),
                level: i as i64 + 1,
            })
            .collect();

        let mut rewards = vec![NewReward {
            reward_type: RewardType::SignupBonus.to_string(),
            amount: self.amounts.signup_bonus,
            recipient: claimer.clone(),
            referred: None,
        }];
        for (i, referrer) in chain.iter().enumerate() {
            let level = i as i64 + 1;
            let amount = self.amounts.signup_commission(level);
            if amount <= 0.0 {
                continue;
            }
            rewards.push(NewReward {
                reward_type: RewardType::signup_commission_for_level(level).to_string(),
                amount,
                recipient: referrer.clone(),
                referred: Some(claimer.clone()),
            });
        }

        self.storage.apply_signup(&code, &referrals, &rewards).await?;

        info!(code = %code, wallet = %claimer, levels = chain.len(), "invite claimed");
        self.notifier.send(OutboundEvent::new(
            "invite_claimed",
            format!("Invite {code} claimed by {claimer}"),
        ));

        Ok(ClaimResult::Claimed {
            bonus_distributed: true,
            referral_levels: chain.len(),
        })
    }
}

fn generate_code() -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(8)
        .collect::<String>()
        .to_ascii_uppercase()
}

fn parse_expiry(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ApiError::validation("expires_at must be an RFC-3339 timestamp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_eight_uppercase_hex_chars() {
        let code = generate_code();
        assert_eq!(code.len(), 8);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        assert_ne!(generate_code(), generate_code());
    }

    #[test]
    fn expiry_parsing_accepts_rfc3339_only() {
        assert!(parse_expiry("2030-01-01T00:00:00Z").is_ok());
        assert!(parse_expiry("tomorrow").is_err());
    }
}
