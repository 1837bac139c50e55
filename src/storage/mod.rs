use anyhow::{Context as _, Result};
use chrono::Utc;
use sqlx::{sqlite::SqliteConnectOptions, ConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr};
use uuid::Uuid;

/// Default timeout for individual SQLite queries.
/// Prevents hung queries from blocking a request indefinitely.
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Execute a future with the standard query timeout.
async fn with_timeout<T>(fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "database query timed out after {}s",
            QUERY_TIMEOUT.as_secs()
        )),
    }
}

// ─── Row types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct ReferralRow {
    pub id: String,
    pub referrer_address: String,
    pub referred_address: String,
    /// 1 = direct referrer, 2-3 = upline.
    pub level: i64,
    /// 'pending' | 'active'
    pub status: String,
    /// Formatted CGC balance observed at activation time.
    pub cgc_earned: f64,
    pub activated_at: Option<String>,
    pub last_activity: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct RewardRow {
    pub id: String,
    pub reward_type: String,
    pub amount: f64,
    /// 'pending' | 'processing' | 'paid' | 'failed'
    pub status: String,
    /// Recipient wallet.
    pub referrer_address: String,
    /// Wallet whose action triggered the reward, when there is one.
    pub referred_address: Option<String>,
    pub tx_hash: Option<String>,
    pub block_number: Option<i64>,
    pub failure_reason: Option<String>,
    pub created_at: String,
    pub paid_at: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct InviteRow {
    pub invite_code: String,
    pub referrer_wallet: String,
    /// 'active' | 'paused'
    pub status: String,
    pub total_claims: i64,
    /// NULL = unlimited.
    pub max_claims: Option<i64>,
    /// RFC-3339; NULL = never expires.
    pub expires_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct InviteClaimRow {
    pub id: String,
    pub invite_code: String,
    pub claimed_by_wallet: String,
    pub education_completed: bool,
    /// Opaque JSON blob supplied by the claiming client.
    pub metadata: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct ProposalRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub proposer_wallet: String,
    /// 'pending' | 'voting' | 'approved' | 'rejected' | 'converted'
    pub status: String,
    pub reward: Option<f64>,
    pub complexity: Option<i64>,
    pub rejection_reason: Option<String>,
    pub resulting_task_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct TaskRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub reward: f64,
    pub complexity: Option<i64>,
    pub assignee_wallet: Option<String>,
    /// 'open' | 'assigned' | 'completed'
    pub status: String,
    pub proposal_id: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct GrantRow {
    pub id: String,
    pub applicant_wallet: String,
    pub title: String,
    pub description: String,
    pub amount: f64,
    /// 'submitted' | 'under_review' | 'approved' | 'rejected'
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct CollaboratorRow {
    pub wallet: String,
    pub total_cgc_earned: f64,
    pub tasks_completed: i64,
    pub referrals_activated: i64,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct DeadLetterRow {
    pub id: String,
    pub kind: String,
    pub payload: String,
    pub error: String,
    pub created_at: String,
}

// ─── Inputs & outcomes ────────────────────────────────────────────────────────

/// A referral edge to insert during signup.
#[derive(Debug, Clone)]
pub struct NewReferral {
    pub referrer_address: String,
    pub referred_address: String,
    pub level: i64,
}

/// A ledger row to mint.
#[derive(Debug, Clone)]
pub struct NewReward {
    pub reward_type: String,
    pub amount: f64,
    pub recipient: String,
    pub referred: Option<String>,
}

/// Optional filters for reward history queries.
#[derive(Debug, Clone, Default)]
pub struct RewardFilter {
    pub status: Option<String>,
    pub reward_type: Option<String>,
}

/// Aggregates over the *full* filtered reward set, not the fetched page.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RewardSummary {
    pub total_count: i64,
    pub pending_count: i64,
    pub processing_count: i64,
    pub paid_count: i64,
    pub failed_count: i64,
    pub pending_amount: f64,
    pub paid_amount: f64,
    pub by_type: Vec<TypeCount>,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct TypeCount {
    pub reward_type: String,
    pub count: i64,
}

/// Result of a guarded reward status transition.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessOutcome {
    Processed,
    /// Row is already in a terminal state; nothing was overwritten.
    AlreadyProcessed,
    NotFound,
}

/// Expected totals recomputed from the completed-tasks table.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct ComputedTotals {
    pub wallet: String,
    pub total_cgc_earned: f64,
    pub tasks_completed: i64,
}

// ─── Storage ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        Self::new_with_slow_query(data_dir, 0).await
    }

    /// Create storage with slow-query logging enabled.
    ///
    /// `slow_query_ms` is the threshold in milliseconds — queries exceeding it
    /// are logged at WARN level. Set to 0 to disable slow-query logging.
    pub async fn new_with_slow_query(data_dir: &Path, slow_query_ms: u64) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("ledger.db");
        let mut opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);

        if slow_query_ms > 0 {
            opts = opts.log_slow_statements(
                log::LevelFilter::Warn,
                std::time::Duration::from_millis(slow_query_ms),
            );
        }

        let pool = SqlitePool::connect_with(opts).await?;
        sqlx::migrate!("src/storage/migrations")
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(Self { pool })
    }

    /// Liveness probe for the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ─── Referrals ──────────────────────────────────────────────────────────

    /// Insert a referral edge. Returns `false` when the `(referred, level)`
    /// slot is already taken (first referrer wins; never overwritten).
    pub async fn create_referral(
        &self,
        referrer_address: &str,
        referred_address: &str,
        level: i64,
    ) -> Result<bool> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO referrals (id, referrer_address, referred_address, level, status, created_at)
             VALUES (?, ?, ?, ?, 'pending', ?)
             ON CONFLICT (referred_address, level) DO NOTHING",
        )
        .bind(&id)
        .bind(referrer_address)
        .bind(referred_address)
        .bind(level)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_pending_referrals(&self, referred_address: &str) -> Result<Vec<ReferralRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM referrals WHERE referred_address = ? AND status = 'pending'
             ORDER BY level ASC",
        )
        .bind(referred_address)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn list_referrals_by_referrer(
        &self,
        referrer_address: &str,
    ) -> Result<Vec<ReferralRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM referrals WHERE referrer_address = ? ORDER BY created_at DESC",
        )
        .bind(referrer_address)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Flip every pending referral of `referred_address` to active and mint
    /// the activation-side rewards in one transaction. The flip is the
    /// idempotence guard, so the rewards must not outlive a rolled-back flip
    /// and the flip must not commit without its rewards.
    ///
    /// Returns rows flipped; 0 means a concurrent activation already won and
    /// nothing was inserted.
    pub async fn activate_and_mint(
        &self,
        referred_address: &str,
        cgc_earned: f64,
        rewards: &[NewReward],
    ) -> Result<u64> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE referrals
             SET status = 'active', activated_at = ?, last_activity = ?, cgc_earned = ?
             WHERE referred_address = ? AND status = 'pending'",
        )
        .bind(&now)
        .bind(&now)
        .bind(cgc_earned)
        .bind(referred_address)
        .execute(&mut *tx)
        .await?;
        let flipped = result.rows_affected();
        if flipped == 0 {
            tx.rollback().await?;
            return Ok(0);
        }

        for reward in rewards {
            sqlx::query(
                "INSERT INTO rewards (id, reward_type, amount, status, referrer_address, referred_address, created_at)
                 VALUES (?, ?, ?, 'pending', ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&reward.reward_type)
            .bind(reward.amount)
            .bind(&reward.recipient)
            .bind(&reward.referred)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(flipped)
    }

    /// The direct (level-1) referrer of a wallet, if any.
    pub async fn direct_referrer_of(&self, wallet: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT referrer_address FROM referrals WHERE referred_address = ? AND level = 1",
        )
        .bind(wallet)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(r,)| r))
    }

    // ─── Rewards ────────────────────────────────────────────────────────────

    pub async fn create_reward(&self, reward: &NewReward) -> Result<RewardRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO rewards (id, reward_type, amount, status, referrer_address, referred_address, created_at)
             VALUES (?, ?, ?, 'pending', ?, ?, ?)",
        )
        .bind(&id)
        .bind(&reward.reward_type)
        .bind(reward.amount)
        .bind(&reward.recipient)
        .bind(&reward.referred)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_reward(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("reward not found after insert"))
    }

    pub async fn get_reward(&self, id: &str) -> Result<Option<RewardRow>> {
        Ok(sqlx::query_as("SELECT * FROM rewards WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// One page of a wallet's reward history, newest first.
    pub async fn list_rewards(
        &self,
        wallet: &str,
        filter: &RewardFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RewardRow>> {
        with_timeout(async {
            let mut qb = sqlx::QueryBuilder::new(
                "SELECT * FROM rewards WHERE referrer_address = ",
            );
            qb.push_bind(wallet);
            if let Some(status) = &filter.status {
                qb.push(" AND status = ").push_bind(status);
            }
            if let Some(rtype) = &filter.reward_type {
                qb.push(" AND reward_type = ").push_bind(rtype);
            }
            qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
                .push_bind(limit)
                .push(" OFFSET ")
                .push_bind(offset);
            Ok(qb.build_query_as().fetch_all(&self.pool).await?)
        })
        .await
    }

    /// Aggregates over the full filtered set. Deliberately independent of the
    /// page bounds passed to [`list_rewards`].
    pub async fn reward_summary(
        &self,
        wallet: &str,
        filter: &RewardFilter,
    ) -> Result<RewardSummary> {
        with_timeout(async {
            let mut qb = sqlx::QueryBuilder::new(
                "SELECT COUNT(*) AS total_count,
                        COALESCE(SUM(status = 'pending'), 0) AS pending_count,
                        COALESCE(SUM(status = 'processing'), 0) AS processing_count,
                        COALESCE(SUM(status = 'paid'), 0) AS paid_count,
                        COALESCE(SUM(status = 'failed'), 0) AS failed_count,
                        COALESCE(SUM(CASE WHEN status = 'pending' THEN amount ELSE 0.0 END), 0.0) AS pending_amount,
                        COALESCE(SUM(CASE WHEN status = 'paid' THEN amount ELSE 0.0 END), 0.0) AS paid_amount
                 FROM rewards WHERE referrer_address = ",
            );
            qb.push_bind(wallet);
            if let Some(status) = &filter.status {
                qb.push(" AND status = ").push_bind(status);
            }
            if let Some(rtype) = &filter.reward_type {
                qb.push(" AND reward_type = ").push_bind(rtype);
            }
            let (total_count, pending_count, processing_count, paid_count, failed_count, pending_amount, paid_amount):
                (i64, i64, i64, i64, i64, f64, f64) =
                qb.build_query_as().fetch_one(&self.pool).await?;

            let mut qb = sqlx::QueryBuilder::new(
                "SELECT reward_type, COUNT(*) AS count FROM rewards WHERE referrer_address = ",
            );
            qb.push_bind(wallet);
            if let Some(status) = &filter.status {
                qb.push(" AND status = ").push_bind(status);
            }
            if let Some(rtype) = &filter.reward_type {
                qb.push(" AND reward_type = ").push_bind(rtype);
            }
            qb.push(" GROUP BY reward_type ORDER BY count DESC");
            let by_type: Vec<TypeCount> = qb.build_query_as().fetch_all(&self.pool).await?;

            Ok(RewardSummary {
                total_count,
                pending_count,
                processing_count,
                paid_count,
                failed_count,
                pending_amount,
                paid_amount,
                by_type,
            })
        })
        .await
    }

    /// Oldest pending rewards first — the payout queue view.
    pub async fn get_pending_rewards(&self, limit: i64) -> Result<Vec<RewardRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM rewards WHERE status = 'pending' ORDER BY created_at ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Claim a batch of rewards for payout by flipping them to 'processing'.
    /// Rows already terminal are left untouched.
    pub async fn begin_processing(&self, ids: &[String]) -> Result<u64> {
        let mut flipped = 0;
        for id in ids {
            let result = sqlx::query(
                "UPDATE rewards SET status = 'processing' WHERE id = ? AND status = 'pending'",
            )
            .bind(id)
            .execute(&self.pool)
            .await?;
            flipped += result.rows_affected();
        }
        Ok(flipped)
    }

    /// Mark a reward paid, recording the externally supplied transaction.
    ///
    /// The UPDATE is guarded on the current status so a second call against a
    /// paid (or failed) row is a no-op: `paid_at` and `tx_hash` are written
    /// exactly once.
    pub async fn process_reward(
        &self,
        id: &str,
        tx_hash: &str,
        block_number: i64,
    ) -> Result<ProcessOutcome> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE rewards SET status = 'paid', tx_hash = ?, block_number = ?, paid_at = ?
             WHERE id = ? AND status IN ('pending', 'processing')",
        )
        .bind(tx_hash)
        .bind(block_number)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(ProcessOutcome::Processed);
        }
        match self.get_reward(id).await? {
            Some(_) => Ok(ProcessOutcome::AlreadyProcessed),
            None => Ok(ProcessOutcome::NotFound),
        }
    }

    /// Terminal failure. Guarded like [`process_reward`]; failed rows are
    /// never retried automatically.
    pub async fn mark_reward_failed(&self, id: &str, reason: &str) -> Result<ProcessOutcome> {
        let result = sqlx::query(
            "UPDATE rewards SET status = 'failed', failure_reason = ?
             WHERE id = ? AND status IN ('pending', 'processing')",
        )
        .bind(reason)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(ProcessOutcome::Processed);
        }
        match self.get_reward(id).await? {
            Some(_) => Ok(ProcessOutcome::AlreadyProcessed),
            None => Ok(ProcessOutcome::NotFound),
        }
    }

    // ─── Invites & claims ───────────────────────────────────────────────────

    pub async fn create_invite(
        &self,
        invite_code: &str,
        referrer_wallet: &str,
        max_claims: Option<i64>,
        expires_at: Option<&str>,
    ) -> Result<InviteRow> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO invites (invite_code, referrer_wallet, status, total_claims, max_claims, expires_at, created_at)
             VALUES (?, ?, 'active', 0, ?, ?, ?)",
        )
        .bind(invite_code)
        .bind(referrer_wallet)
        .bind(max_claims)
        .bind(expires_at)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_invite(invite_code)
            .await?
            .ok_or_else(|| anyhow::anyhow!("invite not found after insert"))
    }

    pub async fn get_invite(&self, invite_code: &str) -> Result<Option<InviteRow>> {
        Ok(sqlx::query_as("SELECT * FROM invites WHERE invite_code = ?")
            .bind(invite_code)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn set_invite_status(&self, invite_code: &str, status: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE invites SET status = ? WHERE invite_code = ?")
            .bind(status)
            .bind(invite_code)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Insert a claim row. Returns `false` when this `(code, wallet)` pair has
    /// already claimed — the idempotence guard for the whole signup flow.
    pub async fn insert_invite_claim(
        &self,
        invite_code: &str,
        claimed_by_wallet: &str,
        education_completed: bool,
        metadata: Option<&str>,
    ) -> Result<bool> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO invite_claims (id, invite_code, claimed_by_wallet, education_completed, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (invite_code, claimed_by_wallet) DO NOTHING",
        )
        .bind(&id)
        .bind(invite_code)
        .bind(claimed_by_wallet)
        .bind(education_completed)
        .bind(metadata)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_invite_claims(&self, invite_code: &str) -> Result<i64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM invite_claims WHERE invite_code = ?")
                .bind(invite_code)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }

    /// Apply the signup side of a first-time claim in one transaction:
    /// referral edges, signup rewards, and the invite claim counter.
    pub async fn apply_signup(
        &self,
        invite_code: &str,
        referrals: &[NewReferral],
        rewards: &[NewReward],
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for referral in referrals {
            sqlx::query(
                "INSERT INTO referrals (id, referrer_address, referred_address, level, status, created_at)
                 VALUES (?, ?, ?, ?, 'pending', ?)
                 ON CONFLICT (referred_address, level) DO NOTHING",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&referral.referrer_address)
            .bind(&referral.referred_address)
            .bind(referral.level)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        for reward in rewards {
            sqlx::query(
                "INSERT INTO rewards (id, reward_type, amount, status, referrer_address, referred_address, created_at)
                 VALUES (?, ?, ?, 'pending', ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&reward.reward_type)
            .bind(reward.amount)
            .bind(&reward.recipient)
            .bind(&reward.referred)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE invites SET total_claims = total_claims + 1 WHERE invite_code = ?")
            .bind(invite_code)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    // ─── Proposals & tasks ──────────────────────────────────────────────────

    pub async fn create_proposal(
        &self,
        title: &str,
        description: &str,
        proposer_wallet: &str,
        reward: Option<f64>,
        complexity: Option<i64>,
    ) -> Result<ProposalRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO proposals (id, title, description, proposer_wallet, status, reward, complexity, created_at, updated_at)
             VALUES (?, ?, ?, ?, 'pending', ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(title)
        .bind(description)
        .bind(proposer_wallet)
        .bind(reward)
        .bind(complexity)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_proposal(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("proposal not found after insert"))
    }

    pub async fn get_proposal(&self, id: &str) -> Result<Option<ProposalRow>> {
        Ok(sqlx::query_as("SELECT * FROM proposals WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_proposals(
        &self,
        status: Option<&str>,
        limit: i64,
    ) -> Result<Vec<ProposalRow>> {
        if let Some(status) = status {
            Ok(sqlx::query_as(
                "SELECT * FROM proposals WHERE status = ? ORDER BY created_at DESC LIMIT ?",
            )
            .bind(status)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
        } else {
            Ok(
                sqlx::query_as("SELECT * FROM proposals ORDER BY created_at DESC LIMIT ?")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?,
            )
        }
    }

    /// pending → voting. Returns `false` when the proposal is not pending.
    pub async fn start_voting(&self, id: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE proposals SET status = 'voting', updated_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// voting → rejected, recording the (non-empty, caller-validated) reason.
    pub async fn reject_proposal(&self, id: &str, reason: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE proposals SET status = 'rejected', rejection_reason = ?, updated_at = ?
             WHERE id = ? AND status = 'voting'",
        )
        .bind(reason)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Approve a voting proposal and convert it into a task, atomically.
    ///
    /// A single transaction claims the 'voting' status, inserts the task,
    /// and marks the proposal 'converted' with `resulting_task_id`. On any
    /// failure the transaction rolls back and the proposal stays 'voting' —
    /// an approved proposal without a task is unrepresentable.
    ///
    /// Returns `None` when the proposal is missing or not in 'voting'.
    pub async fn approve_and_convert(
        &self,
        id: &str,
        task_title: &str,
        task_description: &str,
        reward: f64,
        complexity: Option<i64>,
    ) -> Result<Option<TaskRow>> {
        let now = Utc::now().to_rfc3339();
        let task_id = Uuid::new_v4().to_string();
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            "UPDATE proposals SET status = 'approved', updated_at = ?
             WHERE id = ? AND status = 'voting'",
        )
        .bind(&now)
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if claimed == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query(
            "INSERT INTO tasks (id, title, description, reward, complexity, status, proposal_id, created_at)
             VALUES (?, ?, ?, ?, ?, 'open', ?, ?)",
        )
        .bind(&task_id)
        .bind(task_title)
        .bind(task_description)
        .bind(reward)
        .bind(complexity)
        .bind(id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE proposals SET status = 'converted', resulting_task_id = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&task_id)
        .bind(&now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.get_task(&task_id).await
    }

    pub async fn create_task(
        &self,
        title: &str,
        description: &str,
        reward: f64,
        complexity: Option<i64>,
    ) -> Result<TaskRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO tasks (id, title, description, reward, complexity, status, created_at)
             VALUES (?, ?, ?, ?, ?, 'open', ?)",
        )
        .bind(&id)
        .bind(title)
        .bind(description)
        .bind(reward)
        .bind(complexity)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_task(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("task not found after insert"))
    }

    pub async fn get_task(&self, id: &str) -> Result<Option<TaskRow>> {
        Ok(sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_tasks(&self, status: Option<&str>, limit: i64) -> Result<Vec<TaskRow>> {
        if let Some(status) = status {
            Ok(sqlx::query_as(
                "SELECT * FROM tasks WHERE status = ? ORDER BY created_at DESC LIMIT ?",
            )
            .bind(status)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
        } else {
            Ok(
                sqlx::query_as("SELECT * FROM tasks ORDER BY created_at DESC LIMIT ?")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?,
            )
        }
    }

    /// open → assigned. Returns `false` when the task is not open.
    pub async fn assign_task(&self, id: &str, assignee_wallet: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'assigned', assignee_wallet = ?
             WHERE id = ? AND status = 'open'",
        )
        .bind(assignee_wallet)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// assigned → completed, incrementing the assignee's collaborator totals
    /// in the same transaction (the incremental path; the full re-scan sync
    /// remains available as a repair tool).
    ///
    /// Returns the completed task together with the assignee's
    /// post-increment completed-task count, read inside the transaction so
    /// milestone checks see exactly the count this completion produced.
    /// `None` when the task is missing, unassigned, or not assigned.
    pub async fn complete_task(&self, id: &str) -> Result<Option<(TaskRow, i64)>> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let task: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let task = match task {
            Some(t) if t.status == "assigned" && t.assignee_wallet.is_some() => t,
            _ => {
                tx.rollback().await?;
                return Ok(None);
            }
        };
        let assignee = task
            .assignee_wallet
            .as_deref()
            .unwrap_or_default()
            .to_ascii_lowercase();

        sqlx::query(
            "UPDATE tasks SET status = 'completed', completed_at = ?
             WHERE id = ? AND status = 'assigned'",
        )
        .bind(&now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let (tasks_completed,): (i64,) = sqlx::query_as(
            "INSERT INTO collaborators (wallet, total_cgc_earned, tasks_completed, referrals_activated, updated_at)
             VALUES (?, ?, 1, 0, ?)
             ON CONFLICT (wallet) DO UPDATE SET
               total_cgc_earned = total_cgc_earned + excluded.total_cgc_earned,
               tasks_completed = tasks_completed + 1,
               updated_at = excluded.updated_at
             RETURNING tasks_completed",
        )
        .bind(&assignee)
        .bind(task.reward)
        .bind(&now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        let task = self
            .get_task(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("task missing after completion"))?;
        Ok(Some((task, tasks_completed)))
    }

    // ─── Grants ─────────────────────────────────────────────────────────────

    pub async fn create_grant(
        &self,
        applicant_wallet: &str,
        title: &str,
        description: &str,
        amount: f64,
    ) -> Result<GrantRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO grants (id, applicant_wallet, title, description, amount, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 'submitted', ?, ?)",
        )
        .bind(&id)
        .bind(applicant_wallet)
        .bind(title)
        .bind(description)
        .bind(amount)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_grant(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("grant not found after insert"))
    }

    pub async fn get_grant(&self, id: &str) -> Result<Option<GrantRow>> {
        Ok(sqlx::query_as("SELECT * FROM grants WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_grants(&self, applicant: Option<&str>, limit: i64) -> Result<Vec<GrantRow>> {
        if let Some(wallet) = applicant {
            Ok(sqlx::query_as(
                "SELECT * FROM grants WHERE applicant_wallet = ? ORDER BY created_at DESC LIMIT ?",
            )
            .bind(wallet)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
        } else {
            Ok(
                sqlx::query_as("SELECT * FROM grants ORDER BY created_at DESC LIMIT ?")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?,
            )
        }
    }

    pub async fn update_grant(
        &self,
        id: &str,
        title: &str,
        description: &str,
        amount: f64,
    ) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE grants SET title = ?, description = ?, amount = ?, updated_at = ? WHERE id = ?",
        )
        .bind(title)
        .bind(description)
        .bind(amount)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_grant_status(&self, id: &str, status: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query("UPDATE grants SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_grant(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM grants WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ─── Collaborators ──────────────────────────────────────────────────────

    pub async fn get_collaborator(&self, wallet: &str) -> Result<Option<CollaboratorRow>> {
        Ok(sqlx::query_as("SELECT * FROM collaborators WHERE wallet = ?")
            .bind(wallet)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_collaborators(&self) -> Result<Vec<CollaboratorRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM collaborators ORDER BY total_cgc_earned DESC",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    /// Recompute expected per-wallet totals by scanning every completed task
    /// with an assignee, grouped by lowercased wallet. O(completed tasks).
    pub async fn recompute_totals(&self) -> Result<Vec<ComputedTotals>> {
        with_timeout(async {
            Ok(sqlx::query_as(
                "SELECT LOWER(assignee_wallet) AS wallet,
                        COALESCE(SUM(reward), 0.0) AS total_cgc_earned,
                        COUNT(*) AS tasks_completed
                 FROM tasks
                 WHERE status = 'completed' AND assignee_wallet IS NOT NULL
                 GROUP BY LOWER(assignee_wallet)
                 ORDER BY wallet",
            )
            .fetch_all(&self.pool)
            .await?)
        })
        .await
    }

    /// Overwrite a wallet's stored totals with recomputed ones (repair path).
    pub async fn upsert_collaborator_totals(
        &self,
        wallet: &str,
        total_cgc_earned: f64,
        tasks_completed: i64,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO collaborators (wallet, total_cgc_earned, tasks_completed, referrals_activated, updated_at)
             VALUES (?, ?, ?, 0, ?)
             ON CONFLICT (wallet) DO UPDATE SET
               total_cgc_earned = excluded.total_cgc_earned,
               tasks_completed = excluded.tasks_completed,
               updated_at = excluded.updated_at",
        )
        .bind(wallet)
        .bind(total_cgc_earned)
        .bind(tasks_completed)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Best-effort referrer counter bump on activation.
    pub async fn bump_referrals_activated(&self, wallet: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO collaborators (wallet, total_cgc_earned, tasks_completed, referrals_activated, updated_at)
             VALUES (?, 0, 0, 1, ?)
             ON CONFLICT (wallet) DO UPDATE SET
               referrals_activated = referrals_activated + 1,
               updated_at = excluded.updated_at",
        )
        .bind(wallet)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ─── Dead letters ───────────────────────────────────────────────────────

    /// Record an outbound notification that could not be delivered.
    pub async fn append_dead_letter(&self, kind: &str, payload: &str, error: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO dead_letters (id, kind, payload, error, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(kind)
        .bind(payload)
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_dead_letters(&self, limit: i64) -> Result<Vec<DeadLetterRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM dead_letters ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn storage() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path()).await.unwrap();
        (dir, storage)
    }

    const A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    const C: &str = "0xcccccccccccccccccccccccccccccccccccccccc";

    #[tokio::test]
    async fn referral_level_slot_is_unique() {
        let (_dir, s) = storage().await;
        assert!(s.create_referral(A, B, 1).await.unwrap());
        // Second level-1 referrer for the same wallet loses.
        assert!(!s.create_referral(C, B, 1).await.unwrap());
        // A different level is a different slot.
        assert!(s.create_referral(C, B, 2).await.unwrap());
    }

    #[tokio::test]
    async fn activate_and_mint_flips_pending_rows_with_their_rewards() {
        let (_dir, s) = storage().await;
        s.create_referral(A, B, 1).await.unwrap();
        s.create_referral(C, B, 2).await.unwrap();

        let rewards = vec![NewReward {
            reward_type: "activation_bonus".into(),
            amount: 10.0,
            recipient: B.into(),
            referred: None,
        }];
        assert_eq!(s.activate_and_mint(B, 12.5, &rewards).await.unwrap(), 2);
        // Second activation finds nothing pending and mints nothing more.
        assert_eq!(s.activate_and_mint(B, 99.0, &rewards).await.unwrap(), 0);

        let rows = s.list_referrals_by_referrer(A).await.unwrap();
        assert_eq!(rows[0].status, "active");
        assert_eq!(rows[0].cgc_earned, 12.5);
        assert!(rows[0].activated_at.is_some());
        let minted = s
            .list_rewards(B, &RewardFilter::default(), 10, 0)
            .await
            .unwrap();
        assert_eq!(minted.len(), 1);
    }

    #[tokio::test]
    async fn activation_mint_failure_rolls_back_the_flip() {
        let (_dir, s) = storage().await;
        s.create_referral(A, B, 1).await.unwrap();

        // SQLite stores NaN as NULL, so the second insert trips the NOT NULL
        // constraint on `amount` after the flip has already run.
        let rewards = vec![
            NewReward {
                reward_type: "activation_bonus".into(),
                amount: 10.0,
                recipient: B.into(),
                referred: None,
            },
            NewReward {
                reward_type: "direct_bonus".into(),
                amount: f64::NAN,
                recipient: A.into(),
                referred: Some(B.into()),
            },
        ];
        assert!(s.activate_and_mint(B, 12.5, &rewards).await.is_err());

        // Still pending, nothing minted: a retry can complete the activation.
        assert_eq!(s.list_pending_referrals(B).await.unwrap().len(), 1);
        let minted = s
            .list_rewards(B, &RewardFilter::default(), 10, 0)
            .await
            .unwrap();
        assert!(minted.is_empty());
    }

    #[tokio::test]
    async fn process_reward_writes_tx_fields_exactly_once() {
        let (_dir, s) = storage().await;
        let reward = s
            .create_reward(&NewReward {
                reward_type: "direct_bonus".into(),
                amount: 20.0,
                recipient: A.into(),
                referred: Some(B.into()),
            })
            .await
            .unwrap();

        let first = s.process_reward(&reward.id, "0xhash1", 100).await.unwrap();
        assert_eq!(first, ProcessOutcome::Processed);

        let second = s.process_reward(&reward.id, "0xhash2", 200).await.unwrap();
        assert_eq!(second, ProcessOutcome::AlreadyProcessed);

        let row = s.get_reward(&reward.id).await.unwrap().unwrap();
        assert_eq!(row.tx_hash.as_deref(), Some("0xhash1"));
        assert_eq!(row.block_number, Some(100));
        assert_eq!(row.status, "paid");
    }

    #[tokio::test]
    async fn process_unknown_reward_reports_not_found() {
        let (_dir, s) = storage().await;
        let outcome = s.process_reward("nope", "0x", 1).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::NotFound);
    }

    #[tokio::test]
    async fn mark_failed_is_terminal() {
        let (_dir, s) = storage().await;
        let reward = s
            .create_reward(&NewReward {
                reward_type: "signup_bonus".into(),
                amount: 25.0,
                recipient: A.into(),
                referred: None,
            })
            .await
            .unwrap();
        assert_eq!(
            s.mark_reward_failed(&reward.id, "transfer reverted")
                .await
                .unwrap(),
            ProcessOutcome::Processed
        );
        // A failed row cannot be paid afterwards.
        assert_eq!(
            s.process_reward(&reward.id, "0x", 1).await.unwrap(),
            ProcessOutcome::AlreadyProcessed
        );
        let row = s.get_reward(&reward.id).await.unwrap().unwrap();
        assert_eq!(row.status, "failed");
        assert_eq!(row.failure_reason.as_deref(), Some("transfer reverted"));
    }

    #[tokio::test]
    async fn duplicate_invite_claim_is_rejected_by_constraint() {
        let (_dir, s) = storage().await;
        s.create_invite("ABC123", A, None, None).await.unwrap();
        assert!(s.insert_invite_claim("ABC123", B, false, None).await.unwrap());
        assert!(!s.insert_invite_claim("ABC123", B, true, None).await.unwrap());
        assert_eq!(s.count_invite_claims("ABC123").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn approve_requires_voting_status() {
        let (_dir, s) = storage().await;
        let p = s
            .create_proposal("Title", "Desc", A, Some(10.0), None)
            .await
            .unwrap();
        // Still 'pending' — approval must refuse.
        let task = s
            .approve_and_convert(&p.id, "Title", "Desc", 10.0, None)
            .await
            .unwrap();
        assert!(task.is_none());
        assert_eq!(s.get_proposal(&p.id).await.unwrap().unwrap().status, "pending");

        assert!(s.start_voting(&p.id).await.unwrap());
        let task = s
            .approve_and_convert(&p.id, "Title", "Desc", 10.0, None)
            .await
            .unwrap()
            .unwrap();

        let p2 = s.get_proposal(&p.id).await.unwrap().unwrap();
        assert_eq!(p2.status, "converted");
        assert_eq!(p2.resulting_task_id.as_deref(), Some(task.id.as_str()));
        assert_eq!(task.proposal_id.as_deref(), Some(p.id.as_str()));
    }

    #[tokio::test]
    async fn complete_task_increments_collaborator_totals() {
        let (_dir, s) = storage().await;
        let t1 = s.create_task("T1", "d", 30.0, None).await.unwrap();
        let t2 = s.create_task("T2", "d", 12.0, None).await.unwrap();
        // Mixed-case assignee collapses to one collaborator row.
        assert!(s.assign_task(&t1.id, A).await.unwrap());
        assert!(s.assign_task(&t2.id, &A.to_uppercase().replace("0X", "0x")).await.unwrap());

        // The post-increment count comes back with each completion.
        let (_, count) = s.complete_task(&t1.id).await.unwrap().unwrap();
        assert_eq!(count, 1);
        let (_, count) = s.complete_task(&t2.id).await.unwrap().unwrap();
        assert_eq!(count, 2);
        // Completing twice is a no-op.
        assert!(s.complete_task(&t1.id).await.unwrap().is_none());

        let collab = s.get_collaborator(A).await.unwrap().unwrap();
        assert_eq!(collab.tasks_completed, 2);
        assert_eq!(collab.total_cgc_earned, 42.0);
    }

    #[tokio::test]
    async fn recompute_totals_matches_completed_tasks() {
        let (_dir, s) = storage().await;
        let t1 = s.create_task("T1", "d", 5.0, None).await.unwrap();
        let t2 = s.create_task("T2", "d", 7.0, None).await.unwrap();
        let open = s.create_task("T3", "d", 100.0, None).await.unwrap();
        s.assign_task(&t1.id, A).await.unwrap();
        s.assign_task(&t2.id, B).await.unwrap();
        s.assign_task(&open.id, B).await.unwrap();
        s.complete_task(&t1.id).await.unwrap();
        s.complete_task(&t2.id).await.unwrap();

        let totals = s.recompute_totals().await.unwrap();
        assert_eq!(totals.len(), 2);
        let a = totals.iter().find(|t| t.wallet == A).unwrap();
        assert_eq!(a.total_cgc_earned, 5.0);
        assert_eq!(a.tasks_completed, 1);
        // The still-assigned task does not count.
        let b = totals.iter().find(|t| t.wallet == B).unwrap();
        assert_eq!(b.total_cgc_earned, 7.0);
    }

    #[tokio::test]
    async fn reward_summary_covers_full_filtered_set() {
        let (_dir, s) = storage().await;
        for amount in [1.0, 2.0, 4.0] {
            s.create_reward(&NewReward {
                reward_type: "direct_bonus".into(),
                amount,
                recipient: A.into(),
                referred: None,
            })
            .await
            .unwrap();
        }
        let paid = s
            .create_reward(&NewReward {
                reward_type: "signup_bonus".into(),
                amount: 25.0,
                recipient: A.into(),
                referred: None,
            })
            .await
            .unwrap();
        s.process_reward(&paid.id, "0xabc", 1).await.unwrap();

        // A one-row page must not shrink the summary.
        let page = s
            .list_rewards(A, &RewardFilter::default(), 1, 0)
            .await
            .unwrap();
        assert_eq!(page.len(), 1);

        let summary = s.reward_summary(A, &RewardFilter::default()).await.unwrap();
        assert_eq!(summary.total_count, 4);
        assert_eq!(summary.pending_count, 3);
        assert_eq!(summary.paid_count, 1);
        assert_eq!(summary.pending_amount, 7.0);
        assert_eq!(summary.paid_amount, 25.0);
        assert_eq!(summary.by_type.len(), 2);
    }
}
