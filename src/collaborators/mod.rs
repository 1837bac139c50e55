//! Collaborator statistics.
//!
//! The incremental path lives in task completion; this module is the repair
//! tool. A sync re-scans every completed task, rewrites each collaborator's
//! totals from scratch, and reports where the stored numbers had drifted.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::storage::{CollaboratorRow, ComputedTotals, Storage};
use crate::wallet;

#[derive(Debug, Clone, Serialize)]
pub struct Discrepancy {
    pub wallet: String,
    pub stored_cgc: f64,
    pub expected_cgc: f64,
    pub stored_tasks: i64,
    pub expected_tasks: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub wallets_scanned: usize,
    pub discrepancies: Vec<Discrepancy>,
}

pub struct StatsAggregator {
    storage: Arc<Storage>,
}

impl StatsAggregator {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub async fn get(&self, raw_wallet: &str) -> Result<CollaboratorRow, ApiError> {
        let wallet = wallet::normalize(raw_wallet)
            .ok_or_else(|| ApiError::validation("invalid wallet address"))?;
        self.storage
            .get_collaborator(&wallet)
            .await?
            .ok_or_else(|| ApiError::not_found("collaborator not found"))
    }

    pub async fn leaderboard(&self) -> Result<Vec<CollaboratorRow>, ApiError> {
        Ok(self.storage.list_collaborators().await?)
    }

    /// Read-only audit: recompute expected totals from completed tasks and
    /// report where the stored counters have drifted, without touching a row.
    pub async fn report(&self) -> Result<SyncReport, ApiError> {
        let expected = self.storage.recompute_totals().await?;
        let discrepancies = self.diff_against_stored(&expected).await?;
        Ok(SyncReport {
            wallets_scanned: expected.len(),
            discrepancies,
        })
    }

    /// Full re-scan repair: recompute expected totals from completed tasks
    /// and overwrite every collaborator row with them.
    ///
    /// Comparison runs before the overwrite so the report shows what the
    /// incremental counters had drifted to, not the corrected values.
    pub async fn sync(&self) -> Result<SyncReport, ApiError> {
        let expected = self.storage.recompute_totals().await?;
        let discrepancies = self.diff_against_stored(&expected).await?;

        for totals in &expected {
            self.storage
                .upsert_collaborator_totals(
                    &totals.wallet,
                    totals.total_cgc_earned,
                    totals.tasks_completed,
                )
                .await?;
        }

        info!(
            wallets = expected.len(),
            drifted = discrepancies.len(),
            "collaborator stats synced"
        );
        Ok(SyncReport {
            wallets_scanned: expected.len(),
            discrepancies,
        })
    }

    async fn diff_against_stored(
        &self,
        expected: &[ComputedTotals],
    ) -> Result<Vec<Discrepancy>, ApiError> {
        let mut discrepancies = Vec::new();
        for totals in expected {
            let stored = self.storage.get_collaborator(&totals.wallet).await?;
            let (stored_cgc, stored_tasks) = stored
                .map(|c| (c.total_cgc_earned, c.tasks_completed))
                .unwrap_or((0.0, 0));
            if (stored_cgc - totals.total_cgc_earned).abs() > f64::EPSILON
                || stored_tasks != totals.tasks_completed
            {
                warn!(
                    wallet = %totals.wallet,
                    stored_cgc,
                    expected_cgc = totals.total_cgc_earned,
                    "collaborator totals drifted"
                );
                discrepancies.push(Discrepancy {
                    wallet: totals.wallet.clone(),
                    stored_cgc,
                    expected_cgc: totals.total_cgc_earned,
                    stored_tasks,
                    expected_tasks: totals.tasks_completed,
                });
            }
        }
        Ok(discrepancies)
    }
}
