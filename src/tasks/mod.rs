//! The task board.
//!
//! Tasks are `open → assigned → completed`. Completion is the earning event:
//! the assignee's collaborator totals are bumped in the same transaction as
//! the status flip, and a milestone bonus is minted when the new task count
//! lands on a threshold.

use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::notify::{Notifier, OutboundEvent};
use crate::rewards::RewardLedger;
use crate::storage::{Storage, TaskRow};
use crate::wallet;

pub struct TaskBoard {
    storage: Arc<Storage>,
    ledger: Arc<RewardLedger>,
    notifier: Notifier,
}

impl TaskBoard {
    pub fn new(storage: Arc<Storage>, ledger: Arc<RewardLedger>, notifier: Notifier) -> Self {
        Self {
            storage,
            ledger,
            notifier,
        }
    }

    pub async fn create(
        &self,
        title: &str,
        description: &str,
        reward: f64,
        complexity: Option<i64>,
    ) -> Result<TaskRow, ApiError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ApiError::validation("title is required"));
        }
        if reward <= 0.0 || !reward.is_finite() {
            return Err(ApiError::validation("reward must be a positive number"));
        }
        Ok(self
            .storage
            .create_task(title, description.trim(), reward, complexity)
            .await?)
    }

    pub async fn get(&self, id: &str) -> Result<TaskRow, ApiError> {
        self.storage
            .get_task(id)
            .await?
            .ok_or_else(|| ApiError::not_found("task not found"))
    }

    pub async fn list(
        &self,
        status: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<TaskRow>, ApiError> {
        if let Some(status) = status {
            if !matches!(status, "open" | "assigned" | "completed") {
                return Err(ApiError::validation("unknown task status"));
            }
        }
        Ok(self
            .storage
            .list_tasks(status, limit.unwrap_or(100).clamp(1, 500))
            .await?)
    }

    /// Assign an open task to a wallet.
    pub async fn assign(&self, id: &str, assignee: &str) -> Result<TaskRow, ApiError> {
        let assignee = wallet::normalize(assignee)
            .ok_or_else(|| ApiError::validation("invalid assignee wallet"))?;
        if !self.storage.assign_task(id, &assignee).await? {
            return match self.storage.get_task(id).await? {
                Some(row) => Err(ApiError::validation(&format!(
                    "task is '{}', only open tasks can be assigned",
                    row.status
                ))),
                None => Err(ApiError::not_found("task not found")),
            };
        }
        info!(task = %id, assignee = %assignee, "task assigned");
        self.get(id).await
    }

    /// Complete an assigned task: flip the status, credit the assignee's
    /// totals, and mint any milestone bonus the new count reaches.
    pub async fn complete(&self, id: &str) -> Result<TaskRow, ApiError> {
        let Some((task, tasks_completed)) = self.storage.complete_task(id).await? else {
            return match self.storage.get_task(id).await? {
                Some(row) => Err(ApiError::validation(&format!(
                    "task is '{}', only assigned tasks can be completed",
                    row.status
                ))),
                None => Err(ApiError::not_found("task not found")),
            };
        };

        if let Some(assignee) = task.assignee_wallet.as_deref() {
            let assignee = assignee.to_ascii_lowercase();
            // The count came from the completion's own transaction, so each
            // concurrent completion sees a distinct count and exactly one of
            // them lands on any given milestone.
            self.ledger
                .maybe_mint_milestone(&assignee, tasks_completed)
                .await?;
            info!(task = %id, assignee = %assignee, reward = task.reward, "task completed");
            self.notifier.send(OutboundEvent::new(
                "task_completed",
                format!(
                    "Task \"{}\" completed by {assignee} ({} CGC)",
                    task.title, task.reward
                ),
            ));
        }
        Ok(task)
    }
}
