//! The proposal state machine.
//!
//! `pending → voting → approved | rejected`, with an approved proposal
//! converted into an open task in the same database transaction. Every
//! transition is a guarded conditional update, so two admins racing on the
//! same proposal produce exactly one winner.

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::notify::{Notifier, OutboundEvent};
use crate::storage::{ProposalRow, Storage, TaskRow};
use crate::wallet;

const TITLE_MAX: usize = 200;
const DESCRIPTION_MAX: usize = 10_000;

#[derive(Debug, Clone, Serialize)]
pub struct ApprovedProposal {
    pub proposal: ProposalRow,
    pub task: TaskRow,
}

pub struct ProposalEngine {
    storage: Arc<Storage>,
    notifier: Notifier,
}

impl ProposalEngine {
    pub fn new(storage: Arc<Storage>, notifier: Notifier) -> Self {
        Self { storage, notifier }
    }

    pub async fn submit(
        &self,
        title: &str,
        description: &str,
        proposer_wallet: &str,
        reward: Option<f64>,
        complexity: Option<i64>,
    ) -> Result<ProposalRow, ApiError> {
        let proposer = wallet::normalize(proposer_wallet)
            .ok_or_else(|| ApiError::validation("invalid proposer wallet"))?;
        let title = title.trim();
        let description = description.trim();
        if title.is_empty() || title.len() > TITLE_MAX {
            return Err(ApiError::validation("title must be 1-200 characters"));
        }
        if description.is_empty() || description.len() > DESCRIPTION_MAX {
            return Err(ApiError::validation("description must be 1-10000 characters"));
        }
        if reward.is_some_and(|r| r <= 0.0 || !r.is_finite()) {
            return Err(ApiError::validation("reward must be a positive number"));
        }
        if complexity.is_some_and(|c| !(1..=10).contains(&c)) {
            return Err(ApiError::validation("complexity must be between 1 and 10"));
        }

        let row = self
            .storage
            .create_proposal(title, description, &proposer, reward, complexity)
            .await?;
        info!(proposal = %row.id, proposer = %proposer, "proposal submitted");
        self.notifier.send(OutboundEvent::new(
            "proposal_submitted",
            format!("New proposal \"{title}\" submitted by {proposer}"),
        ));
        Ok(row)
    }

    pub async fn get(&self, id: &str) -> Result<ProposalRow, ApiError> {
        self.storage
            .get_proposal(id)
            .await?
            .ok_or_else(|| ApiError::not_found("proposal not found"))
    }

    pub async fn list(
        &self,
        status: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<ProposalRow>, ApiError> {
        if let Some(status) = status {
            if !matches!(
                status,
                "pending" | "voting" | "approved" | "rejected" | "converted"
            ) {
                return Err(ApiError::validation("unknown proposal status"));
            }
        }
        Ok(self
            .storage
            .list_proposals(status, limit.unwrap_or(100).clamp(1, 500))
            .await?)
    }

    /// Open voting on a pending proposal.
    pub async fn start_voting(&self, id: &str) -> Result<ProposalRow, ApiError> {
        if !self.storage.start_voting(id).await? {
            return match self.storage.get_proposal(id).await? {
                Some(row) => Err(ApiError::validation(&format!(
                    "proposal is '{}', only pending proposals can open voting",
                    row.status
                ))),
                None => Err(ApiError::not_found("proposal not found")),
            };
        }
        let row = self.get(id).await?;
        info!(proposal = %id, "voting opened");
        self.notifier.send(OutboundEvent::new(
            "proposal_voting",
            format!("Voting opened on proposal \"{}\"", row.title),
        ));
        Ok(row)
    }

    /// Approve a voting proposal and convert it into an open task.
    ///
    /// The claim to `approved`, the task insert, and the flip to `converted`
    /// are one transaction: either the caller gets back a task or the
    /// proposal is untouched.
    pub async fn approve(
        &self,
        id: &str,
        reward_override: Option<f64>,
        complexity_override: Option<i64>,
    ) -> Result<ApprovedProposal, ApiError> {
        let proposal = self.get(id).await?;
        if proposal.status != "voting" {
            return Err(ApiError::validation(&format!(
                "proposal is '{}', only voting proposals can be approved",
                proposal.status
            )));
        }
        if reward_override.is_some_and(|r| r <= 0.0 || !r.is_finite()) {
            return Err(ApiError::validation("reward must be a positive number"));
        }
        let reward = reward_override
            .or(proposal.reward)
            .ok_or_else(|| ApiError::validation("proposal has no reward amount set"))?;
        let complexity = complexity_override.or(proposal.complexity);

        let task = self
            .storage
            .approve_and_convert(id, &proposal.title, &proposal.description, reward, complexity)
            .await?
            // The guarded claim lost to a concurrent approve or reject.
            .ok_or_else(|| ApiError::validation("proposal was decided concurrently"))?;

        let proposal = self.get(id).await?;
        info!(proposal = %id, task = %task.id, reward, "proposal approved and converted");
        self.notifier.send(OutboundEvent::new(
            "proposal_approved",
            format!(
                "Proposal \"{}\" approved — task created with {reward} CGC reward",
                proposal.title
            ),
        ));
        Ok(ApprovedProposal { proposal, task })
    }

    /// Reject a voting proposal. The reason is mandatory and recorded.
    pub async fn reject(&self, id: &str, reason: &str) -> Result<ProposalRow, ApiError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ApiError::validation("rejection reason is required"));
        }
        if !self.storage.reject_proposal(id, reason).await? {
            return match self.storage.get_proposal(id).await? {
                Some(row) => Err(ApiError::validation(&format!(
                    "proposal is '{}', only voting proposals can be rejected",
                    row.status
                ))),
                None => Err(ApiError::not_found("proposal not found")),
            };
        }
        let row = self.get(id).await?;
        info!(proposal = %id, "proposal rejected");
        self.notifier.send(OutboundEvent::new(
            "proposal_rejected",
            format!("Proposal \"{}\" rejected: {reason}", row.title),
        ));
        Ok(row)
    }
}
