//! Grant applications.
//!
//! Plain CRUD with a small status vocabulary; the interesting part is the
//! editing rule: an application can only be modified or withdrawn while it is
//! still `submitted`.

use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::storage::{GrantRow, Storage};
use crate::wallet;

const TITLE_MAX: usize = 200;

pub struct GrantDesk {
    storage: Arc<Storage>,
}

impl GrantDesk {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub async fn apply(
        &self,
        applicant_wallet: &str,
        title: &str,
        description: &str,
        amount: f64,
    ) -> Result<GrantRow, ApiError> {
        let applicant = wallet::normalize(applicant_wallet)
            .ok_or_else(|| ApiError::validation("invalid applicant wallet"))?;
        let title = title.trim();
        if title.is_empty() || title.len() > TITLE_MAX {
            return Err(ApiError::validation("title must be 1-200 characters"));
        }
        if amount <= 0.0 || !amount.is_finite() {
            return Err(ApiError::validation("amount must be a positive number"));
        }
        let row = self
            .storage
            .create_grant(&applicant, title, description.trim(), amount)
            .await?;
        info!(grant = %row.id, applicant = %applicant, amount, "grant application created");
        Ok(row)
    }

    pub async fn get(&self, id: &str) -> Result<GrantRow, ApiError> {
        self.storage
            .get_grant(id)
            .await?
            .ok_or_else(|| ApiError::not_found("grant not found"))
    }

    pub async fn list(
        &self,
        applicant: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<GrantRow>, ApiError> {
        let applicant = match applicant {
            Some(raw) => Some(
                wallet::normalize(raw)
                    .ok_or_else(|| ApiError::validation("invalid applicant wallet"))?,
            ),
            None => None,
        };
        Ok(self
            .storage
            .list_grants(applicant.as_deref(), limit.unwrap_or(100).clamp(1, 500))
            .await?)
    }

    /// Edit an application. Only the applicant may edit, and only while the
    /// application is still `submitted`.
    pub async fn update(
        &self,
        id: &str,
        caller_wallet: &str,
        title: &str,
        description: &str,
        amount: f64,
    ) -> Result<GrantRow, ApiError> {
        let caller = wallet::normalize(caller_wallet)
            .ok_or_else(|| ApiError::validation("invalid wallet address"))?;
        let grant = self.get(id).await?;
        if grant.applicant_wallet != caller {
            return Err(ApiError::forbidden("only the applicant can edit a grant"));
        }
        if grant.status != "submitted" {
            return Err(ApiError::validation(&format!(
                "grant is '{}', only submitted applications can be edited",
                grant.status
            )));
        }
        let title = title.trim();
        if title.is_empty() || title.len() > TITLE_MAX {
            return Err(ApiError::validation("title must be 1-200 characters"));
        }
        if amount <= 0.0 || !amount.is_finite() {
            return Err(ApiError::validation("amount must be a positive number"));
        }
        if !self
            .storage
            .update_grant(id, title, description.trim(), amount)
            .await?
        {
            return Err(ApiError::not_found("grant not found"));
        }
        self.get(id).await
    }

    /// Admin review transition.
    pub async fn review(&self, id: &str, status: &str) -> Result<GrantRow, ApiError> {
        if !matches!(status, "under_review" | "approved" | "rejected") {
            return Err(ApiError::validation(
                "status must be 'under_review', 'approved' or 'rejected'",
            ));
        }
        if !self.storage.set_grant_status(id, status).await? {
            return Err(ApiError::not_found("grant not found"));
        }
        info!(grant = %id, status, "grant status updated");
        self.get(id).await
    }

    /// Withdraw a submitted application. Applicant only.
    pub async fn withdraw(&self, id: &str, caller_wallet: &str) -> Result<(), ApiError> {
        let caller = wallet::normalize(caller_wallet)
            .ok_or_else(|| ApiError::validation("invalid wallet address"))?;
        let grant = self.get(id).await?;
        if grant.applicant_wallet != caller {
            return Err(ApiError::forbidden(
                "only the applicant can withdraw a grant",
            ));
        }
        if grant.status != "submitted" {
            return Err(ApiError::validation(&format!(
                "grant is '{}', only submitted applications can be withdrawn",
                grant.status
            )));
        }
        if !self.storage.delete_grant(id).await? {
            return Err(ApiError::not_found("grant not found"));
        }
        info!(grant = %id, "grant application withdrawn");
        Ok(())
    }
}
