use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::error::ApiError;
use crate::rest::ok;
use crate::AppContext;

use super::require_admin;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitProposalRequest {
    pub title: String,
    pub description: String,
    pub wallet: String,
    pub reward: Option<f64>,
    pub complexity: Option<i64>,
}

#[derive(Deserialize)]
pub struct ListProposalsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecideProposalRequest {
    pub proposal_id: String,
    /// `start_voting` | `approve` | `reject`
    pub action: String,
    pub approver_wallet: String,
    pub reward: Option<f64>,
    pub complexity: Option<i64>,
    pub reason: Option<String>,
}

pub async fn submit(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<SubmitProposalRequest>,
) -> Result<Json<Value>, ApiError> {
    let proposal = ctx
        .proposals
        .submit(
            &body.title,
            &body.description,
            &body.wallet,
            body.reward,
            body.complexity,
        )
        .await?;
    Ok(ok(proposal))
}

pub async fn list(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<ListProposalsQuery>,
) -> Result<Json<Value>, ApiError> {
    let proposals = ctx
        .proposals
        .list(query.status.as_deref(), query.limit)
        .await?;
    Ok(ok(proposals))
}

pub async fn get(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    Ok(ok(ctx.proposals.get(&id).await?))
}

/// Admin decision endpoint: moves a proposal through its lifecycle.
pub async fn decide(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<DecideProposalRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&ctx, &body.approver_wallet).await?;

    match body.action.as_str() {
        "start_voting" => Ok(ok(ctx.proposals.start_voting(&body.proposal_id).await?)),
        "approve" => Ok(ok(ctx
            .proposals
            .approve(&body.proposal_id, body.reward, body.complexity)
            .await?)),
        "reject" => {
            let reason = body.reason.as_deref().unwrap_or_default();
            Ok(ok(ctx.proposals.reject(&body.proposal_id, reason).await?))
        }
        _ => Err(ApiError::validation(
            "action must be 'start_voting', 'approve' or 'reject'",
        )),
    }
}
