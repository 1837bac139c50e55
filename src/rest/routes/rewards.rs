use axum::{
    extract::{Query, State},
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
pub struct HistoryQuery {
    pub wallet: String,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub reward_type: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Admin reward actions share one endpoint, dispatched on `action`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminActionRequest {
    pub admin_wallet: String,
    /// `get_pending` | `process_single` | `process_batch` | `mark_failed`
    pub action: String,
    pub reward_id: Option<String>,
    pub reward_ids: Option<Vec<String>>,
    pub tx_hash: Option<String>,
    pub block_number: Option<i64>,
    pub reason: Option<String>,
    pub limit: Option<i64>,
}

pub async fn history(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    let page = ctx
        .rewards
        .history(
            &query.wallet,
            query.status.as_deref(),
            query.reward_type.as_deref(),
            query.limit,
            query.offset,
        )
        .await?;
    Ok(ok(page))
}

pub async fn admin_action(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<AdminActionRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&ctx, &body.admin_wallet).await?;

    match body.action.as_str() {
        "get_pending" => Ok(ok(ctx.rewards.pending(body.limit).await?)),
        "process_single" => {
            let id = body
                .reward_id
                .as_deref()
                .ok_or_else(|| ApiError::validation("rewardId is required"))?;
            let tx_hash = body
                .tx_hash
                .as_deref()
                .ok_or_else(|| ApiError::validation("txHash is required"))?;
            let block = body
                .block_number
                .ok_or_else(|| ApiError::validation("blockNumber is required"))?;
            Ok(ok(ctx.rewards.process_single(id, tx_hash, block).await?))
        }
        "process_batch" => {
            let ids = body
                .reward_ids
                .as_deref()
                .ok_or_else(|| ApiError::validation("rewardIds is required"))?;
            let tx_hash = body
                .tx_hash
                .as_deref()
                .ok_or_else(|| ApiError::validation("txHash is required"))?;
            let block = body
                .block_number
                .ok_or_else(|| ApiError::validation("blockNumber is required"))?;
            Ok(ok(ctx.rewards.process_batch(ids, tx_hash, block).await?))
        }
        "mark_failed" => {
            let id = body
                .reward_id
                .as_deref()
                .ok_or_else(|| ApiError::validation("rewardId is required"))?;
            let reason = body
                .reason
                .as_deref()
                .ok_or_else(|| ApiError::validation("reason is required"))?;
            Ok(ok(ctx.rewards.fail(id, reason).await?))
        }
        _ => Err(ApiError::validation(
            "action must be 'get_pending', 'process_single', 'process_batch' or 'mark_failed'",
        )),
    }
}
