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
pub struct ActivateQuery {
    pub wallet: String,
}

#[derive(Deserialize)]
pub struct ActivateRequest {
    pub wallet: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInviteRequest {
    pub admin_wallet: String,
    pub referrer_wallet: String,
    pub code: Option<String>,
    pub max_claims: Option<i64>,
    pub expires_at: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimInviteRequest {
    pub code: String,
    pub claimed_by: String,
    pub user_profile: Option<Value>,
    pub education_score: Option<i64>,
}

pub async fn activate_get(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<ActivateQuery>,
) -> Result<Json<Value>, ApiError> {
    Ok(ok(ctx.activation.check_and_activate(&query.wallet).await?))
}

pub async fn activate_post(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<ActivateRequest>,
) -> Result<Json<Value>, ApiError> {
    Ok(ok(ctx.activation.check_and_activate(&body.wallet).await?))
}

pub async fn create_invite(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<CreateInviteRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&ctx, &body.admin_wallet).await?;
    let invite = ctx
        .invites
        .create(
            body.code,
            &body.referrer_wallet,
            body.max_claims,
            body.expires_at,
        )
        .await?;
    Ok(ok(invite))
}

pub async fn claim_invite(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<ClaimInviteRequest>,
) -> Result<Json<Value>, ApiError> {
    // The claim row keeps the raw submission for later audits.
    let metadata = body.user_profile.as_ref().map(|profile| {
        serde_json::json!({
            "userProfile": profile,
            "educationScore": body.education_score,
        })
        .to_string()
    });
    let result = ctx
        .invites
        .claim(
            &body.code,
            &body.claimed_by,
            body.education_score.is_some(),
            metadata.as_deref(),
        )
        .await?;
    Ok(ok(result))
}
