use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::error::ApiError;
use crate::rest::ok;
use crate::wallet;
use crate::AppContext;

use super::require_admin;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGrantRequest {
    pub wallet: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub amount: f64,
}

#[derive(Deserialize)]
pub struct ListGrantsQuery {
    pub wallet: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGrantRequest {
    pub wallet: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub amount: Option<f64>,
    /// Admin-only review transition; mutually exclusive with the edit fields.
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct WithdrawQuery {
    pub wallet: String,
}

fn check_allow_list(ctx: &AppContext, raw_wallet: &str) -> Result<String, ApiError> {
    let wallet = wallet::normalize(raw_wallet)
        .ok_or_else(|| ApiError::validation("invalid wallet address"))?;
    if !ctx.grant_allow_list.permits(&wallet) {
        return Err(ApiError::forbidden("wallet is not allowed to manage grants"));
    }
    Ok(wallet)
}

pub async fn create(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<CreateGrantRequest>,
) -> Result<Json<Value>, ApiError> {
    let applicant = check_allow_list(&ctx, &body.wallet)?;
    let grant = ctx
        .grants
        .apply(&applicant, &body.title, &body.description, body.amount)
        .await?;
    Ok(ok(grant))
}

pub async fn list(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<ListGrantsQuery>,
) -> Result<Json<Value>, ApiError> {
    let grants = ctx.grants.list(query.wallet.as_deref(), query.limit).await?;
    Ok(ok(grants))
}

pub async fn get(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    Ok(ok(ctx.grants.get(&id).await?))
}

pub async fn update(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateGrantRequest>,
) -> Result<Json<Value>, ApiError> {
    // A status change is the admin review path; everything else is an
    // applicant edit of a still-submitted application.
    if let Some(status) = &body.status {
        require_admin(&ctx, &body.wallet).await?;
        return Ok(ok(ctx.grants.review(&id, status).await?));
    }

    let caller = check_allow_list(&ctx, &body.wallet)?;
    let current = ctx.grants.get(&id).await?;
    let grant = ctx
        .grants
        .update(
            &id,
            &caller,
            body.title.as_deref().unwrap_or(&current.title),
            body.description.as_deref().unwrap_or(&current.description),
            body.amount.unwrap_or(current.amount),
        )
        .await?;
    Ok(ok(grant))
}

pub async fn withdraw(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    Query(query): Query<WithdrawQuery>,
) -> Result<Json<Value>, ApiError> {
    let caller = check_allow_list(&ctx, &query.wallet)?;
    ctx.grants.withdraw(&id, &caller).await?;
    Ok(ok(serde_json::json!({ "deleted": true })))
}
