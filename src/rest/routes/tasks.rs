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
pub struct CreateTaskRequest {
    pub admin_wallet: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub reward: f64,
    pub complexity: Option<i64>,
}

#[derive(Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignTaskRequest {
    pub wallet: String,
}

pub async fn create(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<CreateTaskRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&ctx, &body.admin_wallet).await?;
    let task = ctx
        .tasks
        .create(&body.title, &body.description, body.reward, body.complexity)
        .await?;
    Ok(ok(task))
}

pub async fn list(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Value>, ApiError> {
    Ok(ok(ctx.tasks.list(query.status.as_deref(), query.limit).await?))
}

pub async fn assign(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    Json(body): Json<AssignTaskRequest>,
) -> Result<Json<Value>, ApiError> {
    Ok(ok(ctx.tasks.assign(&id, &body.wallet).await?))
}

pub async fn complete(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    Ok(ok(ctx.tasks.complete(&id).await?))
}
