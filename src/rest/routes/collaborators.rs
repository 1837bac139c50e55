use axum::{extract::State, Json};
use serde_json::Value;
use std::sync::Arc;

use crate::error::ApiError;
use crate::rest::ok;
use crate::AppContext;

/// GET /collaborators: the current leaderboard, stored totals as-is.
pub async fn leaderboard(State(ctx): State<Arc<AppContext>>) -> Result<Json<Value>, ApiError> {
    Ok(ok(ctx.stats.leaderboard().await?))
}

/// GET /collaborators/sync: read-only drift report, mutates nothing.
pub async fn report(State(ctx): State<Arc<AppContext>>) -> Result<Json<Value>, ApiError> {
    Ok(ok(ctx.stats.report().await?))
}

/// POST /collaborators/sync: full re-scan repair; returns what drifted.
pub async fn sync(State(ctx): State<Arc<AppContext>>) -> Result<Json<Value>, ApiError> {
    Ok(ok(ctx.stats.sync().await?))
}
