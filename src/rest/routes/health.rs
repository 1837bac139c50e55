use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::error;

use crate::error::ApiError;
use crate::rest::ok;
use crate::AppContext;

/// Liveness check. Pings the database so a wedged store reports 503
/// instead of a hollow "ok".
pub async fn health(State(ctx): State<Arc<AppContext>>) -> Result<Json<Value>, ApiError> {
    if let Err(e) = ctx.storage.ping().await {
        error!(err = ?e, "health check database ping failed");
        return Err(ApiError::Unavailable("database unreachable".into()));
    }
    Ok(ok(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": ctx.started_at.elapsed().as_secs(),
    })))
}
