//! The public REST API.
//!
//! Every response is wrapped in the `{success, data|error}` envelope; error
//! mapping lives in [`crate::error::ApiError`]. The router is built apart
//! from the listener so integration tests can drive it in-process.
//!
//! Endpoints:
//!   GET  /api/v1/health
//!   GET/POST /api/v1/grants, GET/PUT/DELETE /api/v1/grants/{id}
//!   GET/POST /api/v1/proposals, GET /api/v1/proposals/{id}
//!   POST /api/v1/proposals/approve
//!   GET/POST /api/v1/referrals/activate
//!   POST /api/v1/referrals/invites, POST /api/v1/referrals/invites/claim
//!   GET/POST /api/v1/referrals/rewards
//!   GET/POST /api/v1/tasks, POST /api/v1/tasks/{id}/assign|complete
//!   GET  /api/v1/collaborators
//!   GET/POST /api/v1/collaborators/sync (GET reports drift, POST repairs)

pub mod ratelimit;
pub mod routes;

use anyhow::Result;
use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::AppContext;

/// Wrap a payload in the success envelope.
pub fn ok(data: impl Serialize) -> Json<Value> {
    Json(json!({ "success": true, "data": data }))
}

pub async fn start_rest_server(ctx: Arc<AppContext>) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", ctx.config.bind_address, ctx.config.port).parse()?;
    let router = build_router(ctx);

    info!("REST API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        // Health (never rate limited below the middleware order)
        .route("/api/v1/health", get(routes::health::health))
        // Grants
        .route(
            "/api/v1/grants",
            get(routes::grants::list).post(routes::grants::create),
        )
        .route(
            "/api/v1/grants/{id}",
            get(routes::grants::get)
                .put(routes::grants::update)
                .delete(routes::grants::withdraw),
        )
        // Proposals
        .route(
            "/api/v1/proposals",
            get(routes::proposals::list).post(routes::proposals::submit),
        )
        .route("/api/v1/proposals/{id}", get(routes::proposals::get))
        .route("/api/v1/proposals/approve", post(routes::proposals::decide))
        // Referrals
        .route(
            "/api/v1/referrals/activate",
            get(routes::referrals::activate_get).post(routes::referrals::activate_post),
        )
        .route(
            "/api/v1/referrals/invites",
            post(routes::referrals::create_invite),
        )
        .route(
            "/api/v1/referrals/invites/claim",
            post(routes::referrals::claim_invite),
        )
        .route(
            "/api/v1/referrals/rewards",
            get(routes::rewards::history).post(routes::rewards::admin_action),
        )
        // Tasks
        .route(
            "/api/v1/tasks",
            get(routes::tasks::list).post(routes::tasks::create),
        )
        .route("/api/v1/tasks/{id}/assign", post(routes::tasks::assign))
        .route("/api/v1/tasks/{id}/complete", post(routes::tasks::complete))
        // Collaborators
        .route(
            "/api/v1/collaborators",
            get(routes::collaborators::leaderboard),
        )
        .route(
            "/api/v1/collaborators/sync",
            get(routes::collaborators::report).post(routes::collaborators::sync),
        )
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            ratelimit::ip_rate_limit,
        ))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}
