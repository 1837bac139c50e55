//! Per-IP sliding-window rate limiting.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::AppContext;

/// A sliding-window counter.
pub struct SlidingWindow {
    window_secs: u64,
    max_count: u64,
    events: VecDeque<DateTime<Utc>>,
}

impl SlidingWindow {
    pub fn new(window_secs: u64, max_count: u64) -> Self {
        Self {
            window_secs,
            max_count,
            events: VecDeque::new(),
        }
    }

    /// Discard events older than the window boundary.
    fn evict(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::seconds(self.window_secs as i64);
        while self.events.front().is_some_and(|t| *t <= cutoff) {
            self.events.pop_front();
        }
    }

    pub fn record_event(&mut self, at: DateTime<Utc>) {
        self.evict(at);
        self.events.push_back(at);
    }

    pub fn count_in_window(&mut self, now: DateTime<Utc>) -> u64 {
        self.evict(now);
        self.events.len() as u64
    }

    pub fn is_limited(&mut self, now: DateTime<Utc>) -> bool {
        self.count_in_window(now) >= self.max_count
    }
}

/// Per-client-IP request limiter over a one-minute window.
pub struct IpRateLimiter {
    max_per_minute: u64,
    windows: Mutex<HashMap<IpAddr, SlidingWindow>>,
}

impl IpRateLimiter {
    pub fn new(max_per_minute: u32) -> Self {
        Self {
            max_per_minute: max_per_minute as u64,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Record one request from `ip`. Returns `false` when the window is full.
    /// A zero budget disables limiting entirely.
    pub async fn allow(&self, ip: IpAddr) -> bool {
        if self.max_per_minute == 0 {
            return true;
        }
        let now = Utc::now();
        let mut map = self.windows.lock().await;
        // Bound memory across many one-off clients.
        if map.len() > 10_000 {
            map.retain(|_, w| w.count_in_window(now) > 0);
        }
        let window = map
            .entry(ip)
            .or_insert_with(|| SlidingWindow::new(60, self.max_per_minute));
        if window.is_limited(now) {
            return false;
        }
        window.record_event(now);
        true
    }
}

pub async fn ip_rate_limit(
    State(ctx): State<Arc<AppContext>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if !ctx.rate_limiter.allow(addr.ip()).await {
        warn!(ip = %addr.ip(), "rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "success": false, "error": "rate limit exceeded" })),
        )
            .into_response();
    }
    next.run(request).await
}
