//! Best-effort outbound announcements.
//!
//! Discord webhook delivery is at-most-once: one send attempt per event, no
//! retry, and a failed send is appended to the `dead_letters` table instead
//! of vanishing into a swallowed promise. Delivery never blocks or fails the
//! request that produced the event.

use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::storage::Storage;

const QUEUE_DEPTH: usize = 200;

#[derive(Debug, Clone)]
pub struct OutboundEvent {
    /// Short machine-readable kind, e.g. "proposal_approved".
    pub kind: String,
    /// Human-readable message posted to the webhook.
    pub content: String,
}

impl OutboundEvent {
    pub fn new(kind: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            content: content.into(),
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<OutboundEvent>,
}

impl Notifier {
    /// Queue an event. Never blocks — drops silently if the queue is full.
    pub fn send(&self, event: OutboundEvent) {
        let _ = self.tx.try_send(event);
    }
}

/// Spawn the background delivery task and return its handle.
///
/// With no webhook configured, events are accepted and dropped at debug
/// level — callers never need to know whether announcements are on.
pub fn spawn(webhook_url: Option<String>, storage: Arc<Storage>) -> Notifier {
    let (tx, mut rx) = mpsc::channel::<OutboundEvent>(QUEUE_DEPTH);

    tokio::spawn(async move {
        let client = reqwest::Client::new();
        while let Some(event) = rx.recv().await {
            let url = match &webhook_url {
                Some(url) => url,
                None => {
                    debug!(kind = %event.kind, "no webhook configured — dropping announcement");
                    continue;
                }
            };
            if let Err(e) = deliver(&client, url, &event).await {
                warn!(kind = %event.kind, err = %e, "webhook delivery failed — dead-lettering");
                if let Err(db_err) = storage
                    .append_dead_letter(&event.kind, &event.content, &e)
                    .await
                {
                    warn!(err = ?db_err, "dead letter write failed");
                }
            }
        }
    });

    Notifier { tx }
}

async fn deliver(
    client: &reqwest::Client,
    url: &str,
    event: &OutboundEvent,
) -> Result<(), String> {
    let response = client
        .post(url)
        .json(&json!({ "content": event.content }))
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if response.status().is_success() {
        Ok(())
    } else {
        Err(format!("webhook returned {}", response.status()))
    }
}
