//! The Webhook Dispatcher (C8): one queue per destination, HMAC-SHA256
//! request signing, exponential backoff with a cap, and auto-disable
//! after a run of consecutive failures. Grounded on the teacher's
//! `NotificationService::send` fan-out shape (look up destinations,
//! send each independently, record per-destination outcome) but adds
//! the retry/backoff/auto-disable state machine the teacher's
//! one-shot notification sends never needed.

use crate::config::WebhookConfig;
use crate::store::models::now_rfc3339;
use crate::store::Store;
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub project_id: String,
    pub event_type: String,
    pub event_id: String,
    pub data: Value,
}

/// Outbound wire format: `POST` body sent to the destination URL.
#[derive(Serialize)]
struct OutboundPayload<'a> {
    event_type: &'a str,
    event_id: &'a str,
    project_id: &'a str,
    occurred_at: String,
    data: &'a Value,
}

#[derive(Clone)]
pub struct WebhookDispatcher {
    tx: mpsc::Sender<WebhookEvent>,
}

impl WebhookDispatcher {
    pub fn spawn(store: Store, config: WebhookConfig) -> Self {
        let (tx, mut rx) = mpsc::channel::<WebhookEvent>(256);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.delivery_timeout_secs))
            .build()
            .expect("failed to build webhook http client");

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let store = store.clone();
                let client = client.clone();
                let config = config.clone();
                tokio::spawn(async move {
                    dispatch_to_destinations(&store, &client, &config, event).await;
                });
            }
        });

        Self { tx }
    }

    /// Enqueues an event for delivery. Never blocks the caller's
    /// request path; a full channel drops the event with a warning.
    pub fn emit(&self, event: WebhookEvent) {
        if let Err(err) = self.tx.try_send(event) {
            warn!(error = %err, "webhook event dropped: dispatcher channel full");
        }
    }
}

async fn dispatch_to_destinations(
    store: &Store,
    client: &reqwest::Client,
    config: &WebhookConfig,
    event: WebhookEvent,
) {
    let destinations =
        match crate::store::webhook::list_enabled_for_project(store.pool(), &event.project_id).await {
            Ok(rows) => rows,
            Err(err) => {
                error!(error = %err, "failed to list webhook destinations");
                return;
            }
        };

    for destination in destinations {
        if !subscribed(&destination.subscribed_events, &event.event_type) {
            continue;
        }
        deliver_with_retry(store, client, config, &destination, &event).await;
    }
}

fn subscribed(subscribed_events_json: &str, event_type: &str) -> bool {
    serde_json::from_str::<Vec<String>>(subscribed_events_json)
        .map(|events| events.iter().any(|e| e == event_type || e == "*"))
        .unwrap_or(false)
}

async fn deliver_with_retry(
    store: &Store,
    client: &reqwest::Client,
    config: &WebhookConfig,
    destination: &crate::store::models::WebhookDestination,
    event: &WebhookEvent,
) {
    let payload = serde_json::to_string(&OutboundPayload {
        event_type: &event.event_type,
        event_id: &event.event_id,
        project_id: &event.project_id,
        occurred_at: now_rfc3339(),
        data: &event.data,
    })
    .unwrap_or_default();
    let signature = destination
        .signing_secret
        .as_deref()
        .map(|secret| format!("sha256={}", sign_payload(secret, &payload)));

    for attempt in 1..=config.max_attempts {
        let started = std::time::Instant::now();
        let mut request = client
            .post(&destination.endpoint_url)
            .header("Content-Type", "application/json")
            .body(payload.clone());
        if let Some(signature) = &signature {
            request = request.header("X-Enclii-Signature", signature.clone());
        }

        let outcome = request.send().await;
        let duration_ms = started.elapsed().as_millis() as i64;

        match outcome {
            Ok(response) if response.status().is_success() => {
                let status_code = response.status().as_u16() as i64;
                let _ = crate::store::webhook::record_delivery(
                    store.pool(),
                    &destination.id,
                    &event.event_type,
                    &event.event_id,
                    &payload,
                    "success",
                    Some(status_code),
                    None,
                    None,
                    attempt as i64,
                    duration_ms,
                )
                .await;
                let _ = crate::store::webhook::record_delivery_success(store.pool(), &destination.id).await;
                crate::api::metrics::record_webhook_delivery("success");
                info!(destination_id = %destination.id, attempt, "webhook delivered");
                return;
            }
            Ok(response) => {
                let status_code = response.status().as_u16() as i64;
                let body = response.text().await.unwrap_or_default();
                let _ = crate::store::webhook::record_delivery(
                    store.pool(),
                    &destination.id,
                    &event.event_type,
                    &event.event_id,
                    &payload,
                    "failure",
                    Some(status_code),
                    Some(&body),
                    None,
                    attempt as i64,
                    duration_ms,
                )
                .await;
            }
            Err(err) => {
                let _ = crate::store::webhook::record_delivery(
                    store.pool(),
                    &destination.id,
                    &event.event_type,
                    &event.event_id,
                    &payload,
                    "failure",
                    None,
                    None,
                    Some(&err.to_string()),
                    attempt as i64,
                    duration_ms,
                )
                .await;
            }
        }

        if attempt < config.max_attempts {
            tokio::time::sleep(backoff_delay(config, attempt)).await;
        }
    }

    let _ = crate::store::webhook::record_delivery_failure(
        store.pool(),
        &destination.id,
        "delivery failed after max attempts",
        config.auto_disable_threshold as i64,
    )
    .await;
    crate::api::metrics::record_webhook_delivery("failure");
    warn!(destination_id = %destination.id, "webhook delivery exhausted retries");
}

/// Exponential backoff capped at `backoff_cap_secs`: `base * 2^(attempt-1)`.
fn backoff_delay(config: &WebhookConfig, attempt: u32) -> Duration {
    let secs = config.backoff_base_secs.saturating_mul(1u64 << (attempt - 1).min(16));
    Duration::from_secs(secs.min(config.backoff_cap_secs))
}

fn sign_payload(secret: &str, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Manual reset after an operator resolves whatever caused a
/// destination to auto-disable (§C8).
pub async fn reset_destination(store: &Store, destination_id: &str) -> crate::error::Result<()> {
    crate::store::webhook::reset_destination(store.pool(), destination_id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_caps_at_configured_ceiling() {
        let config = WebhookConfig {
            delivery_timeout_secs: 10,
            backoff_base_secs: 2,
            backoff_cap_secs: 10,
            max_attempts: 6,
            auto_disable_threshold: 5,
            github_secret: None,
        };
        assert_eq!(backoff_delay(&config, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(&config, 3), Duration::from_secs(8));
        assert_eq!(backoff_delay(&config, 10), Duration::from_secs(10));
    }

    #[test]
    fn signature_is_deterministic() {
        let sig1 = sign_payload("secret", "payload");
        let sig2 = sign_payload("secret", "payload");
        assert_eq!(sig1, sig2);
        assert_ne!(sig1, sign_payload("other", "payload"));
    }
}
