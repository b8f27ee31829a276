//! The Audit Sink (C2): a bounded mpsc channel feeding a background
//! consumer that batches writes to the `audit_logs` table. Every
//! mutating operation in the control plane emits an [`AuditEvent`]
//! rather than writing the store directly, so a slow audit write never
//! blocks the caller's request path — mirrors the teacher's
//! `DeploymentEngine` shape (bounded channel, single consumer loop,
//! `tokio::spawn` per unit of work) generalized from deployment jobs to
//! audit events.

mod redact;

pub use redact::redact_value;

use crate::store::audit::NewAuditEvent;
use crate::store::models::now_rfc3339;
use crate::store::Store;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{error, warn};

const CHANNEL_CAPACITY: usize = 100;
const BATCH_SIZE: usize = 10;
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const SHUTDOWN_FLUSH_DEADLINE: Duration = Duration::from_secs(3);

/// An audit-worthy event, owned and fully formed at the call site —
/// the sink never reaches back into the store to enrich it.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub actor_id: Option<String>,
    pub actor_email: Option<String>,
    pub actor_role: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub resource_name: Option<String>,
    pub project_id: Option<String>,
    pub environment_id: Option<String>,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub outcome: &'static str,
    pub context: Value,
    pub metadata: Value,
}

impl AuditEvent {
    pub fn new(action: impl Into<String>, resource_type: impl Into<String>, outcome: &'static str) -> Self {
        Self {
            actor_id: None,
            actor_email: None,
            actor_role: None,
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: None,
            resource_name: None,
            project_id: None,
            environment_id: None,
            source_ip: None,
            user_agent: None,
            outcome,
            context: Value::Object(Default::default()),
            metadata: Value::Object(Default::default()),
        }
    }
}

enum Command {
    Record(AuditEvent),
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct AuditSink {
    tx: mpsc::Sender<Command>,
}

impl AuditSink {
    /// Spawns the background consumer and returns a cheaply-cloneable
    /// handle. The channel is bounded at 100 so a runaway burst of
    /// events applies backpressure to callers rather than growing
    /// memory without limit.
    pub fn spawn(store: Store) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(run_consumer(store, rx));
        Self { tx }
    }

    /// Enqueues an event without waiting for it to be written. Drops
    /// (with a warning) only if the channel is full and the consumer
    /// is catastrophically behind — matches the "never block the
    /// request path" contract from the spec's ambient-logging section.
    pub fn record(&self, event: AuditEvent) {
        if let Err(err) = self.tx.try_send(Command::Record(event)) {
            warn!(error = %err, "audit event dropped: sink channel full");
        }
    }

    /// Flushes pending events and waits for the write to land, with a
    /// bounded deadline — used during graceful shutdown so the process
    /// doesn't hang on a stuck consumer.
    pub async fn flush_and_wait(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).await.is_err() {
            return;
        }
        let _ = tokio::time::timeout(SHUTDOWN_FLUSH_DEADLINE, done_rx).await;
    }
}

async fn run_consumer(store: Store, mut rx: mpsc::Receiver<Command>) {
    let mut batch: Vec<AuditEvent> = Vec::with_capacity(BATCH_SIZE);
    let mut ticker = interval(FLUSH_INTERVAL);
    ticker.tick().await; // first tick fires immediately; consume it

    loop {
        tokio::select! {
            command = rx.recv() => {
                match command {
                    Some(Command::Record(event)) => {
                        batch.push(event);
                        if batch.len() >= BATCH_SIZE {
                            flush_batch(&store, &mut batch).await;
                        }
                    }
                    Some(Command::Flush(done)) => {
                        flush_batch(&store, &mut batch).await;
                        let _ = done.send(());
                    }
                    None => {
                        flush_batch(&store, &mut batch).await;
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                flush_batch(&store, &mut batch).await;
            }
        }
    }
}

/// Writes the pending batch inside a single transaction and retries
/// once on failure before dropping the batch with a metric bump —
/// audit durability is best-effort by design (§C2 non-goal: the sink
/// is not a transactional outbox for the operations it describes).
async fn flush_batch(store: &Store, batch: &mut Vec<AuditEvent>) {
    if batch.is_empty() {
        return;
    }

    let rows: Vec<(AuditEvent, String, String)> = batch
        .drain(..)
        .map(|event| {
            let context = redact_value(event.context.clone()).to_string();
            let metadata = redact_value(event.metadata.clone()).to_string();
            (event, context, metadata)
        })
        .collect();

    for attempt in 0..2 {
        let result = store
            .with_transaction(|tx| {
                let rows = &rows;
                Box::pin(async move {
                    let new_events: Vec<NewAuditEvent> = rows
                        .iter()
                        .map(|(event, context, metadata)| NewAuditEvent {
                            actor_id: event.actor_id.as_deref(),
                            actor_email: event.actor_email.as_deref(),
                            actor_role: event.actor_role.as_deref(),
                            action: &event.action,
                            resource_type: &event.resource_type,
                            resource_id: event.resource_id.as_deref(),
                            resource_name: event.resource_name.as_deref(),
                            project_id: event.project_id.as_deref(),
                            environment_id: event.environment_id.as_deref(),
                            source_ip: event.source_ip.as_deref(),
                            user_agent: event.user_agent.as_deref(),
                            outcome: event.outcome,
                            context,
                            metadata,
                        })
                        .collect();
                    crate::store::audit::insert_batch(tx, &new_events).await
                })
            })
            .await;

        match result {
            Ok(()) => return,
            Err(err) if attempt == 0 => {
                warn!(error = %err, "audit batch flush failed, retrying once");
            }
            Err(err) => {
                error!(error = %err, dropped = rows.len(), "audit batch flush failed twice, dropping");
                metrics::counter!("switchyard_audit_batches_dropped_total").increment(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[tokio::test]
    async fn record_and_flush_writes_row() {
        let store = Store::in_memory().await.unwrap();
        let sink = AuditSink::spawn(store.clone());

        let mut event = AuditEvent::new("service.create", "service", "success");
        event.actor_email = Some("dev@example.com".to_string());
        sink.record(event);
        sink.flush_and_wait().await;

        let logs = crate::store::audit::list_recent(store.pool(), 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, "service.create");
    }
}
