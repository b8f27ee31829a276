use super::models::{new_id, now_rfc3339, AuditLog};
use crate::error::{Result, SwitchyardError};
use sqlx::{Executor, Sqlite};

/// One append-only row written by the Audit Sink's batch flush (§C2).
/// `context`/`metadata` arrive pre-serialized and pre-redacted — the
/// store never inspects their contents.
#[allow(clippy::too_many_arguments)]
pub struct NewAuditEvent<'a> {
    pub actor_id: Option<&'a str>,
    pub actor_email: Option<&'a str>,
    pub actor_role: Option<&'a str>,
    pub action: &'a str,
    pub resource_type: &'a str,
    pub resource_id: Option<&'a str>,
    pub resource_name: Option<&'a str>,
    pub project_id: Option<&'a str>,
    pub environment_id: Option<&'a str>,
    pub source_ip: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub outcome: &'a str,
    pub context: &'a str,
    pub metadata: &'a str,
}

pub async fn insert<'c, E>(exec: E, event: &NewAuditEvent<'_>) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO audit_logs (id, actor_id, actor_email, actor_role, action, resource_type,
            resource_id, resource_name, project_id, environment_id, source_ip, user_agent,
            outcome, context, metadata, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(new_id())
    .bind(event.actor_id)
    .bind(event.actor_email)
    .bind(event.actor_role)
    .bind(event.action)
    .bind(event.resource_type)
    .bind(event.resource_id)
    .bind(event.resource_name)
    .bind(event.project_id)
    .bind(event.environment_id)
    .bind(event.source_ip)
    .bind(event.user_agent)
    .bind(event.outcome)
    .bind(event.context)
    .bind(event.metadata)
    .bind(now_rfc3339())
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;
    Ok(())
}

/// Batched insert for the Audit Sink's flush path (10 events or 5s
/// ticker, §C2) — each event is still its own statement since the
/// generic executor can't fan out a single multi-row INSERT across a
/// variable-length binding list portably; callers pass a transaction
/// so the whole batch commits atomically.
pub async fn insert_batch(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    events: &[NewAuditEvent<'_>],
) -> Result<()> {
    for event in events {
        insert(&mut **tx, event).await?;
    }
    Ok(())
}

pub async fn list_for_project<'c, E>(
    exec: E,
    project_id: &str,
    limit: i64,
) -> Result<Vec<AuditLog>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, AuditLog>(
        "SELECT * FROM audit_logs WHERE project_id = ? ORDER BY created_at DESC LIMIT ?",
    )
    .bind(project_id)
    .bind(limit)
    .fetch_all(exec)
    .await
    .map_err(SwitchyardError::from)
}

pub async fn list_recent<'c, E>(exec: E, limit: i64) -> Result<Vec<AuditLog>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, AuditLog>("SELECT * FROM audit_logs ORDER BY created_at DESC LIMIT ?")
        .bind(limit)
        .fetch_all(exec)
        .await
        .map_err(SwitchyardError::from)
}
