use super::models::{new_id, now_rfc3339, CiRun};
use crate::error::{Result, SwitchyardError};
use sqlx::{Executor, Sqlite};

#[allow(clippy::too_many_arguments)]
pub async fn upsert<'c, E>(
    exec: E,
    service_id: &str,
    commit_sha: &str,
    workflow_name: &str,
    external_run_id: &str,
    run_number: i64,
    status: &str,
    branch: &str,
    event_type: &str,
    actor: &str,
) -> Result<CiRun>
where
    E: Executor<'c, Database = Sqlite>,
{
    let run = CiRun {
        id: new_id(),
        service_id: service_id.to_string(),
        commit_sha: commit_sha.to_string(),
        workflow_name: workflow_name.to_string(),
        external_run_id: external_run_id.to_string(),
        run_number,
        status: status.to_string(),
        conclusion: None,
        url: None,
        branch: branch.to_string(),
        event_type: event_type.to_string(),
        actor: actor.to_string(),
        started_at: None,
        finished_at: None,
        created_at: now_rfc3339(),
        updated_at: now_rfc3339(),
    };

    // CI providers resend webhook deliveries on retry; `external_run_id`
    // is the provider's idempotency key so a resend updates in place
    // rather than creating a duplicate row.
    sqlx::query(
        "INSERT INTO ci_runs (id, service_id, commit_sha, workflow_name, external_run_id,
            run_number, status, branch, event_type, actor, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(external_run_id) DO UPDATE SET status = excluded.status, updated_at = excluded.updated_at",
    )
    .bind(&run.id)
    .bind(&run.service_id)
    .bind(&run.commit_sha)
    .bind(&run.workflow_name)
    .bind(&run.external_run_id)
    .bind(run.run_number)
    .bind(&run.status)
    .bind(&run.branch)
    .bind(&run.event_type)
    .bind(&run.actor)
    .bind(&run.created_at)
    .bind(&run.updated_at)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;

    Ok(run)
}

pub async fn get_by_external_id<'c, E>(exec: E, external_run_id: &str) -> Result<Option<CiRun>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, CiRun>("SELECT * FROM ci_runs WHERE external_run_id = ?")
        .bind(external_run_id)
        .fetch_optional(exec)
        .await
        .map_err(SwitchyardError::from)
}

pub async fn complete<'c, E>(
    exec: E,
    external_run_id: &str,
    conclusion: &str,
    url: Option<&str>,
) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE ci_runs SET status = 'completed', conclusion = ?, url = ?, finished_at = ?, updated_at = ?
         WHERE external_run_id = ?",
    )
    .bind(conclusion)
    .bind(url)
    .bind(now_rfc3339())
    .bind(now_rfc3339())
    .bind(external_run_id)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;
    Ok(())
}

pub async fn list_for_service<'c, E>(exec: E, service_id: &str) -> Result<Vec<CiRun>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, CiRun>("SELECT * FROM ci_runs WHERE service_id = ? ORDER BY created_at DESC")
        .bind(service_id)
        .fetch_all(exec)
        .await
        .map_err(SwitchyardError::from)
}
