use super::models::{new_id, now_rfc3339, Deployment};
use crate::error::{Result, SwitchyardError};
use sqlx::{Executor, Sqlite};

pub async fn create_pending<'c, E>(
    exec: E,
    service_id: &str,
    release_id: &str,
    environment_id: &str,
    replicas: i64,
) -> Result<Deployment>
where
    E: Executor<'c, Database = Sqlite>,
{
    let deployment = Deployment {
        id: new_id(),
        service_id: service_id.to_string(),
        release_id: release_id.to_string(),
        environment_id: environment_id.to_string(),
        replicas,
        observed_replicas: 0,
        status: "pending".to_string(),
        health: "unknown".to_string(),
        group_id: None,
        deploy_order: None,
        error_message: None,
        created_at: now_rfc3339(),
        updated_at: now_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO deployments (id, service_id, release_id, environment_id, replicas,
            observed_replicas, status, health, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, 0, 'pending', 'unknown', ?, ?)",
    )
    .bind(&deployment.id)
    .bind(&deployment.service_id)
    .bind(&deployment.release_id)
    .bind(&deployment.environment_id)
    .bind(deployment.replicas)
    .bind(&deployment.created_at)
    .bind(&deployment.updated_at)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;

    Ok(deployment)
}

pub async fn get<'c, E>(exec: E, id: &str) -> Result<Deployment>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, Deployment>("SELECT * FROM deployments WHERE id = ?")
        .bind(id)
        .fetch_optional(exec)
        .await
        .map_err(SwitchyardError::from)?
        .ok_or_else(|| SwitchyardError::not_found(format!("deployment {id}")))
}

pub async fn list_by_status<'c, E>(exec: E, status: &str) -> Result<Vec<Deployment>>
where
    E: Executor<'c, Database = Sqlite>,
{
    // FIFO-by-creation for pending workers (§4.1 query surface).
    sqlx::query_as::<_, Deployment>(
        "SELECT * FROM deployments WHERE status = ? ORDER BY created_at ASC",
    )
    .bind(status)
    .fetch_all(exec)
    .await
    .map_err(SwitchyardError::from)
}

pub async fn list_by_release<'c, E>(exec: E, release_id: &str) -> Result<Vec<Deployment>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, Deployment>(
        "SELECT * FROM deployments WHERE release_id = ? ORDER BY created_at DESC",
    )
    .bind(release_id)
    .fetch_all(exec)
    .await
    .map_err(SwitchyardError::from)
}

/// Latest deployment per (service, environment), joined against
/// releases for the caller's convenience (just the deployment row here
/// — callers join release separately via `release::get`).
/// Monotonic status transition. The allowed graph (spec.md §5) is
/// `pending -> deploying -> live -> superseded`, with `failed`
/// reachable from any non-terminal state and `degraded` only as a
/// health annotation on `live`. Callers pass the expected current
/// status so a regressing write (e.g. `live -> deploying`) is rejected
/// rather than silently applied.
pub async fn transition<'c, E>(
    exec: E,
    id: &str,
    from_status: &str,
    to_status: &str,
    error_message: Option<&str>,
) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE deployments SET status = ?, error_message = ?, updated_at = ?
         WHERE id = ? AND status = ?",
    )
    .bind(to_status)
    .bind(error_message)
    .bind(now_rfc3339())
    .bind(id)
    .bind(from_status)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;

    if result.rows_affected() == 0 {
        return Err(SwitchyardError::conflict(format!(
            "deployment {id} is not in status {from_status}"
        )));
    }
    Ok(())
}

pub async fn set_observed<'c, E>(
    exec: E,
    id: &str,
    observed_replicas: i64,
    health: &str,
) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query("UPDATE deployments SET observed_replicas = ?, health = ?, updated_at = ? WHERE id = ?")
        .bind(observed_replicas)
        .bind(health)
        .bind(now_rfc3339())
        .bind(id)
        .execute(exec)
        .await
        .map_err(SwitchyardError::from)?;
    Ok(())
}

/// Every currently-`live` deployment for a service, across all of its
/// environments — the input the service health aggregator reduces over.
pub async fn list_live_for_service<'c, E>(exec: E, service_id: &str) -> Result<Vec<Deployment>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, Deployment>(
        "SELECT * FROM deployments WHERE service_id = ? AND status = 'live'",
    )
    .bind(service_id)
    .fetch_all(exec)
    .await
    .map_err(SwitchyardError::from)
}

/// Supersedes every other `live` deployment of the same (service,
/// environment) when a new one becomes live, implementing the "new
/// deployment supersedes instead of regressing" rule from spec.md §5.
pub async fn supersede_other_live<'c, E>(
    exec: E,
    service_id: &str,
    environment_id: &str,
    except_id: &str,
) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE deployments SET status = 'superseded', updated_at = ?
         WHERE service_id = ? AND environment_id = ? AND status = 'live' AND id != ?",
    )
    .bind(now_rfc3339())
    .bind(service_id)
    .bind(environment_id)
    .bind(except_id)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;
    Ok(())
}
