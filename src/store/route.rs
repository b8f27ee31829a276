//! Custom domain / route repository (§4.6.5's desired-state side).
//! Materializing a domain into orchestrator ingress objects and
//! certificate issuance is the routes/domain reconciler's job; this
//! module only owns the row.

use super::models::{new_id, now_rfc3339, CustomDomain};
use crate::error::{Result, SwitchyardError};
use sqlx::{Executor, Sqlite};

pub async fn create<'c, E>(
    exec: E,
    service_id: &str,
    environment_id: &str,
    hostname: &str,
) -> Result<CustomDomain>
where
    E: Executor<'c, Database = Sqlite>,
{
    let domain = CustomDomain {
        id: new_id(),
        service_id: service_id.to_string(),
        environment_id: environment_id.to_string(),
        hostname: hostname.to_string(),
        status: "pending".to_string(),
        certificate_status: "pending".to_string(),
        created_at: now_rfc3339(),
        updated_at: now_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO custom_domains (id, service_id, environment_id, hostname, status,
            certificate_status, created_at, updated_at)
         VALUES (?, ?, ?, ?, 'pending', 'pending', ?, ?)",
    )
    .bind(&domain.id)
    .bind(&domain.service_id)
    .bind(&domain.environment_id)
    .bind(&domain.hostname)
    .bind(&domain.created_at)
    .bind(&domain.updated_at)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;

    Ok(domain)
}

pub async fn get<'c, E>(exec: E, id: &str) -> Result<CustomDomain>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, CustomDomain>("SELECT * FROM custom_domains WHERE id = ?")
        .bind(id)
        .fetch_optional(exec)
        .await
        .map_err(SwitchyardError::from)?
        .ok_or_else(|| SwitchyardError::not_found(format!("custom domain {id}")))
}

pub async fn list_for_service<'c, E>(exec: E, service_id: &str) -> Result<Vec<CustomDomain>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, CustomDomain>(
        "SELECT * FROM custom_domains WHERE service_id = ? ORDER BY created_at ASC",
    )
    .bind(service_id)
    .fetch_all(exec)
    .await
    .map_err(SwitchyardError::from)
}

pub async fn list_pending<'c, E>(exec: E) -> Result<Vec<CustomDomain>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, CustomDomain>("SELECT * FROM custom_domains WHERE status = 'pending'")
        .fetch_all(exec)
        .await
        .map_err(SwitchyardError::from)
}

pub async fn set_status<'c, E>(exec: E, id: &str, status: &str, certificate_status: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE custom_domains SET status = ?, certificate_status = ?, updated_at = ? WHERE id = ?",
    )
    .bind(status)
    .bind(certificate_status)
    .bind(now_rfc3339())
    .bind(id)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;
    Ok(())
}

pub async fn remove<'c, E>(exec: E, id: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM custom_domains WHERE id = ?")
        .bind(id)
        .execute(exec)
        .await
        .map_err(SwitchyardError::from)?;
    if result.rows_affected() == 0 {
        return Err(SwitchyardError::not_found(format!("custom domain {id}")));
    }
    Ok(())
}
