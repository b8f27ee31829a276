use super::models::{new_id, now_rfc3339, Function};
use crate::error::{Result, SwitchyardError};
use sqlx::{Executor, Sqlite};

pub async fn create_pending<'c, E>(exec: E, project_id: &str, name: &str, config: &str) -> Result<Function>
where
    E: Executor<'c, Database = Sqlite>,
{
    let function = Function {
        id: new_id(),
        project_id: project_id.to_string(),
        name: name.to_string(),
        config: config.to_string(),
        status: "pending".to_string(),
        image_uri: None,
        endpoint_url: None,
        observed_replicas: 0,
        invocation_count: 0,
        avg_duration_ms: 0.0,
        deleted_at: None,
        created_at: now_rfc3339(),
        updated_at: now_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO functions (id, project_id, name, config, status, observed_replicas,
            invocation_count, avg_duration_ms, created_at, updated_at)
         VALUES (?, ?, ?, ?, 'pending', 0, 0, 0.0, ?, ?)",
    )
    .bind(&function.id)
    .bind(&function.project_id)
    .bind(&function.name)
    .bind(&function.config)
    .bind(&function.created_at)
    .bind(&function.updated_at)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;

    Ok(function)
}

pub async fn get<'c, E>(exec: E, id: &str) -> Result<Function>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, Function>("SELECT * FROM functions WHERE id = ?")
        .bind(id)
        .fetch_optional(exec)
        .await
        .map_err(SwitchyardError::from)?
        .ok_or_else(|| SwitchyardError::not_found(format!("function {id}")))
}

pub async fn list_for_project<'c, E>(exec: E, project_id: &str) -> Result<Vec<Function>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, Function>(
        "SELECT * FROM functions WHERE project_id = ? AND deleted_at IS NULL ORDER BY created_at ASC",
    )
    .bind(project_id)
    .fetch_all(exec)
    .await
    .map_err(SwitchyardError::from)
}

pub async fn transition_ready<'c, E>(exec: E, id: &str, image_uri: &str, endpoint_url: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE functions SET status = 'ready', image_uri = ?, endpoint_url = ?, updated_at = ?
         WHERE id = ? AND status != 'deleting'",
    )
    .bind(image_uri)
    .bind(endpoint_url)
    .bind(now_rfc3339())
    .bind(id)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;
    Ok(())
}

pub async fn set_status<'c, E>(exec: E, id: &str, status: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query("UPDATE functions SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status)
        .bind(now_rfc3339())
        .bind(id)
        .execute(exec)
        .await
        .map_err(SwitchyardError::from)?;
    Ok(())
}

pub async fn set_observed_replicas<'c, E>(exec: E, id: &str, observed_replicas: i64) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query("UPDATE functions SET observed_replicas = ?, updated_at = ? WHERE id = ?")
        .bind(observed_replicas)
        .bind(now_rfc3339())
        .bind(id)
        .execute(exec)
        .await
        .map_err(SwitchyardError::from)?;
    Ok(())
}

/// Rolling invocation counters, updated by the invoke-path collaborator
/// (outside this crate's core scope) via a single incrementing
/// statement — the running average is recomputed in SQL so no
/// read-then-write round trip is needed.
pub async fn record_invocation<'c, E>(exec: E, id: &str, duration_ms: f64) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE functions SET
            avg_duration_ms = (avg_duration_ms * invocation_count + ?) / (invocation_count + 1),
            invocation_count = invocation_count + 1,
            updated_at = ?
         WHERE id = ?",
    )
    .bind(duration_ms)
    .bind(now_rfc3339())
    .bind(id)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;
    Ok(())
}

pub async fn soft_delete<'c, E>(exec: E, id: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query("UPDATE functions SET status = 'deleting', deleted_at = ?, updated_at = ? WHERE id = ?")
        .bind(now_rfc3339())
        .bind(now_rfc3339())
        .bind(id)
        .execute(exec)
        .await
        .map_err(SwitchyardError::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[tokio::test]
    async fn record_invocation_maintains_a_rolling_average() {
        let store = Store::in_memory().await.unwrap();
        let pool = store.pool();
        crate::store::project::create(pool, "p1", "p1").await.unwrap();
        let function = create_pending(pool, "p1", "fn1", "{}").await.unwrap();

        record_invocation(pool, &function.id, 100.0).await.unwrap();
        record_invocation(pool, &function.id, 200.0).await.unwrap();

        let function = get(pool, &function.id).await.unwrap();
        assert_eq!(function.invocation_count, 2);
        assert!((function.avg_duration_ms - 150.0).abs() < f64::EPSILON);
    }
}
