use super::models::{new_id, now_rfc3339, DatabaseAddon, DatabaseAddonBinding};
use crate::error::{Result, SwitchyardError};
use sqlx::{Executor, Sqlite};

pub async fn create_pending<'c, E>(
    exec: E,
    project_id: &str,
    addon_type: &str,
    name: &str,
    config: &str,
) -> Result<DatabaseAddon>
where
    E: Executor<'c, Database = Sqlite>,
{
    let addon = DatabaseAddon {
        id: new_id(),
        project_id: project_id.to_string(),
        addon_type: addon_type.to_string(),
        name: name.to_string(),
        status: "pending".to_string(),
        config: config.to_string(),
        host: None,
        port: None,
        database_name: None,
        username: None,
        secret_ref: None,
        deleted_at: None,
        created_at: now_rfc3339(),
        updated_at: now_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO database_addons (id, project_id, addon_type, name, status, config, created_at, updated_at)
         VALUES (?, ?, ?, ?, 'pending', ?, ?, ?)",
    )
    .bind(&addon.id)
    .bind(&addon.project_id)
    .bind(&addon.addon_type)
    .bind(&addon.name)
    .bind(&addon.config)
    .bind(&addon.created_at)
    .bind(&addon.updated_at)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;

    Ok(addon)
}

pub async fn get<'c, E>(exec: E, id: &str) -> Result<DatabaseAddon>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, DatabaseAddon>("SELECT * FROM database_addons WHERE id = ?")
        .bind(id)
        .fetch_optional(exec)
        .await
        .map_err(SwitchyardError::from)?
        .ok_or_else(|| SwitchyardError::not_found(format!("database addon {id}")))
}

pub async fn list_for_project<'c, E>(exec: E, project_id: &str) -> Result<Vec<DatabaseAddon>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, DatabaseAddon>(
        "SELECT * FROM database_addons WHERE project_id = ? AND deleted_at IS NULL ORDER BY created_at ASC",
    )
    .bind(project_id)
    .fetch_all(exec)
    .await
    .map_err(SwitchyardError::from)
}

/// Stores the provisioned connection details. `secret_ref` is an
/// already-encrypted blob (see `crypto::encrypt`) — the store never
/// sees addon credentials in plaintext.
#[allow(clippy::too_many_arguments)]
pub async fn transition_ready<'c, E>(
    exec: E,
    id: &str,
    host: &str,
    port: i64,
    database_name: &str,
    username: &str,
    secret_ref: &str,
) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE database_addons SET status = 'ready', host = ?, port = ?, database_name = ?,
            username = ?, secret_ref = ?, updated_at = ?
         WHERE id = ? AND status != 'deleted'",
    )
    .bind(host)
    .bind(port)
    .bind(database_name)
    .bind(username)
    .bind(secret_ref)
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
    sqlx::query("UPDATE database_addons SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status)
        .bind(now_rfc3339())
        .bind(id)
        .execute(exec)
        .await
        .map_err(SwitchyardError::from)?;
    Ok(())
}

/// Soft-delete: marks an addon `deleting` so the reconciler releases its
/// backing resources. `deleted_at` is stamped only once that finishes
/// (`set_status` to `deleted`), so the addon stays visible to
/// `list_deleting` in the meantime; addons are never hard-deleted, so
/// bindings and audit history retain a stable `addon_id` to reference.
pub async fn soft_delete<'c, E>(exec: E, id: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query("UPDATE database_addons SET status = 'deleting', updated_at = ? WHERE id = ?")
        .bind(now_rfc3339())
        .bind(id)
        .execute(exec)
        .await
        .map_err(SwitchyardError::from)?;
    Ok(())
}

/// Every addon mid-teardown, across all projects — the input to the
/// addon reconciler's deletion sweep.
pub async fn list_deleting<'c, E>(exec: E) -> Result<Vec<DatabaseAddon>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, DatabaseAddon>("SELECT * FROM database_addons WHERE status = 'deleting'")
        .fetch_all(exec)
        .await
        .map_err(SwitchyardError::from)
}

/// Terminal: backing resources have been released.
pub async fn mark_deleted<'c, E>(exec: E, id: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query("UPDATE database_addons SET status = 'deleted', deleted_at = ?, updated_at = ? WHERE id = ?")
        .bind(now_rfc3339())
        .bind(now_rfc3339())
        .bind(id)
        .execute(exec)
        .await
        .map_err(SwitchyardError::from)?;
    Ok(())
}

pub async fn create_binding<'c, E>(
    exec: E,
    addon_id: &str,
    service_id: &str,
    env_var_name: &str,
) -> Result<DatabaseAddonBinding>
where
    E: Executor<'c, Database = Sqlite>,
{
    let binding = DatabaseAddonBinding {
        id: new_id(),
        addon_id: addon_id.to_string(),
        service_id: service_id.to_string(),
        env_var_name: env_var_name.to_string(),
        status: "pending".to_string(),
        created_at: now_rfc3339(),
        updated_at: now_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO database_addon_bindings (id, addon_id, service_id, env_var_name, status, created_at, updated_at)
         VALUES (?, ?, ?, ?, 'pending', ?, ?)",
    )
    .bind(&binding.id)
    .bind(&binding.addon_id)
    .bind(&binding.service_id)
    .bind(&binding.env_var_name)
    .bind(&binding.created_at)
    .bind(&binding.updated_at)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;

    Ok(binding)
}

pub async fn list_bindings_for_service<'c, E>(
    exec: E,
    service_id: &str,
) -> Result<Vec<DatabaseAddonBinding>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, DatabaseAddonBinding>(
        "SELECT * FROM database_addon_bindings WHERE service_id = ? ORDER BY created_at ASC",
    )
    .bind(service_id)
    .fetch_all(exec)
    .await
    .map_err(SwitchyardError::from)
}
