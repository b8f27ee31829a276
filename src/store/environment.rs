use super::models::{new_id, now_rfc3339, Environment};
use crate::error::{Result, SwitchyardError};
use sqlx::{Executor, Sqlite};

pub async fn create<'c, E>(
    exec: E,
    project_id: &str,
    name: &str,
    namespace_label: &str,
) -> Result<Environment>
where
    E: Executor<'c, Database = Sqlite>,
{
    let env = Environment {
        id: new_id(),
        project_id: project_id.to_string(),
        name: name.to_string(),
        namespace_label: namespace_label.to_string(),
        created_at: now_rfc3339(),
        updated_at: now_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO environments (id, project_id, name, namespace_label, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&env.id)
    .bind(&env.project_id)
    .bind(&env.name)
    .bind(&env.namespace_label)
    .bind(&env.created_at)
    .bind(&env.updated_at)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;

    Ok(env)
}

pub async fn get<'c, E>(exec: E, id: &str) -> Result<Environment>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, Environment>("SELECT * FROM environments WHERE id = ?")
        .bind(id)
        .fetch_optional(exec)
        .await
        .map_err(SwitchyardError::from)?
        .ok_or_else(|| SwitchyardError::not_found(format!("environment {id}")))
}

pub async fn get_by_name<'c, E>(
    exec: E,
    project_id: &str,
    name: &str,
) -> Result<Option<Environment>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, Environment>("SELECT * FROM environments WHERE project_id = ? AND name = ?")
        .bind(project_id)
        .bind(name)
        .fetch_optional(exec)
        .await
        .map_err(SwitchyardError::from)
}

pub async fn list_for_project<'c, E>(exec: E, project_id: &str) -> Result<Vec<Environment>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, Environment>(
        "SELECT * FROM environments WHERE project_id = ? ORDER BY created_at ASC",
    )
    .bind(project_id)
    .fetch_all(exec)
    .await
    .map_err(SwitchyardError::from)
}
