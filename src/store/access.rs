use super::models::{new_id, now_rfc3339, ProjectAccess, Role};
use crate::error::{Result, SwitchyardError};
use sqlx::{Executor, Sqlite};
use std::str::FromStr;

pub async fn grant<'c, E>(
    exec: E,
    user_id: &str,
    project_id: &str,
    environment_id: Option<&str>,
    role: Role,
    expires_at: Option<&str>,
) -> Result<ProjectAccess>
where
    E: Executor<'c, Database = Sqlite>,
{
    let grant = ProjectAccess {
        id: new_id(),
        user_id: user_id.to_string(),
        project_id: project_id.to_string(),
        environment_id: environment_id.map(str::to_string),
        role: role.as_str().to_string(),
        expires_at: expires_at.map(str::to_string),
        created_at: now_rfc3339(),
        updated_at: now_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO project_access (id, user_id, project_id, environment_id, role, expires_at, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&grant.id)
    .bind(&grant.user_id)
    .bind(&grant.project_id)
    .bind(&grant.environment_id)
    .bind(&grant.role)
    .bind(&grant.expires_at)
    .bind(&grant.created_at)
    .bind(&grant.updated_at)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;

    Ok(grant)
}

pub async fn revoke<'c, E>(exec: E, id: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM project_access WHERE id = ?")
        .bind(id)
        .execute(exec)
        .await
        .map_err(SwitchyardError::from)?;

    if result.rows_affected() == 0 {
        return Err(SwitchyardError::not_found(format!("project access grant {id}")));
    }
    Ok(())
}

pub async fn list_for_project<'c, E>(exec: E, project_id: &str) -> Result<Vec<ProjectAccess>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, ProjectAccess>(
        "SELECT * FROM project_access WHERE project_id = ? ORDER BY created_at ASC",
    )
    .bind(project_id)
    .fetch_all(exec)
    .await
    .map_err(SwitchyardError::from)
}

pub async fn list_for_user<'c, E>(exec: E, user_id: &str) -> Result<Vec<ProjectAccess>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, ProjectAccess>("SELECT * FROM project_access WHERE user_id = ?")
        .bind(user_id)
        .fetch_all(exec)
        .await
        .map_err(SwitchyardError::from)
}

/// Resolves the effective role for a user on a project, optionally
/// scoped to an environment. A project-wide grant (`environment_id`
/// NULL) applies everywhere; an environment-scoped grant only applies
/// there. When both exist the higher of the two (by `Role::level`)
/// wins, matching `hasAccess`'s numeric comparison contract (§4.3).
/// Expired grants (`expires_at` in the past) are excluded by the
/// caller, not here, since that comparison needs a trusted clock the
/// store layer doesn't own.
pub async fn effective_role<'c, E>(
    exec: E,
    user_id: &str,
    project_id: &str,
    environment_id: Option<&str>,
) -> Result<Option<Role>>
where
    E: Executor<'c, Database = Sqlite>,
{
    let grants = sqlx::query_as::<_, ProjectAccess>(
        "SELECT * FROM project_access WHERE user_id = ? AND project_id = ?
            AND (environment_id IS NULL OR environment_id = ?)",
    )
    .bind(user_id)
    .bind(project_id)
    .bind(environment_id)
    .fetch_all(exec)
    .await
    .map_err(SwitchyardError::from)?;

    let now = super::models::now_rfc3339();
    grants
        .into_iter()
        .filter(|g| g.expires_at.as_deref().map(|exp| exp > now.as_str()).unwrap_or(true))
        .map(|g| Role::from_str(&g.role))
        .collect::<Result<Vec<_>>>()
        .map(|roles| roles.into_iter().max_by_key(|r| r.level()))
}
