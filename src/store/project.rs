use super::models::{new_id, now_rfc3339, Project};
use crate::error::{Result, SwitchyardError};
use sqlx::{Executor, Sqlite};

pub async fn create<'c, E>(exec: E, name: &str, slug: &str) -> Result<Project>
where
    E: Executor<'c, Database = Sqlite>,
{
    let project = Project {
        id: new_id(),
        name: name.to_string(),
        slug: slug.to_string(),
        created_at: now_rfc3339(),
        updated_at: now_rfc3339(),
    };

    sqlx::query("INSERT INTO projects (id, name, slug, created_at, updated_at) VALUES (?, ?, ?, ?, ?)")
        .bind(&project.id)
        .bind(&project.name)
        .bind(&project.slug)
        .bind(&project.created_at)
        .bind(&project.updated_at)
        .execute(exec)
        .await
        .map_err(SwitchyardError::from)?;

    Ok(project)
}

pub async fn get<'c, E>(exec: E, id: &str) -> Result<Project>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ?")
        .bind(id)
        .fetch_optional(exec)
        .await
        .map_err(SwitchyardError::from)?
        .ok_or_else(|| SwitchyardError::not_found(format!("project {id}")))
}

pub async fn get_by_slug<'c, E>(exec: E, slug: &str) -> Result<Option<Project>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE slug = ?")
        .bind(slug)
        .fetch_optional(exec)
        .await
        .map_err(SwitchyardError::from)
}

pub async fn list<'c, E>(exec: E) -> Result<Vec<Project>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, Project>("SELECT * FROM projects ORDER BY created_at ASC")
        .fetch_all(exec)
        .await
        .map_err(SwitchyardError::from)
}

pub async fn delete<'c, E>(exec: E, id: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(id)
        .execute(exec)
        .await
        .map_err(SwitchyardError::from)?;

    if result.rows_affected() == 0 {
        return Err(SwitchyardError::not_found(format!("project {id}")));
    }
    Ok(())
}
