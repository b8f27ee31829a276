use super::models::{new_id, now_rfc3339, Service};
use crate::error::{Result, SwitchyardError};
use sqlx::{Executor, Sqlite};

/// Normalizes a git repository URL for comparison: strips trailing
/// slashes, rewrites `git@host:owner/repo` SSH form to HTTPS, and
/// strips a trailing `.git` suffix so lookups match with or without it.
pub fn normalize_git_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');

    let https_form = if let Some(rest) = trimmed.strip_prefix("git@") {
        // git@host:owner/repo -> https://host/owner/repo
        if let Some((host, path)) = rest.split_once(':') {
            format!("https://{host}/{path}")
        } else {
            trimmed.to_string()
        }
    } else {
        trimmed.to_string()
    };

    https_form.strip_suffix(".git").unwrap_or(&https_form).to_string()
}

#[allow(clippy::too_many_arguments)]
pub async fn create<'c, E>(
    exec: E,
    project_id: &str,
    name: &str,
    git_url: &str,
    app_path: Option<&str>,
    build_config: &str,
    auto_deploy: bool,
    auto_deploy_branch: Option<&str>,
    auto_deploy_environment_id: Option<&str>,
) -> Result<Service>
where
    E: Executor<'c, Database = Sqlite>,
{
    let service = Service {
        id: new_id(),
        project_id: project_id.to_string(),
        name: name.to_string(),
        git_url: git_url.to_string(),
        app_path: app_path.map(str::to_string),
        build_config: build_config.to_string(),
        auto_deploy,
        auto_deploy_branch: auto_deploy_branch.map(str::to_string),
        auto_deploy_environment_id: auto_deploy_environment_id.map(str::to_string),
        health: "unknown".to_string(),
        created_at: now_rfc3339(),
        updated_at: now_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO services (id, project_id, name, git_url, app_path, build_config,
            auto_deploy, auto_deploy_branch, auto_deploy_environment_id, health, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&service.id)
    .bind(&service.project_id)
    .bind(&service.name)
    .bind(&service.git_url)
    .bind(&service.app_path)
    .bind(&service.build_config)
    .bind(service.auto_deploy)
    .bind(&service.auto_deploy_branch)
    .bind(&service.auto_deploy_environment_id)
    .bind(&service.health)
    .bind(&service.created_at)
    .bind(&service.updated_at)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;

    Ok(service)
}

pub async fn get<'c, E>(exec: E, id: &str) -> Result<Service>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = ?")
        .bind(id)
        .fetch_optional(exec)
        .await
        .map_err(SwitchyardError::from)?
        .ok_or_else(|| SwitchyardError::not_found(format!("service {id}")))
}

pub async fn get_by_name<'c, E>(exec: E, project_id: &str, name: &str) -> Result<Option<Service>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, Service>("SELECT * FROM services WHERE project_id = ? AND name = ?")
        .bind(project_id)
        .bind(name)
        .fetch_optional(exec)
        .await
        .map_err(SwitchyardError::from)
}

/// Finds every service whose normalized git URL matches — monorepos can
/// register more than one service against the same repository, so this
/// returns all hits rather than the first.
pub async fn find_by_git_url<'c, E>(exec: E, url: &str) -> Result<Vec<Service>>
where
    E: Executor<'c, Database = Sqlite>,
{
    let target = normalize_git_url(url);
    let candidates = sqlx::query_as::<_, Service>("SELECT * FROM services")
        .fetch_all(exec)
        .await
        .map_err(SwitchyardError::from)?;

    Ok(candidates
        .into_iter()
        .filter(|s| normalize_git_url(&s.git_url) == target)
        .collect())
}

pub async fn list_for_project<'c, E>(exec: E, project_id: &str) -> Result<Vec<Service>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, Service>("SELECT * FROM services WHERE project_id = ? ORDER BY created_at ASC")
        .bind(project_id)
        .fetch_all(exec)
        .await
        .map_err(SwitchyardError::from)
}

pub async fn set_health<'c, E>(exec: E, id: &str, health: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query("UPDATE services SET health = ?, updated_at = ? WHERE id = ?")
        .bind(health)
        .bind(now_rfc3339())
        .bind(id)
        .execute(exec)
        .await
        .map_err(SwitchyardError::from)?;
    Ok(())
}

pub async fn delete<'c, E>(exec: E, id: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM services WHERE id = ?")
        .bind(id)
        .execute(exec)
        .await
        .map_err(SwitchyardError::from)?;

    if result.rows_affected() == 0 {
        return Err(SwitchyardError::not_found(format!("service {id}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_ssh_and_git_suffix() {
        assert_eq!(
            normalize_git_url("git@github.com:acme/app.git"),
            "https://github.com/acme/app"
        );
        assert_eq!(
            normalize_git_url("https://github.com/acme/app.git/"),
            "https://github.com/acme/app"
        );
        assert_eq!(
            normalize_git_url("https://github.com/acme/app"),
            "https://github.com/acme/app"
        );
    }
}
