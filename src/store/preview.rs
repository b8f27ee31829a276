use super::models::{new_id, now_rfc3339, PreviewEnvironment};
use crate::error::{Result, SwitchyardError};
use sqlx::{Executor, Sqlite};

#[allow(clippy::too_many_arguments)]
pub async fn create_pending<'c, E>(
    exec: E,
    service_id: &str,
    pr_number: i64,
    pr_title: Option<&str>,
    pr_author: Option<&str>,
    branch: &str,
    base_branch: &str,
    commit_sha: &str,
    subdomain: &str,
    auto_sleep_after_minutes: i64,
) -> Result<PreviewEnvironment>
where
    E: Executor<'c, Database = Sqlite>,
{
    let preview = PreviewEnvironment {
        id: new_id(),
        service_id: service_id.to_string(),
        pr_number,
        pr_title: pr_title.map(str::to_string),
        pr_author: pr_author.map(str::to_string),
        branch: branch.to_string(),
        base_branch: base_branch.to_string(),
        commit_sha: commit_sha.to_string(),
        subdomain: subdomain.to_string(),
        preview_url: None,
        status: "pending".to_string(),
        auto_sleep_after_minutes,
        last_accessed_at: now_rfc3339(),
        sleeping_since: None,
        deployment_id: None,
        closed_at: None,
        created_at: now_rfc3339(),
        updated_at: now_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO preview_environments (id, service_id, pr_number, pr_title, pr_author,
            branch, base_branch, commit_sha, subdomain, status, auto_sleep_after_minutes,
            last_accessed_at, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?, ?)",
    )
    .bind(&preview.id)
    .bind(&preview.service_id)
    .bind(preview.pr_number)
    .bind(&preview.pr_title)
    .bind(&preview.pr_author)
    .bind(&preview.branch)
    .bind(&preview.base_branch)
    .bind(&preview.commit_sha)
    .bind(&preview.subdomain)
    .bind(preview.auto_sleep_after_minutes)
    .bind(&preview.last_accessed_at)
    .bind(&preview.created_at)
    .bind(&preview.updated_at)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;

    Ok(preview)
}

pub async fn get<'c, E>(exec: E, id: &str) -> Result<PreviewEnvironment>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, PreviewEnvironment>("SELECT * FROM preview_environments WHERE id = ?")
        .bind(id)
        .fetch_optional(exec)
        .await
        .map_err(SwitchyardError::from)?
        .ok_or_else(|| SwitchyardError::not_found(format!("preview environment {id}")))
}

pub async fn get_by_service_and_pr<'c, E>(
    exec: E,
    service_id: &str,
    pr_number: i64,
) -> Result<Option<PreviewEnvironment>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, PreviewEnvironment>(
        "SELECT * FROM preview_environments WHERE service_id = ? AND pr_number = ? AND status != 'closed'",
    )
    .bind(service_id)
    .bind(pr_number)
    .fetch_optional(exec)
    .await
    .map_err(SwitchyardError::from)
}

pub async fn get_by_deployment_id<'c, E>(exec: E, deployment_id: &str) -> Result<Option<PreviewEnvironment>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, PreviewEnvironment>(
        "SELECT * FROM preview_environments WHERE deployment_id = ?",
    )
    .bind(deployment_id)
    .fetch_optional(exec)
    .await
    .map_err(SwitchyardError::from)
}

pub async fn list_for_service<'c, E>(exec: E, service_id: &str) -> Result<Vec<PreviewEnvironment>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, PreviewEnvironment>(
        "SELECT * FROM preview_environments WHERE service_id = ? ORDER BY created_at DESC",
    )
    .bind(service_id)
    .fetch_all(exec)
    .await
    .map_err(SwitchyardError::from)
}

/// Every preview currently `active`, used by the sleep-scan tick
/// (§4.7) to find candidates whose idle window has elapsed.
pub async fn list_active<'c, E>(exec: E) -> Result<Vec<PreviewEnvironment>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, PreviewEnvironment>(
        "SELECT * FROM preview_environments WHERE status = 'active'",
    )
    .fetch_all(exec)
    .await
    .map_err(SwitchyardError::from)
}

pub async fn set_deployment<'c, E>(exec: E, id: &str, deployment_id: &str, status: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE preview_environments SET deployment_id = ?, status = ?, updated_at = ? WHERE id = ?",
    )
    .bind(deployment_id)
    .bind(status)
    .bind(now_rfc3339())
    .bind(id)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;
    Ok(())
}

pub async fn set_preview_url<'c, E>(exec: E, id: &str, preview_url: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query("UPDATE preview_environments SET preview_url = ?, updated_at = ? WHERE id = ?")
        .bind(preview_url)
        .bind(now_rfc3339())
        .bind(id)
        .execute(exec)
        .await
        .map_err(SwitchyardError::from)?;
    Ok(())
}

/// Coalesced access-tracking write (§4.7 limits this to at most once
/// per second per preview at the caller level; this just performs the
/// unconditional bump once the caller has decided to do it).
pub async fn touch_access<'c, E>(exec: E, id: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query("UPDATE preview_environments SET last_accessed_at = ? WHERE id = ?")
        .bind(now_rfc3339())
        .bind(id)
        .execute(exec)
        .await
        .map_err(SwitchyardError::from)?;
    Ok(())
}

pub async fn transition_sleeping<'c, E>(exec: E, id: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE preview_environments SET status = 'sleeping', sleeping_since = ?, updated_at = ?
         WHERE id = ? AND status = 'active'",
    )
    .bind(now_rfc3339())
    .bind(now_rfc3339())
    .bind(id)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;

    if result.rows_affected() == 0 {
        return Err(SwitchyardError::conflict(format!(
            "preview environment {id} is not active"
        )));
    }
    Ok(())
}

pub async fn transition_waking<'c, E>(exec: E, id: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE preview_environments SET status = 'deploying', sleeping_since = NULL, last_accessed_at = ?, updated_at = ?
         WHERE id = ? AND status = 'sleeping'",
    )
    .bind(now_rfc3339())
    .bind(now_rfc3339())
    .bind(id)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;

    if result.rows_affected() == 0 {
        return Err(SwitchyardError::conflict(format!(
            "preview environment {id} is not sleeping"
        )));
    }
    Ok(())
}

pub async fn transition_active<'c, E>(exec: E, id: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE preview_environments SET status = 'active', updated_at = ?
         WHERE id = ? AND status IN ('pending', 'building', 'deploying')",
    )
    .bind(now_rfc3339())
    .bind(id)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;
    Ok(())
}

pub async fn transition_failed<'c, E>(exec: E, id: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE preview_environments SET status = 'failed', updated_at = ?
         WHERE id = ? AND status != 'closed'",
    )
    .bind(now_rfc3339())
    .bind(id)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;
    Ok(())
}

/// Terminal close — an explicit PR-close or merge event (§4.7). Closed
/// previews never transition again; the reconciler tears down the
/// underlying deployment out-of-band once it observes this status.
pub async fn close<'c, E>(exec: E, id: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE preview_environments SET status = 'closed', closed_at = ?, updated_at = ? WHERE id = ?",
    )
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
    async fn sleep_wake_cycle_respects_expected_status() {
        let store = Store::in_memory().await.unwrap();
        let pool = store.pool();
        crate::store::project::create(pool, "p1", "p1").await.unwrap();
        let svc = crate::store::service::create(
            pool, "p1", "svc1", "https://github.com/acme/app", None, "{}", false, None, None,
        )
        .await
        .unwrap();
        let preview = create_pending(
            pool, &svc.id, 42, None, None, "feature/x", "main", "abc123", "pr-42", 30,
        )
        .await
        .unwrap();

        transition_active(pool, &preview.id).await.unwrap();
        transition_sleeping(pool, &preview.id).await.unwrap();

        // Waking a non-sleeping preview is rejected.
        let err = transition_waking(pool, &preview.id).await;
        assert!(err.is_ok());
        let err = transition_waking(pool, &preview.id).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn set_deployment_is_found_by_deployment_id() {
        let store = Store::in_memory().await.unwrap();
        let pool = store.pool();
        crate::store::project::create(pool, "p1", "p1").await.unwrap();
        let svc = crate::store::service::create(
            pool, "p1", "svc1", "https://github.com/acme/app", None, "{}", false, None, None,
        )
        .await
        .unwrap();
        let preview = create_pending(
            pool, &svc.id, 7, None, None, "feature/y", "main", "def456", "pr-7", 30,
        )
        .await
        .unwrap();

        assert!(get_by_deployment_id(pool, "dep-1").await.unwrap().is_none());

        set_deployment(pool, &preview.id, "dep-1", "deploying").await.unwrap();

        let found = get_by_deployment_id(pool, "dep-1").await.unwrap().unwrap();
        assert_eq!(found.id, preview.id);
        assert_eq!(found.status, "deploying");
    }
}
