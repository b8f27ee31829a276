use super::models::{new_id, now_rfc3339, Release};
use crate::error::{Result, SwitchyardError};
use sqlx::{Executor, Sqlite};

/// Creates a release in `pending`. The version label is the next
/// monotonic integer for the service, computed via a subquery in the
/// same INSERT so the whole operation is a single statement against
/// the generic executor (repository functions that need more than one
/// statement can't stay generic over `E` — `&mut Transaction` isn't
/// `Copy` — so single-statement SQL is preferred wherever the shape
/// allows it).
pub async fn create_pending<'c, E>(
    exec: E,
    service_id: &str,
    commit_sha: &str,
    build_config_hash: &str,
) -> Result<Release>
where
    E: Executor<'c, Database = Sqlite>,
{
    let id = new_id();
    let now = now_rfc3339();

    sqlx::query(
        "INSERT INTO releases (id, service_id, version, commit_sha, build_config_hash,
            status, created_at, updated_at)
         VALUES (?, ?, (SELECT COALESCE(MAX(version), 0) + 1 FROM releases WHERE service_id = ?),
            ?, ?, 'pending', ?, ?)",
    )
    .bind(&id)
    .bind(service_id)
    .bind(service_id)
    .bind(commit_sha)
    .bind(build_config_hash)
    .bind(&now)
    .bind(&now)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;

    Ok(Release {
        id,
        service_id: service_id.to_string(),
        version: 0, // caller re-reads via `get` if the exact version is needed
        commit_sha: commit_sha.to_string(),
        build_config_hash: build_config_hash.to_string(),
        image_uri: None,
        status: "pending".to_string(),
        sbom_format: None,
        sbom_blob: None,
        signature: None,
        signature_verified_at: None,
        error_message: None,
        created_at: now.clone(),
        updated_at: now,
    })
}

pub async fn get<'c, E>(exec: E, id: &str) -> Result<Release>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, Release>("SELECT * FROM releases WHERE id = ?")
        .bind(id)
        .fetch_optional(exec)
        .await
        .map_err(SwitchyardError::from)?
        .ok_or_else(|| SwitchyardError::not_found(format!("release {id}")))
}

/// The build-pipeline dedup key: `(service_id, commit_sha,
/// build_config_hash)`. Returns the most recent matching release, if
/// any, regardless of its status — callers decide what to do with an
/// in-flight vs. terminal match.
pub async fn find_by_fingerprint<'c, E>(
    exec: E,
    service_id: &str,
    commit_sha: &str,
    build_config_hash: &str,
) -> Result<Option<Release>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, Release>(
        "SELECT * FROM releases WHERE service_id = ? AND commit_sha = ? AND build_config_hash = ?
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(service_id)
    .bind(commit_sha)
    .bind(build_config_hash)
    .fetch_optional(exec)
    .await
    .map_err(SwitchyardError::from)
}

pub async fn list_for_service<'c, E>(exec: E, service_id: &str) -> Result<Vec<Release>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, Release>(
        "SELECT * FROM releases WHERE service_id = ? ORDER BY created_at DESC",
    )
    .bind(service_id)
    .fetch_all(exec)
    .await
    .map_err(SwitchyardError::from)
}

pub async fn transition_building<'c, E>(exec: E, id: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE releases SET status = 'building', updated_at = ? WHERE id = ? AND status = 'pending'",
    )
    .bind(now_rfc3339())
    .bind(id)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;
    Ok(())
}

/// Sets the release to `ready` with its image URI (and optional SBOM).
/// Per the invariant in spec.md §3/§8, a release in {ready, failed} is
/// never mutated again except for signature attachment, so this only
/// applies against rows still in a non-terminal status.
pub async fn transition_ready<'c, E>(
    exec: E,
    id: &str,
    image_uri: &str,
    sbom_format: Option<&str>,
    sbom_blob: Option<&str>,
) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE releases SET status = 'ready', image_uri = ?, sbom_format = ?, sbom_blob = ?, updated_at = ?
         WHERE id = ? AND status != 'ready' AND status != 'failed'",
    )
    .bind(image_uri)
    .bind(sbom_format)
    .bind(sbom_blob)
    .bind(now_rfc3339())
    .bind(id)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;
    Ok(())
}

pub async fn transition_failed<'c, E>(exec: E, id: &str, error_message: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE releases SET status = 'failed', error_message = ?, updated_at = ?
         WHERE id = ? AND status != 'ready' AND status != 'failed'",
    )
    .bind(error_message)
    .bind(now_rfc3339())
    .bind(id)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;
    Ok(())
}

/// Attaches a verification signature to an already-`ready` release —
/// the single mutation spec.md §3 permits after a release reaches a
/// terminal status.
pub async fn attach_signature<'c, E>(exec: E, id: &str, signature: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE releases SET signature = ?, signature_verified_at = ?, updated_at = ?
         WHERE id = ? AND status = 'ready'",
    )
    .bind(signature)
    .bind(now_rfc3339())
    .bind(now_rfc3339())
    .bind(id)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;

    if result.rows_affected() == 0 {
        return Err(SwitchyardError::invalid(
            "signature can only be attached to a ready release",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[tokio::test]
    async fn fingerprint_reuses_latest_matching_release() {
        let store = Store::in_memory().await.unwrap();
        let pool = store.pool();
        crate::store::project::create(pool, "p1", "p1").await.unwrap();
        let svc = crate::store::service::create(
            pool,
            "p1",
            "svc1",
            "https://github.com/acme/app",
            None,
            "{}",
            false,
            None,
            None,
        )
        .await
        .unwrap();

        create_pending(pool, &svc.id, "abc123", "hash1").await.unwrap();
        let found = find_by_fingerprint(pool, &svc.id, "abc123", "hash1")
            .await
            .unwrap();
        assert!(found.is_some());

        let none = find_by_fingerprint(pool, &svc.id, "def456", "hash1")
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn attach_signature_requires_a_ready_release() {
        let store = Store::in_memory().await.unwrap();
        let pool = store.pool();
        crate::store::project::create(pool, "p1", "p1").await.unwrap();
        let svc = crate::store::service::create(
            pool, "p1", "svc1", "https://github.com/acme/app", None, "{}", false, None, None,
        )
        .await
        .unwrap();
        let release = create_pending(pool, &svc.id, "abc123", "hash1").await.unwrap();

        let err = attach_signature(pool, &release.id, "sig").await;
        assert!(err.is_err());

        transition_ready(pool, &release.id, "registry.local/app:abc123", None, None)
            .await
            .unwrap();
        attach_signature(pool, &release.id, "sig").await.unwrap();

        let release = get(pool, &release.id).await.unwrap();
        assert_eq!(release.signature.as_deref(), Some("sig"));
    }
}
