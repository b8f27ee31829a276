use super::models::{new_id, now_rfc3339, ApiToken};
use crate::error::{Result, SwitchyardError};
use sqlx::{Executor, Sqlite};

/// Persists a freshly generated token. The plaintext secret never
/// reaches the store — callers pass only the stable `prefix` (for
/// display: `enclii_ab12...`) and the SHA-256 `digest` used for lookup.
pub async fn create<'c, E>(
    exec: E,
    user_id: &str,
    name: &str,
    prefix: &str,
    digest: &str,
    scopes_json: &str,
    expires_at: Option<&str>,
) -> Result<ApiToken>
where
    E: Executor<'c, Database = Sqlite>,
{
    let token = ApiToken {
        id: new_id(),
        user_id: user_id.to_string(),
        name: name.to_string(),
        prefix: prefix.to_string(),
        digest: digest.to_string(),
        scopes: scopes_json.to_string(),
        expires_at: expires_at.map(str::to_string),
        last_used_at: None,
        last_used_ip: None,
        revoked: false,
        revoked_at: None,
        created_at: now_rfc3339(),
        updated_at: now_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO api_tokens (id, user_id, name, prefix, digest, scopes, expires_at,
            revoked, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
    )
    .bind(&token.id)
    .bind(&token.user_id)
    .bind(&token.name)
    .bind(&token.prefix)
    .bind(&token.digest)
    .bind(&token.scopes)
    .bind(&token.expires_at)
    .bind(&token.created_at)
    .bind(&token.updated_at)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;

    Ok(token)
}

/// The hot path for every authenticated request: look up by digest,
/// excluding revoked tokens. Expiry is checked by the caller against
/// `expires_at` since SQLite has no reliable way to compare RFC3339
/// strings against "now" portably across the connection's timezone.
pub async fn find_by_digest<'c, E>(exec: E, digest: &str) -> Result<Option<ApiToken>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, ApiToken>("SELECT * FROM api_tokens WHERE digest = ? AND revoked = 0")
        .bind(digest)
        .fetch_optional(exec)
        .await
        .map_err(SwitchyardError::from)
}

pub async fn list_for_user<'c, E>(exec: E, user_id: &str) -> Result<Vec<ApiToken>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, ApiToken>(
        "SELECT * FROM api_tokens WHERE user_id = ? ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(exec)
    .await
    .map_err(SwitchyardError::from)
}

pub async fn touch_last_used<'c, E>(exec: E, id: &str, ip: Option<&str>) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query("UPDATE api_tokens SET last_used_at = ?, last_used_ip = ? WHERE id = ?")
        .bind(now_rfc3339())
        .bind(ip)
        .bind(id)
        .execute(exec)
        .await
        .map_err(SwitchyardError::from)?;
    Ok(())
}

pub async fn revoke<'c, E>(exec: E, id: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE api_tokens SET revoked = 1, revoked_at = ?, updated_at = ? WHERE id = ? AND revoked = 0",
    )
    .bind(now_rfc3339())
    .bind(now_rfc3339())
    .bind(id)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;

    if result.rows_affected() == 0 {
        return Err(SwitchyardError::not_found(format!("active api token {id}")));
    }
    Ok(())
}
