use super::models::{new_id, now_rfc3339, User};
use crate::error::{Result, SwitchyardError};
use sqlx::{Executor, Sqlite};

pub async fn create_with_password<'c, E>(exec: E, email: &str, password_hash: &str) -> Result<User>
where
    E: Executor<'c, Database = Sqlite>,
{
    let user = User {
        id: new_id(),
        email: email.to_string(),
        password_hash: Some(password_hash.to_string()),
        idp_subject: None,
        idp_issuer: None,
        active: true,
        created_at: now_rfc3339(),
        updated_at: now_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, active, created_at, updated_at)
         VALUES (?, ?, ?, 1, ?, ?)",
    )
    .bind(&user.id)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.created_at)
    .bind(&user.updated_at)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;

    Ok(user)
}

pub async fn get<'c, E>(exec: E, id: &str) -> Result<User>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(exec)
        .await
        .map_err(SwitchyardError::from)?
        .ok_or_else(|| SwitchyardError::not_found(format!("user {id}")))
}

pub async fn get_by_email<'c, E>(exec: E, email: &str) -> Result<Option<User>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(exec)
        .await
        .map_err(SwitchyardError::from)
}

pub async fn set_active<'c, E>(exec: E, id: &str, active: bool) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query("UPDATE users SET active = ?, updated_at = ? WHERE id = ?")
        .bind(active)
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
    async fn create_with_password_is_findable_by_email_and_can_be_deactivated() {
        let store = Store::in_memory().await.unwrap();
        let pool = store.pool();

        let user = create_with_password(pool, "dev@example.com", "hash").await.unwrap();
        assert!(user.active);

        let found = get_by_email(pool, "dev@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);

        set_active(pool, &user.id, false).await.unwrap();
        let found = get(pool, &user.id).await.unwrap();
        assert!(!found.active);
    }
}
