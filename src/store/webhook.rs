use super::models::{new_id, now_rfc3339, WebhookDelivery, WebhookDestination};
use crate::error::{Result, SwitchyardError};
use sqlx::{Executor, Sqlite};

#[allow(clippy::too_many_arguments)]
pub async fn create_destination<'c, E>(
    exec: E,
    project_id: &str,
    name: &str,
    transport: &str,
    endpoint_url: &str,
    bot_token: Option<&str>,
    chat_id: Option<&str>,
    signing_secret: Option<&str>,
    subscribed_events_json: &str,
) -> Result<WebhookDestination>
where
    E: Executor<'c, Database = Sqlite>,
{
    let dest = WebhookDestination {
        id: new_id(),
        project_id: project_id.to_string(),
        name: name.to_string(),
        transport: transport.to_string(),
        endpoint_url: endpoint_url.to_string(),
        bot_token: bot_token.map(str::to_string),
        chat_id: chat_id.map(str::to_string),
        custom_headers: None,
        signing_secret: signing_secret.map(str::to_string),
        subscribed_events: subscribed_events_json.to_string(),
        enabled: true,
        last_delivery_at: None,
        last_delivery_status: None,
        last_delivery_error: None,
        consecutive_failures: 0,
        auto_disabled_at: None,
        created_at: now_rfc3339(),
        updated_at: now_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO webhook_destinations (id, project_id, name, transport, endpoint_url,
            bot_token, chat_id, signing_secret, subscribed_events, enabled, consecutive_failures,
            created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, 0, ?, ?)",
    )
    .bind(&dest.id)
    .bind(&dest.project_id)
    .bind(&dest.name)
    .bind(&dest.transport)
    .bind(&dest.endpoint_url)
    .bind(&dest.bot_token)
    .bind(&dest.chat_id)
    .bind(&dest.signing_secret)
    .bind(&dest.subscribed_events)
    .bind(&dest.created_at)
    .bind(&dest.updated_at)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;

    Ok(dest)
}

pub async fn get_destination<'c, E>(exec: E, id: &str) -> Result<WebhookDestination>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, WebhookDestination>("SELECT * FROM webhook_destinations WHERE id = ?")
        .bind(id)
        .fetch_optional(exec)
        .await
        .map_err(SwitchyardError::from)?
        .ok_or_else(|| SwitchyardError::not_found(format!("webhook destination {id}")))
}

/// Destinations eligible to receive a given event type: enabled and
/// not auto-disabled, scoped to the project, subscribed_events checked
/// in application code since it's an opaque JSON array here.
pub async fn list_enabled_for_project<'c, E>(
    exec: E,
    project_id: &str,
) -> Result<Vec<WebhookDestination>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, WebhookDestination>(
        "SELECT * FROM webhook_destinations WHERE project_id = ? AND enabled = 1",
    )
    .bind(project_id)
    .fetch_all(exec)
    .await
    .map_err(SwitchyardError::from)
}

pub async fn record_delivery_success<'c, E>(exec: E, id: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE webhook_destinations SET last_delivery_at = ?, last_delivery_status = 'success',
            last_delivery_error = NULL, consecutive_failures = 0, updated_at = ?
         WHERE id = ?",
    )
    .bind(now_rfc3339())
    .bind(now_rfc3339())
    .bind(id)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;
    Ok(())
}

/// Bumps the failure streak and auto-disables once it crosses the
/// caller-supplied threshold (§C8 default 10 consecutive failures) —
/// done as one statement with a `CASE` so the disable check doesn't
/// need a separate read.
pub async fn record_delivery_failure<'c, E>(
    exec: E,
    id: &str,
    error_message: &str,
    auto_disable_threshold: i64,
) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE webhook_destinations SET
            last_delivery_at = ?, last_delivery_status = 'failure', last_delivery_error = ?,
            consecutive_failures = consecutive_failures + 1,
            enabled = CASE WHEN consecutive_failures + 1 >= ? THEN 0 ELSE enabled END,
            auto_disabled_at = CASE WHEN consecutive_failures + 1 >= ? THEN ? ELSE auto_disabled_at END,
            updated_at = ?
         WHERE id = ?",
    )
    .bind(now_rfc3339())
    .bind(error_message)
    .bind(auto_disable_threshold)
    .bind(auto_disable_threshold)
    .bind(now_rfc3339())
    .bind(now_rfc3339())
    .bind(id)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;
    Ok(())
}

/// Manual reset after an operator addresses an auto-disabled
/// destination (§C8) — re-enables and clears the failure streak.
pub async fn reset_destination<'c, E>(exec: E, id: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE webhook_destinations SET enabled = 1, consecutive_failures = 0,
            auto_disabled_at = NULL, updated_at = ? WHERE id = ?",
    )
    .bind(now_rfc3339())
    .bind(id)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn record_delivery<'c, E>(
    exec: E,
    destination_id: &str,
    event_type: &str,
    event_id: &str,
    payload: &str,
    outcome: &str,
    status_code: Option<i64>,
    response_body: Option<&str>,
    error_message: Option<&str>,
    attempt: i64,
    duration_ms: i64,
) -> Result<WebhookDelivery>
where
    E: Executor<'c, Database = Sqlite>,
{
    let delivery = WebhookDelivery {
        id: new_id(),
        destination_id: destination_id.to_string(),
        event_type: event_type.to_string(),
        event_id: event_id.to_string(),
        payload: payload.to_string(),
        outcome: outcome.to_string(),
        status_code,
        response_body: response_body.map(str::to_string),
        error_message: error_message.map(str::to_string),
        attempt,
        duration_ms,
        created_at: now_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO webhook_deliveries (id, destination_id, event_type, event_id, payload,
            outcome, status_code, response_body, error_message, attempt, duration_ms, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&delivery.id)
    .bind(&delivery.destination_id)
    .bind(&delivery.event_type)
    .bind(&delivery.event_id)
    .bind(&delivery.payload)
    .bind(&delivery.outcome)
    .bind(delivery.status_code)
    .bind(&delivery.response_body)
    .bind(&delivery.error_message)
    .bind(delivery.attempt)
    .bind(delivery.duration_ms)
    .bind(&delivery.created_at)
    .execute(exec)
    .await
    .map_err(SwitchyardError::from)?;

    Ok(delivery)
}

pub async fn list_recent_for_destination<'c, E>(
    exec: E,
    destination_id: &str,
    limit: i64,
) -> Result<Vec<WebhookDelivery>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, WebhookDelivery>(
        "SELECT * FROM webhook_deliveries WHERE destination_id = ? ORDER BY created_at DESC LIMIT ?",
    )
    .bind(destination_id)
    .bind(limit)
    .fetch_all(exec)
    .await
    .map_err(SwitchyardError::from)
}
