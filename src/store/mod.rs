//! The Store (C1): a single façade vending one repository per entity
//! family, plus the transaction combinator `with_transaction`.
//!
//! Every repository function is generic over `E: sqlx::Executor<'c,
//! Database = Sqlite>` — the capability-based abstraction spec.md §9
//! calls for: `&SqlitePool`, `&mut PoolConnection<Sqlite>`, and
//! `&mut Transaction<'_, Sqlite>` all satisfy it, so the same repository
//! code runs against the base pool or a transaction-scoped handle
//! without a wrapper enum. This generalizes the teacher's ad-hoc
//! `&DbPool` threading (rivetr passed `&SqlitePool` everywhere and had
//! no transaction combinator at all).

pub mod access;
pub mod addon;
pub mod audit;
pub mod cirun;
pub mod dependency;
pub mod deployment;
pub mod environment;
pub mod function;
pub mod models;
pub mod preview;
pub mod project;
pub mod release;
pub mod route;
pub mod service;
pub mod token;
pub mod user;
pub mod webhook;

use crate::error::{Result, SwitchyardError};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::future::Future;
use std::path::Path;
use tracing::info;

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if absent) the SQLite database at `url` and runs
    /// pending migrations. Mirrors the teacher's `db::init()` sequence:
    /// WAL mode, foreign keys on, then guarded `CREATE TABLE IF NOT
    /// EXISTS` blocks run in order.
    pub async fn init(url: &str, data_dir: &Path) -> anyhow::Result<Self> {
        if let Some(path) = url.strip_prefix("sqlite://") {
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::create_dir_all(data_dir)?;

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect(&format!("{url}?mode=rwc"))
            .await?;

        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;

        run_migrations(&pool).await?;
        info!("store initialized");
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect("sqlite::memory:")
            .await?;
        sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The transaction combinator. `f` receives a transaction-scoped
    /// handle; every repository call inside must be made against that
    /// same handle. On `Ok` the transaction commits; on `Err` it rolls
    /// back. Nesting is impossible by construction: the façade only
    /// ever hands out the base pool or a fresh transaction, never both
    /// at once.
    pub async fn with_transaction<'a, F, T>(&'a self, f: F) -> Result<T>
    where
        F: for<'r> FnOnce(
            &'r mut Transaction<'a, Sqlite>,
        ) -> std::pin::Pin<Box<dyn Future<Output = Result<T>> + Send + 'r>>,
    {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SwitchyardError::Transient(e.to_string()))?;

        match f(&mut tx).await {
            Ok(value) => {
                tx.commit()
                    .await
                    .map_err(|e| SwitchyardError::Transient(e.to_string()))?;
                Ok(value)
            }
            Err(err) => {
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }
}

async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    const STATEMENTS: &[&str] = &[
        r#"CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
        r#"CREATE TABLE IF NOT EXISTS environments (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            namespace_label TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(project_id, name)
        )"#,
        r#"CREATE TABLE IF NOT EXISTS services (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            git_url TEXT NOT NULL,
            app_path TEXT,
            build_config TEXT NOT NULL DEFAULT '{}',
            auto_deploy INTEGER NOT NULL DEFAULT 0,
            auto_deploy_branch TEXT,
            auto_deploy_environment_id TEXT REFERENCES environments(id),
            health TEXT NOT NULL DEFAULT 'unknown',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(project_id, name)
        )"#,
        r#"CREATE INDEX IF NOT EXISTS idx_services_git_url ON services(git_url)"#,
        r#"CREATE TABLE IF NOT EXISTS releases (
            id TEXT PRIMARY KEY,
            service_id TEXT NOT NULL REFERENCES services(id) ON DELETE CASCADE,
            version INTEGER NOT NULL,
            commit_sha TEXT NOT NULL,
            build_config_hash TEXT NOT NULL,
            image_uri TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            sbom_format TEXT,
            sbom_blob TEXT,
            signature TEXT,
            signature_verified_at TEXT,
            error_message TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(service_id, version)
        )"#,
        r#"CREATE INDEX IF NOT EXISTS idx_releases_fingerprint
            ON releases(service_id, commit_sha, build_config_hash)"#,
        // Enforces "at most one concurrent build per fingerprint" at the
        // storage layer: two racing `create_pending` calls for the same
        // (service, commit, build config) can't both land while either row
        // is still pending/building. A terminal (ready/failed) row for the
        // same fingerprint doesn't block a later retry.
        r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_releases_fingerprint_inflight
            ON releases(service_id, commit_sha, build_config_hash)
            WHERE status IN ('pending', 'building')"#,
        r#"CREATE TABLE IF NOT EXISTS deployments (
            id TEXT PRIMARY KEY,
            service_id TEXT NOT NULL REFERENCES services(id) ON DELETE CASCADE,
            release_id TEXT NOT NULL REFERENCES releases(id),
            environment_id TEXT NOT NULL REFERENCES environments(id),
            replicas INTEGER NOT NULL DEFAULT 1,
            observed_replicas INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            health TEXT NOT NULL DEFAULT 'unknown',
            group_id TEXT,
            deploy_order INTEGER,
            error_message TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
        r#"CREATE INDEX IF NOT EXISTS idx_deployments_status ON deployments(status, created_at)"#,
        r#"CREATE INDEX IF NOT EXISTS idx_deployments_service_env
            ON deployments(service_id, environment_id, status)"#,
        r#"CREATE TABLE IF NOT EXISTS preview_environments (
            id TEXT PRIMARY KEY,
            service_id TEXT NOT NULL REFERENCES services(id) ON DELETE CASCADE,
            pr_number INTEGER NOT NULL,
            pr_title TEXT,
            pr_author TEXT,
            branch TEXT NOT NULL,
            base_branch TEXT NOT NULL,
            commit_sha TEXT NOT NULL,
            subdomain TEXT NOT NULL UNIQUE,
            preview_url TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            auto_sleep_after_minutes INTEGER NOT NULL DEFAULT 30,
            last_accessed_at TEXT NOT NULL,
            sleeping_since TEXT,
            deployment_id TEXT REFERENCES deployments(id),
            closed_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(service_id, pr_number)
        )"#,
        r#"CREATE INDEX IF NOT EXISTS idx_previews_sleep_candidates
            ON preview_environments(status, auto_sleep_after_minutes, last_accessed_at)"#,
        r#"CREATE TABLE IF NOT EXISTS database_addons (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            addon_type TEXT NOT NULL,
            name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            config TEXT NOT NULL DEFAULT '{}',
            host TEXT,
            port INTEGER,
            database_name TEXT,
            username TEXT,
            secret_ref TEXT,
            deleted_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(project_id, name)
        )"#,
        r#"CREATE TABLE IF NOT EXISTS database_addon_bindings (
            id TEXT PRIMARY KEY,
            addon_id TEXT NOT NULL REFERENCES database_addons(id) ON DELETE CASCADE,
            service_id TEXT NOT NULL REFERENCES services(id) ON DELETE CASCADE,
            env_var_name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
        r#"CREATE TABLE IF NOT EXISTS functions (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            config TEXT NOT NULL DEFAULT '{}',
            status TEXT NOT NULL DEFAULT 'pending',
            image_uri TEXT,
            endpoint_url TEXT,
            observed_replicas INTEGER NOT NULL DEFAULT 0,
            invocation_count INTEGER NOT NULL DEFAULT 0,
            avg_duration_ms REAL NOT NULL DEFAULT 0,
            deleted_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(project_id, name)
        )"#,
        r#"CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT,
            idp_subject TEXT,
            idp_issuer TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
        r#"CREATE TABLE IF NOT EXISTS project_access (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            environment_id TEXT REFERENCES environments(id),
            role TEXT NOT NULL,
            expires_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(user_id, project_id, environment_id)
        )"#,
        r#"CREATE TABLE IF NOT EXISTS api_tokens (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            prefix TEXT NOT NULL,
            digest TEXT NOT NULL UNIQUE,
            scopes TEXT NOT NULL DEFAULT '[]',
            expires_at TEXT,
            last_used_at TEXT,
            last_used_ip TEXT,
            revoked INTEGER NOT NULL DEFAULT 0,
            revoked_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
        r#"CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            actor_id TEXT,
            actor_email TEXT,
            actor_role TEXT,
            action TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            resource_id TEXT,
            resource_name TEXT,
            project_id TEXT,
            environment_id TEXT,
            source_ip TEXT,
            user_agent TEXT,
            outcome TEXT NOT NULL,
            context TEXT NOT NULL DEFAULT '{}',
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        )"#,
        r#"CREATE INDEX IF NOT EXISTS idx_audit_logs_lookup
            ON audit_logs(project_id, actor_id, action, resource_type, created_at)"#,
        r#"CREATE TABLE IF NOT EXISTS webhook_destinations (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            transport TEXT NOT NULL DEFAULT 'http',
            endpoint_url TEXT NOT NULL,
            bot_token TEXT,
            chat_id TEXT,
            custom_headers TEXT,
            signing_secret TEXT,
            subscribed_events TEXT NOT NULL DEFAULT '[]',
            enabled INTEGER NOT NULL DEFAULT 1,
            last_delivery_at TEXT,
            last_delivery_status TEXT,
            last_delivery_error TEXT,
            consecutive_failures INTEGER NOT NULL DEFAULT 0,
            auto_disabled_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
        r#"CREATE TABLE IF NOT EXISTS webhook_deliveries (
            id TEXT PRIMARY KEY,
            destination_id TEXT NOT NULL REFERENCES webhook_destinations(id) ON DELETE CASCADE,
            event_type TEXT NOT NULL,
            event_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            outcome TEXT NOT NULL,
            status_code INTEGER,
            response_body TEXT,
            error_message TEXT,
            attempt INTEGER NOT NULL DEFAULT 1,
            duration_ms INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )"#,
        r#"CREATE TABLE IF NOT EXISTS ci_runs (
            id TEXT PRIMARY KEY,
            service_id TEXT NOT NULL REFERENCES services(id) ON DELETE CASCADE,
            commit_sha TEXT NOT NULL,
            workflow_name TEXT NOT NULL,
            external_run_id TEXT NOT NULL UNIQUE,
            run_number INTEGER NOT NULL,
            status TEXT NOT NULL,
            conclusion TEXT,
            url TEXT,
            branch TEXT NOT NULL,
            event_type TEXT NOT NULL,
            actor TEXT NOT NULL,
            started_at TEXT,
            finished_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
        r#"CREATE TABLE IF NOT EXISTS service_dependencies (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            source_service_id TEXT NOT NULL REFERENCES services(id) ON DELETE CASCADE,
            target_service_id TEXT NOT NULL REFERENCES services(id) ON DELETE CASCADE,
            dependency_type TEXT NOT NULL DEFAULT 'runtime',
            created_at TEXT NOT NULL,
            UNIQUE(source_service_id, target_service_id)
        )"#,
        r#"CREATE TABLE IF NOT EXISTS custom_domains (
            id TEXT PRIMARY KEY,
            service_id TEXT NOT NULL REFERENCES services(id) ON DELETE CASCADE,
            environment_id TEXT NOT NULL REFERENCES environments(id) ON DELETE CASCADE,
            hostname TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'pending',
            certificate_status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    ];

    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_creates_schema() {
        let store = Store::in_memory().await.unwrap();
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM projects")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(row.0, 0);
    }
}
