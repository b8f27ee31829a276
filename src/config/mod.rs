use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub builder: BuilderConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub webhooks: WebhookConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// External URL used for outbound webhook callbacks and links in
    /// notification payloads.
    #[serde(default)]
    pub external_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            api_port: default_api_port(),
            data_dir: default_data_dir(),
            external_url: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite://./data/switchyard.db".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_admin_token")]
    pub admin_token: String,
    /// Key used to derive the AES-256-GCM key that encrypts addon
    /// connection secrets at rest. Unset means secrets are stored
    /// as-is (backwards compatible with single-node dev setups).
    pub encryption_key: Option<String>,
    #[serde(default = "default_session_ttl_days")]
    pub session_ttl_days: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_token: default_admin_token(),
            encryption_key: None,
            session_ttl_days: default_session_ttl_days(),
        }
    }
}

fn default_admin_token() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_session_ttl_days() -> i64 {
    7
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuilderConfig {
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_registry_url")]
    pub registry_url: String,
    #[serde(default = "default_max_concurrent_builds")]
    pub max_concurrent_builds: usize,
    #[serde(default = "default_build_timeout_secs")]
    pub build_timeout_secs: u64,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            workspace_dir: default_workspace_dir(),
            cache_dir: default_cache_dir(),
            registry_url: default_registry_url(),
            max_concurrent_builds: default_max_concurrent_builds(),
            build_timeout_secs: default_build_timeout_secs(),
        }
    }
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("./data/workspace")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./data/build-cache")
}

fn default_registry_url() -> String {
    "registry.local".to_string()
}

fn default_max_concurrent_builds() -> usize {
    3
}

fn default_build_timeout_secs() -> u64 {
    30 * 60
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_deployment_deadline_secs")]
    pub deployment_deadline_secs: u64,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            deployment_deadline_secs: default_deployment_deadline_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_tick_interval_secs() -> u64 {
    15
}

fn default_deployment_deadline_secs() -> u64 {
    10 * 60
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewConfig {
    #[serde(default = "default_sleep_tick_secs")]
    pub sleep_tick_secs: u64,
    #[serde(default = "default_wake_hold_secs")]
    pub wake_hold_secs: u64,
    pub base_domain: Option<String>,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            sleep_tick_secs: default_sleep_tick_secs(),
            wake_hold_secs: default_wake_hold_secs(),
            base_domain: None,
        }
    }
}

fn default_sleep_tick_secs() -> u64 {
    60
}

fn default_wake_hold_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_timeout_secs")]
    pub delivery_timeout_secs: u64,
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_auto_disable_threshold")]
    pub auto_disable_threshold: u32,
    /// Shared secret used to verify inbound GitHub webhook signatures.
    pub github_secret: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            delivery_timeout_secs: default_webhook_timeout_secs(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_cap_secs: default_backoff_cap_secs(),
            max_attempts: default_max_attempts(),
            auto_disable_threshold: default_auto_disable_threshold(),
            github_secret: None,
        }
    }
}

fn default_webhook_timeout_secs() -> u64 {
    10
}

fn default_backoff_base_secs() -> u64 {
    2
}

fn default_backoff_cap_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    6
}

fn default_auto_disable_threshold() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_audit_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_audit_flush_interval_secs")]
    pub flush_interval_secs: u64,
    #[serde(default = "default_audit_shutdown_deadline_secs")]
    pub shutdown_deadline_secs: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_audit_queue_capacity(),
            batch_size: default_audit_batch_size(),
            flush_interval_secs: default_audit_flush_interval_secs(),
            shutdown_deadline_secs: default_audit_shutdown_deadline_secs(),
        }
    }
}

fn default_audit_queue_capacity() -> usize {
    100
}

fn default_audit_batch_size() -> usize {
    10
}

fn default_audit_flush_interval_secs() -> u64 {
    5
}

fn default_audit_shutdown_deadline_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_requests_per_window")]
    pub api_requests_per_window: u32,
    #[serde(default = "default_auth_requests_per_window")]
    pub auth_requests_per_window: u32,
    #[serde(default = "default_webhook_requests_per_window")]
    pub webhook_requests_per_window: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            api_requests_per_window: default_api_requests_per_window(),
            auth_requests_per_window: default_auth_requests_per_window(),
            webhook_requests_per_window: default_webhook_requests_per_window(),
            window_seconds: default_window_seconds(),
        }
    }
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_api_requests_per_window() -> u32 {
    100
}

fn default_auth_requests_per_window() -> u32 {
    20
}

fn default_webhook_requests_per_window() -> u32 {
    500
}

fn default_window_seconds() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found at {}, using defaults", path.display());
            Ok(Config::default())
        }
    }

    pub fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            builder: BuilderConfig::default(),
            reconciler: ReconcilerConfig::default(),
            preview: PreviewConfig::default(),
            webhooks: WebhookConfig::default(),
            audit: AuditConfig::default(),
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
