//! Shared entity structs and status enums for the Store (§3 of the spec).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn now_rfc3339() -> String {
    now().to_rfc3339()
}

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::error::SwitchyardError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant),)+
                    other => Err(crate::error::SwitchyardError::Fatal(anyhow::anyhow!(
                        "unknown {} value: {}", stringify!($name), other
                    ))),
                }
            }
        }
    };
}

string_enum!(ReleaseStatus {
    Pending => "pending",
    Building => "building",
    Ready => "ready",
    Failed => "failed",
});

string_enum!(DeploymentStatus {
    Pending => "pending",
    Deploying => "deploying",
    Live => "live",
    Degraded => "degraded",
    Failed => "failed",
    Superseded => "superseded",
});

string_enum!(DeploymentHealth {
    Unknown => "unknown",
    Healthy => "healthy",
    Degraded => "degraded",
    Unhealthy => "unhealthy",
});

string_enum!(PreviewStatus {
    Pending => "pending",
    Building => "building",
    Deploying => "deploying",
    Active => "active",
    Sleeping => "sleeping",
    Closed => "closed",
    Failed => "failed",
});

string_enum!(AddonStatus {
    Pending => "pending",
    Provisioning => "provisioning",
    Ready => "ready",
    Degraded => "degraded",
    Deleting => "deleting",
    Deleted => "deleted",
});

string_enum!(FunctionStatus {
    Pending => "pending",
    Building => "building",
    Deploying => "deploying",
    Ready => "ready",
    Failed => "failed",
    Deleting => "deleting",
});

string_enum!(Role {
    Viewer => "viewer",
    Developer => "developer",
    Admin => "admin",
});

impl Role {
    /// Numeric level used by `hasAccess`: admin=3, developer=2, viewer=1.
    pub fn level(&self) -> u8 {
        match self {
            Role::Admin => 3,
            Role::Developer => 2,
            Role::Viewer => 1,
        }
    }
}

string_enum!(AuditOutcome {
    Success => "success",
    Failure => "failure",
    Denied => "denied",
});

string_enum!(WebhookTransport {
    Http => "http",
    ChatA => "chat_a",
    ChatB => "chat_b",
});

string_enum!(WebhookOutcome {
    Success => "success",
    Failure => "failure",
});

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Environment {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub namespace_label: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub git_url: String,
    pub app_path: Option<String>,
    pub build_config: String, // opaque JSON: builder type + options
    pub auto_deploy: bool,
    pub auto_deploy_branch: Option<String>,
    pub auto_deploy_environment_id: Option<String>,
    pub health: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Release {
    pub id: String,
    pub service_id: String,
    pub version: i64,
    pub commit_sha: String,
    pub build_config_hash: String,
    pub image_uri: Option<String>,
    pub status: String,
    pub sbom_format: Option<String>,
    pub sbom_blob: Option<String>,
    pub signature: Option<String>,
    pub signature_verified_at: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    pub service_id: String,
    pub release_id: String,
    pub environment_id: String,
    pub replicas: i64,
    pub observed_replicas: i64,
    pub status: String,
    pub health: String,
    pub group_id: Option<String>,
    pub deploy_order: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct PreviewEnvironment {
    pub id: String,
    pub service_id: String,
    pub pr_number: i64,
    pub pr_title: Option<String>,
    pub pr_author: Option<String>,
    pub branch: String,
    pub base_branch: String,
    pub commit_sha: String,
    pub subdomain: String,
    pub preview_url: Option<String>,
    pub status: String,
    pub auto_sleep_after_minutes: i64,
    pub last_accessed_at: String,
    pub sleeping_since: Option<String>,
    pub deployment_id: Option<String>,
    pub closed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct DatabaseAddon {
    pub id: String,
    pub project_id: String,
    pub addon_type: String,
    pub name: String,
    pub status: String,
    pub config: String,
    pub host: Option<String>,
    pub port: Option<i64>,
    pub database_name: Option<String>,
    pub username: Option<String>,
    pub secret_ref: Option<String>,
    pub deleted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct DatabaseAddonBinding {
    pub id: String,
    pub addon_id: String,
    pub service_id: String,
    pub env_var_name: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Function {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub config: String,
    pub status: String,
    pub image_uri: Option<String>,
    pub endpoint_url: Option<String>,
    pub observed_replicas: i64,
    pub invocation_count: i64,
    pub avg_duration_ms: f64,
    pub deleted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ApiToken {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub prefix: String,
    pub digest: String,
    pub scopes: String, // JSON array
    pub expires_at: Option<String>,
    pub last_used_at: Option<String>,
    pub last_used_ip: Option<String>,
    pub revoked: bool,
    pub revoked_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub idp_subject: Option<String>,
    pub idp_issuer: Option<String>,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ProjectAccess {
    pub id: String,
    pub user_id: String,
    pub project_id: String,
    pub environment_id: Option<String>,
    pub role: String,
    pub expires_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: String,
    pub actor_id: Option<String>,
    pub actor_email: Option<String>,
    pub actor_role: Option<String>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub resource_name: Option<String>,
    pub project_id: Option<String>,
    pub environment_id: Option<String>,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub outcome: String,
    pub context: String,  // JSON
    pub metadata: String, // JSON
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct WebhookDestination {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub transport: String,
    pub endpoint_url: String,
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub custom_headers: Option<String>, // JSON
    pub signing_secret: Option<String>,
    pub subscribed_events: String, // JSON array
    pub enabled: bool,
    pub last_delivery_at: Option<String>,
    pub last_delivery_status: Option<String>,
    pub last_delivery_error: Option<String>,
    pub consecutive_failures: i64,
    pub auto_disabled_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: String,
    pub destination_id: String,
    pub event_type: String,
    pub event_id: String,
    pub payload: String, // JSON snapshot
    pub outcome: String,
    pub status_code: Option<i64>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub attempt: i64,
    pub duration_ms: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct CiRun {
    pub id: String,
    pub service_id: String,
    pub commit_sha: String,
    pub workflow_name: String,
    pub external_run_id: String,
    pub run_number: i64,
    pub status: String,
    pub conclusion: Option<String>,
    pub url: Option<String>,
    pub branch: String,
    pub event_type: String,
    pub actor: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ServiceDependency {
    pub id: String,
    pub project_id: String,
    pub source_service_id: String,
    pub target_service_id: String,
    pub dependency_type: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct CustomDomain {
    pub id: String,
    pub service_id: String,
    pub environment_id: String,
    pub hostname: String,
    pub status: String,
    pub certificate_status: String,
    pub created_at: String,
    pub updated_at: String,
}
