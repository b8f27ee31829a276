//! The build-intent shape enqueued onto the pipeline's channel.

#[derive(Debug, Clone)]
pub struct BuildIntent {
    pub service_id: String,
    pub commit_sha: String,
    pub build_config_hash: String,
    pub build_config: String, // opaque JSON handed to the Builder
    pub replicas: i64,
    pub auto_deploy: bool,
    pub auto_deploy_environment_id: Option<String>,
    /// Set when this intent came from `preview::provision`, so the
    /// resulting deployment can be linked back to its preview row.
    pub preview_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub image_uri: String,
    pub sbom_format: Option<String>,
    pub sbom_blob: Option<String>,
    pub built_at: String,
}
