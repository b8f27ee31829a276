//! Input validation for API requests.
//!
//! For collecting multiple validation errors and returning them as an
//! ApiError, use the `ValidationErrorBuilder` from the `error` module.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref GIT_HTTP_URL_REGEX: Regex = Regex::new(
        r"^https?://[a-zA-Z0-9][-a-zA-Z0-9]*(\.[a-zA-Z0-9][-a-zA-Z0-9]*)*(:\d+)?(/[-a-zA-Z0-9_%&=+@~.]+)*/?$"
    ).unwrap();

    static ref GIT_SSH_URL_REGEX: Regex = Regex::new(
        r"^(git@[a-zA-Z0-9][-a-zA-Z0-9]*(\.[a-zA-Z0-9][-a-zA-Z0-9]*)*:[-a-zA-Z0-9_./]+\.git|ssh://[a-zA-Z0-9@][-a-zA-Z0-9@.]*(/[-a-zA-Z0-9_.]+)+\.git)$"
    ).unwrap();

    /// Project/service/environment names: lowercase alphanumeric with dashes.
    static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").unwrap();

    static ref DOMAIN_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?)*$"
    ).unwrap();

    static ref BRANCH_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9._/-]*[a-zA-Z0-9])?$").unwrap();
}

pub fn validate_git_url(url: &str) -> Result<(), String> {
    if url.is_empty() {
        return Err("Git URL is required".to_string());
    }
    if url.len() > 2048 {
        return Err("Git URL is too long (max 2048 characters)".to_string());
    }
    if (url.starts_with("http://") || url.starts_with("https://")) && GIT_HTTP_URL_REGEX.is_match(url) {
        return Ok(());
    }
    if (url.starts_with("git@") || url.starts_with("ssh://")) && GIT_SSH_URL_REGEX.is_match(url) {
        return Ok(());
    }
    Err("Invalid Git URL format. Must be HTTP(S) or SSH URL".to_string())
}

/// Shared by project names, service names, and environment names — all
/// DNS-label-safe slugs (service names end up in a workload's generated
/// hostname).
pub fn validate_slug(name: &str, field_name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err(format!("{field_name} is required"));
    }
    if name.len() > 63 {
        return Err(format!("{field_name} is too long (max 63 characters)"));
    }
    if name.len() < 2 {
        return Err(format!("{field_name} is too short (min 2 characters)"));
    }
    if !SLUG_REGEX.is_match(name) {
        return Err(format!(
            "{field_name} must be lowercase alphanumeric with dashes, starting and ending with alphanumeric"
        ));
    }
    Ok(())
}

pub fn validate_uuid(id: &str, field_name: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{field_name} is required"));
    }
    if uuid::Uuid::parse_str(id).is_err() {
        return Err(format!("Invalid {field_name} format"));
    }
    Ok(())
}

pub fn validate_branch(branch: &str) -> Result<(), String> {
    if branch.is_empty() {
        return Err("Branch name is required".to_string());
    }
    if branch.len() > 255 {
        return Err("Branch name is too long (max 255 characters)".to_string());
    }
    if !BRANCH_REGEX.is_match(branch) {
        return Err("Invalid branch name format".to_string());
    }
    Ok(())
}

pub fn validate_domain_name(domain: &str) -> Result<(), String> {
    if domain.is_empty() {
        return Err("Domain is required".to_string());
    }
    if domain.len() > 253 {
        return Err("Domain name is too long (max 253 characters)".to_string());
    }
    if !DOMAIN_REGEX.is_match(domain) {
        return Err("Invalid domain name format".to_string());
    }
    Ok(())
}

pub fn validate_replicas(replicas: i64) -> Result<(), String> {
    if replicas < 0 {
        return Err("replicas cannot be negative".to_string());
    }
    if replicas > 64 {
        return Err("replicas exceeds the maximum of 64".to_string());
    }
    Ok(())
}

pub fn validate_role(role: &str) -> Result<(), String> {
    match role {
        "admin" | "developer" | "viewer" => Ok(()),
        _ => Err("role must be one of: admin, developer, viewer".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_https_and_ssh_git_urls() {
        assert!(validate_git_url("https://github.com/acme/app.git").is_ok());
        assert!(validate_git_url("git@github.com:acme/app.git").is_ok());
        assert!(validate_git_url("not-a-url").is_err());
    }

    #[test]
    fn slug_rejects_uppercase_and_short_names() {
        assert!(validate_slug("api", "name").is_ok());
        assert!(validate_slug("Api", "name").is_err());
        assert!(validate_slug("a", "name").is_err());
    }

    #[test]
    fn replicas_bounded() {
        assert!(validate_replicas(3).is_ok());
        assert!(validate_replicas(-1).is_err());
        assert!(validate_replicas(100).is_err());
    }
}
