//! Auth (C3): password hashing, API token issuance/validation, and the
//! axum extractor/middleware that resolves a request's [`Principal`].
//! Token shape and the constant-time comparison discipline are
//! grounded on the teacher's session-token handling; `hasAccess` role
//! resolution is new (the teacher had no multi-tenant RBAC model).

pub mod middleware;

use crate::error::{Result, SwitchyardError};
use crate::store::models::Role;
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const TOKEN_PREFIX: &str = "enclii_";
const TOKEN_RANDOM_BYTES: usize = 32; // -> 64 hex chars

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| SwitchyardError::Fatal(anyhow::anyhow!("password hash: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

/// A freshly minted token: the plaintext (shown to the caller exactly
/// once), its stable display prefix, and its SHA-256 digest (what gets
/// persisted).
pub struct IssuedToken {
    pub plaintext: String,
    pub prefix: String,
    pub digest: String,
}

/// Generates a token of the form `enclii_<64 hex chars>`. The prefix
/// lets a token be displayed/identified in a UI without ever storing
/// or re-displaying the secret half.
pub fn generate_token() -> IssuedToken {
    let mut rng = rand::rng();
    let bytes: [u8; TOKEN_RANDOM_BYTES] = rng.random();
    let hex = hex::encode(bytes);
    let plaintext = format!("{TOKEN_PREFIX}{hex}");
    let prefix = format!("{TOKEN_PREFIX}{}", &hex[..8]);
    let digest = digest_token(&plaintext);
    IssuedToken { plaintext, prefix, digest }
}

pub fn digest_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time comparison against a single trusted value (e.g. a
/// statically configured bootstrap token), matching the teacher's
/// admin-token check rather than `==` to avoid a timing side channel.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// The resolved identity and role for an authenticated request, scoped
/// to the project/environment being acted on.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: String,
    pub email: String,
    pub token_id: Option<String>,
}

/// `hasAccess` (§4.3): does `role` meet or exceed `required`? Numeric
/// comparison on `Role::level`, never string matching, since future
/// roles may be inserted without reshuffling existing ones.
pub fn has_access(role: Role, required: Role) -> bool {
    role.level() >= required.level()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_roundtrip() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn token_digest_is_deterministic_and_matches_plaintext() {
        let issued = generate_token();
        assert!(issued.plaintext.starts_with("enclii_"));
        assert_eq!(issued.plaintext.len(), "enclii_".len() + 64);
        assert_eq!(digest_token(&issued.plaintext), issued.digest);
    }

    #[test]
    fn has_access_is_numeric_not_exact_match() {
        assert!(has_access(Role::Admin, Role::Developer));
        assert!(has_access(Role::Developer, Role::Developer));
        assert!(!has_access(Role::Viewer, Role::Developer));
    }
}
