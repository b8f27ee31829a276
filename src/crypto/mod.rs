//! At-rest encryption for addon connection secrets (§4.8).
//!
//! `config.auth.encryption_key`, if set, is stretched into an AES-256
//! key via PBKDF2 and used to encrypt a `DatabaseAddon`'s `secret_ref`
//! before it's written to the store, and to decrypt it again when a
//! deployment needs the plaintext to inject as an env var. Unset key
//! means secrets are stored as-is — every function here degrades to a
//! passthrough rather than failing when no key is configured, so a
//! deployment without `encryption_key` set still works end to end.
//!
//! Wire format: `ENC:` + base64(nonce[12] || ciphertext || tag[16]).

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ring::pbkdf2;
use std::num::NonZeroU32;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const PBKDF2_ITERATIONS: u32 = 100_000;
const PBKDF2_SALT: &[u8] = b"switchyard-addon-secret-v1";

/// Marks a value as ciphertext rather than a plaintext secret someone
/// provisioned before encryption was turned on.
const PREFIX: &str = "ENC:";

/// Stretches an operator-supplied passphrase into a 256-bit AES key.
/// Deterministic: the same passphrase always derives the same key, so
/// encrypted addon secrets stay decryptable across process restarts
/// without persisting the key anywhere.
pub fn derive_key(secret: &str) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        NonZeroU32::new(PBKDF2_ITERATIONS).unwrap(),
        PBKDF2_SALT,
        secret.as_bytes(),
        &mut key,
    );
    key
}

fn encrypt(plaintext: &str, key: &[u8; KEY_LEN]) -> Result<String> {
    use rand::RngCore;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(key).context("failed to build cipher")?;
    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| anyhow::anyhow!("encryption failed: {e}"))?;

    let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(format!("{PREFIX}{}", BASE64.encode(&combined)))
}

fn decrypt(ciphertext: &str, key: &[u8; KEY_LEN]) -> Result<String> {
    let encoded = ciphertext.strip_prefix(PREFIX).context("missing ENC: prefix")?;
    let combined = BASE64.decode(encoded).context("invalid base64")?;
    if combined.len() < NONCE_LEN {
        anyhow::bail!("ciphertext shorter than a nonce");
    }

    let (nonce_bytes, ciphertext_bytes) = combined.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key).context("failed to build cipher")?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext_bytes)
        .map_err(|e| anyhow::anyhow!("decryption failed, wrong key or corrupted data: {e}"))?;

    String::from_utf8(plaintext).context("decrypted value is not valid UTF-8")
}

fn is_encrypted(value: &str) -> bool {
    value.starts_with(PREFIX)
}

/// Encrypts `value` if a key is configured, otherwise returns it as-is
/// — the addon reconciler calls this right before persisting a freshly
/// provisioned `secret_ref`.
pub fn encrypt_if_key_available(value: &str, key: Option<&[u8; KEY_LEN]>) -> Result<String> {
    match key {
        Some(k) => encrypt(value, k),
        None => Ok(value.to_string()),
    }
}

/// Decrypts `value` if it carries the `ENC:` prefix, otherwise returns
/// it as-is — lets an addon provisioned before `encryption_key` was set
/// keep working without a backfill. An encrypted value with no key
/// configured is an error rather than a silent pass-through: the
/// connection string needs the real secret, not the ciphertext.
pub fn decrypt_if_encrypted(value: &str, key: Option<&[u8; KEY_LEN]>) -> Result<String> {
    if !is_encrypted(value) {
        return Ok(value.to_string());
    }
    let key = key.context("value is encrypted but no encryption key is configured")?;
    decrypt(value, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_key_is_deterministic_per_secret() {
        assert_eq!(derive_key("my-secret-key"), derive_key("my-secret-key"));
        assert_ne!(derive_key("secret1"), derive_key("secret2"));
    }

    #[test]
    fn encrypt_then_decrypt_if_encrypted_recovers_the_plaintext() {
        let key = derive_key("test-encryption-key");
        let encrypted = encrypt_if_key_available("postgres-password-123!@#", Some(&key)).unwrap();
        assert!(encrypted.starts_with(PREFIX));

        let decrypted = decrypt_if_encrypted(&encrypted, Some(&key)).unwrap();
        assert_eq!(decrypted, "postgres-password-123!@#");
    }

    #[test]
    fn same_plaintext_encrypts_differently_each_time_but_decrypts_the_same() {
        let key = derive_key("test-key");
        let a = encrypt_if_key_available("same-plaintext", Some(&key)).unwrap();
        let b = encrypt_if_key_available("same-plaintext", Some(&key)).unwrap();
        assert_ne!(a, b, "random nonce should vary the ciphertext");
        assert_eq!(decrypt_if_encrypted(&a, Some(&key)).unwrap(), "same-plaintext");
        assert_eq!(decrypt_if_encrypted(&b, Some(&key)).unwrap(), "same-plaintext");
    }

    #[test]
    fn decrypting_with_the_wrong_key_fails() {
        let encrypted = encrypt_if_key_available("secret-value", Some(&derive_key("correct-key"))).unwrap();
        let result = decrypt_if_encrypted(&encrypted, Some(&derive_key("wrong-key")));
        assert!(result.is_err());
    }

    #[test]
    fn unencrypted_values_pass_through_regardless_of_key() {
        assert_eq!(decrypt_if_encrypted("plain-value", None).unwrap(), "plain-value");
        assert_eq!(
            decrypt_if_encrypted("plain-value", Some(&derive_key("k"))).unwrap(),
            "plain-value"
        );
    }

    #[test]
    fn encrypted_value_with_no_key_configured_is_an_error() {
        let encrypted = encrypt_if_key_available("secret", Some(&derive_key("test-key"))).unwrap();
        assert!(decrypt_if_encrypted(&encrypted, None).is_err());
    }

    #[test]
    fn no_key_configured_stores_secrets_as_is() {
        assert_eq!(encrypt_if_key_available("my-secret", None).unwrap(), "my-secret");
    }
}
