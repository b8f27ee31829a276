//! Sensitive-field redaction for audit payloads. Walks an arbitrary
//! JSON value and blanks any object key that looks like a secret
//! before the payload is ever written to `audit_logs` or `context`.

use serde_json::Value;

const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "password_hash",
    "secret",
    "secret_ref",
    "token",
    "api_key",
    "apikey",
    "signing_secret",
    "bot_token",
    "digest",
    "authorization",
    "private_key",
    "key",
];

const REDACTED: &str = "[REDACTED]";

pub fn redact_value(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, val)| {
                    if is_sensitive_key(&key) {
                        (key, Value::String(REDACTED.to_string()))
                    } else {
                        (key, redact_value(val))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(redact_value).collect()),
        other => other,
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_KEYS.iter().any(|needle| lower.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_nested_sensitive_fields() {
        let input = json!({
            "service": "web",
            "config": { "database_password": "hunter2", "port": 5432 },
            "tokens": ["a", "b"],
        });
        let redacted = redact_value(input);
        assert_eq!(redacted["config"]["database_password"], json!("[REDACTED]"));
        assert_eq!(redacted["config"]["port"], json!(5432));
        assert_eq!(redacted["service"], json!("web"));
    }

    #[test]
    fn redacts_fields_matching_the_generic_key_substring() {
        let input = json!({
            "encryption_key": "abc123",
            "aws_key": "xyz",
            "monkey": "not a secret",
        });
        let redacted = redact_value(input);
        assert_eq!(redacted["encryption_key"], json!("[REDACTED]"));
        assert_eq!(redacted["aws_key"], json!("[REDACTED]"));
        assert_eq!(redacted["monkey"], json!("[REDACTED]"));
    }
}
