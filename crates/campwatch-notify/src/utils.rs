//! Utility functions for notification channels

use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// Maximum length of a response body kept in an error message.
pub const MAX_BODY_LENGTH: usize = 500;

/// Attempts per delivery before giving up.
pub const SEND_ATTEMPTS: u32 = 3;

/// Truncate a string to at most `max_len` bytes, respecting char boundaries.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &s[..end])
}

/// Strips the separators people type into phone numbers (`-` and spaces).
pub fn normalize_phone_number(raw: &str) -> String {
    raw.chars().filter(|c| *c != '-' && !c.is_whitespace()).collect()
}

/// Redact sensitive fields from JSON configuration
///
/// Replaces values for keys that look like credentials (password, token,
/// secret, api_key) with `"***"`, recursing into nested objects and arrays.
pub fn redact_sensitive_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = serde_json::Map::new();
            for (key, val) in map {
                let key_lower = key.to_lowercase();
                let is_sensitive = key_lower.contains("password")
                    || key_lower.contains("token")
                    || key_lower.contains("secret")
                    || key_lower.contains("api_key")
                    || key_lower.contains("apikey");

                if is_sensitive {
                    redacted.insert(key.clone(), Value::String("***".to_string()));
                } else {
                    redacted.insert(key.clone(), redact_sensitive_json(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(redact_sensitive_json).collect()),
        _ => value.clone(),
    }
}

/// Runs `attempt` up to [`SEND_ATTEMPTS`] times with exponential backoff
/// (100ms, 200ms) between tries. On failure the last error is returned,
/// wrapped with the number of attempts made.
pub async fn with_retries<F, Fut>(what: &str, mut attempt: F) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let mut last_err = None;
    for n in 0..SEND_ATTEMPTS {
        match attempt().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::warn!(target_name = what, attempt = n + 1, error = %e, "Send attempt failed");
                last_err = Some(e);
            }
        }
        if n + 1 < SEND_ATTEMPTS {
            tokio::time::sleep(Duration::from_millis(100 * 2u64.pow(n))).await;
        }
    }
    let err = last_err.unwrap_or_else(|| anyhow::anyhow!("no attempt made"));
    Err(err.context(format!("{what} failed after {SEND_ATTEMPTS} attempts")))
}
