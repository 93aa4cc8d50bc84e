//! Redaction helpers
//!
//! Keeps secrets out of two places: request bodies persisted in the store,
//! and values written to the application log.

use serde_json::Value;
use std::fmt;

/// Replacement for redacted body fields
pub const REDACTED: &str = "***";

/// Masked representation of a secret for log output
///
/// Shows at most the first 8 characters followed by `***`.
#[derive(Clone, Debug)]
pub struct SensitiveValue<'a> {
    inner: &'a str,
}

impl<'a> SensitiveValue<'a> {
    pub fn new(value: &'a str) -> Self {
        Self { inner: value }
    }
}

impl fmt::Display for SensitiveValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let visible: String = self.inner.chars().take(8).collect();
        if visible.len() == self.inner.len() {
            // Too short to reveal anything
            write!(f, "***")
        } else {
            write!(f, "{}***", visible)
        }
    }
}

/// True for values that look like credentials (API keys, bearer tokens, key-derived identities)
pub fn is_sensitive_value(value: &str) -> bool {
    const SENSITIVE_PREFIXES: &[&str] = &[
        "sk-",
        "pk-",
        "sess-",
        "Bearer ",
        "jwt:",
        "header:x-api-key:",
        "header:api-key:",
    ];

    SENSITIVE_PREFIXES
        .iter()
        .any(|prefix| value.starts_with(prefix))
}

/// Mask `value` if it looks like a credential, otherwise return it unchanged
///
/// # Example
/// ```
/// use devtrack::logging::sanitize_log_value;
///
/// assert_eq!(sanitize_log_value("sk-live-abcdef123456"), "sk-live-***");
/// assert_eq!(sanitize_log_value("mobile-app"), "mobile-app");
/// ```
pub fn sanitize_log_value(value: &str) -> String {
    if is_sensitive_value(value) {
        SensitiveValue::new(value).to_string()
    } else {
        value.to_string()
    }
}

/// Replace the value of every object key matching one of `fields`
/// (case-insensitive) with `"***"`, at any nesting depth.
pub fn redact_sensitive_fields(value: &mut Value, fields: &[String]) {
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                if fields.iter().any(|field| field.eq_ignore_ascii_case(key)) {
                    *entry = Value::String(REDACTED.to_string());
                } else {
                    redact_sensitive_fields(entry, fields);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                redact_sensitive_fields(item, fields);
            }
        }
        _ => {}
    }
}
