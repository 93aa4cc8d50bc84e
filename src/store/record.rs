//! Log record schema
//!
//! `NewLogRecord` is what an adapter builds for one request/response cycle;
//! `LogRecord` is what the store hands back, with the store-assigned `id`
//! and `created_at`.

use crate::error::{Result, TrackError};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Log entry as produced by the HTTP adapter, before insertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLogRecord {
    pub path: String,
    pub path_pattern: String,
    pub method: String,
    pub status_code: u16,
    pub timestamp: DateTime<Utc>,
    pub client_ip: Option<String>,
    pub duration_ms: Option<f64>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    #[serde(default)]
    pub query_params: Map<String, Value>,
    #[serde(default)]
    pub path_params: Map<String, Value>,
    #[serde(default = "empty_object")]
    pub request_body: Value,
    #[serde(default)]
    pub response_size: u64,
    pub user_id: Option<String>,
    pub role: Option<String>,
    /// Generated by the store when absent
    pub trace_id: Option<String>,
    pub client_identifier_hash: Option<String>,
}

/// Persisted log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub path: String,
    pub path_pattern: String,
    pub method: String,
    pub status_code: u16,
    pub timestamp: DateTime<Utc>,
    pub client_ip: Option<String>,
    pub duration_ms: Option<f64>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub query_params: Map<String, Value>,
    pub path_params: Map<String, Value>,
    pub request_body: Value,
    pub response_size: u64,
    pub user_id: Option<String>,
    pub role: Option<String>,
    pub trace_id: String,
    pub client_identifier_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl NewLogRecord {
    /// Minimal record for a request; every optional field starts empty.
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        status_code: u16,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let path = path.into();
        Self {
            path_pattern: path.clone(),
            path,
            method: method.into(),
            status_code,
            timestamp,
            client_ip: None,
            duration_ms: None,
            user_agent: None,
            referer: None,
            query_params: Map::new(),
            path_params: Map::new(),
            request_body: empty_object(),
            response_size: 0,
            user_id: None,
            role: None,
            trace_id: None,
            client_identifier_hash: None,
        }
    }

    /// Reject values the schema cannot represent faithfully.
    pub fn validate(&self) -> Result<()> {
        if let Some(duration) = self.duration_ms {
            if !duration.is_finite() || duration < 0.0 {
                return Err(TrackError::validation(format!(
                    "duration_ms must be a non-negative number, got {}",
                    duration
                )));
            }
        }
        if self.response_size > i64::MAX as u64 {
            return Err(TrackError::validation("response_size is out of range"));
        }
        if self.method.is_empty() {
            return Err(TrackError::validation("method cannot be empty"));
        }
        Ok(())
    }
}

/// Convert Unix milliseconds back into a UTC timestamp.
///
/// Out-of-range values clamp to the epoch rather than failing the read.
pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_default()
}

/// Round to two decimal places (latency and percentage outputs)
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_defaults() {
        let record = NewLogRecord::new("GET", "/users/42", 200, Utc::now());
        assert_eq!(record.path_pattern, "/users/42");
        assert_eq!(record.request_body, serde_json::json!({}));
        assert!(record.trace_id.is_none());
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_negative_duration_rejected() {
        let mut record = NewLogRecord::new("GET", "/", 200, Utc::now());
        record.duration_ms = Some(-1.0);
        assert!(record.validate().unwrap_err().is_client_error());

        record.duration_ms = Some(f64::NAN);
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(12.345_6), 12.35);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn test_from_millis() {
        let ts = from_millis(1_705_728_000_000);
        assert_eq!(ts.timestamp_millis(), 1_705_728_000_000);
    }
}
