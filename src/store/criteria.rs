//! Administrative deletion criteria
//!
//! Raw parameters arrive as strings from the query string or the CLI and are
//! parsed into exactly one [`DeleteCriteria`]. When several are supplied the
//! first in the order `all_logs`, `path_pattern`, `status_code`,
//! `older_than_days`, `log_ids` wins.

use crate::error::{Result, TrackError};
use crate::store::LogStore;
use serde::{Deserialize, Serialize};

/// Unparsed deletion parameters, echoed back to the caller as given
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteParams {
    pub all_logs: Option<String>,
    pub path_pattern: Option<String>,
    pub status_code: Option<String>,
    pub older_than_days: Option<String>,
    /// Comma-separated ids
    pub log_ids: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteCriteria {
    All,
    PathPattern(String),
    StatusCode(u16),
    OlderThanDays(u32),
    Ids(Vec<i64>),
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(TrackError::validation(format!(
            "all_logs must be a boolean, got '{}'",
            value
        ))),
    }
}

/// Parse a comma-separated id list; blank entries are skipped
pub fn parse_log_ids(raw: &str) -> Result<Vec<i64>> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| id.parse::<i64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| TrackError::validation("Invalid log IDs format"))?;

    if ids.is_empty() {
        return Err(TrackError::validation("Invalid log IDs format"));
    }
    Ok(ids)
}

impl DeleteParams {
    /// The single criterion to honor
    pub fn criteria(&self) -> Result<DeleteCriteria> {
        if let Some(flag) = present(&self.all_logs) {
            if parse_flag(flag)? {
                return Ok(DeleteCriteria::All);
            }
        }

        if let Some(pattern) = present(&self.path_pattern) {
            return Ok(DeleteCriteria::PathPattern(pattern.to_string()));
        }

        if let Some(code) = present(&self.status_code) {
            let code = code.parse::<u16>().map_err(|_| {
                TrackError::validation(format!("status_code must be an integer, got '{}'", code))
            })?;
            return Ok(DeleteCriteria::StatusCode(code));
        }

        if let Some(days) = present(&self.older_than_days) {
            let days = days.parse::<u32>().map_err(|_| {
                TrackError::validation(format!(
                    "older_than_days must be a non-negative integer, got '{}'",
                    days
                ))
            })?;
            return Ok(DeleteCriteria::OlderThanDays(days));
        }

        if let Some(ids) = present(&self.log_ids) {
            return Ok(DeleteCriteria::Ids(parse_log_ids(ids)?));
        }

        Err(TrackError::validation("No deletion criteria provided"))
    }
}

impl LogStore {
    /// Delete everything matching `criteria` and return the removed row count
    pub async fn delete_matching(&self, criteria: &DeleteCriteria) -> Result<u64> {
        match criteria {
            DeleteCriteria::All => self.delete_all().await,
            DeleteCriteria::PathPattern(pattern) => self.delete_by_path_pattern(pattern).await,
            DeleteCriteria::StatusCode(code) => self.delete_by_status_code(*code).await,
            DeleteCriteria::OlderThanDays(days) => self.delete_older_than(*days).await,
            DeleteCriteria::Ids(ids) => self.delete_by_ids(ids).await,
        }
    }
}
