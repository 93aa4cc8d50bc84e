//! Log listing and administrative deletion

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use super::parse_param;
use crate::error::{Result, TrackError};
use crate::store::{DeleteCriteria, DeleteParams, LogRecord, LogStore, Summary};

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub path_pattern: Option<String>,
    pub status_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatsFilters {
    pub limit: Option<u32>,
    pub offset: u32,
    pub path_pattern: Option<String>,
    pub status_code: Option<u16>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub summary: Summary,
    pub total: u64,
    pub entries: Vec<LogRecord>,
    pub filters: StatsFilters,
}

/// GET {mount}/stats - Summary plus stored entries
///
/// `path_pattern` takes precedence over `status_code`; `offset` only applies
/// to the unfiltered listing.
pub async fn get_stats(
    State(store): State<Arc<LogStore>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsResponse>> {
    let limit = parse_param::<u32>("limit", query.limit.as_deref())?;
    let offset = parse_param::<u32>("offset", query.offset.as_deref())?.unwrap_or(0);
    let status_code = parse_param::<u16>("status_code", query.status_code.as_deref())?;
    let path_pattern = query.path_pattern.filter(|p| !p.is_empty());

    let entries = if let Some(pattern) = &path_pattern {
        store.get_by_path_pattern(pattern, limit).await?
    } else if let Some(code) = status_code {
        store.get_by_status_code(code, limit).await?
    } else {
        store.get_all(limit, offset).await?
    };

    Ok(Json(StatsResponse {
        summary: store.summary().await?,
        total: store.count().await?,
        entries,
        filters: StatsFilters {
            limit,
            offset,
            path_pattern,
            status_code,
        },
    }))
}

/// DELETE {mount}/logs - Delete by exactly one criterion
pub async fn delete_logs(
    State(store): State<Arc<LogStore>>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<Value>> {
    let criteria = params.criteria()?;
    let deleted = store.delete_matching(&criteria).await?;

    Ok(Json(json!({
        "message": format!("Successfully deleted {} log entries", deleted),
        "deleted_count": deleted,
        "criteria": {
            "all_logs": criteria == DeleteCriteria::All,
            "path_pattern": params.path_pattern,
            "status_code": params.status_code,
            "older_than_days": params.older_than_days,
            "log_ids": params.log_ids,
        },
    })))
}

/// DELETE {mount}/logs/{log_id}
///
/// A missing id is reported with `deleted_count: 0`, not as an error.
pub async fn delete_log_by_id(
    State(store): State<Arc<LogStore>>,
    Path(log_id): Path<String>,
) -> Result<Json<Value>> {
    let log_id: i64 = log_id
        .trim()
        .parse()
        .map_err(|_| TrackError::validation(format!("Invalid log ID '{}'", log_id)))?;

    let deleted = store.delete_by_id(log_id).await?;
    let message = if deleted == 0 {
        format!("No log found with ID {}", log_id)
    } else {
        format!("Successfully deleted log with ID {}", log_id)
    };

    Ok(Json(json!({
        "message": message,
        "deleted_count": deleted,
        "log_id": log_id,
    })))
}
