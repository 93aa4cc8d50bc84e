//! Admin and analytics HTTP routes
//!
//! Mounted under the configured prefix (default `/__devtrack__`).

pub mod health;
pub mod metrics_api;
pub mod stats_api;

use axum::routing::{delete, get};
use axum::Router;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{Result, TrackError};
use crate::store::LogStore;

/// Routes relative to the mount prefix
pub fn create_devtrack_router(store: Arc<LogStore>) -> Router {
    Router::new()
        .route("/stats", get(stats_api::get_stats))
        .route("/logs", delete(stats_api::delete_logs))
        .route("/logs/:log_id", delete(stats_api::delete_log_by_id))
        .route("/metrics/traffic", get(metrics_api::get_traffic))
        .route("/metrics/errors", get(metrics_api::get_errors))
        .route("/metrics/perf", get(metrics_api::get_performance))
        .route("/consumers", get(metrics_api::get_consumers))
        .route("/consumers/:client_hash", get(metrics_api::get_consumer))
        .route("/health", get(health::health_check))
        .with_state(store)
}

/// [`create_devtrack_router`] nested under `mount_path`
pub fn mount_devtrack_routes(mount_path: &str, store: Arc<LogStore>) -> Router {
    let mount = mount_path.trim_end_matches('/');
    if mount.is_empty() {
        create_devtrack_router(store)
    } else {
        Router::new().nest(mount, create_devtrack_router(store))
    }
}

/// Parse an optional query parameter; blank counts as absent
pub(crate) fn parse_param<T: FromStr>(name: &str, value: Option<&str>) -> Result<Option<T>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            TrackError::validation(format!("{} must be a non-negative integer, got '{}'", name, raw))
        }),
    }
}
