//! Windowed analytics routes
//!
//! Every route accepts `?hours=N` (default 24) and reads `[now - N h, now]`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::parse_param;
use crate::error::Result;
use crate::store::{
    ConsumerSegments, ErrorTrends, LogStore, PerformanceMetrics, TimeWindow, DEFAULT_WINDOW_HOURS,
};

#[derive(Debug, Default, Deserialize)]
pub struct WindowQuery {
    pub hours: Option<String>,
}

impl WindowQuery {
    fn window(&self) -> Result<TimeWindow> {
        let hours = parse_param::<u32>("hours", self.hours.as_deref())?.unwrap_or(DEFAULT_WINDOW_HOURS);
        Ok(TimeWindow::last_hours(hours))
    }
}

/// GET {mount}/metrics/traffic
pub async fn get_traffic(
    State(store): State<Arc<LogStore>>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<serde_json::Value>> {
    let traffic = store.traffic_over_time(query.window()?).await?;
    Ok(Json(json!({ "traffic": traffic })))
}

/// GET {mount}/metrics/errors
pub async fn get_errors(
    State(store): State<Arc<LogStore>>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<ErrorTrends>> {
    Ok(Json(store.error_trends(query.window()?).await?))
}

/// GET {mount}/metrics/perf
pub async fn get_performance(
    State(store): State<Arc<LogStore>>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<PerformanceMetrics>> {
    Ok(Json(store.performance_metrics(query.window()?).await?))
}

/// GET {mount}/consumers
pub async fn get_consumers(
    State(store): State<Arc<LogStore>>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<ConsumerSegments>> {
    Ok(Json(store.consumer_segments(query.window()?).await?))
}

/// GET {mount}/consumers/{client_hash} - One client's metrics and traffic
///
/// Responds 404 with `found: false` when the client has no records in the window.
pub async fn get_consumer(
    State(store): State<Arc<LogStore>>,
    Path(client_hash): Path<String>,
    Query(query): Query<WindowQuery>,
) -> Result<Response> {
    let window = query.window()?;

    let Some(metrics) = store.client_metrics(&client_hash, window).await? else {
        let body = json!({
            "found": false,
            "client_hash": client_hash,
            "error": "Client not found or no data",
        });
        return Ok((StatusCode::NOT_FOUND, Json(body)).into_response());
    };

    let traffic = store.client_traffic_over_time(&client_hash, window).await?;
    Ok(Json(json!({
        "found": true,
        "client_hash": client_hash,
        "metrics": metrics,
        "traffic": traffic,
    }))
    .into_response())
}
