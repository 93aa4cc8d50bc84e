use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;
use std::sync::Arc;

use crate::error::TrackError;
use crate::store::LogStore;

/// Health check endpoint
/// Returns 200 OK with the stored record count while the store is usable
pub async fn health_check(
    State(store): State<Arc<LogStore>>,
) -> Result<impl IntoResponse, TrackError> {
    let records = store.count().await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "devtrack",
            "version": env!("CARGO_PKG_VERSION"),
            "records": records,
        })),
    ))
}
