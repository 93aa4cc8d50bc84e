//! devtrack: request tracking and analytics for axum services
//!
//! Every tracked request becomes one immutable row in a SQLite store. The
//! store answers windowed analytics (traffic, errors, latency, consumers)
//! and administrative deletes, and is exposed under a mount prefix as JSON
//! routes.

pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod logging;
pub mod server;
pub mod store;
pub mod tracking;

pub use error::{Result, TrackError};
pub use store::{LogStore, NewLogRecord, StoreOptions};
pub use tracking::{track_requests, RecordWriter, TrackingState};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// `RUST_LOG` wins over `level`. `format` is `text` or `json`.
///
/// Note: This function can only be called once.
pub fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}
