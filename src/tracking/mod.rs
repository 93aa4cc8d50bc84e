//! axum request tracking
//!
//! - `middleware`: builds a log record per request and hands it off
//! - `writer`: background task that persists handed-off records

pub mod middleware;
pub mod writer;

pub use middleware::{track_requests, AuthenticatedUser, TrackingState};
pub use writer::RecordWriter;
