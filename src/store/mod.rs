//! Embedded request log store
//!
//! - `record`: log entry schema
//! - `database`: SQLite persistence (insert, filtered reads, deletes)
//! - `aggregate`: windowed analytics over the stored logs
//! - `criteria`: administrative deletion filters

pub mod aggregate;
pub mod criteria;
pub mod database;
pub mod record;

pub use aggregate::{
    ClientMetrics, ClientSegment, ConsumerSegments, ErrorTrendPoint, ErrorTrends, FailingRoute,
    LatencyStats, PerformanceMetrics, PerformancePoint, SourceBreakdown, SourceCount, Summary,
    TimeWindow, TrafficPoint, DEFAULT_WINDOW_HOURS,
};
pub use criteria::{DeleteCriteria, DeleteParams};
pub use database::{LogStore, StoreOptions, StoreStats, MEMORY_PATH};
pub use record::{LogRecord, NewLogRecord};
