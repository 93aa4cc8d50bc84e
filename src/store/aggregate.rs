//! Analytics over stored request logs
//!
//! Every route and the CLI go through these methods; none of them mutate the store.
//! Time-series results use one-minute buckets keyed by the bucket start and
//! omit empty buckets. Bucketing floors, so pre-1970 events keep their own
//! minute.

use crate::error::Result;
use crate::store::database::LogStore;
use crate::store::record::{from_millis, round2};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lookback used when a caller does not pass `hours`
pub const DEFAULT_WINDOW_HOURS: u32 = 24;

const TOP_FAILING_ROUTES: i64 = 10;
const TOP_CONSUMERS: i64 = 50;

/// Inclusive `[start, end]` range of event timestamps, in Unix milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl TimeWindow {
    /// `[now - hours, now]`
    pub fn last_hours(hours: u32) -> Self {
        Self::ending_at(Utc::now(), hours)
    }

    pub fn ending_at(end: DateTime<Utc>, hours: u32) -> Self {
        let end_ms = end.timestamp_millis();
        Self {
            start_ms: end_ms - i64::from(hours) * 3_600_000,
            end_ms,
        }
    }
}

/// Whole-store counters, as shown on the stats endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_requests: u64,
    pub unique_endpoints: u64,
    pub avg_duration_ms: Option<f64>,
    pub min_duration_ms: Option<f64>,
    pub max_duration_ms: Option<f64>,
    pub success_count: u64,
    pub error_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficPoint {
    pub timestamp: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorTrendPoint {
    pub timestamp: String,
    pub total_requests: u64,
    pub error_count: u64,
    pub error_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailingRoute {
    pub path: String,
    pub method: String,
    pub error_count: u64,
    pub error_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorTrends {
    pub trends: Vec<ErrorTrendPoint>,
    pub top_failing_routes: Vec<FailingRoute>,
}

/// Latency statistics; every field is `None` when there were no samples
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub p50: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub avg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformancePoint {
    pub timestamp: String,
    #[serde(flatten)]
    pub stats: LatencyStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub over_time: Vec<PerformancePoint>,
    pub overall: LatencyStats,
}

/// Per-client activity within the window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSegment {
    pub client_hash: String,
    pub request_count: u64,
    pub unique_endpoints: u64,
    pub avg_latency: Option<f64>,
    pub error_count: u64,
    pub error_rate: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Most recent stored IP for the client, absent when it was never resolved
    pub public_ip: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceCount {
    pub client_count: u64,
    pub request_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceBreakdown {
    pub identified: SourceCount,
    pub unknown: SourceCount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerSegments {
    pub segments: Vec<ClientSegment>,
    pub total_unique_clients: u64,
    pub source_breakdown: SourceBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMetrics {
    pub request_count: u64,
    pub unique_endpoints: u64,
    pub avg_latency: Option<f64>,
    pub min_latency: Option<f64>,
    pub max_latency: Option<f64>,
    pub error_count: u64,
    pub success_count: u64,
    pub error_rate: f64,
}

/// Clamped nearest-rank percentile over an ascending slice.
///
/// Picks `sorted[floor(n * fraction)]`, or the last sample when that index
/// runs past the end. Returns `None` for an empty slice.
pub fn percentile(sorted: &[f64], fraction: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let index = (sorted.len() as f64 * fraction).floor() as usize;
    Some(sorted[index.min(last)])
}

/// p50/p95/p99 and mean of `samples`, rounded to 2 decimals
pub fn latency_stats(mut samples: Vec<f64>) -> LatencyStats {
    if samples.is_empty() {
        return LatencyStats::default();
    }

    samples.sort_by(|a, b| a.total_cmp(b));
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;

    LatencyStats {
        p50: percentile(&samples, 0.50).map(round2),
        p95: percentile(&samples, 0.95).map(round2),
        p99: percentile(&samples, 0.99).map(round2),
        avg: Some(round2(mean)),
    }
}

fn bucket_label(bucket_ms: i64) -> String {
    from_millis(bucket_ms).to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn count(value: i64) -> u64 {
    value.max(0) as u64
}

impl LogStore {
    /// Totals across the whole store
    pub async fn summary(&self) -> Result<Summary> {
        self.ensure_open_for_query()?;

        let (total, endpoints, avg, min, max, success, errors) =
            sqlx::query_as::<_, (i64, i64, Option<f64>, Option<f64>, Option<f64>, i64, i64)>(
                r#"
                SELECT
                    COUNT(*),
                    COUNT(DISTINCT path_pattern),
                    AVG(duration_ms),
                    MIN(duration_ms),
                    MAX(duration_ms),
                    COALESCE(SUM(CASE WHEN status_code >= 200 AND status_code < 300 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status_code >= 400 THEN 1 ELSE 0 END), 0)
                FROM request_logs
                "#,
            )
            .fetch_one(self.pool())
            .await?;

        Ok(Summary {
            total_requests: count(total),
            unique_endpoints: count(endpoints),
            avg_duration_ms: avg.map(round2),
            min_duration_ms: min.map(round2),
            max_duration_ms: max.map(round2),
            success_count: count(success),
            error_count: count(errors),
        })
    }

    /// Request counts per minute within the window
    pub async fn traffic_over_time(&self, window: TimeWindow) -> Result<Vec<TrafficPoint>> {
        self.ensure_open_for_query()?;

        let rows = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT timestamp - ((timestamp % 60000) + 60000) % 60000 AS bucket, COUNT(*)
            FROM request_logs
            WHERE timestamp BETWEEN ? AND ?
            GROUP BY bucket
            ORDER BY bucket ASC
            "#,
        )
        .bind(window.start_ms)
        .bind(window.end_ms)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(bucket, requests)| TrafficPoint {
                timestamp: bucket_label(bucket),
                count: count(requests),
            })
            .collect())
    }

    /// Per-minute error rates plus the routes producing the most errors
    pub async fn error_trends(&self, window: TimeWindow) -> Result<ErrorTrends> {
        self.ensure_open_for_query()?;

        let rows = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT
                timestamp - ((timestamp % 60000) + 60000) % 60000 AS bucket,
                COUNT(*),
                SUM(CASE WHEN status_code >= 400 THEN 1 ELSE 0 END)
            FROM request_logs
            WHERE timestamp BETWEEN ? AND ?
            GROUP BY bucket
            ORDER BY bucket ASC
            "#,
        )
        .bind(window.start_ms)
        .bind(window.end_ms)
        .fetch_all(self.pool())
        .await?;

        let trends = rows
            .into_iter()
            .map(|(bucket, total, errors)| {
                let (total, errors) = (count(total), count(errors));
                ErrorTrendPoint {
                    timestamp: bucket_label(bucket),
                    total_requests: total,
                    error_count: errors,
                    error_rate: percentage(errors, total),
                }
            })
            .collect();

        let total_errors: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM request_logs WHERE status_code >= 400 AND timestamp BETWEEN ? AND ?",
        )
        .bind(window.start_ms)
        .bind(window.end_ms)
        .fetch_one(self.pool())
        .await?;
        let total_errors = count(total_errors);

        let failing = sqlx::query_as::<_, (String, String, i64)>(
            r#"
            SELECT path_pattern, method, COUNT(*) AS error_count
            FROM request_logs
            WHERE status_code >= 400 AND timestamp BETWEEN ? AND ?
            GROUP BY path_pattern, method
            ORDER BY error_count DESC, path_pattern ASC, method ASC
            LIMIT ?
            "#,
        )
        .bind(window.start_ms)
        .bind(window.end_ms)
        .bind(TOP_FAILING_ROUTES)
        .fetch_all(self.pool())
        .await?;

        let top_failing_routes = failing
            .into_iter()
            .map(|(path, method, errors)| {
                let errors = count(errors);
                FailingRoute {
                    path,
                    method,
                    error_count: errors,
                    error_percentage: round2(percentage(errors, total_errors)),
                }
            })
            .collect();

        Ok(ErrorTrends {
            trends,
            top_failing_routes,
        })
    }

    /// Latency percentiles per minute and across the whole window
    pub async fn performance_metrics(&self, window: TimeWindow) -> Result<PerformanceMetrics> {
        self.ensure_open_for_query()?;

        let rows = sqlx::query_as::<_, (i64, Option<f64>)>(
            r#"
            SELECT timestamp - ((timestamp % 60000) + 60000) % 60000 AS bucket, duration_ms
            FROM request_logs
            WHERE timestamp BETWEEN ? AND ?
            "#,
        )
        .bind(window.start_ms)
        .bind(window.end_ms)
        .fetch_all(self.pool())
        .await?;

        let mut buckets: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
        let mut overall = Vec::with_capacity(rows.len());
        for (bucket, duration) in rows {
            let samples = buckets.entry(bucket).or_default();
            if let Some(duration) = duration {
                samples.push(duration);
                overall.push(duration);
            }
        }

        let over_time = buckets
            .into_iter()
            .map(|(bucket, samples)| PerformancePoint {
                timestamp: bucket_label(bucket),
                stats: latency_stats(samples),
            })
            .collect();

        Ok(PerformanceMetrics {
            over_time,
            overall: latency_stats(overall),
        })
    }

    /// Busiest identified clients plus identified/unknown traffic split
    pub async fn consumer_segments(&self, window: TimeWindow) -> Result<ConsumerSegments> {
        self.ensure_open_for_query()?;

        let rows = sqlx::query_as::<_, (String, i64, i64, Option<f64>, i64, i64, i64, Option<String>)>(
            r#"
            SELECT
                client_identifier_hash,
                COUNT(*) AS request_count,
                COUNT(DISTINCT path_pattern),
                AVG(duration_ms),
                SUM(CASE WHEN status_code >= 400 THEN 1 ELSE 0 END),
                MIN(timestamp),
                MAX(timestamp),
                (SELECT r2.client_ip FROM request_logs r2
                 WHERE r2.client_identifier_hash = request_logs.client_identifier_hash
                   AND r2.timestamp BETWEEN ?1 AND ?2
                 ORDER BY r2.timestamp DESC, r2.id DESC
                 LIMIT 1)
            FROM request_logs
            WHERE timestamp BETWEEN ?1 AND ?2
              AND client_identifier_hash IS NOT NULL
            GROUP BY client_identifier_hash
            ORDER BY request_count DESC, client_identifier_hash ASC
            LIMIT ?3
            "#,
        )
        .bind(window.start_ms)
        .bind(window.end_ms)
        .bind(TOP_CONSUMERS)
        .fetch_all(self.pool())
        .await?;

        let segments = rows
            .into_iter()
            .map(
                |(client_hash, requests, endpoints, avg, errors, first, last, latest_ip)| {
                    let (requests, errors) = (count(requests), count(errors));
                    ClientSegment {
                        client_hash,
                        request_count: requests,
                        unique_endpoints: count(endpoints),
                        avg_latency: avg.map(round2),
                        error_count: errors,
                        error_rate: round2(percentage(errors, requests)),
                        first_seen: from_millis(first),
                        last_seen: from_millis(last),
                        public_ip: latest_ip.filter(|ip| !ip.is_empty() && ip != "unknown"),
                    }
                },
            )
            .collect();

        let sources = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT
                client_identifier_hash IS NOT NULL AS identified,
                COUNT(DISTINCT client_identifier_hash),
                COUNT(*)
            FROM request_logs
            WHERE timestamp BETWEEN ? AND ?
            GROUP BY identified
            "#,
        )
        .bind(window.start_ms)
        .bind(window.end_ms)
        .fetch_all(self.pool())
        .await?;

        let mut source_breakdown = SourceBreakdown::default();
        for (identified, clients, requests) in sources {
            let entry = SourceCount {
                client_count: count(clients),
                request_count: count(requests),
            };
            if identified != 0 {
                source_breakdown.identified = entry;
            } else {
                source_breakdown.unknown = entry;
            }
        }

        Ok(ConsumerSegments {
            segments,
            total_unique_clients: source_breakdown.identified.client_count,
            source_breakdown,
        })
    }

    /// Metrics for one client, or `None` when it has no records in the window
    pub async fn client_metrics(
        &self,
        client_hash: &str,
        window: TimeWindow,
    ) -> Result<Option<ClientMetrics>> {
        self.ensure_open_for_query()?;

        let (requests, endpoints, avg, min, max, errors, success) =
            sqlx::query_as::<_, (i64, i64, Option<f64>, Option<f64>, Option<f64>, i64, i64)>(
                r#"
                SELECT
                    COUNT(*),
                    COUNT(DISTINCT path_pattern),
                    AVG(duration_ms),
                    MIN(duration_ms),
                    MAX(duration_ms),
                    COALESCE(SUM(CASE WHEN status_code >= 400 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status_code >= 200 AND status_code < 300 THEN 1 ELSE 0 END), 0)
                FROM request_logs
                WHERE client_identifier_hash = ? AND timestamp BETWEEN ? AND ?
                "#,
            )
            .bind(client_hash)
            .bind(window.start_ms)
            .bind(window.end_ms)
            .fetch_one(self.pool())
            .await?;

        if requests == 0 {
            return Ok(None);
        }

        let (requests, errors) = (count(requests), count(errors));
        Ok(Some(ClientMetrics {
            request_count: requests,
            unique_endpoints: count(endpoints),
            avg_latency: avg.map(round2),
            min_latency: min.map(round2),
            max_latency: max.map(round2),
            error_count: errors,
            success_count: count(success),
            error_rate: round2(percentage(errors, requests)),
        }))
    }

    /// Per-minute request counts for one client
    pub async fn client_traffic_over_time(
        &self,
        client_hash: &str,
        window: TimeWindow,
    ) -> Result<Vec<TrafficPoint>> {
        self.ensure_open_for_query()?;

        let rows = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT timestamp - ((timestamp % 60000) + 60000) % 60000 AS bucket, COUNT(*)
            FROM request_logs
            WHERE client_identifier_hash = ? AND timestamp BETWEEN ? AND ?
            GROUP BY bucket
            ORDER BY bucket ASC
            "#,
        )
        .bind(client_hash)
        .bind(window.start_ms)
        .bind(window.end_ms)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(bucket, requests)| TrafficPoint {
                timestamp: bucket_label(bucket),
                count: count(requests),
            })
            .collect())
    }
}
