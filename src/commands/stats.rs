use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use devtrack::config::Config;
use devtrack::store::{
    ConsumerSegments, LatencyStats, LogStore, StoreOptions, Summary, TimeWindow,
};
use std::path::Path;
use tracing::info;

/// Execute the stats command
///
/// Opens the store read-only so it works next to a running server.
pub async fn execute(cfg: &Config, hours: u32, top: usize) -> Result<()> {
    println!("devtrack Statistics");
    println!("===================\n");

    if !Path::new(&cfg.store.database_path).exists() {
        println!("No request log store at {}", cfg.store.database_path);
        return Ok(());
    }

    info!(database = %cfg.store.database_path, "Opening request log store");
    let store = LogStore::open_with(StoreOptions::from(&cfg.store).read_only())
        .await
        .with_context(|| format!("Failed to open request log store at {}", cfg.store.database_path))?;

    let result = display(&store, hours, top).await;
    store.close().await;
    result
}

async fn display(store: &LogStore, hours: u32, top: usize) -> Result<()> {
    let window = TimeWindow::last_hours(hours);

    let stats = store.stats().await?;
    println!("Store: {}", stats.database_path);
    if let (Some(oldest), Some(newest)) = (stats.oldest_timestamp, stats.newest_timestamp) {
        println!("  Records span {} to {}", oldest.to_rfc3339(), newest.to_rfc3339());
    }
    println!();

    display_summary(&store.summary().await?);

    println!("Latency (last {} hours):", hours);
    display_latency(&store.performance_metrics(window).await?.overall);

    let errors = store.error_trends(window).await?;
    println!("Top Failing Routes (last {} hours):", hours);
    if errors.top_failing_routes.is_empty() {
        println!("  No errors recorded\n");
    } else {
        let mut table = new_table(&["METHOD", "ROUTE", "ERRORS", "ERROR %"]);
        for route in &errors.top_failing_routes {
            table.add_row(vec![
                Cell::new(&route.method),
                Cell::new(&route.path),
                Cell::new(route.error_count),
                Cell::new(format!("{:.2}%", route.error_percentage)),
            ]);
        }
        println!("{}\n", table);
    }

    println!("Top Consumers (last {} hours):", hours);
    display_consumers(&store.consumer_segments(window).await?, top);

    Ok(())
}

fn display_summary(summary: &Summary) {
    for line in summary_lines(summary) {
        println!("{}", line);
    }
    println!();
}

fn summary_lines(summary: &Summary) -> Vec<String> {
    vec![
        "Summary (all records):".to_string(),
        format!("  Total Requests:    {}", summary.total_requests),
        format!("  Unique Endpoints:  {}", summary.unique_endpoints),
        format!("  Success (2xx):     {}", summary.success_count),
        format!("  Errors (>=400):    {}", summary.error_count),
        format!(
            "  Duration ms:       avg {} / min {} / max {}",
            format_ms(summary.avg_duration_ms),
            format_ms(summary.min_duration_ms),
            format_ms(summary.max_duration_ms)
        ),
    ]
}

fn display_latency(stats: &LatencyStats) {
    let mut table = new_table(&["P50", "P95", "P99", "AVG"]);
    table.add_row(vec![
        Cell::new(format_ms(stats.p50)),
        Cell::new(format_ms(stats.p95)),
        Cell::new(format_ms(stats.p99)),
        Cell::new(format_ms(stats.avg)),
    ]);
    println!("{}\n", table);
}

fn display_consumers(consumers: &ConsumerSegments, top: usize) {
    println!(
        "  Unique clients: {} (identified requests: {}, unknown requests: {})",
        consumers.total_unique_clients,
        consumers.source_breakdown.identified.request_count,
        consumers.source_breakdown.unknown.request_count
    );

    if consumers.segments.is_empty() {
        println!("  No identified clients\n");
        return;
    }

    let mut table = new_table(&[
        "CLIENT", "REQUESTS", "ENDPOINTS", "AVG MS", "ERRORS", "ERROR %", "LAST SEEN",
    ]);
    for segment in consumers.segments.iter().take(top) {
        let error_cell = if segment.error_count > 0 {
            Cell::new(segment.error_count).fg(Color::Red)
        } else {
            Cell::new(segment.error_count)
        };
        table.add_row(vec![
            Cell::new(&segment.client_hash),
            Cell::new(segment.request_count),
            Cell::new(segment.unique_endpoints),
            Cell::new(format_ms(segment.avg_latency)),
            error_cell,
            Cell::new(format!("{:.2}%", segment.error_rate)),
            Cell::new(segment.last_seen.format("%Y-%m-%d %H:%M:%S").to_string()),
        ]);
    }
    println!("{}\n", table);
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).fg(Color::Cyan))
            .collect::<Vec<_>>(),
    );
    table
}

fn format_ms(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use devtrack::store::NewLogRecord;

    #[test]
    fn test_format_ms() {
        assert_eq!(format_ms(Some(12.0)), "12.00");
        assert_eq!(format_ms(None), "-");
    }

    #[tokio::test]
    async fn test_summary_success_counts_only_2xx() {
        let store = LogStore::open_in_memory().await.unwrap();
        for status in [200, 204, 301, 404] {
            let record = NewLogRecord::new("GET", "/items", status, Utc::now());
            store.insert(&record).await.unwrap();
        }

        let lines = summary_lines(&store.summary().await.unwrap());
        assert_eq!(lines[3], "  Success (2xx):     2");
        assert_eq!(lines[4], "  Errors (>=400):    1");
    }

    #[tokio::test]
    async fn test_missing_store_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.store.database_path = dir.path().join("absent.db").to_string_lossy().into_owned();

        execute(&cfg, 24, 10).await.unwrap();
        assert!(!dir.path().join("absent.db").exists());
    }
}
