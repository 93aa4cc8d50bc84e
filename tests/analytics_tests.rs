/// Integration tests for windowed analytics over a populated store
use chrono::{DateTime, Duration, TimeZone, Utc};
use devtrack::identity::{hash_identifier, ClientIdentity};
use devtrack::store::{LogStore, NewLogRecord, TimeWindow};

// 2024-01-20T05:20:00Z
fn base() -> DateTime<Utc> {
    Utc.timestamp_opt(1_705_728_000, 0).unwrap()
}

fn at(minutes: i64, seconds: i64) -> DateTime<Utc> {
    base() + Duration::minutes(minutes) + Duration::seconds(seconds)
}

struct Request<'a> {
    method: &'a str,
    pattern: &'a str,
    status: u16,
    when: DateTime<Utc>,
    duration: Option<f64>,
    client: Option<&'a str>,
    ip: Option<&'a str>,
}

async fn insert(store: &LogStore, req: Request<'_>) {
    let mut record = NewLogRecord::new(req.method, req.pattern, req.status, req.when);
    record.duration_ms = req.duration;
    record.client_identifier_hash = req.client.map(str::to_string);
    record.client_ip = req.ip.map(str::to_string);
    store.insert(&record).await.unwrap();
}

/// Two identified clients plus anonymous traffic spread over three minutes
async fn populated_store() -> (LogStore, String, String) {
    let store = LogStore::open_in_memory().await.unwrap();
    let alice = ClientIdentity::Header {
        name: "x-client-id",
        value: "alice".to_string(),
    }
    .hash()
    .unwrap();
    let bob = ClientIdentity::User("bob".to_string()).hash().unwrap();

    let rows = [
        ("GET", "/users", 200, at(0, 5), Some(10.0), Some(alice.as_str()), Some("ip-a1")),
        ("GET", "/users/:id", 200, at(0, 40), Some(20.0), Some(alice.as_str()), Some("ip-a2")),
        ("POST", "/orders", 500, at(1, 10), Some(300.0), Some(alice.as_str()), Some("unknown")),
        ("GET", "/users", 404, at(1, 20), Some(5.0), Some(bob.as_str()), None),
        ("POST", "/orders", 500, at(2, 0), None, None, None),
        ("GET", "/health", 200, at(2, 30), Some(1.0), None, None),
    ];
    for (method, pattern, status, when, duration, client, ip) in rows {
        insert(
            &store,
            Request {
                method,
                pattern,
                status,
                when,
                duration,
                client,
                ip,
            },
        )
        .await;
    }

    (store, alice, bob)
}

fn window() -> TimeWindow {
    TimeWindow::ending_at(at(10, 0), 1)
}

#[tokio::test]
async fn test_traffic_and_error_trends_share_buckets() {
    let (store, _, _) = populated_store().await;

    let traffic = store.traffic_over_time(window()).await.unwrap();
    let labels: Vec<&str> = traffic.iter().map(|p| p.timestamp.as_str()).collect();
    assert_eq!(
        labels,
        vec!["2024-01-20T05:20:00Z", "2024-01-20T05:21:00Z", "2024-01-20T05:22:00Z"]
    );
    assert_eq!(traffic.iter().map(|p| p.count).collect::<Vec<_>>(), vec![2, 2, 2]);

    let errors = store.error_trends(window()).await.unwrap();
    assert_eq!(errors.trends.len(), 3);
    assert_eq!(errors.trends[0].error_rate, 0.0);
    assert_eq!(errors.trends[1].error_count, 2);
    assert_eq!(errors.trends[1].error_rate, 100.0);
    assert_eq!(errors.trends[2].error_rate, 50.0);

    let top = &errors.top_failing_routes;
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].path, "/orders");
    assert_eq!(top[0].method, "POST");
    assert_eq!(top[0].error_count, 2);
    assert_eq!(top[0].error_percentage, 66.67);
    assert_eq!(top[1].path, "/users");
    assert_eq!(top[1].error_percentage, 33.33);
}

#[tokio::test]
async fn test_window_excludes_older_records() {
    let (store, _, _) = populated_store().await;
    let stale = TimeWindow::ending_at(at(90, 0), 1);
    assert!(store.traffic_over_time(stale).await.unwrap().is_empty());
    assert!(store.error_trends(stale).await.unwrap().top_failing_routes.is_empty());

    let wide = TimeWindow::ending_at(at(90, 0), 2);
    let traffic = store.traffic_over_time(wide).await.unwrap();
    assert_eq!(traffic.iter().map(|p| p.count).sum::<u64>(), 6);

    // the end bound is inclusive
    let until = TimeWindow::ending_at(at(2, 0), 1);
    let traffic = store.traffic_over_time(until).await.unwrap();
    assert_eq!(traffic.iter().map(|p| p.count).sum::<u64>(), 5);
}

#[tokio::test]
async fn test_performance_percentiles() {
    let (store, _, _) = populated_store().await;
    let perf = store.performance_metrics(window()).await.unwrap();

    // samples: 1, 5, 10, 20, 300
    assert_eq!(perf.overall.p50, Some(10.0));
    assert_eq!(perf.overall.p95, Some(300.0));
    assert_eq!(perf.overall.p99, Some(300.0));
    assert_eq!(perf.overall.avg, Some(67.2));

    assert_eq!(perf.over_time.len(), 3);
    assert_eq!(perf.over_time[0].stats.avg, Some(15.0));
    // minute 2 holds one timed and one untimed request
    assert_eq!(perf.over_time[2].stats.p50, Some(1.0));
}

#[tokio::test]
async fn test_consumer_segments_and_breakdown() {
    let (store, alice, bob) = populated_store().await;
    let consumers = store.consumer_segments(window()).await.unwrap();

    assert_eq!(consumers.total_unique_clients, 2);
    assert_eq!(consumers.source_breakdown.identified.client_count, 2);
    assert_eq!(consumers.source_breakdown.identified.request_count, 4);
    assert_eq!(consumers.source_breakdown.unknown.client_count, 0);
    assert_eq!(consumers.source_breakdown.unknown.request_count, 2);

    let first = &consumers.segments[0];
    assert_eq!(first.client_hash, alice);
    assert_eq!(first.request_count, 3);
    assert_eq!(first.unique_endpoints, 3);
    assert_eq!(first.error_count, 1);
    assert_eq!(first.error_rate, 33.33);
    assert_eq!(first.first_seen, at(0, 5));
    assert_eq!(first.last_seen, at(1, 10));
    // latest IP was unresolved
    assert_eq!(first.public_ip, None);

    let second = &consumers.segments[1];
    assert_eq!(second.client_hash, bob);
    assert_eq!(second.error_rate, 100.0);
}

#[tokio::test]
async fn test_client_detail() {
    let (store, alice, _) = populated_store().await;

    let metrics = store.client_metrics(&alice, window()).await.unwrap().unwrap();
    assert_eq!(metrics.request_count, 3);
    assert_eq!(metrics.success_count, 2);
    assert_eq!(metrics.min_latency, Some(10.0));
    assert_eq!(metrics.max_latency, Some(300.0));
    assert_eq!(metrics.avg_latency, Some(110.0));

    let traffic = store.client_traffic_over_time(&alice, window()).await.unwrap();
    assert_eq!(traffic.iter().map(|p| p.count).collect::<Vec<_>>(), vec![2, 1]);

    let stranger = hash_identifier("ip:203.0.113.9").unwrap();
    assert!(store.client_metrics(&stranger, window()).await.unwrap().is_none());
    assert!(store
        .client_traffic_over_time(&stranger, window())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_summary_covers_whole_store() {
    let (store, _, _) = populated_store().await;
    let summary = store.summary().await.unwrap();

    assert_eq!(summary.total_requests, 6);
    assert_eq!(summary.unique_endpoints, 4);
    assert_eq!(summary.success_count, 3);
    assert_eq!(summary.error_count, 3);
    assert_eq!(summary.min_duration_ms, Some(1.0));
    assert_eq!(summary.max_duration_ms, Some(300.0));
}

#[tokio::test]
async fn test_empty_store_analytics() {
    let store = LogStore::open_in_memory().await.unwrap();

    assert!(store.traffic_over_time(window()).await.unwrap().is_empty());
    let perf = store.performance_metrics(window()).await.unwrap();
    assert!(perf.over_time.is_empty());
    assert_eq!(perf.overall.p50, None);

    let consumers = store.consumer_segments(window()).await.unwrap();
    assert!(consumers.segments.is_empty());
    assert_eq!(consumers.total_unique_clients, 0);

    let summary = store.summary().await.unwrap();
    assert_eq!(summary.total_requests, 0);
    assert_eq!(summary.avg_duration_ms, None);
}
