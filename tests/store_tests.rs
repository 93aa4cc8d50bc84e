/// Integration tests for the request log store (file-backed and in-memory)
use chrono::{Duration, Utc};
use devtrack::store::{DeleteCriteria, DeleteParams, LogStore, NewLogRecord, StoreOptions};
use devtrack::TrackError;
use serde_json::json;
use std::sync::Arc;

fn record(path: &str, status: u16) -> NewLogRecord {
    let mut record = NewLogRecord::new("GET", path, status, Utc::now());
    record.duration_ms = Some(5.0);
    record
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("logs.db");
    let path = path.to_str().unwrap();

    {
        let store = LogStore::open(path).await.unwrap();
        let mut rec = record("/users/42", 201);
        rec.path_pattern = "/users/:id".to_string();
        rec.query_params = json!({"tag": ["a", "b"]}).as_object().unwrap().clone();
        rec.request_body = json!({"name": "x", "password": "***"});
        rec.trace_id = Some("trace-1".to_string());
        store.insert(&rec).await.unwrap();
        store.close().await;
    }

    let store = LogStore::open(path).await.unwrap();
    let records = store.get_all(None, 0).await.unwrap();
    assert_eq!(records.len(), 1);

    let stored = &records[0];
    assert_eq!(stored.path, "/users/42");
    assert_eq!(stored.path_pattern, "/users/:id");
    assert_eq!(stored.status_code, 201);
    assert_eq!(stored.query_params["tag"], json!(["a", "b"]));
    assert_eq!(stored.request_body["password"], "***");
    assert_eq!(stored.trace_id, "trace-1");
    store.close().await;
}

#[tokio::test]
async fn test_second_writer_is_rejected_until_close() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs.db");
    let path = path.to_str().unwrap();

    let first = LogStore::open(path).await.unwrap();
    match LogStore::open(path).await {
        Err(TrackError::Locked(_)) => {}
        Err(e) => panic!("Expected Locked error, got {}", e),
        Ok(_) => panic!("Expected second open to fail"),
    }

    first.close().await;
    let second = LogStore::open(path).await.unwrap();
    assert_eq!(second.count().await.unwrap(), 0);
    second.close().await;
}

#[tokio::test]
async fn test_concurrent_inserts_are_all_stored_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs.db");
    let store = Arc::new(
        LogStore::open_with(StoreOptions::new(path.to_str().unwrap()))
            .await
            .unwrap(),
    );

    let mut tasks = Vec::new();
    for worker in 0..4 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..20 {
                store
                    .insert(&record(&format!("/w{}/{}", worker, i), 200))
                    .await
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let records = store.get_all(None, 0).await.unwrap();
    assert_eq!(records.len(), 80);
    for pair in records.windows(2) {
        assert!(pair[0].created_at >= pair[1].created_at);
        assert!(pair[0].id > pair[1].id);
    }
    store.close().await;
}

#[tokio::test]
async fn test_delete_params_end_to_end() {
    let store = LogStore::open_in_memory().await.unwrap();
    for status in [200, 404, 500, 500] {
        store.insert(&record("/orders", status)).await.unwrap();
    }
    let mut old = record("/orders", 200);
    old.timestamp = Utc::now() - Duration::days(40);
    store.insert(&old).await.unwrap();

    let params = DeleteParams {
        status_code: Some("500".to_string()),
        ..Default::default()
    };
    let criteria = params.criteria().unwrap();
    assert_eq!(criteria, DeleteCriteria::StatusCode(500));
    assert_eq!(store.delete_matching(&criteria).await.unwrap(), 2);

    let params = DeleteParams {
        older_than_days: Some("30".to_string()),
        ..Default::default()
    };
    assert_eq!(store.delete_matching(&params.criteria().unwrap()).await.unwrap(), 1);

    let ids: Vec<String> = store
        .get_all(None, 0)
        .await
        .unwrap()
        .iter()
        .map(|r| r.id.to_string())
        .collect();
    let params = DeleteParams {
        log_ids: Some(format!("{}, 999999", ids.join(","))),
        ..Default::default()
    };
    assert_eq!(store.delete_matching(&params.criteria().unwrap()).await.unwrap(), 2);
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_operations_fail_after_close() {
    let store = LogStore::open_in_memory().await.unwrap();
    store.insert(&record("/a", 200)).await.unwrap();
    store.close().await;
    store.close().await;

    assert!(store.is_closed());
    assert!(matches!(store.insert(&record("/b", 200)).await, Err(TrackError::Closed)));
    assert!(matches!(store.get_all(None, 0).await, Err(TrackError::Closed)));
    assert!(matches!(store.summary().await, Err(TrackError::Closed)));
    assert!(matches!(store.delete_all().await, Err(TrackError::Closed)));
}

#[tokio::test]
async fn test_invalid_record_is_rejected_without_insert() {
    let store = LogStore::open_in_memory().await.unwrap();
    let mut bad = record("/a", 200);
    bad.duration_ms = Some(f64::NAN);

    let err = store.insert(&bad).await.unwrap_err();
    assert!(err.is_client_error());
    assert_eq!(store.count().await.unwrap(), 0);
}
