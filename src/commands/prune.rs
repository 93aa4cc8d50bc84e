use anyhow::{Context, Result};
use devtrack::config::Config;
use devtrack::store::{DeleteCriteria, LogStore, StoreOptions};
use tracing::info;

/// Execute the prune command
///
/// Opens the store for writing, so it fails while a server holds the same
/// database. Use `DELETE {mount}/logs` against a running server instead.
pub async fn execute(cfg: &Config, criteria: DeleteCriteria) -> Result<()> {
    let store = LogStore::open_with(StoreOptions::from(&cfg.store))
        .await
        .with_context(|| format!("Failed to open request log store at {}", cfg.store.database_path))?;

    let result = store.delete_matching(&criteria).await;
    store.close().await;
    let deleted = result?;

    info!(deleted = deleted, criteria = ?criteria, "Prune completed");
    println!("✓ Deleted {} log entries ({})", deleted, describe(&criteria));
    Ok(())
}

/// Map CLI flags to a criterion; clap guarantees exactly one is set
pub fn criteria_from_flags(
    all: bool,
    path_pattern: Option<String>,
    status_code: Option<u16>,
    older_than_days: Option<u32>,
) -> Option<DeleteCriteria> {
    if all {
        Some(DeleteCriteria::All)
    } else if let Some(pattern) = path_pattern {
        Some(DeleteCriteria::PathPattern(pattern))
    } else if let Some(code) = status_code {
        Some(DeleteCriteria::StatusCode(code))
    } else {
        older_than_days.map(DeleteCriteria::OlderThanDays)
    }
}

fn describe(criteria: &DeleteCriteria) -> String {
    match criteria {
        DeleteCriteria::All => "all records".to_string(),
        DeleteCriteria::PathPattern(p) => format!("path pattern {}", p),
        DeleteCriteria::StatusCode(c) => format!("status code {}", c),
        DeleteCriteria::OlderThanDays(d) => format!("older than {} days", d),
        DeleteCriteria::Ids(ids) => format!("{} ids", ids.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use devtrack::store::NewLogRecord;

    #[test]
    fn test_criteria_from_flags() {
        assert_eq!(criteria_from_flags(true, None, None, None), Some(DeleteCriteria::All));
        assert_eq!(
            criteria_from_flags(false, None, Some(500), None),
            Some(DeleteCriteria::StatusCode(500))
        );
        assert_eq!(
            criteria_from_flags(false, None, None, Some(0)),
            Some(DeleteCriteria::OlderThanDays(0))
        );
        assert_eq!(criteria_from_flags(false, None, None, None), None);
    }

    #[tokio::test]
    async fn test_prune_deletes_from_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.store.database_path = dir.path().join("logs.db").to_string_lossy().into_owned();

        {
            let store = LogStore::open_with(StoreOptions::from(&cfg.store)).await.unwrap();
            let old = NewLogRecord::new("GET", "/old", 200, Utc::now() - Duration::days(10));
            store.insert(&old).await.unwrap();
            store.insert(&NewLogRecord::new("GET", "/new", 200, Utc::now())).await.unwrap();
            store.close().await;
        }

        execute(&cfg, DeleteCriteria::OlderThanDays(7)).await.unwrap();

        let store = LogStore::open_with(StoreOptions::from(&cfg.store)).await.unwrap();
        let remaining = store.get_all(None, 0).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].path, "/new");
        store.close().await;
    }
}
