use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::store::{LogStore, NewLogRecord};

/// Channel-backed log writer
///
/// Decouples request handling from SQLite writes: the middleware hands each
/// record over without waiting, and a single background task inserts them in
/// arrival order. The task exits once every clone of the writer is dropped,
/// after draining what is still queued.
#[derive(Clone)]
pub struct RecordWriter {
    tx: mpsc::Sender<NewLogRecord>,
}

impl RecordWriter {
    /// Create a writer and its background task
    ///
    /// # Arguments
    /// * `store` - Destination store
    /// * `buffer_size` - Records queued before new ones are dropped (default: 10000)
    pub fn spawn(store: Arc<LogStore>, buffer_size: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<NewLogRecord>(buffer_size.max(1));

        let handle = tokio::spawn(async move {
            let result = std::panic::AssertUnwindSafe(async {
                while let Some(record) = rx.recv().await {
                    if let Err(e) = store.insert(&record).await {
                        tracing::error!(
                            trace_id = ?record.trace_id,
                            path = %record.path,
                            error = %e,
                            "Failed to write request log"
                        );
                    }
                }
            })
            .catch_unwind()
            .await;
            match result {
                Ok(()) => tracing::debug!("Request log writer drained and stopped"),
                Err(e) => tracing::error!(panic = ?e, "Request log writer panicked"),
            }
        });

        (Self { tx }, handle)
    }

    /// Queue a record for insertion (never blocks)
    ///
    /// A full or closed channel drops the record with a warning.
    pub fn record(&self, record: NewLogRecord) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(record)) => {
                tracing::warn!(
                    trace_id = ?record.trace_id,
                    "Request log buffer full, dropping record"
                );
            }
            Err(mpsc::error::TrySendError::Closed(record)) => {
                tracing::warn!(
                    trace_id = ?record.trace_id,
                    "Request log writer stopped, dropping record"
                );
            }
        }
    }
}
