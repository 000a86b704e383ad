//! C5: the Log Demultiplexer. Per-execution line counter that assigns a
//! monotonic `line_number` to each log line emitted by the invoker (C3) and
//! persists it to the catalogue store (C1), per spec §4.5.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use async_trait::async_trait;
use dashmap::DashMap;
use edgefn_common::{LogLevel, UnixNanos};
use edgefn_store::CatalogueStore;
use uuid::Uuid;

/// A handle scoped to one execution, handed to the invoker (C3) so it never
/// needs to thread an execution id through every log call. Generalises the
/// teacher's `LogInterleaver::spawn_with_prefixed_logs` single-process
/// fan-in to the "one entry per in-flight execution" cardinality spec §4.5
/// names.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn emit(&self, level: LogLevel, message: String);
}

/// Demultiplexer service (spec §4.5). Cheap to clone; the counter map is
/// behind an `Arc`.
pub struct LogDemultiplexer<S: CatalogueStore> {
    store: Arc<S>,
    counters: Arc<DashMap<Uuid, AtomicU32>>,
}

// Written by hand rather than `#[derive(Clone)]`: the derive would add a
// spurious `S: Clone` bound (neither field needs `S` itself to be `Clone`,
// only `Arc<S>`), which `SqliteCatalogueStore` does not implement.
impl<S: CatalogueStore> Clone for LogDemultiplexer<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            counters: self.counters.clone(),
        }
    }
}

impl<S: CatalogueStore> LogDemultiplexer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            counters: Arc::new(DashMap::new()),
        }
    }

    /// Registers a fresh counter for `execution_id`. Must be called before
    /// the invoker is spawned so `append` never drops a legitimate line
    /// (spec §4.5 lifecycle: "registered when an execution is created").
    pub fn register(&self, execution_id: Uuid) {
        self.counters.insert(execution_id, AtomicU32::new(0));
    }

    /// Removes the counter once the execution has reached a terminal state.
    /// Any log line that arrives after this point is dropped by `append`.
    pub fn unregister(&self, execution_id: Uuid) {
        self.counters.remove(&execution_id);
    }

    /// §4.5 `append`: look up the counter, read-then-increment for the line
    /// number, and persist. Drops the line (with a debug trace) if the
    /// execution has already been finalized — this is the mechanism that
    /// protects against late-arriving lines racing the terminal-state write.
    pub async fn append(&self, execution_id: Uuid, level: LogLevel, message: String) {
        let Some(counter) = self.counters.get(&execution_id) else {
            tracing::debug!(%execution_id, "dropping log line for unregistered execution");
            return;
        };
        // Single atomic read-modify-write: spec §5's ordering guarantee that
        // line numbers are contiguous from 0 per execution.
        let line_number = counter.fetch_add(1, Ordering::SeqCst);
        drop(counter);

        if let Err(err) = self
            .store
            .append_log_line(execution_id, line_number, level, message, UnixNanos::now())
            .await
        {
            tracing::warn!(%execution_id, line_number, %err, "failed to persist log line");
        }
    }

    /// A [`LogSink`] bound to one execution id, for handing to the invoker.
    pub fn sink_for(&self, execution_id: Uuid) -> ExecutionLogSink<S> {
        ExecutionLogSink {
            demux: self.clone(),
            execution_id,
        }
    }
}

pub struct ExecutionLogSink<S: CatalogueStore> {
    demux: LogDemultiplexer<S>,
    execution_id: Uuid,
}

#[async_trait]
impl<S: CatalogueStore> LogSink for ExecutionLogSink<S> {
    async fn emit(&self, level: LogLevel, message: String) {
        self.demux.append(self.execution_id, level, message).await;
    }
}

/// No-op sink for contexts that don't want per-line persistence (tests,
/// dry-run bulk sync). Never drops silently-meaningful information because
/// there is none to drop: this is an opt-in discard, not the §4.5
/// unregistered-execution path.
pub struct NullLogSink;

#[async_trait]
impl LogSink for NullLogSink {
    async fn emit(&self, _level: LogLevel, _message: String) {}
}

#[cfg(test)]
mod tests {
    use edgefn_store::SqliteCatalogueStore;

    use super::*;

    fn test_store() -> Arc<SqliteCatalogueStore> {
        Arc::new(SqliteCatalogueStore::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn unregistered_execution_drops_line() {
        let demux = LogDemultiplexer::new(test_store());
        let id = Uuid::new_v4();
        // Not registered: should be a no-op, not a panic.
        demux.append(id, LogLevel::Info, "hello".to_string()).await;
    }

    #[tokio::test]
    async fn line_numbers_start_at_zero_and_are_contiguous() {
        use edgefn_common::model::{ExecutionRecord, ExecutionStatus, TriggerType};
        use edgefn_common::{FunctionName, Namespace};

        let store = test_store();
        let demux = LogDemultiplexer::new(store.clone());
        let id = Uuid::new_v4();
        store
            .create_execution(ExecutionRecord {
                id,
                namespace: Namespace::default_namespace(),
                function_name: FunctionName::parse("f").unwrap(),
                trigger: TriggerType::Http,
                status: ExecutionStatus::Running,
                http_status: None,
                duration_ms: None,
                result: None,
                aggregate_logs: None,
                error_message: None,
                started_at: UnixNanos::now(),
                completed_at: None,
            })
            .await
            .unwrap();
        demux.register(id);
        for i in 0..5 {
            demux.append(id, LogLevel::Info, format!("line {i}")).await;
        }
        demux.unregister(id);
        let lines = store.log_lines_since(id, 0).await.unwrap();
        let numbers: Vec<u32> = lines.iter().map(|l| l.line_number).collect();
        assert_eq!(numbers, vec![0, 1, 2, 3, 4]);

        // Late line after unregister is dropped, not persisted.
        demux.append(id, LogLevel::Info, "late".to_string()).await;
        let lines_after = store.log_lines_since(id, 0).await.unwrap();
        assert_eq!(lines_after.len(), 5);
    }
}
