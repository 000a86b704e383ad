//! C4: the Scheduler. Owns a single process-wide cron table, binds
//! function `(namespace, name)` pairs to trigger times, enforces a
//! concurrency ceiling on scheduled executions, re-reads each function's
//! current configuration at fire time, and reconciles its timetable with
//! create/update/delete/enable/disable events on the function catalogue,
//! per spec §4.4.
//!
//! Grounded on the teacher's `application::cron_jobs::CronJobExecutor`
//! (backoff-wrapped retry loop around a single `run` future) and
//! `model::cron_jobs::next_ts::compute_next_ts` (single-binding next-fire
//! computation via `saffron`), generalised per `SPEC_FULL.md` §4.4 to a
//! `BTreeMap`-backed binding table guarded by one `parking_lot::Mutex`
//! rather than a document-store index scan, since this core has no
//! transactional document store to scan.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use edgefn_common::{
    model::{ExecutionRecord, ExecutionStatus, TriggerType},
    CronSpec, FunctionName, Namespace, UnixNanos,
};
use edgefn_config::GlobalConfig;
use edgefn_invoker::{InvokeParams, InvokeRequest, SandboxRuntime};
use edgefn_logs::LogDemultiplexer;
use edgefn_store::{CatalogueStore, ExecutionCompletion};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How often the internal ticker wakes up to scan the binding table for due
/// fires. `saffron` resolves cron expressions to second precision, so a
/// sub-second tick keeps fire-time error small without busy-looping.
const TICK_PERIOD: Duration = Duration::from_millis(500);

/// One entry in the cron table. Captures only the cron expression needed to
/// compute fire times; everything else about the function (body,
/// permissions, timeout, `enabled`) is re-read at fire time (spec §4.4.1,
/// §9 "Scheduler rebinding on every fire"). `reschedule` is only required
/// when this expression itself changes.
struct CronBinding {
    cron: CronSpec,
    next_fire: Option<UnixNanos>,
}

type BindingKey = (Namespace, FunctionName);

/// C4. Generic over the catalogue store and sandbox runtime so tests can
/// swap in an in-memory store and a fake runtime, the same way the
/// invoker crate separates `SandboxRuntime` from `DenoSandboxRuntime`.
pub struct Scheduler<S: CatalogueStore, R: SandboxRuntime> {
    store: Arc<S>,
    runtime: Arc<R>,
    demux: LogDemultiplexer<S>,
    config: GlobalConfig,
    bindings: Mutex<BTreeMap<BindingKey, CronBinding>>,
    /// §4.4.2 step 1 / §5 "single integer guarded by a mutex".
    active_count: Mutex<usize>,
    cancel: CancellationToken,
}

impl<S: CatalogueStore, R: SandboxRuntime> Scheduler<S, R> {
    pub fn new(store: Arc<S>, runtime: Arc<R>, demux: LogDemultiplexer<S>, config: GlobalConfig) -> Arc<Self> {
        Arc::new(Self {
            store,
            runtime,
            demux,
            config,
            bindings: Mutex::new(BTreeMap::new()),
            active_count: Mutex::new(0),
            cancel: CancellationToken::new(),
        })
    }

    /// §4.4.1: begin ticking immediately, then asynchronously load the
    /// function catalogue (retried with back-off since the backing store
    /// may not yet be ready at process start).
    pub fn start(self: &Arc<Self>) {
        let ticker = self.clone();
        tokio::spawn(async move { ticker.run_ticker().await });

        let bootstrap = self.clone();
        tokio::spawn(async move { bootstrap.bootstrap().await });
    }

    async fn bootstrap(&self) {
        let mut backoff = self.config.scheduler_bootstrap_initial_backoff;
        for attempt in 1..=self.config.scheduler_bootstrap_attempts {
            match self.store.list_all_functions().await {
                Ok(functions) => {
                    let mut bindings = self.bindings.lock();
                    for function in functions.iter().filter(|f| f.is_cron_eligible()) {
                        bindings.insert(
                            (function.namespace.clone(), function.name.clone()),
                            CronBinding {
                                cron: function.cron_schedule.clone().expect("is_cron_eligible checked Some"),
                                next_fire: None,
                            },
                        );
                    }
                    tracing::info!(bound = bindings.len(), "scheduler loaded cron bindings from catalogue");
                    return;
                }
                Err(err) => {
                    tracing::warn!(attempt, %err, "scheduler catalogue bootstrap attempt failed");
                    if attempt < self.config.scheduler_bootstrap_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }
        tracing::error!("scheduler bootstrap exhausted all retries; continuing with an empty cron table");
    }

    /// Binds `function` if it is cron-eligible (spec §4.4.1). No-op
    /// otherwise, so callers can pass every function from a create/update
    /// handler unconditionally.
    pub fn schedule(&self, namespace: &Namespace, name: &FunctionName, cron_schedule: Option<&CronSpec>, enabled: bool) {
        let Some(cron) = cron_schedule.filter(|_| enabled) else {
            return;
        };
        self.bindings.lock().insert(
            (namespace.clone(), name.clone()),
            CronBinding {
                cron: cron.clone(),
                next_fire: None,
            },
        );
    }

    pub fn unschedule(&self, namespace: &Namespace, name: &FunctionName) {
        self.bindings.lock().remove(&(namespace.clone(), name.clone()));
    }

    /// §4.4.3: idempotent. Unbinds any existing entry, then re-binds if the
    /// function still has a schedule and is enabled.
    pub fn reschedule(&self, namespace: &Namespace, name: &FunctionName, cron_schedule: Option<&CronSpec>, enabled: bool) {
        self.unschedule(namespace, name);
        self.schedule(namespace, name, cron_schedule, enabled);
    }

    pub fn scheduled_functions(&self) -> Vec<(Namespace, FunctionName)> {
        self.bindings.lock().keys().cloned().collect()
    }

    /// §4.4.4: cancel the ambient context, stop accepting new fires, and
    /// wait for active invocations up to the drain budget.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let deadline = tokio::time::Instant::now() + self.config.scheduler_drain_budget;
        loop {
            if *self.active_count.lock() == 0 {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!("scheduler shutdown drain budget elapsed with executions still running");
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    async fn run_ticker(self: Arc<Self>) {
        let mut interval = tokio::time::interval(TICK_PERIOD);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("scheduler ticker stopping");
                    return;
                }
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }
    }

    /// Scans the binding table for due fires and spawns a fresh task per
    /// fire (spec §5: "spawns a fresh task per fire"). Computing and
    /// advancing `next_fire` happens under the single bindings lock so two
    /// ticks can never double-fire the same binding.
    fn tick(self: &Arc<Self>) {
        let now = UnixNanos::now();
        let due: Vec<BindingKey> = {
            let mut bindings = self.bindings.lock();
            let mut due = Vec::new();
            for (key, binding) in bindings.iter_mut() {
                let next_fire = *binding.next_fire.get_or_insert_with(|| {
                    binding.cron.next_after(None, now).unwrap_or(now)
                });
                if next_fire.as_i64() <= now.as_i64() {
                    due.push(key.clone());
                    binding.next_fire = binding.cron.next_after(Some(next_fire), now).ok();
                }
            }
            due
        };
        for (namespace, name) in due {
            self.clone().fire(namespace, name);
        }
    }

    fn fire(self: Arc<Self>, namespace: Namespace, name: FunctionName) {
        if self.cancel.is_cancelled() {
            return;
        }
        tokio::spawn(async move {
            // §4.4.2 step 1: concurrency gate. If at the ceiling, the fire
            // is skipped entirely -- no execution row, no queueing.
            {
                let mut active = self.active_count.lock();
                if *active >= self.config.scheduler_concurrency_ceiling {
                    tracing::info!(
                        namespace = %namespace, name = %name,
                        "skipping cron fire: concurrency ceiling reached"
                    );
                    return;
                }
                *active += 1;
            }

            if let Err(err) = self.fire_once(&namespace, &name).await {
                tracing::warn!(namespace = %namespace, name = %name, %err, "cron fire failed");
            }

            let mut active = self.active_count.lock();
            *active = active.saturating_sub(1);
        });
    }

    async fn fire_once(&self, namespace: &Namespace, name: &FunctionName) -> anyhow::Result<()> {
        // §4.4.2 step 2: re-fetch. Deleted or disabled since scheduling ->
        // abort silently.
        let Some(function) = self.store.get_function(namespace, name).await? else {
            return Ok(());
        };
        if !function.enabled {
            return Ok(());
        }

        // §4.4.2 step 3: synthesise request, fresh execution id, register
        // with C5.
        let execution_id = Uuid::new_v4();
        self.demux.register(execution_id);
        let started_at = UnixNanos::now();

        // §4.4.2 step 4: create execution row in running state.
        self.store
            .create_execution(ExecutionRecord {
                id: execution_id,
                namespace: namespace.clone(),
                function_name: name.clone(),
                trigger: TriggerType::Cron,
                status: ExecutionStatus::Running,
                http_status: None,
                duration_ms: None,
                result: None,
                aggregate_logs: None,
                error_message: None,
                started_at,
                completed_at: None,
            })
            .await?;

        // §4.4.2 step 5: invoke via C3 using the function's own permissions
        // and timeout.
        let sink = self.demux.sink_for(execution_id);
        let outcome = self
            .runtime
            .invoke(
                InvokeParams {
                    execution_id,
                    artifact: function.artifact.clone(),
                    request: InvokeRequest::scheduled(""),
                    permissions: function.permissions,
                    timeout: Duration::from_secs(function.timeout_seconds as u64),
                    memory_limit_mb: function.memory_limit_mb,
                    user_env: Vec::new(),
                },
                &sink,
                CancellationToken::new(),
            )
            .await;

        // §4.4.2 step 6: complete the execution row in a detached task so
        // the scheduler does not block on the store.
        let store = self.store.clone();
        let demux = self.demux.clone();
        tokio::spawn(async move {
            let completion = match outcome {
                Ok(outcome) => ExecutionCompletion {
                    status: if outcome.error.is_some() {
                        ExecutionStatus::Error
                    } else {
                        ExecutionStatus::Success
                    },
                    http_status: Some(outcome.response.status),
                    duration_ms: outcome.duration_ms,
                    result: outcome.response.body,
                    aggregate_logs: outcome.aggregate_logs,
                    error_message: outcome.error,
                },
                Err(err) => ExecutionCompletion {
                    status: ExecutionStatus::Error,
                    http_status: None,
                    duration_ms: 0,
                    result: None,
                    aggregate_logs: None,
                    error_message: Some(err.to_string()),
                },
            };
            if let Err(err) = store.complete_execution(execution_id, completion).await {
                tracing::warn!(%execution_id, %err, "failed to finalize cron execution row");
            }
            demux.unregister(execution_id);
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use edgefn_common::model::{FunctionPermissions, FunctionRecord, FunctionSource};
    use edgefn_errors::EdgeError;
    use edgefn_invoker::{InvokeOutcome, InvokeResponse, LogSink};
    use edgefn_store::SqliteCatalogueStore;

    use super::*;

    fn test_store() -> Arc<SqliteCatalogueStore> {
        Arc::new(SqliteCatalogueStore::open_in_memory().unwrap())
    }

    fn test_function(namespace: &str, name: &str, cron: Option<&str>) -> FunctionRecord {
        FunctionRecord {
            namespace: Namespace::new(namespace),
            name: FunctionName::parse(name).unwrap(),
            description: String::new(),
            original_code: "async function handler(r){return {status:200, body:null}}".to_string(),
            artifact: "async function handler(r){return {status:200, body:null}}".to_string(),
            is_bundled: false,
            bundle_error: None,
            version: 1,
            enabled: true,
            permissions: FunctionPermissions::default(),
            allow_unauthenticated: true,
            is_public: true,
            timeout_seconds: 30,
            memory_limit_mb: None,
            cron_schedule: cron.map(|c| CronSpec::parse(c).unwrap()),
            cors: Default::default(),
            source: FunctionSource::Api,
            created_at: UnixNanos::now(),
            updated_at: UnixNanos::now(),
            created_by: None,
        }
    }

    /// Runtime double that counts how many invocations are in flight at
    /// once, so the concurrency-ceiling test (spec §8 scenario 4) can
    /// assert the peak never exceeds the configured cap.
    struct TrackingRuntime {
        current: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl SandboxRuntime for TrackingRuntime {
        async fn invoke(
            &self,
            params: InvokeParams,
            _log_sink: &(dyn LogSink + Send + Sync),
            _cancel: CancellationToken,
        ) -> Result<InvokeOutcome, EdgeError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            let _ = params;
            Ok(InvokeOutcome {
                response: InvokeResponse {
                    status: 200,
                    headers: Default::default(),
                    body: None,
                },
                aggregate_logs: Some(String::new()),
                error: None,
                error_kind: None,
                duration_ms: 0,
            })
        }
    }

    #[tokio::test]
    async fn schedule_unschedule_reschedule_bookkeeping() {
        let store = test_store();
        let demux = LogDemultiplexer::new(store.clone());
        let runtime = Arc::new(TrackingRuntime {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: Duration::from_millis(0),
        });
        let scheduler = Scheduler::new(store, runtime, demux, GlobalConfig::default());

        let ns = Namespace::new("default");
        let name = FunctionName::parse("nightly").unwrap();
        let cron = CronSpec::parse("0 0 * * *").unwrap();

        scheduler.schedule(&ns, &name, Some(&cron), true);
        assert_eq!(scheduler.scheduled_functions(), vec![(ns.clone(), name.clone())]);

        scheduler.unschedule(&ns, &name);
        assert!(scheduler.scheduled_functions().is_empty());

        scheduler.reschedule(&ns, &name, Some(&cron), true);
        assert_eq!(scheduler.scheduled_functions().len(), 1);

        // Disabling clears the binding via reschedule.
        scheduler.reschedule(&ns, &name, Some(&cron), false);
        assert!(scheduler.scheduled_functions().is_empty());
    }

    #[tokio::test]
    async fn schedule_ignores_functions_without_cron_or_disabled() {
        let store = test_store();
        let demux = LogDemultiplexer::new(store.clone());
        let runtime = Arc::new(TrackingRuntime {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: Duration::from_millis(0),
        });
        let scheduler = Scheduler::new(store, runtime, demux, GlobalConfig::default());
        let ns = Namespace::new("default");
        let name = FunctionName::parse("f").unwrap();
        let cron = CronSpec::parse("0 0 * * *").unwrap();

        scheduler.schedule(&ns, &name, None, true);
        assert!(scheduler.scheduled_functions().is_empty());

        scheduler.schedule(&ns, &name, Some(&cron), false);
        assert!(scheduler.scheduled_functions().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_ceiling_caps_simultaneous_fires() {
        let store = test_store();
        for i in 0..10 {
            store
                .create_function(test_function("default", &format!("f{i}"), Some("* * * * * *")))
                .await
                .unwrap();
        }
        let demux = LogDemultiplexer::new(store.clone());
        let runtime = Arc::new(TrackingRuntime {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: Duration::from_millis(150),
        });
        let mut config = GlobalConfig::default();
        config.scheduler_concurrency_ceiling = 3;
        let scheduler = Scheduler::new(store.clone(), runtime.clone(), demux, config);

        // Fire all ten simultaneously, as spec §8 scenario 4 describes,
        // bypassing the ticker so the test is deterministic.
        let mut handles = Vec::new();
        for i in 0..10 {
            let scheduler = scheduler.clone();
            handles.push(tokio::spawn(async move {
                scheduler.fire(Namespace::new("default"), FunctionName::parse(format!("f{i}")).unwrap());
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        // Give the spawned fire tasks time to run past the gate and for
        // the runtime's sleep to elapse.
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(
            runtime.peak.load(Ordering::SeqCst) <= 3,
            "peak concurrent invocations {} exceeded ceiling of 3",
            runtime.peak.load(Ordering::SeqCst)
        );
        assert_eq!(*scheduler.active_count.lock(), 0);
    }

    #[tokio::test]
    async fn abandoned_function_skips_silently() {
        let store = test_store();
        let demux = LogDemultiplexer::new(store.clone());
        let runtime = Arc::new(TrackingRuntime {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: Duration::from_millis(0),
        });
        let scheduler = Scheduler::new(store.clone(), runtime, demux, GlobalConfig::default());

        // Fire a binding whose function was never created: §4.4.2 step 2
        // "if the function has been deleted ... since scheduling, abort
        // silently" -- no execution row, no panic.
        scheduler
            .fire_once(&Namespace::new("default"), &FunctionName::parse("ghost").unwrap())
            .await
            .unwrap();
    }
}
