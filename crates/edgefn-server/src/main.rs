//! Process entry point. Reads configuration from the environment, opens the
//! catalogue store, starts the scheduler, builds the router, and serves
//! HTTP -- the same shape as the teacher's `local_backend` binary, minus
//! its deterministic-simulation `Runtime` abstraction (`SPEC_FULL.md`
//! records this as a deliberate scope cut: this core has no simulation
//! test harness to serve).

use std::sync::Arc;

use edgefn_bundler::{DenoBundleExternalBundler, ExternalBundler};
use edgefn_config::GlobalConfig;
use edgefn_invoker::DenoSandboxRuntime;
use edgefn_logs::LogDemultiplexer;
use edgefn_scheduler::Scheduler;
use edgefn_server::{build_router, AppState};
use edgefn_store::SqliteCatalogueStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = GlobalConfig::from_env();
    tracing::info!(bind_addr = %config.bind_addr, database_path = ?config.database_path, "starting edgefn-server");

    let store = Arc::new(SqliteCatalogueStore::open(&config.database_path)?);
    let bundler = Arc::new(DenoBundleExternalBundler::new(config.bundler_binary.clone()));
    let runtime = Arc::new(DenoSandboxRuntime::new(config.sandbox_binary.clone()));
    let demux = LogDemultiplexer::new(store.clone());

    if let Err(err) = bundler.precache().await {
        tracing::warn!(%err, "bundler pre-cache failed; first real bundle request will retry it");
    }

    let scheduler = Scheduler::new(store.clone(), runtime.clone(), demux.clone(), config.clone());
    scheduler.start();

    let state = AppState {
        store,
        bundler,
        runtime,
        demux,
        scheduler: scheduler.clone(),
        config: Arc::new(config.clone()),
    };

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");

    let shutdown_scheduler = scheduler.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received, draining scheduler");
            shutdown_scheduler.stop().await;
        })
        .await?;

    Ok(())
}
