//! Shared application state threaded through every handler via axum's
//! `State` extractor, the same role the teacher's `RouterState`
//! (`local_backend::router`) plays for its own handlers.

use std::sync::Arc;

use edgefn_bundler::ExternalBundler;
use edgefn_config::GlobalConfig;
use edgefn_invoker::SandboxRuntime;
use edgefn_logs::LogDemultiplexer;
use edgefn_scheduler::Scheduler;
use edgefn_store::CatalogueStore;

pub struct AppState<S: CatalogueStore, B: ExternalBundler, R: SandboxRuntime> {
    pub store: Arc<S>,
    pub bundler: Arc<B>,
    pub runtime: Arc<R>,
    pub demux: LogDemultiplexer<S>,
    pub scheduler: Arc<Scheduler<S, R>>,
    pub config: Arc<GlobalConfig>,
}

// Hand-written rather than `#[derive(Clone)]`: the derive would add a
// spurious `S: Clone` / `B: Clone` / `R: Clone` bound, none of which our
// concrete types (`SqliteCatalogueStore`, `DenoBundleExternalBundler`,
// `DenoSandboxRuntime`) implement or need to -- every field here is already
// behind an `Arc` or is itself cheap-to-clone (`LogDemultiplexer`).
impl<S: CatalogueStore, B: ExternalBundler, R: SandboxRuntime> Clone for AppState<S, B, R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            bundler: self.bundler.clone(),
            runtime: self.runtime.clone(),
            demux: self.demux.clone(),
            scheduler: self.scheduler.clone(),
            config: self.config.clone(),
        }
    }
}
