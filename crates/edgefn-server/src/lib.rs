//! The HTTP surface (spec §6) binding C1-C5 together behind axum, the same
//! role the teacher's `local_backend::router` plays for the Convex HTTP
//! API. `build_router` is exposed separately from `main` so integration
//! tests can exercise the whole stack without a bound socket.

pub mod auth;
pub mod bundling;
pub mod cors;
pub mod dto;
pub mod error_response;
pub mod fs_layout;
mod routes;
pub mod state;

use axum::{
    routing::{get, post, MethodFilter},
    Router,
};
use edgefn_bundler::ExternalBundler;
use edgefn_invoker::SandboxRuntime;
use edgefn_store::CatalogueStore;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

pub use state::AppState;

/// Builds the full router over the generic `AppState`. Request-id
/// propagation and request tracing are applied here as ambient
/// middleware (spec §1 keeps authentication/request-id propagation
/// "out of scope" as a *design*, but still names them as things the core
/// interacts with -- this is the thin plumbing that lets them attach).
/// CORS is deliberately *not* a blanket layer here: spec §6's per-function
/// origin/method/header negotiation (`cors::merge`/`cors::apply_headers`,
/// used inside `routes::functions::invoke`) needs to see the resolved
/// function before it knows what to allow, and a `tower_http::cors::CorsLayer`
/// would intercept preflight requests and overwrite response headers before
/// that logic ever runs.
pub fn build_router<S: CatalogueStore, B: ExternalBundler, R: SandboxRuntime>(
    state: AppState<S, B, R>,
) -> Router {
    let request_id_header = http::HeaderName::from_static("x-request-id");

    let app = Router::new()
        .route("/functions", post(routes::functions::create_function).get(routes::functions::list_functions))
        .route("/functions/sync", post(routes::functions::sync_functions))
        .route("/functions/shared", get(routes::shared::list_shared_modules))
        .route(
            "/functions/shared/{*path}",
            get(routes::shared::get_shared_module)
                .put(routes::shared::put_shared_module)
                .delete(routes::shared::delete_shared_module),
        )
        .route("/functions/executions/{id}/logs", get(routes::functions::tail_logs))
        .route(
            "/functions/{name}",
            get(routes::functions::get_function)
                .put(routes::functions::update_function)
                .delete(routes::functions::delete_function),
        )
        .route(
            "/functions/{name}/invoke",
            axum::routing::on(
                MethodFilter::GET
                    .or(MethodFilter::POST)
                    .or(MethodFilter::PUT)
                    .or(MethodFilter::PATCH)
                    .or(MethodFilter::DELETE)
                    .or(MethodFilter::OPTIONS),
                routes::functions::invoke,
            ),
        )
        .route("/functions/{name}/executions", get(routes::functions::list_executions))
        .route("/admin/functions/reload", post(routes::admin::reload))
        .with_state(state);

    app.layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id_header.clone(), MakeRequestUuid))
        .layer(PropagateRequestIdLayer::new(request_id_header))
}
