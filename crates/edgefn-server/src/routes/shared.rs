//! Shared-module endpoints (spec §6: "mirror the function endpoints under
//! `/functions/shared`, with the path wildcard carrying the module path").

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use edgefn_bundler::ExternalBundler;
use edgefn_errors::EdgeError;
use edgefn_invoker::SandboxRuntime;
use edgefn_store::CatalogueStore;

use crate::{
    auth,
    dto::SharedModuleSpec,
    error_response::{ApiError, ApiResult},
    state::AppState,
};

fn require_admin(config: &edgefn_config::GlobalConfig, headers: &HeaderMap) -> Result<(), ApiError> {
    if auth::is_admin_authorized(config, headers) {
        Ok(())
    } else {
        Err(ApiError::from(EdgeError::auth_required()))
    }
}

fn full_path(path: &str) -> String {
    if path.starts_with("_shared/") {
        path.to_string()
    } else {
        format!("_shared/{path}")
    }
}

pub async fn put_shared_module<S: CatalogueStore, B: ExternalBundler, R: SandboxRuntime>(
    State(state): State<AppState<S, B, R>>,
    headers: HeaderMap,
    Path(path): Path<String>,
    Json(spec): Json<SharedModuleSpec>,
) -> ApiResult<Response> {
    require_admin(&state.config, &headers)?;
    let record = state
        .store
        .put_shared_module(&full_path(&path), spec.content)
        .await
        ?;
    Ok((StatusCode::CREATED, Json(record)).into_response())
}

pub async fn get_shared_module<S: CatalogueStore, B: ExternalBundler, R: SandboxRuntime>(
    State(state): State<AppState<S, B, R>>,
    headers: HeaderMap,
    Path(path): Path<String>,
) -> ApiResult<Response> {
    require_admin(&state.config, &headers)?;
    let record = state
        .store
        .get_shared_module(&full_path(&path))
        .await
        ?
        .ok_or_else(|| EdgeError::not_found(format!("shared module \"{}\"", full_path(&path))))?;
    Ok(Json(record).into_response())
}

pub async fn delete_shared_module<S: CatalogueStore, B: ExternalBundler, R: SandboxRuntime>(
    State(state): State<AppState<S, B, R>>,
    headers: HeaderMap,
    Path(path): Path<String>,
) -> ApiResult<Response> {
    require_admin(&state.config, &headers)?;
    state
        .store
        .delete_shared_module(&full_path(&path))
        .await
        ?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn list_shared_modules<S: CatalogueStore, B: ExternalBundler, R: SandboxRuntime>(
    State(state): State<AppState<S, B, R>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    require_admin(&state.config, &headers)?;
    let modules = state
        .store
        .list_shared_modules()
        .await
        ?;
    Ok(Json(modules).into_response())
}
